use crate::core::models::Frame;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },
}

pub const DEFAULT_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct RdfConfig {
    /// Atoms at the center of each shell.
    pub reference: Vec<usize>,
    /// Atoms counted in the shells.
    pub target: Vec<usize>,
    pub r_max: f64,
    pub bins: usize,
    /// Number density of the target atoms; taken from each frame's cell when `None`.
    pub density: Option<f64>,
    /// Frames requested per concurrent batch.
    pub batch_size: usize,
}

impl RdfConfig {
    pub fn bin_width(&self) -> f64 {
        self.r_max / self.bins as f64
    }
}

#[derive(Default)]
pub struct RdfConfigBuilder {
    reference: Option<Vec<usize>>,
    target: Option<Vec<usize>>,
    r_max: Option<f64>,
    bins: Option<usize>,
    density: Option<f64>,
    batch_size: Option<usize>,
}

impl RdfConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(mut self, indices: Vec<usize>) -> Self {
        self.reference = Some(indices);
        self
    }
    pub fn target(mut self, indices: Vec<usize>) -> Self {
        self.target = Some(indices);
        self
    }
    pub fn r_max(mut self, r_max: f64) -> Self {
        self.r_max = Some(r_max);
        self
    }
    pub fn bins(mut self, bins: usize) -> Self {
        self.bins = Some(bins);
        self
    }
    pub fn density(mut self, density: f64) -> Self {
        self.density = Some(density);
        self
    }
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn build(self) -> Result<RdfConfig, ConfigError> {
        let config = RdfConfig {
            reference: self
                .reference
                .ok_or(ConfigError::MissingParameter("reference"))?,
            target: self.target.ok_or(ConfigError::MissingParameter("target"))?,
            r_max: self.r_max.ok_or(ConfigError::MissingParameter("r_max"))?,
            bins: self.bins.ok_or(ConfigError::MissingParameter("bins"))?,
            density: self.density,
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        };
        if config.reference.is_empty() || config.target.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "reference/target",
                reason: "selection is empty",
            });
        }
        if !(config.r_max > 0.0 && config.r_max.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "r_max",
                reason: "must be positive and finite",
            });
        }
        if config.bins == 0 || config.batch_size == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "bins/batch_size",
                reason: "must be at least 1",
            });
        }
        if config.density.is_some_and(|d| d.is_nan() || d <= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "density",
                reason: "must be positive",
            });
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RmsdConfig {
    pub reference: Frame,
    /// Atoms compared; all atoms when `None`.
    pub selection: Option<Vec<usize>>,
    /// Superpose each frame onto the reference before measuring.
    pub superpose: bool,
}

#[derive(Default)]
pub struct RmsdConfigBuilder {
    reference: Option<Frame>,
    selection: Option<Vec<usize>>,
    superpose: Option<bool>,
}

impl RmsdConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(mut self, frame: Frame) -> Self {
        self.reference = Some(frame);
        self
    }
    pub fn selection(mut self, indices: Vec<usize>) -> Self {
        self.selection = Some(indices);
        self
    }
    pub fn superpose(mut self, superpose: bool) -> Self {
        self.superpose = Some(superpose);
        self
    }

    pub fn build(self) -> Result<RmsdConfig, ConfigError> {
        let reference = self
            .reference
            .ok_or(ConfigError::MissingParameter("reference"))?;
        if reference.is_empty() || self.selection.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::InvalidParameter {
                name: "selection",
                reason: "no atoms to compare",
            });
        }
        Ok(RmsdConfig {
            reference,
            selection: self.selection,
            superpose: self.superpose.unwrap_or(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn rdf_builder_reports_first_missing_parameter() {
        let err = RdfConfigBuilder::new().reference(vec![0]).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("target"));
    }

    #[test]
    fn rdf_builder_applies_defaults_and_validates() {
        let config = RdfConfigBuilder::new()
            .reference(vec![0, 1])
            .target(vec![2])
            .r_max(10.0)
            .bins(50)
            .build()
            .unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.bin_width(), 0.2);

        let bad = RdfConfigBuilder::new()
            .reference(vec![0])
            .target(vec![1])
            .r_max(-1.0)
            .bins(10)
            .build();
        assert!(matches!(bad, Err(ConfigError::InvalidParameter { name: "r_max", .. })));
    }

    #[test]
    fn rmsd_builder_defaults_to_superposition() {
        let config = RmsdConfigBuilder::new()
            .reference(vec![Point3::origin()])
            .build()
            .unwrap();
        assert!(config.superpose);
        assert_eq!(
            RmsdConfigBuilder::new().build(),
            Err(ConfigError::MissingParameter("reference"))
        );
    }
}
