use super::config::ConfigError;
use crate::core::utils::geometry::GeometryError;
use crate::traj::TrajError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Trajectory error: {source}")]
    Trajectory {
        #[from]
        source: TrajError,
    },

    #[error("Geometry error in frame {frame}: {source}")]
    Geometry {
        frame: usize,
        #[source]
        source: GeometryError,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Atom index {index} is out of range for a trajectory of {natoms} atoms")]
    SelectionOutOfRange { index: usize, natoms: usize },

    #[error("Frame {frame} has no unit cell and no density was given")]
    MissingCell { frame: usize },

    #[error("Trajectory contained no frames")]
    NoFrames,

    #[error("Series of length {len} is too short for lag {max_lag}")]
    SeriesTooShort { len: usize, max_lag: usize },

    #[error("Series has zero variance")]
    ZeroVariance,

    #[error("Analysis was cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Maps a trajectory cancellation onto [`AnalysisError::Cancelled`].
    pub(crate) fn from_traj(error: TrajError) -> Self {
        match error {
            TrajError::Cancelled => Self::Cancelled,
            other => other.into(),
        }
    }
}

pub(crate) fn check_selection(indices: &[usize], natoms: usize) -> Result<(), AnalysisError> {
    match indices.iter().find(|&&i| i >= natoms) {
        Some(&index) => Err(AnalysisError::SelectionOutOfRange { index, natoms }),
        None => Ok(()),
    }
}
