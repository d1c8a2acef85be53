//! Layered command settings: built-in defaults, then an optional TOML file,
//! then command-line flags.

use crate::cli::{ConvertArgs, RdfArgs, RmsdArgs};
use crate::error::{CliError, Result};
use chemtraj::analysis::config::DEFAULT_BATCH_SIZE;
use chemtraj::traj::stf::DEFAULT_PRECISION;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

pub struct DefaultsConfig {
    pub precision: u32,
    pub batch_size: usize,
    pub r_max: f64,
    pub bins: usize,
    pub superpose: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            batch_size: DEFAULT_BATCH_SIZE,
            r_max: 10.0,
            bins: 200,
            superpose: true,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConvertConfig {
    pub precision: Option<u32>,
    pub timestep: Option<f32>,
    pub title: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRmsdConfig {
    pub superpose: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRdfConfig {
    pub r_max: Option<f64>,
    pub bins: Option<usize>,
    pub density: Option<f64>,
    pub batch_size: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub convert: FileConvertConfig,
    #[serde(default)]
    pub rmsd: FileRmsdConfig,
    #[serde(default)]
    pub rdf: FileRdfConfig,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertSettings {
    pub precision: u32,
    pub timestep: Option<f32>,
    pub title: Option<String>,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RdfSettings {
    pub r_max: f64,
    pub bins: usize,
    pub density: Option<f64>,
    pub batch_size: usize,
}

fn positive(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        Err(CliError::Config(format!("`{name}` must be at least 1.")))
    } else {
        Ok(value)
    }
}

pub fn convert_settings(args: &ConvertArgs, file: FileConvertConfig) -> Result<ConvertSettings> {
    let defaults = DefaultsConfig::default();
    Ok(ConvertSettings {
        precision: args
            .precision
            .or(file.precision)
            .unwrap_or(defaults.precision),
        timestep: args.timestep.or(file.timestep),
        title: args.title.clone().or(file.title),
        batch_size: positive(
            "batch-size",
            args.batch_size
                .or(file.batch_size)
                .unwrap_or(defaults.batch_size),
        )?,
    })
}

pub fn rmsd_superpose(args: &RmsdArgs, file: &FileRmsdConfig) -> bool {
    if args.no_superpose {
        false
    } else {
        file.superpose.unwrap_or(DefaultsConfig::default().superpose)
    }
}

pub fn rdf_settings(args: &RdfArgs, file: FileRdfConfig) -> RdfSettings {
    let defaults = DefaultsConfig::default();
    RdfSettings {
        r_max: args.r_max.or(file.r_max).unwrap_or(defaults.r_max),
        bins: args.bins.or(file.bins).unwrap_or(defaults.bins),
        density: args.density.or(file.density),
        batch_size: args
            .batch_size
            .or(file.batch_size)
            .unwrap_or(defaults.batch_size),
    }
}
