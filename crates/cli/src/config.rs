use failure::Fail;
use log::LevelFilter;
use newsdesk_models::Config as ModelConfig;
use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

use crate::Result;

pub fn load(path: &Path) -> Result<Config> {
    let data = fs::read(path).map_err(ReadConfigurationError)?;
    toml::from_slice(&data).map_err(|e| ConfigurationError(e).into())
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: newsdesk_rest_api::Config,
    #[serde(default)]
    pub logging: Logging,
    pub sentry: Option<Sentry>,
    #[serde(flatten)]
    pub model: ModelConfig,
}

/// Logging configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Logging {
    /// Default logging level.
    #[serde(default = "default_level_filter")]
    pub level: LevelFilter,
    /// Actix-web logging level.
    pub network: Option<LevelFilter>,
    /// Audit records logging level.
    pub audit: Option<LevelFilter>,
    /// Custom filters.
    #[serde(default)]
    pub filters: HashMap<String, LevelFilter>,
}

/// Sentry.io configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Sentry {
    /// Client key.
    pub dsn: String,
}

#[derive(Debug, Fail)]
#[fail(display = "Cannot read configuration file")]
pub struct ReadConfigurationError(#[fail(cause)] std::io::Error);

#[derive(Debug, Fail)]
#[fail(display = "Invalid configuration: {}", _0)]
pub struct ConfigurationError(#[fail(cause)] toml::de::Error);

fn default_level_filter() -> LevelFilter {
    LevelFilter::Info
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: default_level_filter(),
            network: None,
            audit: None,
            filters: HashMap::new(),
        }
    }
}
