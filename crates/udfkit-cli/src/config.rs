//! Configuration for the udfkit command line
//!
//! Loads configuration from:
//! 1. a YAML file (`--config` or `UDFKIT_CONFIG`) - logging and catalogue output
//! 2. a `.env` file, loaded before anything else
//!
//! Environment variables always override file values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::catalog::CatalogFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnvVar { var: String, value: String },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific directives
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Catalogue dump configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub format: CatalogFormat,

    /// List the aliases of each function
    pub include_aliases: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            format: CatalogFormat::Json,
            include_aliases: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub catalog: CatalogConfig,
}

impl Config {
    /// Load configuration from a YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(format) = std::env::var("UDFKIT_CATALOG_FORMAT") {
            self.catalog.format =
                format
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnvVar {
                        var: "UDFKIT_CATALOG_FORMAT".to_string(),
                        value: format.clone(),
                    })?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
        Ok(())
    }
}
