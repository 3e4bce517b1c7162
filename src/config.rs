//! Layered configuration: defaults, then an optional TOML file, then
//! environment variables. Command-line flags are applied last by the binary.

use crate::accumulation::AnalysisConfig;
use crate::fetcher::FetcherConfig;
use crate::pipeline::PipelineConfig;
use crate::server::ServerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file (default: "bhavcopy.db")
    pub database_path: PathBuf,
    pub fetcher: FetcherConfig,
    pub pipeline: PipelineConfig,
    pub analysis: AnalysisConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("bhavcopy.db"),
            fetcher: FetcherConfig::default(),
            pipeline: PipelineConfig::default(),
            analysis: AnalysisConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path` when given, otherwise starts from defaults, then applies
    /// the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Config::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Overrides fields from `BHAVCOPY_DB`, `BHAVCOPY_CACHE_DIR`, `HOST` and
    /// `PORT` as returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("BHAVCOPY_DB") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("BHAVCOPY_CACHE_DIR") {
            self.fetcher.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var: "PORT", value: port })?;
        }
        Ok(())
    }
}
