//! Gateway configuration.
//!
//! Loaded from an optional YAML file; every field has a default and unknown
//! fields are rejected. Command-line flags override file values in `main`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::observability::LogFormat;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`Config`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the storage gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Directory holding `<owner>/<name>` repositories.
    pub root: PathBuf,
    /// Path of the git executable.
    pub git_bin: PathBuf,
    /// Deadline for refs advertisement, in milliseconds.
    pub advertise_timeout_ms: u64,
    /// Optional deadline for one RPC exchange, in seconds.
    pub rpc_timeout_secs: Option<u64>,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format, `pretty` or `json`.
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            root: PathBuf::from("./data/repositories"),
            git_bin: PathBuf::from("/usr/bin/git"),
            advertise_timeout_ms: 1000,
            rpc_timeout_secs: None,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Loads and validates a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parses and validates YAML.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.advertise_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "advertise_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.rpc_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "rpc_timeout_secs must be greater than zero when set".into(),
            ));
        }
        self.log_format
            .parse::<LogFormat>()
            .map_err(ConfigError::Invalid)?;
        Ok(())
    }

    /// Deadline for refs advertisement.
    pub fn advertise_timeout(&self) -> Duration {
        Duration::from_millis(self.advertise_timeout_ms)
    }

    /// Deadline for one RPC exchange, if any.
    pub fn rpc_timeout(&self) -> Option<Duration> {
        self.rpc_timeout_secs.map(Duration::from_secs)
    }

    /// Parsed log format.
    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.log_format)
    }
}
