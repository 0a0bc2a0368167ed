// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! TOML configuration file for the exporter
//!
//! Every field is optional; command-line flags take precedence over values
//! read here.
//!
//! ```toml
//! namespace = "myapp"
//! addr = ":9100"
//! interval_secs = 5
//! shutdown_timeout_secs = 10
//!
//! [log]
//! level = "info"
//! format = "json"
//! ```

use procmetrics_collector::server::normalize_addr;
use procmetrics_observability::LogFormat;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Contents of a configuration file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Metric name prefix
    pub namespace: Option<String>,
    /// Listen address, `:port` accepted
    pub addr: Option<String>,
    /// Sampling period in seconds
    pub interval_secs: Option<u64>,
    /// Time allowed for a graceful stop in seconds
    pub shutdown_timeout_secs: Option<u64>,
    /// Logging settings
    pub log: LogSection,
}

/// `[log]` table
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Filter directive, e.g. `info` or `procmetrics_collector=debug`
    pub level: Option<String>,
    /// Output format
    pub format: Option<LogFormat>,
}

impl FileConfig {
    /// Parse configuration from TOML text and validate it
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: FileConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        debug!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Check the values that are present
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(addr) = &self.addr {
            validate_addr("addr", addr)?;
        }
        if self.shutdown_timeout_secs == Some(0) {
            return Err(ConfigError::invalid_value(
                "shutdown_timeout_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Check that `addr` resolves to a socket address once normalised
pub(crate) fn validate_addr(field: &str, addr: &str) -> ConfigResult<SocketAddr> {
    normalize_addr(addr).parse().map_err(|e| {
        ConfigError::invalid_value(field, format!("'{}' is not a socket address: {}", addr, e))
    })
}
