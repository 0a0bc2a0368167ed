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
//! Standalone procmetrics exporter
//!
//! Resolves settings from flags, environment and an optional TOML file, then
//! runs a collector until the process is asked to terminate.

pub mod config;

use anyhow::{Context, Result};
use clap::Parser;
use procmetrics_collector::{Collector, CollectorOpts};
use procmetrics_observability::{Dispatch, LogConfig, LogFormat};
use std::future::Future;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub use config::{ConfigError, ConfigResult, FileConfig, LogSection};

/// Listen address used when neither flag nor file sets one
pub const DEFAULT_ADDR: &str = ":8080";
/// Namespace used when neither flag nor file sets one
pub const DEFAULT_NAMESPACE: &str = "procmetrics";
/// Sampling period in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
/// Graceful stop budget in seconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Command-line arguments
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "procmetrics")]
#[command(version, about = "Export process runtime gauges for Prometheus")]
#[command(
    long_about = "Samples thread count, memory and reclamation counters of this process on a \
fixed interval and serves them at /metrics in Prometheus text format."
)]
pub struct Args {
    /// Listen address (`:port` binds every interface)
    #[arg(long, env = "PROCMETRICS_ADDR", value_name = "ADDR")]
    pub addr: Option<String>,

    /// Prefix for every gauge name
    #[arg(long, env = "PROCMETRICS_NAMESPACE")]
    pub namespace: Option<String>,

    /// Sampling interval in seconds
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Time allowed for a graceful stop in seconds
    #[arg(long, value_name = "SECS")]
    pub shutdown_timeout: Option<u64>,

    /// TOML configuration file; flags override its values
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter directive (falls back to RUST_LOG, then info)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format (pretty|compact|json)
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

/// Fully resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Listen address as given by the user
    pub addr: String,
    /// Gauge name prefix
    pub namespace: String,
    /// Sampling period
    pub interval: Duration,
    /// Graceful stop budget
    pub shutdown_timeout: Duration,
    /// Log filter directive, if any
    pub log_level: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
}

impl Settings {
    /// Merge `args` over the file it names, if any
    pub fn resolve(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file)?)
    }

    /// Flags win over file values; defaults fill the rest
    pub fn merge(args: &Args, file: FileConfig) -> ConfigResult<Self> {
        let addr = args
            .addr
            .clone()
            .or(file.addr)
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        config::validate_addr("addr", &addr)?;

        let shutdown_timeout_secs = args
            .shutdown_timeout
            .or(file.shutdown_timeout_secs)
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);
        if shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "shutdown_timeout",
                "must be greater than zero",
            ));
        }

        Ok(Settings {
            addr,
            namespace: args
                .namespace
                .clone()
                .or(file.namespace)
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            interval: Duration::from_secs(
                args.interval
                    .or(file.interval_secs)
                    .unwrap_or(DEFAULT_INTERVAL_SECS),
            ),
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
            log_level: args.log_level.clone().or(file.log.level),
            log_format: args.log_format.or(file.log.format).unwrap_or_default(),
        })
    }

    /// Logging configuration for these settings
    pub fn log_config(&self) -> LogConfig {
        let config = LogConfig::new()
            .with_format(self.log_format)
            .with_color(std::io::stderr().is_terminal());
        match &self.log_level {
            Some(level) => config.with_level(level.as_str()),
            None => config,
        }
    }

    /// Collector options for these settings, reporting into `logger`
    pub fn collector_opts(&self, logger: Dispatch) -> CollectorOpts {
        CollectorOpts::new(self.addr.as_str())
            .with_namespace(self.namespace.as_str())
            .with_interval(self.interval)
            .with_logger(logger)
    }
}

/// Run a collector until `shutdown` completes, then stop it
pub async fn run_until<F>(settings: &Settings, logger: Dispatch, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let collector = Collector::new(settings.collector_opts(logger))
        .context("Failed to construct collector")?;
    collector.start();

    match collector.local_addr().await {
        Some(addr) => info!(
            "Exporting {} gauges on http://{}/metrics every {:?}",
            settings.namespace, addr, settings.interval
        ),
        None => warn!(addr = %settings.addr, "Metrics endpoint unavailable, sampling continues"),
    }

    shutdown.await;
    info!(timeout = ?settings.shutdown_timeout, "Stopping collector");

    collector
        .stop_with_timeout(settings.shutdown_timeout)
        .await
        .context("Collector did not stop cleanly")?;

    info!("Collector stopped");
    Ok(())
}

/// Wait for SIGINT or, on unix, SIGTERM
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C signal");
            }
            _ = terminate.recv() => {
                info!("Received terminate signal");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C signal");
        Ok(())
    }
}
