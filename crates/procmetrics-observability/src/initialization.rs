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
//! Subscriber construction and installation.
//!
//! [`build_dispatch`] turns a [`LogConfig`] into a logger handle without
//! touching global state. [`init_tracing_with_config`] additionally installs
//! that handle as the process-wide default.

use crate::config::{LogConfig, LogError, LogFormat};
use std::io;
use tracing::Dispatch;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build a subscriber from `config` and install it as the global default.
///
/// Fails if a global default has already been set.
pub fn init_tracing_with_config(config: LogConfig) -> Result<Dispatch, LogError> {
    let dispatch = build_dispatch(config)?;
    tracing::dispatcher::set_global_default(dispatch.clone()).map_err(|e| {
        LogError::ConfigError(format!("Failed to install global subscriber: {}", e))
    })?;
    Ok(dispatch)
}

/// Build a logger handle from `config` without installing it.
///
/// # Example
///
/// ```ignore
/// use procmetrics_observability::{build_dispatch, LogConfig, LogFormat};
///
/// let logger = build_dispatch(LogConfig::new().with_format(LogFormat::Json))?;
/// tracing::dispatcher::with_default(&logger, || tracing::info!("scoped"));
/// ```
pub fn build_dispatch(config: LogConfig) -> Result<Dispatch, LogError> {
    let env_filter = build_env_filter(&config)?;
    let subscriber = Registry::default()
        .with(fmt_layer(&config))
        .with(env_filter);
    Ok(Dispatch::new(subscriber))
}

fn fmt_layer(config: &LogConfig) -> BoxedLayer {
    match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(io::stderr)
                .with_thread_names(true)
                .with_ansi(config.use_color)
                .with_span_events(FmtSpan::ACTIVE)
                .pretty();

            if config.use_timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .with_writer(io::stderr)
                .with_thread_names(false)
                .with_ansi(config.use_color)
                .with_span_events(FmtSpan::CLOSE)
                .compact();

            if config.use_timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .with_writer(io::stderr)
                .json()
                .with_thread_names(true)
                .with_span_events(FmtSpan::CLOSE);

            if config.use_timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
    }
}

/// Build an environment filter for the given configuration
fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let level_str = config.get_effective_level();

    EnvFilter::try_new(&level_str).map_err(|e| {
        LogError::ConfigError(format!("Failed to parse log filter '{}': {}", level_str, e))
    })
}
