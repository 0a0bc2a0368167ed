//! procmetrics Observability Module
//!
//! Provides structured logging for procmetrics and builds the logger handle
//! that the collector's background tasks report into.
//!
//! # Features
//!
//! - **Multiple Output Formats**: Pretty, JSON, and compact output formats
//! - **Environment-based Filtering**: Dynamic log level control via `RUST_LOG`
//! - **Logger Handles**: a [`tracing::Dispatch`] can be built without touching
//!   the global default, so tests and libraries can inject their own
//!
//! # Example
//!
//! ```ignore
//! use procmetrics_observability::{init_tracing_with_config, LogConfig, LogFormat};
//!
//! fn main() -> anyhow::Result<()> {
//!     // Install globally and keep a handle for the collector
//!     let logger = init_tracing_with_config(
//!         LogConfig::new().with_format(LogFormat::Pretty).with_level("info"),
//!     )?;
//!
//!     tracing::info!("Application started");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat};
pub use initialization::{build_dispatch, init_tracing_with_config};

/// Tracing re-exports for convenience
pub use tracing::{debug, error, info, trace, warn, Dispatch, Level};
