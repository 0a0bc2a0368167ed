//! procmetrics collector
//!
//! Exposes process runtime health through a Prometheus `/metrics` endpoint,
//! refreshed on a fixed interval.
//!
//! # Features
//!
//! - **Runtime gauges**: live threads, resident and virtual memory,
//!   reclamation cycles and pause time
//! - **HTTP Endpoint**: Axum-based `/metrics` endpoint for scraping
//! - **Graceful lifecycle**: idempotent `start`, deadline-bounded `stop`
//! - **Injected registry**: no hidden global state, so several collectors can
//!   live in one process
//!
//! # Gauges
//!
//! - `<namespace>_goroutines`
//! - `<namespace>_heap_alloc`
//! - `<namespace>_heap_sys`
//! - `<namespace>_gc_pause_total_ns`
//! - `<namespace>_gc_completed_cycles`
//!
//! # Example
//!
//! ```ignore
//! use procmetrics_collector::{Collector, CollectorOpts};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let logger = procmetrics_observability::build_dispatch(Default::default())?;
//!     let collector = Collector::new(
//!         CollectorOpts::new(":8080")
//!             .with_namespace("myapp")
//!             .with_interval(Duration::from_secs(5))
//!             .with_logger(logger),
//!     )?;
//!
//!     collector.start();
//!     tokio::signal::ctrl_c().await?;
//!     collector.stop_with_timeout(Duration::from_secs(10)).await?;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod error;
pub mod registry;
pub mod sampler;
pub mod server;
pub mod types;

pub use collector::Collector;
pub use error::{Error, Result, StopPhase};
pub use registry::RuntimeGauges;
pub use sampler::{ProcessSampler, ReclaimStats, Sampler};
pub use types::{CollectorOpts, LifecycleState, RuntimeSample, DEFAULT_INTERVAL};

// Re-export prometheus types for convenience
pub use prometheus::{Encoder, Registry, TextEncoder};
