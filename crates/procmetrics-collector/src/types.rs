//! Common types for the runtime collector

use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Dispatch;

use crate::sampler::Sampler;

/// Sampling interval used when the options leave it at zero
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Construction options for a [`Collector`](crate::Collector)
///
/// Options are consumed by the constructor and never change afterwards.
#[derive(Clone, Default)]
pub struct CollectorOpts {
    /// Logger handle used by the background loops. Required.
    pub logger: Option<Dispatch>,

    /// Bind address for the `/metrics` endpoint
    pub addr: String,

    /// Prefix for every gauge name
    pub namespace: String,

    /// Period between two samples (zero means [`DEFAULT_INTERVAL`])
    pub interval: Duration,

    /// Registry the gauges are registered into
    pub registry: Registry,

    /// Custom sampler; the process sampler is used when unset
    pub sampler: Option<Arc<dyn Sampler>>,
}

impl CollectorOpts {
    /// Create options bound to `addr` with every other field defaulted
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set the logger handle
    pub fn with_logger(mut self, logger: impl Into<Dispatch>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    /// Set the metric namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the sampling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Register into `registry` instead of a private one
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the process sampler
    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// The interval with the zero default applied
    pub fn effective_interval(&self) -> Duration {
        if self.interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            self.interval
        }
    }
}

impl fmt::Debug for CollectorOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorOpts")
            .field("logger", &self.logger.is_some())
            .field("addr", &self.addr)
            .field("namespace", &self.namespace)
            .field("interval", &self.interval)
            .field("sampler", &self.sampler.is_some())
            .finish_non_exhaustive()
    }
}

/// One reading of the process runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSample {
    /// Live threads in the process
    pub threads: u64,
    /// Resident bytes
    pub heap_alloc: u64,
    /// Bytes of address space obtained from the OS
    pub heap_sys: u64,
    /// Completed reclamation cycles
    pub gc_completed_cycles: u64,
    /// Total time spent in reclamation pauses, in nanoseconds
    pub gc_pause_total_ns: u64,
}

/// Observable lifecycle of a collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, never started
    Idle,
    /// Background loops launched
    Running,
    /// Shut down; terminal
    Stopped,
}

impl LifecycleState {
    /// Get string label for logging
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        }
    }
}
