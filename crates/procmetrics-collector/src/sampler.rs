//! Runtime sampling
//!
//! A [`Sampler`] turns the current state of the process into a
//! [`RuntimeSample`]. [`ProcessSampler`] reads thread and memory figures
//! through `sysinfo`; reclamation figures come from a shared
//! [`ReclaimStats`] handle that the application reports into.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::types::RuntimeSample;

/// Source of runtime readings
///
/// Implementations must be cheap and must not fail: a running process always
/// has something to report.
pub trait Sampler: Send + Sync {
    /// Read the current runtime state
    fn sample(&self) -> RuntimeSample;
}

impl<F> Sampler for F
where
    F: Fn() -> RuntimeSample + Send + Sync,
{
    fn sample(&self) -> RuntimeSample {
        self()
    }
}

/// Counters for application-driven memory reclamation
///
/// Rust frees memory deterministically, so there is no collector to ask for
/// cycle counts. Code that releases memory in bulk (arena resets, cache
/// sweeps) records each pass here and the gauges pick it up.
#[derive(Debug, Clone, Default)]
pub struct ReclaimStats {
    inner: Arc<ReclaimCounters>,
}

#[derive(Debug, Default)]
struct ReclaimCounters {
    cycles: AtomicU64,
    pause_ns: AtomicU64,
}

impl ReclaimStats {
    /// Create a fresh set of counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed cycle that paused for `pause`
    pub fn record_cycle(&self, pause: Duration) {
        let nanos = u64::try_from(pause.as_nanos()).unwrap_or(u64::MAX);
        self.inner.pause_ns.fetch_add(nanos, Ordering::Relaxed);
        self.inner.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Run `f` and record it as one cycle
    pub fn time_cycle<T>(&self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record_cycle(start.elapsed());
        out
    }

    /// Completed cycles so far
    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    /// Total pause time so far, in nanoseconds
    pub fn pause_total_ns(&self) -> u64 {
        self.inner.pause_ns.load(Ordering::Relaxed)
    }
}

/// Samples the current process
#[derive(Debug, Clone, Default)]
pub struct ProcessSampler {
    reclaim: ReclaimStats,
}

impl ProcessSampler {
    /// Create a sampler with its own reclamation counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sampler that reads the given reclamation counters
    pub fn with_reclaim_stats(reclaim: ReclaimStats) -> Self {
        Self { reclaim }
    }

    /// Handle to the reclamation counters read by this sampler
    pub fn reclaim_stats(&self) -> &ReclaimStats {
        &self.reclaim
    }
}

impl Sampler for ProcessSampler {
    fn sample(&self) -> RuntimeSample {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );

        let (threads, heap_alloc, heap_sys) = system
            .process(pid)
            .map(|p| {
                // The task set holds every thread except the main one.
                let threads = p.tasks().map_or(1, |tasks| tasks.len() as u64 + 1);
                (threads, p.memory(), p.virtual_memory())
            })
            .unwrap_or((1, 0, 0));

        RuntimeSample {
            threads,
            heap_alloc,
            heap_sys,
            gc_completed_cycles: self.reclaim.cycles(),
            gc_pause_total_ns: self.reclaim.pause_total_ns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_count_at_least_one() {
        let sample = ProcessSampler::new().sample();
        assert!(sample.threads >= 1);
    }

    #[test]
    fn test_reclaim_counters_flow_into_sample() {
        let stats = ReclaimStats::new();
        let sampler = ProcessSampler::with_reclaim_stats(stats.clone());

        stats.record_cycle(Duration::from_nanos(1_500));
        stats.record_cycle(Duration::from_nanos(500));

        let sample = sampler.sample();
        assert_eq!(sample.gc_completed_cycles, 2);
        assert_eq!(sample.gc_pause_total_ns, 2_000);
        assert_eq!(sampler.reclaim_stats().cycles(), 2);
    }

    #[test]
    fn test_time_cycle_returns_value() {
        let stats = ReclaimStats::new();
        let value = stats.time_cycle(|| 42);
        assert_eq!(value, 42);
        assert_eq!(stats.cycles(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memory_is_reported() {
        let sample = ProcessSampler::new().sample();
        assert!(sample.heap_alloc > 0);
        assert!(sample.heap_sys >= sample.heap_alloc);
    }

    #[test]
    fn test_closure_sampler() {
        let sampler = || RuntimeSample {
            threads: 7,
            ..Default::default()
        };
        assert_eq!(Sampler::sample(&sampler).threads, 7);
    }
}
