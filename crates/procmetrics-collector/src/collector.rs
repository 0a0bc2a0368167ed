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
//! Collector lifecycle
//!
//! A [`Collector`] owns two background tasks: the serving loop behind
//! `/metrics` and the sampling loop that refreshes the gauges. The lifecycle
//! is `idle -> running -> stopped` and never goes back. Each transition is a
//! single compare-and-set on an atomic flag, so scrapes never contend with
//! `start`/`stop`.
//!
//! `stop` runs in two ordered phases: the sampling loop is signalled and its
//! exit awaited, then the listener is shut down gracefully. Both phases share
//! the caller's deadline.

use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, trace, warn, Dispatch};

use crate::error::{Error, Result, StopPhase};
use crate::registry::RuntimeGauges;
use crate::sampler::{ProcessSampler, Sampler};
use crate::server::{self, ServeState};
use crate::types::{CollectorOpts, LifecycleState};

/// Runtime metrics collector
///
/// Cloning is cheap and every clone drives the same lifecycle.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<CollectorInner>,
}

struct CollectorInner {
    logger: Dispatch,
    addr: String,
    namespace: String,
    interval: Duration,
    gauges: RuntimeGauges,
    sampler: Arc<dyn Sampler>,
    app: Router,

    // Start/Stop controls
    started: AtomicBool,
    stopped: AtomicBool,
    listener_claimed: AtomicBool,
    stop_signal: CancellationToken,
    sampler_done: CancellationToken,
    server_shutdown: CancellationToken,
    finished: CancellationToken,
    serve_state: watch::Sender<ServeState>,

    binds: AtomicU64,
    shutdowns: AtomicU64,
}

impl Collector {
    /// Create a collector and register its gauges
    ///
    /// Fails without a logger, or when a gauge name is already registered.
    /// Nothing is spawned until [`start`](Self::start).
    pub fn new(opts: CollectorOpts) -> Result<Self> {
        let interval = opts.effective_interval();
        let logger = opts.logger.ok_or(Error::MissingLogger)?;

        let gauges = RuntimeGauges::new(&opts.namespace)?;
        gauges.register(&opts.registry)?;

        let sampler = opts
            .sampler
            .unwrap_or_else(|| Arc::new(ProcessSampler::new()));
        let (serve_state, _) = watch::channel(ServeState::Pending);

        tracing::dispatcher::with_default(&logger, || {
            debug!(
                namespace = %opts.namespace,
                addr = %opts.addr,
                interval_ms = interval.as_millis() as u64,
                "Created runtime collector"
            );
        });

        Ok(Self {
            inner: Arc::new(CollectorInner {
                logger,
                addr: opts.addr,
                namespace: opts.namespace,
                interval,
                gauges,
                sampler,
                app: server::router(opts.registry),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                listener_claimed: AtomicBool::new(false),
                stop_signal: CancellationToken::new(),
                sampler_done: CancellationToken::new(),
                server_shutdown: CancellationToken::new(),
                finished: CancellationToken::new(),
                serve_state,
                binds: AtomicU64::new(0),
                shutdowns: AtomicU64::new(0),
            }),
        })
    }

    /// Launch the serving and sampling loops
    ///
    /// Returns immediately. Only the first call has an effect; later calls,
    /// including calls after [`stop`](Self::stop), do nothing. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        tracing::dispatcher::with_default(&inner.logger, || {
            info!(
                addr = %inner.addr,
                interval_ms = inner.interval.as_millis() as u64,
                "Starting runtime collector"
            );
        });

        tokio::spawn(serve_loop(Arc::clone(inner)).with_subscriber(inner.logger.clone()));
        tokio::spawn(sampling_loop(Arc::clone(inner)).with_subscriber(inner.logger.clone()));
    }

    /// Gracefully stop the collector before `deadline`
    ///
    /// Returns `Ok(())` at once if already stopped. A collector that was
    /// never started goes straight to stopped. Otherwise the sampling loop is
    /// stopped first, then the listener; if `deadline` passes while waiting
    /// for the sampling loop a [`Error::ShutdownTimeout`] is returned and the
    /// call may be retried. Only one caller performs the listener shutdown;
    /// concurrent callers wait for it.
    pub async fn stop(&self, deadline: Instant) -> Result<()> {
        self.stop_inner(deadline)
            .with_subscriber(self.inner.logger.clone())
            .await
    }

    /// [`stop`](Self::stop) with a deadline `timeout` from now
    pub async fn stop_with_timeout(&self, timeout: Duration) -> Result<()> {
        self.stop(Instant::now() + timeout).await
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        if self.inner.stopped.load(Ordering::Acquire) {
            LifecycleState::Stopped
        } else if self.inner.started.load(Ordering::Acquire) {
            LifecycleState::Running
        } else {
            LifecycleState::Idle
        }
    }

    /// Address the serving loop is bound to
    ///
    /// Waits for the bind attempt after [`start`](Self::start). `None` if
    /// the collector was never started, the bind failed, or the listener is
    /// already closed.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        if !self.inner.started.load(Ordering::Acquire) {
            return None;
        }

        let mut rx = self.inner.serve_state.subscribe();
        let state = rx
            .wait_for(|s| !matches!(s, ServeState::Pending))
            .await
            .ok()?;
        match *state {
            ServeState::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    /// Number of times the serving loop has bound its listener
    pub fn listener_binds(&self) -> u64 {
        self.inner.binds.load(Ordering::Acquire)
    }

    /// Number of listener shutdowns performed
    pub fn listener_shutdowns(&self) -> u64 {
        self.inner.shutdowns.load(Ordering::Acquire)
    }

    /// Gauges written by the sampling loop
    pub fn gauges(&self) -> &RuntimeGauges {
        &self.inner.gauges
    }

    /// Sampling interval in effect
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Metric namespace
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    async fn stop_inner(&self, deadline: Instant) -> Result<()> {
        let inner = &self.inner;
        if inner.stopped.load(Ordering::Acquire) {
            return Ok(());
        }

        // Never started: claim the start flag so a late start() is a no-op,
        // and the listener so a concurrent stop() waits instead of shutting
        // down a socket that was never bound.
        if inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            inner.listener_claimed.store(true, Ordering::Release);
            inner.stop_signal.cancel();
            inner.sampler_done.cancel();
            inner.server_shutdown.cancel();
            inner.serve_state.send_replace(ServeState::Closed(None));
            self.mark_stopped();
            info!("Collector stopped before it was started");
            return Ok(());
        }

        info!("Stopping runtime collector");
        inner.stop_signal.cancel();

        if !inner.sampler_done.is_cancelled() && Instant::now() >= deadline {
            warn!("Deadline already elapsed while the sampling loop is busy");
            return Err(Error::ShutdownTimeout { phase: StopPhase::Sampling });
        }

        tokio::select! {
            biased;
            _ = inner.sampler_done.cancelled() => {
                debug!("Sampling loop acknowledged stop");
            }
            _ = sleep_until(deadline) => {
                warn!("Deadline elapsed waiting for the sampling loop");
                return Err(Error::ShutdownTimeout { phase: StopPhase::Sampling });
            }
        }

        if inner
            .listener_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return tokio::select! {
                biased;
                _ = inner.finished.cancelled() => Ok(()),
                _ = sleep_until(deadline) => {
                    Err(Error::ShutdownTimeout { phase: StopPhase::Listener })
                }
            };
        }

        let result = self.shutdown_listener(deadline).await;

        // Once the serving loop has exited the socket is released, whatever
        // it reported; otherwise a later stop() may try again.
        if inner.serve_state.borrow().is_terminal() {
            self.mark_stopped();
        } else {
            inner.listener_claimed.store(false, Ordering::Release);
        }

        match &result {
            Ok(()) => info!("Runtime collector stopped"),
            Err(e) => error!(error = %e, "Runtime collector did not stop cleanly"),
        }
        result
    }

    async fn shutdown_listener(&self, deadline: Instant) -> Result<()> {
        let inner = &self.inner;
        inner.shutdowns.fetch_add(1, Ordering::AcqRel);
        inner.server_shutdown.cancel();

        let mut rx = inner.serve_state.subscribe();
        let state = tokio::select! {
            biased;
            state = rx.wait_for(ServeState::is_terminal) => match state {
                Ok(state) => state.clone(),
                Err(_) => {
                    return Err(Error::ListenerShutdown("serving loop state was lost".to_string()));
                }
            },
            _ = sleep_until(deadline) => {
                return Err(Error::ListenerShutdown(
                    "deadline elapsed while draining connections".to_string(),
                ));
            }
        };

        match state {
            ServeState::Closed(Some(reason)) => Err(Error::ListenerShutdown(reason)),
            _ => Ok(()),
        }
    }

    fn mark_stopped(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.finished.cancel();
    }
}

async fn serve_loop(inner: Arc<CollectorInner>) {
    server::serve(
        &inner.addr,
        inner.app.clone(),
        &inner.server_shutdown,
        &inner.serve_state,
        &inner.binds,
    )
    .await;
}

async fn sampling_loop(inner: Arc<CollectorInner>) {
    // Acknowledge the stop however this task ends.
    let _ack = inner.sampler_done.clone().drop_guard();
    let period = inner.interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval_ms = period.as_millis() as u64, "Sampling loop started");

    loop {
        // Stop wins over a tick that is ready at the same time.
        tokio::select! {
            biased;
            _ = inner.stop_signal.cancelled() => break,
            _ = ticker.tick() => {
                // Samplers may block; keep them off the async workers so
                // timers, including stop deadlines, keep firing.
                let sampler = Arc::clone(&inner.sampler);
                let sample = match tokio::task::spawn_blocking(move || sampler.sample()).await {
                    Ok(sample) => sample,
                    Err(e) => {
                        error!(error = %e, "Sampler failed, skipping this tick");
                        continue;
                    }
                };
                inner.gauges.record(&sample);
                trace!(
                    threads = sample.threads,
                    heap_alloc = sample.heap_alloc,
                    heap_sys = sample.heap_sys,
                    gc_completed_cycles = sample.gc_completed_cycles,
                    gc_pause_total_ns = sample.gc_pause_total_ns,
                    "Recorded runtime sample"
                );
            }
        }
    }

    debug!("Sampling loop stopped");
}
