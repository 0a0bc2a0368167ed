// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 procmetrics Contributors

//! Integration tests for the collector lifecycle
//!
//! Exercises start/stop under concurrency, deadline handling and the live
//! `/metrics` endpoint.

use procmetrics_collector::{
    Collector, CollectorOpts, Error, LifecycleState, Registry, RuntimeSample, Sampler, StopPhase,
};
use procmetrics_observability::{build_dispatch, LogConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Instant};
use tokio_test::{assert_err, assert_ok};

/// Sampler that counts its invocations and reports the count as threads
#[derive(Default)]
struct CountingSampler {
    calls: AtomicU64,
}

impl CountingSampler {
    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Sampler for CountingSampler {
    fn sample(&self) -> RuntimeSample {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        RuntimeSample {
            threads: calls,
            ..Default::default()
        }
    }
}

/// Sampler whose first invocation blocks its thread
struct BlockingSampler {
    entered: AtomicBool,
    block_for: Duration,
}

impl Sampler for BlockingSampler {
    fn sample(&self) -> RuntimeSample {
        if !self.entered.swap(true, Ordering::SeqCst) {
            std::thread::sleep(self.block_for);
        }
        RuntimeSample {
            threads: 1,
            ..Default::default()
        }
    }
}

fn opts(namespace: &str, interval: Duration) -> CollectorOpts {
    let logger = build_dispatch(LogConfig::new().with_level("warn").with_color(false)).unwrap();
    CollectorOpts::new("127.0.0.1:0")
        .with_namespace(namespace)
        .with_interval(interval)
        .with_registry(Registry::new())
        .with_logger(logger)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

/// Value of the first sample line for `name` in an exposition body
fn gauge_value(body: &str, name: &str) -> Option<f64> {
    body.lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(' ')?.parse().ok())
}

#[tokio::test]
async fn test_missing_logger_fails_construction() {
    let result = Collector::new(CollectorOpts::new("127.0.0.1:0").with_namespace("nolog"));
    assert!(matches!(result, Err(Error::MissingLogger)));
}

#[tokio::test]
async fn test_duplicate_registration_fails_construction() {
    let registry = Registry::new();
    let _first = Collector::new(opts("dup", Duration::from_secs(1)).with_registry(registry.clone()))
        .unwrap();

    let err = Collector::new(opts("dup", Duration::from_secs(1)).with_registry(registry))
        .err()
        .unwrap();
    assert!(err.is_config());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_bind_once() {
    let collector = Collector::new(opts("starts", Duration::from_millis(50))).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let c = collector.clone();
            tokio::spawn(async move { c.start() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(collector.local_addr().await.is_some());
    sleep(Duration::from_millis(100)).await;
    assert_eq!(collector.listener_binds(), 1);
    assert_eq!(collector.state(), LifecycleState::Running);

    collector.stop_with_timeout(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stops_shutdown_once() {
    let collector = Collector::new(opts("stops", Duration::from_millis(20))).unwrap();
    collector.start();
    assert!(collector.local_addr().await.is_some());

    let deadline = Instant::now() + Duration::from_secs(3);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let c = collector.clone();
            tokio::spawn(async move { c.stop(deadline).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(collector.listener_shutdowns(), 1);
    assert_eq!(collector.state(), LifecycleState::Stopped);

    // Later calls return at once.
    assert_ok!(collector.stop(Instant::now()).await);
    assert_eq!(collector.listener_shutdowns(), 1);
}

#[tokio::test]
async fn test_stop_before_first_tick() {
    let sampler = Arc::new(CountingSampler::default());
    let collector = Collector::new(
        opts("early", Duration::from_secs(3600)).with_sampler(Arc::clone(&sampler) as Arc<dyn Sampler>),
    )
    .unwrap();
    collector.start();
    assert!(collector.local_addr().await.is_some());

    let started = std::time::Instant::now();
    collector.stop_with_timeout(Duration::from_secs(1)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(sampler.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_expired_deadline_with_blocked_sampler_times_out() {
    let sampler = Arc::new(BlockingSampler {
        entered: AtomicBool::new(false),
        block_for: Duration::from_millis(400),
    });
    let collector = Collector::new(
        opts("blocked", Duration::from_millis(10)).with_sampler(Arc::clone(&sampler) as Arc<dyn Sampler>),
    )
    .unwrap();
    collector.start();

    while !sampler.entered.load(Ordering::SeqCst) {
        sleep(Duration::from_millis(5)).await;
    }

    let err = assert_err!(collector.stop(Instant::now()).await);
    assert!(matches!(
        err,
        Error::ShutdownTimeout {
            phase: StopPhase::Sampling
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(collector.state(), LifecycleState::Running);
    assert_eq!(collector.listener_shutdowns(), 0);

    // Retrying with a real deadline succeeds once the sampler unblocks.
    collector.stop_with_timeout(Duration::from_secs(3)).await.unwrap();
    assert_eq!(collector.state(), LifecycleState::Stopped);
    assert_eq!(collector.listener_shutdowns(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_short_deadline_with_slow_sampler_times_out_promptly() {
    let sampler = Arc::new(BlockingSampler {
        entered: AtomicBool::new(false),
        block_for: Duration::from_millis(1500),
    });
    let collector = Collector::new(
        opts("slow", Duration::from_millis(10)).with_sampler(Arc::clone(&sampler) as Arc<dyn Sampler>),
    )
    .unwrap();
    collector.start();

    while !sampler.entered.load(Ordering::SeqCst) {
        sleep(Duration::from_millis(5)).await;
    }

    let started = std::time::Instant::now();
    let err = assert_err!(collector.stop_with_timeout(Duration::from_millis(100)).await);
    let elapsed = started.elapsed();

    assert!(matches!(
        err,
        Error::ShutdownTimeout {
            phase: StopPhase::Sampling
        }
    ));
    assert!(
        elapsed < Duration::from_millis(250),
        "stop overran its deadline: {:?}",
        elapsed
    );
    assert_eq!(collector.state(), LifecycleState::Running);

    assert_ok!(collector.stop_with_timeout(Duration::from_secs(5)).await);
    assert_eq!(collector.state(), LifecycleState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listener_drain_deadline_is_reported_and_retryable() {
    let collector = Collector::new(opts("drain", Duration::from_millis(20))).unwrap();
    collector.start();
    let addr = collector.local_addr().await.unwrap();

    // A request whose headers never finish keeps its connection in flight.
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\n")
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    let err = assert_err!(collector.stop_with_timeout(Duration::from_millis(200)).await);
    assert!(matches!(err, Error::ListenerShutdown(_)), "unexpected error: {:?}", err);
    assert!(err.is_retryable());
    assert_eq!(collector.state(), LifecycleState::Running);

    // Once the client goes away the listener drains and a retry succeeds.
    drop(stream);
    assert_ok!(collector.stop_with_timeout(Duration::from_secs(3)).await);
    assert_eq!(collector.state(), LifecycleState::Stopped);
    assert_eq!(collector.listener_shutdowns(), 2);
}

#[tokio::test]
async fn test_scrape_fails_after_stop() {
    let sampler = Arc::new(CountingSampler::default());
    let collector = Collector::new(
        opts("closed", Duration::from_millis(20)).with_sampler(Arc::clone(&sampler) as Arc<dyn Sampler>),
    )
    .unwrap();
    collector.start();
    let addr = collector.local_addr().await.unwrap();
    let url = format!("http://{}/metrics", addr);

    let response = client().get(&url).send().await.unwrap();
    assert!(response.status().is_success());

    collector.stop_with_timeout(Duration::from_secs(2)).await.unwrap();

    let result = client().get(&url).send().await;
    assert!(result.is_err());
    assert!(result.unwrap_err().is_connect());

    // Gauges are frozen once sampling stopped.
    let frozen = sampler.calls();
    let snapshot = collector.gauges().snapshot();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(sampler.calls(), frozen);
    assert_eq!(collector.gauges().snapshot(), snapshot);
}

#[tokio::test]
async fn test_scrape_reflects_recent_samples() {
    let sampler = Arc::new(CountingSampler::default());
    let collector = Collector::new(
        opts("fresh", Duration::from_millis(50)).with_sampler(Arc::clone(&sampler) as Arc<dyn Sampler>),
    )
    .unwrap();
    collector.start();
    let addr = collector.local_addr().await.unwrap();

    sleep(Duration::from_millis(150)).await;

    let body = client()
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let value = gauge_value(&body, "fresh_goroutines").unwrap();
    assert!(value >= 2.0, "expected at least two samples, got {}", value);
    assert!(sampler.calls() >= 2);

    collector.stop_with_timeout(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_process_sampler_exposes_live_threads() {
    let collector = Collector::new(opts("live", Duration::from_millis(20))).unwrap();
    collector.start();
    let addr = collector.local_addr().await.unwrap();

    sleep(Duration::from_millis(100)).await;

    let body = client()
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    for name in [
        "live_goroutines",
        "live_heap_alloc",
        "live_heap_sys",
        "live_gc_pause_total_ns",
        "live_gc_completed_cycles",
    ] {
        assert!(gauge_value(&body, name).is_some(), "missing {}", name);
    }
    assert!(gauge_value(&body, "live_goroutines").unwrap() >= 1.0);

    collector.stop_with_timeout(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_logged_not_fatal() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let mut options = opts("busy", Duration::from_millis(20));
    options.addr = addr;
    let collector = Collector::new(options).unwrap();
    collector.start();

    assert_eq!(collector.local_addr().await, None);
    assert_eq!(collector.listener_binds(), 0);

    // Nothing is bound, so stopping still succeeds.
    assert_ok!(collector.stop_with_timeout(Duration::from_secs(2)).await);
    assert_eq!(collector.state(), LifecycleState::Stopped);
}
