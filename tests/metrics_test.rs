//! Tests for metrics emission.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter. Each test drives a
//! current-thread runtime inside `with_local_recorder`, so the spawned
//! network task records into the same local recorder.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use astrolabe::telemetry;
use astrolabe::transport::Transport;
use astrolabe::{
    EndpointDescriptor, EndpointRegistry, FetchOptions, Gateway, GatewayError, Params,
    RateLimitOrigin, Result, RetryConfig,
};
use serde_json::{Value, json};

// ============================================================================
// Mock transports
// ============================================================================

struct Ok200;

#[async_trait]
impl Transport for Ok200 {
    fn name(&self) -> &str {
        "ok"
    }

    async fn send(&self, _endpoint: &EndpointDescriptor, _params: &Params) -> Result<Value> {
        Ok(json!({"ok": true}))
    }
}

/// Answers 429 for the first `throttled` calls, then fails with 500.
struct ThrottleThenFail {
    throttled: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Transport for ThrottleThenFail {
    fn name(&self) -> &str {
        "throttle-then-fail"
    }

    async fn send(&self, _endpoint: &EndpointDescriptor, _params: &Params) -> Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if n == 0 {
            return Ok(json!({"first": true}));
        }
        if n <= self.throttled {
            return Err(GatewayError::RateLimited {
                origin: RateLimitOrigin::Provider,
            });
        }
        Err(GatewayError::Http {
            status: 500,
            message: "HTTP 500: Internal Server Error".into(),
        })
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counter values for `name` carrying label `label=value`.
fn labelled_total(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Run `f` on a paused current-thread runtime with a local recorder installed.
fn record<F, Fut>(f: F) -> SnapshotVec
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap();

    metrics::with_local_recorder(&recorder, || runtime.block_on(f()));
    snapshotter.snapshot().into_vec()
}

fn gateway_with_limit(transport: Arc<dyn Transport>, rate_limit: u32) -> Gateway {
    let registry = EndpointRegistry::from_json(&format!(
        r#"[{{"id": "exoplanets", "url": "https://archive.example.edu/TAP/sync",
             "method": "GET", "rate_limit": {rate_limit}, "ttl_ms": 0,
             "params": {{"query": {{"type": "string", "required": true}}}}}}]"#
    ))
    .unwrap();
    Gateway::builder()
        .registry(registry)
        .transport(transport)
        .retry(RetryConfig::new().max_retries(2))
        .build()
        .unwrap()
}

fn gateway(transport: Arc<dyn Transport>) -> Gateway {
    gateway_with_limit(transport, 100)
}

fn query() -> Params {
    Params::new().with("query", "select pl_name from ps")
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn network_success_records_request_and_duration() {
    let snapshot = record(|| async {
        let gateway = gateway(Arc::new(Ok200));
        gateway
            .fetch("exoplanets", &query(), FetchOptions::default())
            .await
            .unwrap();
    });

    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(
        labelled_total(&snapshot, telemetry::REQUESTS_TOTAL, "status", "ok"),
        1
    );
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
}

#[test]
fn cache_hit_is_counted() {
    let snapshot = record(|| async {
        let gateway = gateway(Arc::new(Ok200));
        gateway
            .fetch("exoplanets", &query(), FetchOptions::default())
            .await
            .unwrap();
        // ttl 0: fresh only at the instant of insertion; the paused clock
        // has not moved.
        gateway
            .fetch("exoplanets", &query(), FetchOptions::default())
            .await
            .unwrap();
    });

    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
}

#[test]
fn validation_failure_is_counted() {
    let snapshot = record(|| async {
        let gateway = gateway(Arc::new(Ok200));
        let result = gateway
            .fetch("exoplanets", &Params::new(), FetchOptions::default())
            .await;
        assert!(result.is_err());
    });

    assert_eq!(counter_total(&snapshot, telemetry::VALIDATION_FAILURES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 0);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 0);
}

#[test]
fn local_rate_limit_is_counted_by_source() {
    let snapshot = record(|| async {
        let gateway = gateway_with_limit(Arc::new(Ok200), 2);
        let options = FetchOptions::new().no_cache(true);
        for _ in 0..3 {
            let _ = gateway.fetch("exoplanets", &query(), options).await;
        }
    });

    assert_eq!(
        labelled_total(&snapshot, telemetry::RATE_LIMITED_TOTAL, "source", "local"),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 2);
}

#[test]
fn retries_and_stale_fallback_are_counted() {
    let snapshot = record(|| async {
        let transport = Arc::new(ThrottleThenFail {
            throttled: 1,
            calls: AtomicU32::new(0),
        });
        let gateway = gateway(transport);
        gateway
            .fetch("exoplanets", &query(), FetchOptions::default())
            .await
            .unwrap();

        // 429, then 500: one retry, then the cached entry is served stale.
        let fetched = gateway
            .fetch_with_retry("exoplanets", &query(), FetchOptions::new().no_cache(true))
            .await
            .unwrap();
        assert!(fetched.is_stale());
    });

    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::STALE_SERVED_TOTAL), 1);
    assert_eq!(
        labelled_total(&snapshot, telemetry::RATE_LIMITED_TOTAL, "source", "provider"),
        1
    );
    assert_eq!(
        labelled_total(&snapshot, telemetry::REQUESTS_TOTAL, "status", "http"),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let gateway = gateway(Arc::new(Ok200));
    gateway
        .fetch("exoplanets", &query(), FetchOptions::default())
        .await
        .unwrap();
}
