//! Telemetry metric name constants.
//!
//! Centralised metric names for gateway operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `astrolabe_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `endpoint` — registry id (e.g. "apod", "iss-position")
//! - `status` — outcome: "ok" or the error kind ("http", "network", ...)
//! - `source` — rate-limit origin: "local" or "provider"

/// Total network calls dispatched through the transport.
///
/// Labels: `endpoint`, `status`.
pub const REQUESTS_TOTAL: &str = "astrolabe_requests_total";

/// Network call duration in seconds.
///
/// Labels: `endpoint`.
pub const REQUEST_DURATION_SECONDS: &str = "astrolabe_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `endpoint`.
pub const RETRIES_TOTAL: &str = "astrolabe_retries_total";

/// Total fresh cache hits.
///
/// Labels: `endpoint`.
pub const CACHE_HITS_TOTAL: &str = "astrolabe_cache_hits_total";

/// Total cache misses (including forced bypasses).
///
/// Labels: `endpoint`.
pub const CACHE_MISSES_TOTAL: &str = "astrolabe_cache_misses_total";

/// Total rate-limit outcomes.
///
/// Labels: `endpoint`, `source` ("local" | "provider").
pub const RATE_LIMITED_TOTAL: &str = "astrolabe_rate_limited_total";

/// Total expired entries served in place of a failure.
///
/// Labels: `endpoint`.
pub const STALE_SERVED_TOTAL: &str = "astrolabe_stale_served_total";

/// Total requests rejected by the validator.
///
/// Labels: `endpoint`.
pub const VALIDATION_FAILURES_TOTAL: &str = "astrolabe_validation_failures_total";
