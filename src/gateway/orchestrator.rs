//! Gateway — the fetch orchestrator.
//!
//! Composes the gates in a fixed order:
//!
//! ```text
//! fetch(endpoint, params)
//!     │
//!     ▼  validate        ── ValidationError (nothing else touched)
//!     ▼  cache (fresh?)  ── hit: Success, no limiter, no network
//!     ▼  limiter.admit   ── rejected: RateLimited { Local }, no network
//!     ▼  transport.send  ── spawned; fills the cache on 200
//!     ▼
//!   Result<Fetched>
//! ```
//!
//! [`Gateway::fetch_with_retry`] wraps this in a bounded backoff loop for
//! rate-limit outcomes and falls back to an expired cache entry when the
//! final outcome is still a failure.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::cache::{CacheStats, ResponseCache, cache_key};
use crate::limiter::{Admission, RateLimiter};
use crate::registry::{EndpointDescriptor, EndpointRegistry};
use crate::retry::RetryConfig;
use crate::telemetry;
use crate::transport::Transport;
use crate::types::{FetchOptions, Fetched, Params};
use crate::validate::RequestValidator;
use crate::{GatewayError, RateLimitOrigin, Result};

/// The fetch orchestrator.
///
/// Cheap to clone; clones share the registry, limiter windows and cache.
/// Build one with [`Gateway::builder()`](super::Gateway::builder).
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    registry: EndpointRegistry,
    validator: RequestValidator,
    limiter: RateLimiter,
    cache: ResponseCache,
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
}

impl Gateway {
    pub(crate) fn new(
        registry: EndpointRegistry,
        validator: RequestValidator,
        cache: ResponseCache,
        transport: Arc<dyn Transport>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                validator,
                limiter: RateLimiter::new(),
                cache,
                transport,
                retry,
            }),
        }
    }

    /// Run one attempt through validator, cache, limiter and network.
    ///
    /// Never retries and never serves stale data; see
    /// [`fetch_with_retry`](Self::fetch_with_retry) for that.
    ///
    /// The network call and cache fill run on a spawned task, so dropping
    /// this future after the call is dispatched still lets the response
    /// land in the cache.
    #[instrument(skip_all, fields(endpoint = endpoint_id, no_cache = options.no_cache))]
    pub async fn fetch(
        &self,
        endpoint_id: &str,
        params: &Params,
        options: FetchOptions,
    ) -> Result<Fetched> {
        let endpoint = match self
            .inner
            .validator
            .validate(&self.inner.registry, endpoint_id, params)
        {
            Ok(endpoint) => Arc::clone(endpoint),
            Err(e) => {
                metrics::counter!(telemetry::VALIDATION_FAILURES_TOTAL,
                    "endpoint" => endpoint_id.to_owned(),
                )
                .increment(1);
                debug!(error = %e, "request rejected by validator");
                return Err(e);
            }
        };

        let key = cache_key(&endpoint.id, params);
        if !options.no_cache {
            if let Some(data) = self.inner.cache.get_fresh(&key) {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "endpoint" => endpoint.id.clone())
                    .increment(1);
                debug!(%key, "cache hit");
                return Ok(Fetched::fresh(data));
            }
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "endpoint" => endpoint.id.clone())
            .increment(1);

        if let Admission::Rejected { retry_in } = self.inner.limiter.admit(&endpoint) {
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL,
                "endpoint" => endpoint.id.clone(),
                "source" => RateLimitOrigin::Local.as_str(),
            )
            .increment(1);
            debug!(
                retry_in_ms = retry_in.as_millis() as u64,
                "local rate limit reached"
            );
            return Err(GatewayError::RateLimited {
                origin: RateLimitOrigin::Local,
            });
        }

        let inner = Arc::clone(&self.inner);
        let params = params.clone();
        let call = tokio::spawn(async move { inner.call(&endpoint, &params, key).await });
        match call.await {
            Ok(result) => result,
            Err(e) => Err(GatewayError::Network(format!("request task failed: {e}"))),
        }
    }

    /// [`fetch`](Self::fetch) with bounded backoff and stale fallback.
    ///
    /// Rate-limit outcomes are retried up to `max_retries` times, waiting
    /// `initial_delay * 2^attempt` (capped) between attempts; each retry
    /// re-runs the full sequence including validation. When the final
    /// outcome is a failure other than a validation error and the cache
    /// holds an entry for the same request, that entry is returned marked
    /// [`Freshness::Stale`](crate::Freshness::Stale).
    #[instrument(skip_all, fields(endpoint = endpoint_id))]
    pub async fn fetch_with_retry(
        &self,
        endpoint_id: &str,
        params: &Params,
        options: FetchOptions,
    ) -> Result<Fetched> {
        let retry = &self.inner.retry;
        let mut attempt = 0;
        loop {
            let error = match self.fetch(endpoint_id, params, options).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) => e,
            };

            if error.is_retryable() && attempt < retry.max_retries {
                let delay = retry.delay_for_attempt(attempt);
                metrics::counter!(telemetry::RETRIES_TOTAL, "endpoint" => endpoint_id.to_owned())
                    .increment(1);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = retry.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return self.stale_or(endpoint_id, params, error);
        }
    }

    /// Serve the cached entry for this request, if any, instead of `error`.
    fn stale_or(&self, endpoint_id: &str, params: &Params, error: GatewayError) -> Result<Fetched> {
        if matches!(
            error,
            GatewayError::Validation(_) | GatewayError::Configuration(_)
        ) {
            return Err(error);
        }

        let key = cache_key(endpoint_id, params);
        match self.inner.cache.get_any(&key) {
            Some(entry) => {
                metrics::counter!(telemetry::STALE_SERVED_TOTAL, "endpoint" => endpoint_id.to_owned())
                    .increment(1);
                warn!(
                    %key,
                    age_ms = entry.age_at(tokio::time::Instant::now()).as_millis() as u64,
                    error = %error,
                    "refresh failed, serving cached response"
                );
                Ok(Fetched::stale(entry.data))
            }
            None => Err(error),
        }
    }

    /// Drop every cached response.
    ///
    /// Rate-limit windows are left alone: they record calls the providers
    /// have already seen.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        debug!("response cache cleared");
    }

    /// Cache occupancy and keys, oldest first.
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.inner.registry
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry
    }
}

impl Inner {
    /// Network call plus cache fill for one admitted request.
    async fn call(&self, endpoint: &EndpointDescriptor, params: &Params, key: String) -> Result<Fetched> {
        let start = std::time::Instant::now();
        let result = self.transport.send(endpoint, params).await;
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "endpoint" => endpoint.id.clone())
            .record(start.elapsed().as_secs_f64());

        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "endpoint" => endpoint.id.clone(),
            "status" => status,
        )
        .increment(1);

        match result {
            Ok(value) => {
                let data = Arc::new(value);
                self.cache.insert(key, Arc::clone(&data), endpoint.ttl);
                Ok(Fetched::fresh(data))
            }
            Err(e) => {
                if let GatewayError::RateLimited { origin } = &e {
                    metrics::counter!(telemetry::RATE_LIMITED_TOTAL,
                        "endpoint" => endpoint.id.clone(),
                        "source" => origin.as_str(),
                    )
                    .increment(1);
                }
                debug!(transport = self.transport.name(), error = %e, "request failed");
                Err(e)
            }
        }
    }
}
