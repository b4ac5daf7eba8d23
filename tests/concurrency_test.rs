//! Concurrent callers sharing one gateway.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use astrolabe::transport::Transport;
use astrolabe::{
    CacheConfig, EndpointDescriptor, EndpointRegistry, FetchOptions, Gateway, GatewayError,
    Params, RateLimitOrigin, Result,
};
use futures_util::future::join_all;
use serde_json::{Value, json};

/// Transport that answers after a fixed delay, counting calls.
struct Slow {
    delay: Duration,
    calls: AtomicU32,
}

impl Slow {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn send(&self, endpoint: &EndpointDescriptor, params: &Params) -> Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.delay).await;
        Ok(json!({"endpoint": endpoint.id, "params": params.to_json(), "call": n}))
    }
}

fn gateway(transport: Arc<Slow>, rate_limit: u32, cache_entries: usize) -> Gateway {
    let registry = EndpointRegistry::from_json(&format!(
        r#"[{{"id": "iss-position", "url": "https://iss.example.com/v1/satellites/25544",
             "method": "GET", "rate_limit": {rate_limit}, "ttl_ms": 10000}}]"#
    ))
    .unwrap();
    Gateway::builder()
        .registry(registry)
        .transport(transport)
        .cache(CacheConfig::new().max_entries(cache_entries))
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn identical_concurrent_requests_are_not_coalesced() {
    let transport = Slow::new(Duration::from_millis(500));
    let gateway = gateway(transport.clone(), 10, 100);

    let params = Params::new();
    let (a, b) = tokio::join!(
        gateway.fetch("iss-position", &params, FetchOptions::default()),
        gateway.fetch("iss-position", &params, FetchOptions::default()),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(transport.call_count(), 2);
    assert_eq!(gateway.limiter().in_window("iss-position"), 2);
    assert_eq!(gateway.cache_stats().size, 1);
}

#[tokio::test(start_paused = true)]
async fn limit_holds_under_concurrency() {
    let transport = Slow::new(Duration::from_millis(100));
    let gateway = gateway(transport.clone(), 3, 100);

    let requests: Vec<_> = (0..10i64)
        .map(|i| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let params = Params::new().with("tick", i);
                gateway
                    .fetch("iss-position", &params, FetchOptions::default())
                    .await
            })
        })
        .collect();
    let results: Vec<_> = join_all(requests)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(GatewayError::RateLimited {
                    origin: RateLimitOrigin::Local
                })
            )
        })
        .count();
    assert_eq!(admitted, 3);
    assert_eq!(rejected, 7);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn cache_stays_bounded_under_concurrent_fills() {
    let transport = Slow::new(Duration::from_millis(10));
    let gateway = gateway(transport.clone(), 100, 5);

    let fetches = (0..20i64).map(|i| {
        let gateway = gateway.clone();
        async move {
            gateway
                .fetch(
                    "iss-position",
                    &Params::new().with("tick", i),
                    FetchOptions::default(),
                )
                .await
        }
    });
    let results = join_all(fetches).await;

    assert!(results.iter().all(|r| r.is_ok()));
    let stats = gateway.cache_stats();
    assert_eq!(stats.size, 5);
    assert_eq!(stats.keys.len(), 5);
}
