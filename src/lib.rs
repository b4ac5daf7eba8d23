//! Astrolabe - capability-restricted gateway for public space-data APIs
//!
//! Callers name a registered endpoint and pass parameters; the gateway
//! validates them against the endpoint's schema, serves fresh cached
//! responses, enforces a per-endpoint sliding-window rate limit, and only
//! then calls the provider. A retrying variant backs off on throttling and
//! falls back to the last good response when the provider is unavailable.
//!
//! # Example
//!
//! ```rust,no_run
//! use astrolabe::{FetchOptions, Gateway, Params};
//!
//! #[tokio::main]
//! async fn main() -> astrolabe::Result<()> {
//!     let gateway = Gateway::builder().build()?;
//!
//!     let params = Params::new()
//!         .with("api_key", "DEMO_KEY")
//!         .with("date", "2024-01-01");
//!     let apod = gateway
//!         .fetch_with_retry("apod", &params, FetchOptions::default())
//!         .await?;
//!
//!     println!("{} (stale: {})", apod.data, apod.is_stale());
//!     Ok(())
//! }
//! ```
//!
//! # Untrusted callers
//!
//! Hand a [`Bridge`] rather than the [`Gateway`] to code that should only
//! be able to fetch registered endpoints. The `cli` feature's `astrolabe
//! bridge` command serves it as JSON lines over stdio.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod limiter;
pub mod registry;
pub mod retry;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod validate;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types at crate root
pub use bridge::{Bridge, BridgeCall, BridgeResponse};
pub use cache::{CacheConfig, CacheStats};
pub use config::Config;
pub use error::{GatewayError, RateLimitOrigin, Result};
pub use gateway::{Gateway, GatewayBuilder};
pub use limiter::{Admission, RateLimiter};
pub use registry::{EndpointDescriptor, EndpointRegistry, HttpMethod, ParamSpec, ParamType};
pub use retry::RetryConfig;
pub use transport::{HttpConfig, HttpTransport, Transport};
pub use types::{FetchOptions, Fetched, Freshness, ParamValue, Params, UnlistedParams};
pub use validate::RequestValidator;
