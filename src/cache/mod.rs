//! Caching subsystem.
//!
//! - [`response::ResponseCache`] — bounded FIFO store of successful
//!   responses with per-entry TTL. Fresh reads gate the network; expired
//!   entries remain available to the gateway's stale-fallback path.

pub mod response;

pub use response::{CacheConfig, CacheEntry, CacheStats, ResponseCache, cache_key};
