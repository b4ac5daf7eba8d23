//! Fetch options and results

use std::sync::Arc;

use serde_json::Value;

/// Per-call options for [`Gateway::fetch`](crate::Gateway::fetch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the fresh-cache lookup and go to the network.
    ///
    /// A successful response still refreshes the cache.
    pub no_cache: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }
}

/// How current a returned payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from the network or from a cache entry within its TTL.
    Fresh,
    /// A previous success served because the refresh failed.
    Stale,
}

/// A successful gateway outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// Parsed response body, shared with the cache.
    pub data: Arc<Value>,
    pub freshness: Freshness,
}

impl Fetched {
    pub(crate) fn fresh(data: Arc<Value>) -> Self {
        Self {
            data,
            freshness: Freshness::Fresh,
        }
    }

    pub(crate) fn stale(data: Arc<Value>) -> Self {
        Self {
            data,
            freshness: Freshness::Stale,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}
