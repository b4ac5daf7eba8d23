//! Per-endpoint sliding-window rate limiter.
//!
//! Each endpoint owns a window of admission timestamps covering the
//! trailing [`WINDOW`]. On every check, timestamps older than the window
//! are pruned and the call is admitted iff fewer than the endpoint's
//! `rate_limit` remain. A window only grows on admission, so its length
//! never exceeds `rate_limit`.
//!
//! This is a local approximation of the provider's ceiling. It does not
//! coordinate with other processes, and a provider 429 stays authoritative
//! even after local admission.
//!
//! Timestamps come from [`tokio::time::Instant`], so paused-clock tests can
//! move windows forward with `tokio::time::advance`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::registry::EndpointDescriptor;

/// Length of the rolling window every `rate_limit` is expressed over.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Window is full; `retry_in` is when the oldest admission ages out.
    Rejected { retry_in: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Sliding-window call counter, one window per endpoint id.
///
/// Admission is a single critical section: prune, compare and append
/// happen under one lock with no suspension point in between.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to admit one call to `endpoint` now.
    pub fn admit(&self, endpoint: &EndpointDescriptor) -> Admission {
        self.admit_at(endpoint, Instant::now())
    }

    /// Try to admit one call to `endpoint` at `now`.
    pub fn admit_at(&self, endpoint: &EndpointDescriptor, now: Instant) -> Admission {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(endpoint.id.clone()).or_default();
        prune(window, now);

        if window.len() < endpoint.rate_limit as usize {
            window.push_back(now);
            Admission::Admitted
        } else {
            let retry_in = window
                .front()
                .map(|oldest| (*oldest + WINDOW).saturating_duration_since(now))
                .unwrap_or(WINDOW);
            Admission::Rejected { retry_in }
        }
    }

    /// Admissions for `endpoint_id` still inside the window.
    pub fn in_window(&self, endpoint_id: &str) -> usize {
        self.in_window_at(endpoint_id, Instant::now())
    }

    pub fn in_window_at(&self, endpoint_id: &str, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        match windows.get_mut(endpoint_id) {
            Some(window) => {
                prune(window, now);
                window.len()
            }
            None => 0,
        }
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}
