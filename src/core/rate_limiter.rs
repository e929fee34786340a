//! Per-caller rate limiting built atop `governor`.
//!
//! One keyed limiter is shared by every route. The key combines the request
//! path with the caller's bearer token, or with the client IP for anonymous
//! callers, so each (path, caller) pair gets its own quota.
use std::{num::NonZeroU32, time::Duration};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};
use http::HeaderMap;

use crate::core::request_info::bearer_token;

pub type KeyedRateLimiterImpl = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Keyed limiter allowing `requests` per `period` for each key.
pub struct GatewayRateLimiter {
    limiter: KeyedRateLimiterImpl,
}

impl GatewayRateLimiter {
    /// Build a limiter that admits `requests` per `period`, with bursts up to
    /// the full quota.
    pub fn new(requests: u32, period: Duration) -> Result<Self, String> {
        let burst = NonZeroU32::new(requests)
            .ok_or_else(|| "Rate limit 'requests' must be greater than 0".to_string())?;
        let replenish_interval = period / requests;
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| format!("Invalid rate limit period: {period:?}"))?
            .allow_burst(burst);

        tracing::info!(requests, period = ?period, "Creating rate limiter");
        Ok(Self {
            limiter: RateLimiter::keyed(quota),
        })
    }

    /// Limiter key for a request: `path|token`, else `path|ip`.
    pub fn key_for(path: &str, headers: &HeaderMap, client_ip: Option<&str>) -> String {
        match bearer_token(headers) {
            Some(token) => format!("{path}|{token}"),
            None => format!("{path}|{}", client_ip.unwrap_or_default()),
        }
    }

    /// Consume one cell for `key`; `false` when the caller is over quota.
    pub fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    /// Drop state for keys whose quota has fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }
}
