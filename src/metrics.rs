//! Metrics helpers for the gateway.
//!
//! Thin wrappers around the `metrics` crate macros. No exporter is embedded;
//! the embedding application installs whichever recorder it needs.
//!
//! Provided metrics:
//! * `edgeguard_requests_total` (counter; `method`, `status`)
//! * `edgeguard_request_duration_seconds` (histogram; `method`)
//! * `edgeguard_rejections_total` (counter; `stage`)
//! * `edgeguard_response_cache_total` (counter; `result` = hit | miss | store)
//! * `edgeguard_token_issuance_total` (counter; `result`)
//! * `edgeguard_backend_requests_total` (counter; `kind`, `status`)
use std::time::Instant;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const EDGEGUARD_REQUESTS_TOTAL: &str = "edgeguard_requests_total";
pub const EDGEGUARD_REQUEST_DURATION_SECONDS: &str = "edgeguard_request_duration_seconds";
pub const EDGEGUARD_REJECTIONS_TOTAL: &str = "edgeguard_rejections_total";
pub const EDGEGUARD_RESPONSE_CACHE_TOTAL: &str = "edgeguard_response_cache_total";
pub const EDGEGUARD_TOKEN_ISSUANCE_TOTAL: &str = "edgeguard_token_issuance_total";
pub const EDGEGUARD_BACKEND_REQUESTS_TOTAL: &str = "edgeguard_backend_requests_total";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        EDGEGUARD_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests answered by the gateway."
    );
    describe_histogram!(
        EDGEGUARD_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests answered by the gateway."
    );
    describe_counter!(
        EDGEGUARD_REJECTIONS_TOTAL,
        Unit::Count,
        "Requests short-circuited by a pipeline stage."
    );
    describe_counter!(
        EDGEGUARD_RESPONSE_CACHE_TOTAL,
        Unit::Count,
        "Response cache lookups and stores."
    );
    describe_counter!(
        EDGEGUARD_TOKEN_ISSUANCE_TOTAL,
        Unit::Count,
        "Identity token requests, by outcome."
    );
    describe_counter!(
        EDGEGUARD_BACKEND_REQUESTS_TOTAL,
        Unit::Count,
        "Requests forwarded to backend services."
    );
});

/// Register metric descriptions with the installed recorder (idempotent).
pub fn init_metrics() {
    Lazy::force(&DESCRIPTIONS);
    tracing::debug!("Metric descriptions registered");
}

pub fn increment_request_total(method: &str, status: u16) {
    counter!(
        EDGEGUARD_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Count a request rejected by `stage` (e.g. `size_limit`, `cors`).
pub fn increment_rejection(stage: &'static str) {
    counter!(EDGEGUARD_REJECTIONS_TOTAL, "stage" => stage).increment(1);
}

pub fn increment_response_cache(result: &'static str) {
    counter!(EDGEGUARD_RESPONSE_CACHE_TOTAL, "result" => result).increment(1);
}

pub fn increment_token_issuance(result: &'static str) {
    counter!(EDGEGUARD_TOKEN_ISSUANCE_TOTAL, "result" => result).increment(1);
}

pub fn increment_backend_request_total(kind: &'static str, status: u16) {
    counter!(
        EDGEGUARD_BACKEND_REQUESTS_TOTAL,
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
    method: String,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        histogram!(
            EDGEGUARD_REQUEST_DURATION_SECONDS,
            "method" => self.method.clone()
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}
