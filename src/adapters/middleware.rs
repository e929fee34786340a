//! Axum middleware wrapped around the gateway fallback.
//!
//! Both layers are stateless: one tags each request with an id, the other
//! records latency into the request span and the metrics facade.
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::{metrics::RequestTimer, tracing_setup::create_request_span};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Tag the request with an id (the caller's `X-Request-ID`, or a fresh UUID),
/// run it inside a `request` span and echo the id on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(X_REQUEST_ID, value);
    }

    let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);
    let mut response = next.run(req).instrument(span.clone()).await;
    span.record("http.status_code", response.status().as_u16());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Log completion of a request with its latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let _timer = RequestTimer::new(method.as_str());

    let response = next.run(req).await;
    let elapsed = start.elapsed();

    tracing::Span::current().record("duration_ms", elapsed.as_millis() as u64);
    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = elapsed.as_millis() as u64,
        "Request completed"
    );
    response
}
