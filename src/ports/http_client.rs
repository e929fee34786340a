use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the upstream fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error while reading the upstream response body
    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for every outbound HTTP call the
/// gateway makes: backend forwarding, token issuance, challenge and
/// access-token verification.
///
/// Bodies are fully buffered in both directions. Request signing hashes the
/// exact bytes that are sent, and cached responses are replayed from bytes.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request and buffer the response.
    ///
    /// Any status code is a successful call; only transport failures
    /// (connect, TLS, timeout, body read) are errors.
    async fn send_request(&self, req: Request<Bytes>) -> HttpClientResult<Response<Bytes>>;
}
