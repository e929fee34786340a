//! Request body size enforcement.
//!
//! The body is buffered here, once. Every later stage (signing, forwarding)
//! works from these bytes.
use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, header};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::error::GatewayError;

/// Reject bodies whose declared or actual size exceeds `max_body_size`, and
/// return the buffered body otherwise.
pub async fn read_body_limited(
    headers: &HeaderMap,
    body: Body,
    max_body_size: u64,
) -> Result<Bytes, GatewayError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared.is_some_and(|size| size > max_body_size) {
        return Err(GatewayError::PayloadTooLarge);
    }

    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(GatewayError::PayloadTooLarge)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read request body");
            Err(GatewayError::SizeUndetermined)
        }
    }
}
