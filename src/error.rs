//! Gateway error taxonomy and its HTTP rendering.
//!
//! Every variant maps to one status code and renders as
//! `{"error":{"message": ...}}`. Upstream details never reach the client.
use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header};
use serde_json::json;

use crate::core::router::RouteError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Unable to determine request size")]
    SizeUndetermined,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("CORS preflight not allowed")]
    PreflightDenied,

    #[error("Method Not Allowed")]
    MethodNotAllowed { allow: String },

    #[error("Forbidden - Origin Not Allowed")]
    OriginNotAllowed,

    #[error("Not Found: {0}")]
    Routing(#[from] RouteError),

    #[error("Turnstile token required")]
    ChallengeTokenMissing,

    #[error("Invalid Turnstile token")]
    ChallengeTokenInvalid,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Auth service unavailable")]
    AuthServiceUnavailable,

    #[error("API Gateway unavailable")]
    UpstreamUnavailable,

    #[error("Internal Server Error")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::SizeUndetermined => StatusCode::BAD_REQUEST,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::PreflightDenied
            | GatewayError::OriginNotAllowed
            | GatewayError::ChallengeTokenMissing
            | GatewayError::ChallengeTokenInvalid => StatusCode::FORBIDDEN,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Routing(RouteError::NotFound(_)) => StatusCode::NOT_FOUND,
            GatewayError::Routing(RouteError::InvalidEnvironment { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::AuthServiceUnavailable | GatewayError::UpstreamUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Pipeline stage label used for metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            GatewayError::PayloadTooLarge | GatewayError::SizeUndetermined => "size_limit",
            GatewayError::RateLimited => "rate_limit",
            GatewayError::PreflightDenied
            | GatewayError::MethodNotAllowed { .. }
            | GatewayError::OriginNotAllowed => "cors",
            GatewayError::Routing(_) => "routing",
            GatewayError::ChallengeTokenMissing | GatewayError::ChallengeTokenInvalid => {
                "challenge"
            }
            GatewayError::Unauthorized(_) | GatewayError::AuthServiceUnavailable => "access_token",
            GatewayError::UpstreamUnavailable => "upstream",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// Render as a JSON error response.
    pub fn to_response(&self) -> Response<Bytes> {
        let body = json!({ "error": { "message": self.to_string() } });
        let mut response = Response::new(Bytes::from(body.to_string()));
        *response.status_mut() = self.status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let GatewayError::MethodNotAllowed { allow } = self {
            if let Ok(value) = HeaderValue::from_str(allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }
        response
    }
}
