//! CORS preflight handling and origin/method enforcement.
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, header};

use crate::{config::models::CorsConfig, error::GatewayError};

fn origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ORIGIN).and_then(|v| v.to_str().ok())
}

/// Apply CORS policy to an inbound request.
///
/// Returns the finished preflight response for an allowed `OPTIONS`,
/// `Ok(None)` when the request may proceed, and an error otherwise.
pub fn handle_cors(
    method: &Method,
    headers: &HeaderMap,
    cors: &CorsConfig,
) -> Result<Option<Response<Bytes>>, GatewayError> {
    let origin = origin(headers);

    if method == Method::OPTIONS {
        return match origin {
            Some(origin) if cors.is_origin_allowed(origin) => {
                Ok(Some(preflight_response(origin, cors)?))
            }
            _ => Err(GatewayError::PreflightDenied),
        };
    }

    if !cors.is_method_allowed(method.as_str()) {
        return Err(GatewayError::MethodNotAllowed {
            allow: cors.allowed_methods.join(", "),
        });
    }

    if let Some(origin) = origin {
        if !cors.is_origin_allowed(origin) {
            return Err(GatewayError::OriginNotAllowed);
        }
    }

    Ok(None)
}

fn preflight_response(origin: &str, cors: &CorsConfig) -> Result<Response<Bytes>, GatewayError> {
    let entries = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.to_string()),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            cors.allowed_methods.join(", "),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            cors.allowed_headers.join(", "),
        ),
        (
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            cors.expose_headers.join(", "),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            cors.allow_credentials.to_string(),
        ),
        (header::ACCESS_CONTROL_MAX_AGE, cors.max_age_secs.to_string()),
        (header::VARY, cors.vary.clone()),
    ];

    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::NO_CONTENT;
    for (name, value) in entries {
        let value = HeaderValue::from_str(&value)
            .map_err(|_| GatewayError::Internal(format!("invalid CORS header value for {name}")))?;
        response.headers_mut().insert(name, value);
    }
    Ok(response)
}
