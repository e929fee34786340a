//! Response header normalization.
//!
//! Every response leaving the gateway, including rejections and cache hits,
//! passes through [`HeaderNormalizer::normalize`]. The overlay is computed as
//! one map and merged over the response headers in a single pass.
use bytes::Bytes;
use eyre::{Result, WrapErr};
use http::{HeaderMap, HeaderName, HeaderValue, Response, header};

use crate::config::models::{CorsConfig, SecurityHeadersConfig};

#[derive(Debug, Clone)]
pub struct HeaderNormalizer {
    allowed_origins: Vec<String>,
    /// CORS headers added when the request origin is allow-listed.
    cors: HeaderMap,
    /// Security headers that always replace the upstream value.
    security: HeaderMap,
    /// Applied only when the response has no `Content-Type`.
    default_content_type: HeaderValue,
}

fn value(name: &str, raw: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(raw).wrap_err_with(|| format!("invalid value for header {name}: {raw:?}"))
}

impl HeaderNormalizer {
    pub fn new(cors: &CorsConfig, security: &SecurityHeadersConfig) -> Result<Self> {
        let mut cors_headers = HeaderMap::new();
        for (name, raw) in [
            (
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                cors.allow_credentials.to_string(),
            ),
            (
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                cors.expose_headers.join(", "),
            ),
            (header::VARY, cors.vary.clone()),
        ] {
            let value = value(name.as_str(), &raw)?;
            cors_headers.insert(name, value);
        }

        let security_entries: [(HeaderName, &str); 7] = [
            (header::CACHE_CONTROL, &security.cache_control),
            (
                header::CONTENT_SECURITY_POLICY,
                &security.content_security_policy,
            ),
            (
                header::STRICT_TRANSPORT_SECURITY,
                &security.strict_transport_security,
            ),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                &security.x_content_type_options,
            ),
            (header::X_FRAME_OPTIONS, &security.x_frame_options),
            (
                HeaderName::from_static("permissions-policy"),
                &security.permissions_policy,
            ),
            (header::REFERRER_POLICY, &security.referrer_policy),
        ];
        let mut security_headers = HeaderMap::new();
        for (name, raw) in security_entries {
            let value = value(name.as_str(), raw)?;
            security_headers.insert(name, value);
        }

        Ok(Self {
            allowed_origins: cors.allowed_origins.clone(),
            cors: cors_headers,
            security: security_headers,
            default_content_type: value("content-type", &security.content_type)?,
        })
    }

    /// Headers to lay over a response for a request from `origin`.
    pub fn overlay(&self, origin: Option<&HeaderValue>, response_headers: &HeaderMap) -> HeaderMap {
        let mut overlay = self.security.clone();

        let allowed_origin = origin.filter(|origin| {
            origin
                .to_str()
                .is_ok_and(|o| self.allowed_origins.iter().any(|allowed| allowed == o))
        });
        if let Some(origin) = allowed_origin {
            overlay.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            overlay.extend(self.cors.clone());
        }

        if !response_headers.contains_key(header::CONTENT_TYPE) {
            overlay.insert(header::CONTENT_TYPE, self.default_content_type.clone());
        }
        overlay
    }

    pub fn normalize(&self, origin: Option<&HeaderValue>, response: Response<Bytes>) -> Response<Bytes> {
        let (mut parts, body) = response.into_parts();
        let overlay = self.overlay(origin, &parts.headers);
        for (name, value) in &overlay {
            parts.headers.insert(name.clone(), value.clone());
        }
        Response::from_parts(parts, body)
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    fn normalizer() -> HeaderNormalizer {
        let cors = CorsConfig {
            allowed_origins: vec!["https://allowed".to_string()],
            ..CorsConfig::default()
        };
        HeaderNormalizer::new(&cors, &SecurityHeadersConfig::default()).unwrap()
    }

    fn upstream() -> Response<Bytes> {
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CACHE_CONTROL, "s-maxage=120")
            .header("x-upstream", "kept")
            .body(Bytes::from_static(b"{}"))
            .unwrap()
    }

    #[test]
    fn test_security_headers_replace_upstream_values() {
        let response = normalizer().normalize(None, upstream());
        let headers = response.headers();
        let defaults = SecurityHeadersConfig::default();

        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), &defaults.cache_control);
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(
            headers.get("permissions-policy").unwrap(),
            &defaults.permissions_policy
        );
        assert_eq!(headers.get(header::REFERRER_POLICY).unwrap(), &defaults.referrer_policy);
        assert_eq!(headers.get("x-upstream").unwrap(), "kept");
        assert_eq!(headers.get_all(header::CACHE_CONTROL).iter().count(), 1);
    }

    #[test]
    fn test_content_type_only_defaulted() {
        let response = normalizer().normalize(None, upstream());
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );

        let html = Response::builder()
            .header(header::CONTENT_TYPE, "text/html")
            .body(Bytes::new())
            .unwrap();
        let response = normalizer().normalize(None, html);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/html");
    }

    #[test]
    fn test_cors_headers_for_allowed_origin() {
        let origin = HeaderValue::from_static("https://allowed");
        let response = normalizer().normalize(Some(&origin), upstream());
        let headers = response.headers();

        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://allowed"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_EXPOSE_HEADERS).unwrap(),
            "Content-Length, Content-Type, Cache-Control"
        );
        assert_eq!(headers.get(header::VARY).unwrap(), "Origin");
    }

    #[test]
    fn test_no_cors_headers_for_other_origins() {
        let origin = HeaderValue::from_static("https://evil");
        for origin in [Some(&origin), None] {
            let response = normalizer().normalize(origin, upstream());
            assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
            assert!(!response.headers().contains_key(header::VARY));
        }
    }

    #[test]
    fn test_invalid_configured_value_is_rejected() {
        let security = SecurityHeadersConfig {
            x_frame_options: "DENY\n".to_string(),
            ..SecurityHeadersConfig::default()
        };
        assert!(HeaderNormalizer::new(&CorsConfig::default(), &security).is_err());
    }
}
