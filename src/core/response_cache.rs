//! Response cache for cacheable routes.
//!
//! Entries are keyed by the outbound backend URL and live for the TTL the
//! backend advertised in `Cache-Control`. Requests carrying `Authorization`
//! never read or write the cache.
use std::{sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode, header};
use serde::{Deserialize, Serialize};

use crate::{metrics, ports::cache::CacheStore};

/// Whether a request may be answered from the cache.
pub fn is_lookup_eligible(cacheable: bool, method: &Method, headers: &HeaderMap) -> bool {
    cacheable
        && (method == Method::GET || method == Method::HEAD)
        && !headers.contains_key(header::AUTHORIZATION)
}

/// TTL advertised by a `Cache-Control` value: `s-maxage`, else `max-age`.
///
/// `no-store`, `private` and zero lifetimes yield `None`.
pub fn ttl_from_cache_control(value: &str) -> Option<Duration> {
    let mut s_maxage = None;
    let mut max_age = None;

    for directive in value.split(',') {
        let directive = directive.trim();
        let (name, arg) = match directive.split_once('=') {
            Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
            None => (directive, None),
        };

        if name.eq_ignore_ascii_case("no-store") || name.eq_ignore_ascii_case("private") {
            return None;
        } else if name.eq_ignore_ascii_case("s-maxage") {
            s_maxage = arg.and_then(|a| a.parse::<u64>().ok());
        } else if name.eq_ignore_ascii_case("max-age") {
            max_age = arg.and_then(|a| a.parse::<u64>().ok());
        }
    }

    s_maxage
        .or(max_age)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Decide whether an upstream response may be stored, and for how long.
///
/// `upstream_headers` must be the backend's own headers, before
/// normalization replaces `Cache-Control`.
pub fn store_ttl(
    cacheable: bool,
    method: &Method,
    request_headers: &HeaderMap,
    upstream_failed: bool,
    upstream_headers: &HeaderMap,
) -> Option<Duration> {
    if !cacheable
        || upstream_failed
        || method != Method::GET
        || request_headers.contains_key(header::AUTHORIZATION)
    {
        return None;
    }
    let cache_control = upstream_headers.get(header::CACHE_CONTROL)?.to_str().ok()?;
    ttl_from_cache_control(cache_control)
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64 of the body bytes.
    body: String,
}

impl CachedResponse {
    fn from_response(response: &Response<Bytes>) -> Self {
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            status: response.status().as_u16(),
            headers,
            body: STANDARD.encode(response.body()),
        }
    }

    fn into_response(self) -> Option<Response<Bytes>> {
        let body = STANDARD.decode(self.body.as_bytes()).ok()?;
        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = StatusCode::from_u16(self.status).ok()?;
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
            let value = HeaderValue::from_str(&value).ok()?;
            response.headers_mut().append(name, value);
        }
        Some(response)
    }
}

/// Lookup/store front end over the shared [`CacheStore`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Cached response for `key`. `HEAD` hits are served without a body.
    pub async fn lookup(&self, key: &str, method: &Method) -> Option<Response<Bytes>> {
        let Some(raw) = self.store.get(key).await else {
            metrics::increment_response_cache("miss");
            return None;
        };

        let response = serde_json::from_slice::<CachedResponse>(&raw)
            .ok()
            .and_then(CachedResponse::into_response);
        let Some(mut response) = response else {
            tracing::warn!(key = %key, "Discarding unreadable response cache entry");
            metrics::increment_response_cache("miss");
            return None;
        };

        metrics::increment_response_cache("hit");
        if method == Method::HEAD {
            *response.body_mut() = Bytes::new();
        }
        Some(response)
    }

    pub async fn store(&self, key: &str, response: &Response<Bytes>, ttl: Duration) {
        match serde_json::to_vec(&CachedResponse::from_response(response)) {
            Ok(encoded) => {
                self.store.put(key, Bytes::from(encoded), ttl).await;
                metrics::increment_response_cache("store");
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Stored response in cache");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode response for caching"),
        }
    }

    /// Store without making the caller wait.
    pub fn store_detached(&self, key: String, response: Response<Bytes>, ttl: Duration) {
        let cache = self.clone();
        tokio::spawn(async move {
            cache.store(&key, &response, ttl).await;
        });
    }
}
