//! End-user access token validation against the auth service.
//!
//! Outcomes of definitive answers (valid, or rejected with 400/401) are cached
//! per token and environment. Anything the auth service cannot answer is
//! reported as unavailable and never cached, so a flapping backend cannot pin
//! a token as invalid, and never turns into "valid".
use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    core::{credentials::BackendCredentials, request_info::bearer_token, router::RouteDescriptor},
    ports::{cache::CacheStore, http_client::HttpClient},
};

const KEY_BASE: &str = "https://cache/verify-access-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTokenOutcome {
    Valid,
    Invalid(&'static str),
    ServiceUnavailable,
}

#[derive(Serialize, Deserialize)]
struct CachedOutcome {
    valid: bool,
}

/// Validates bearer tokens by asking the auth service, with an outcome cache.
#[derive(Clone)]
pub struct AccessTokenValidator {
    client: Arc<dyn HttpClient>,
    store: Arc<dyn CacheStore>,
    credentials: BackendCredentials,
    /// Backend hosting the verification endpoint, if this environment has one.
    auth_service: Option<RouteDescriptor>,
    verify_path: String,
    environment: String,
    ttl: Duration,
}

impl AccessTokenValidator {
    pub fn new(
        client: Arc<dyn HttpClient>,
        store: Arc<dyn CacheStore>,
        credentials: BackendCredentials,
        auth_service: Option<RouteDescriptor>,
        verify_path: impl Into<String>,
        environment: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            client,
            store,
            credentials,
            auth_service,
            verify_path: verify_path.into(),
            environment: environment.into(),
            ttl,
        }
    }

    pub fn cache_key(token: &str, environment: &str) -> String {
        format!(
            "{KEY_BASE}?token={}&env={}",
            urlencoding::encode(token),
            urlencoding::encode(environment)
        )
    }

    pub async fn validate(&self, headers: &HeaderMap) -> AccessTokenOutcome {
        if !headers.contains_key(header::AUTHORIZATION) {
            return AccessTokenOutcome::Invalid("Missing or invalid Authorization header");
        }
        let Some(token) = bearer_token(headers) else {
            return AccessTokenOutcome::Invalid("Missing bearer token");
        };

        let key = Self::cache_key(token, &self.environment);
        if let Some(raw) = self.store.get(&key).await {
            if let Ok(cached) = serde_json::from_slice::<CachedOutcome>(&raw) {
                tracing::debug!(valid = cached.valid, "Access token outcome served from cache");
                return if cached.valid {
                    AccessTokenOutcome::Valid
                } else {
                    AccessTokenOutcome::Invalid("Token invalid (cached)")
                };
            }
        }

        let outcome = self.verify(token).await;
        match outcome {
            AccessTokenOutcome::Valid => self.remember(&key, true).await,
            AccessTokenOutcome::Invalid(_) => self.remember(&key, false).await,
            AccessTokenOutcome::ServiceUnavailable => {}
        }
        outcome
    }

    async fn verify(&self, token: &str) -> AccessTokenOutcome {
        let Some(auth_service) = &self.auth_service else {
            tracing::error!(environment = %self.environment, "No auth service route configured");
            return AccessTokenOutcome::ServiceUnavailable;
        };

        let url = format!("{}{}", auth_service.service_endpoint, self.verify_path);
        let request = match Request::builder()
            .method(Method::POST)
            .uri(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(json!({ "accessToken": token }).to_string()))
        {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Invalid access token verification URL");
                return AccessTokenOutcome::ServiceUnavailable;
            }
        };

        let request = match self
            .credentials
            .attach(auth_service.kind, &auth_service.service_endpoint, request)
            .await
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to authenticate access token verification");
                return AccessTokenOutcome::ServiceUnavailable;
            }
        };

        let response = match self.client.send_request(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Access token verification request failed");
                return AccessTokenOutcome::ServiceUnavailable;
            }
        };

        match response.status() {
            StatusCode::OK => AccessTokenOutcome::Valid,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                AccessTokenOutcome::Invalid("Token invalid")
            }
            status if status.is_server_error() => {
                tracing::warn!(status = %status, "Auth service error during token verification");
                AccessTokenOutcome::ServiceUnavailable
            }
            status => {
                tracing::debug!(status = %status, "Unexpected token verification status");
                AccessTokenOutcome::Invalid("Token validation failed")
            }
        }
    }

    async fn remember(&self, key: &str, valid: bool) {
        match serde_json::to_vec(&CachedOutcome { valid }) {
            Ok(encoded) => self.store.put(key, Bytes::from(encoded), self.ttl).await,
            Err(e) => tracing::warn!(error = %e, "Failed to encode access token outcome"),
        }
    }
}
