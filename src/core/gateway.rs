//! Core gateway orchestration service.
//!
//! `GatewayService` runs every inbound request through the ordered policy
//! pipeline: size limit, rate limit, CORS, index/redirect, route resolution,
//! challenge token, access token, cache lookup, credential attachment,
//! forward, cache store. Each stage may end the request early. Whatever the
//! exit, the response passes through header normalization exactly once.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::body::Body;
use bytes::Bytes;
use eyre::{Result, WrapErr};
use http::{HeaderMap, Request, Response, header, request::Parts};

use crate::{
    config::models::GatewayConfig,
    core::{
        access_token::{AccessTokenOutcome, AccessTokenValidator},
        challenge::ChallengeVerifier,
        cors::handle_cors,
        credentials::{BackendCredentials, CredentialError},
        headers::HeaderNormalizer,
        index_page::{documentation_redirect, render_index},
        rate_limiter::GatewayRateLimiter,
        request_info::ClientIpResolver,
        response_cache::{ResponseCache, is_lookup_eligible, store_ttl},
        router::{RouteDescriptor, RouteTable},
        size_limit::read_body_limited,
        token::{IdTokenIssuer, TokenCache},
    },
    error::GatewayError,
    metrics,
    ports::{cache::CacheStore, http_client::HttpClient},
};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP_HEADERS: [header::HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Central orchestrator for the request pipeline. Built once at startup and
/// shared behind an `Arc`; holds no per-request state.
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    routes: RouteTable,
    client: Arc<dyn HttpClient>,
    rate_limiter: GatewayRateLimiter,
    client_ips: ClientIpResolver,
    normalizer: HeaderNormalizer,
    challenge: ChallengeVerifier,
    access_tokens: AccessTokenValidator,
    response_cache: ResponseCache,
    credentials: BackendCredentials,
}

impl GatewayService {
    /// Wire the pipeline from configuration. `store` backs the token, access
    /// token and response caches.
    pub fn new(
        config: Arc<GatewayConfig>,
        client: Arc<dyn HttpClient>,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        let routes = RouteTable::from_config(&config.route_table());

        let period = config.rate_limit_period()?;
        let rate_limiter = GatewayRateLimiter::new(config.rate_limit.requests, period)
            .map_err(|e| eyre::eyre!(e))
            .wrap_err("Failed to create rate limiter")?;

        let client_ips = ClientIpResolver::new(
            config
                .trusted_proxy_addrs()
                .wrap_err("Invalid trusted proxy configuration")?,
        );

        let normalizer = HeaderNormalizer::new(&config.cors, &config.security_headers)
            .wrap_err("Invalid CORS or security header configuration")?;

        let issuer = IdTokenIssuer::new(
            client.clone(),
            TokenCache::new(store.clone()),
            config.gcp.token_endpoint.clone(),
        );
        let credentials = BackendCredentials::from_config(&config, issuer);

        let access_tokens = AccessTokenValidator::new(
            client.clone(),
            store.clone(),
            credentials.clone(),
            routes.find_prefix(&config.environment, &config.access_token.auth_route_prefix),
            config.access_token.verify_path.clone(),
            config.environment.clone(),
            Duration::from_secs(config.access_token.cache_ttl_secs),
        );

        Ok(Self {
            challenge: ChallengeVerifier::new(client.clone(), config.challenge.clone()),
            response_cache: ResponseCache::new(store),
            config,
            routes,
            client,
            rate_limiter,
            client_ips,
            normalizer,
            access_tokens,
            credentials,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn rate_limiter(&self) -> &GatewayRateLimiter {
        &self.rate_limiter
    }

    /// Run `req` through the pipeline. Never fails: every rejection is
    /// rendered as a normalized JSON error response.
    pub async fn handle_request(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Response<Bytes> {
        let origin = req.headers().get(header::ORIGIN).cloned();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = match self.process(req, client_addr).await {
            Ok(response) => response,
            Err(err) => {
                metrics::increment_rejection(err.stage());
                if err.status().is_server_error() {
                    tracing::warn!(method = %method, path = %path, error = ?err, "Request failed");
                } else {
                    tracing::info!(method = %method, path = %path, error = %err, "Request rejected");
                }
                err.to_response()
            }
        };

        let response = self.normalizer.normalize(origin.as_ref(), response);
        metrics::increment_request_total(method.as_str(), response.status().as_u16());
        response
    }

    async fn process(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<Bytes>, GatewayError> {
        let (parts, body) = req.into_parts();
        let body = read_body_limited(&parts.headers, body, self.config.max_body_size).await?;

        let path = parts.uri.path();
        let client_ip = self.client_ips.resolve(&parts.headers, client_addr);
        let limiter_key = GatewayRateLimiter::key_for(path, &parts.headers, client_ip.as_deref());
        if !self.rate_limiter.check(&limiter_key) {
            return Err(GatewayError::RateLimited);
        }

        if let Some(preflight) = handle_cors(&parts.method, &parts.headers, &self.config.cors)? {
            return Ok(preflight);
        }

        let environment = self.config.environment.as_str();
        if path == "/" {
            return Ok(render_index(&self.routes.descriptors(environment)?));
        }
        if let Some(prefix) = self.routes.is_exact_prefix(environment, path) {
            return documentation_redirect(&prefix);
        }

        let route = self.routes.resolve(path, environment)?;
        tracing::debug!(
            prefix = %route.prefix,
            backend = %route.kind,
            cacheable = route.cacheable,
            "Resolved route"
        );

        if route.requires_challenge_token {
            self.challenge
                .verify(&parts.headers, client_ip.as_deref())
                .await?;
        }

        if route.requires_access_token {
            match self.access_tokens.validate(&parts.headers).await {
                AccessTokenOutcome::Valid => {}
                AccessTokenOutcome::Invalid(reason) => {
                    return Err(GatewayError::Unauthorized(reason));
                }
                AccessTokenOutcome::ServiceUnavailable => {
                    return Err(GatewayError::AuthServiceUnavailable);
                }
            }
        }

        let api_url = outbound_url(&route, &parts);
        if is_lookup_eligible(route.cacheable, &parts.method, &parts.headers) {
            if let Some(cached) = self.response_cache.lookup(&api_url, &parts.method).await {
                tracing::debug!(url = %api_url, "Serving response from cache");
                return Ok(cached);
            }
        }

        let outbound = build_outbound(&parts, &api_url, body)?;
        let outbound = self
            .credentials
            .attach(route.kind, &route.service_endpoint, outbound)
            .await
            .map_err(|e| match e {
                CredentialError::Issuance(e) => {
                    tracing::warn!(error = %e, "Identity token unavailable for backend");
                    GatewayError::UpstreamUnavailable
                }
                other => GatewayError::Internal(other.to_string()),
            })?;

        let response = match self.client.send_request(outbound).await {
            Ok(response) => response,
            Err(e) => {
                metrics::increment_backend_request_total(route.kind.metric_label(), 503);
                tracing::warn!(url = %api_url, error = %e, "Backend request failed");
                return Err(GatewayError::UpstreamUnavailable);
            }
        };

        let status = response.status();
        metrics::increment_backend_request_total(route.kind.metric_label(), status.as_u16());
        let upstream_failed = !status.is_success();
        if upstream_failed {
            tracing::debug!(url = %api_url, status = %status, "Backend returned an error status");
        }

        if let Some(ttl) = store_ttl(
            route.cacheable,
            &parts.method,
            &parts.headers,
            upstream_failed,
            response.headers(),
        ) {
            self.response_cache
                .store_detached(api_url, response.clone(), ttl);
        }

        Ok(response)
    }
}

/// Backend base URL joined with the original path and query.
fn outbound_url(route: &RouteDescriptor, parts: &Parts) -> String {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    format!("{}{}", route.service_endpoint, path_and_query)
}

fn build_outbound(parts: &Parts, url: &str, body: Bytes) -> Result<Request<Bytes>, GatewayError> {
    let mut headers = HeaderMap::with_capacity(parts.headers.len());
    for (name, value) in &parts.headers {
        if !HOP_BY_HOP_HEADERS.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    let mut request = Request::builder()
        .method(parts.method.clone())
        .uri(url)
        .body(body)
        .map_err(|e| GatewayError::Internal(format!("invalid outbound request: {e}")))?;
    *request.headers_mut() = headers;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{HeaderValue, Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::{
        adapters::memory_cache::MemoryCacheStore,
        config::models::{BackendKind, PathRuleConfig, RouteEntryConfig},
        ports::http_client::HttpClientError,
        test_support::{FakeHttpClient, RecordedRequest, json_response, test_service_account},
    };

    const PROJECTS: &str = "https://projects.example.test";
    const AUTH: &str = "https://auth.example.test";
    const TOKEN_ENDPOINT: &str = "https://oauth2.example.test/token";
    const CHALLENGE: &str = "https://challenge.example.test/siteverify";

    fn config() -> GatewayConfig {
        let account = test_service_account();
        let mut config = GatewayConfig::default();
        config.environment = "test".to_string();
        config.cors.allowed_origins = vec!["https://allowed".to_string()];
        config.aws.access_key_id = Some("AKIDEXAMPLE".to_string());
        config.aws.secret_access_key = Some("secret".to_string());
        config.gcp.service_account_email = Some(account.email.clone());
        config.gcp.service_account_key = Some(account.private_key.clone());
        config.gcp.token_endpoint = TOKEN_ENDPOINT.to_string();
        config.challenge.secret_key = Some("challenge-secret".to_string());
        config.challenge.verify_url = CHALLENGE.to_string();
        config.routes = Some(
            [(
                "test".to_string(),
                vec![
                    RouteEntryConfig {
                        prefix: "/projects".to_string(),
                        service_endpoint: PROJECTS.to_string(),
                        endpoint_type: BackendKind::AwsLambdaFunctionUrl,
                        cacheable: Some(true),
                        requires_challenge_token: Some(false),
                        requires_access_token: Some(false),
                        path_rules: vec![PathRuleConfig {
                            path: "/projects/private".to_string(),
                            requires_access_token: Some(true),
                            ..PathRuleConfig::default()
                        }],
                    },
                    RouteEntryConfig {
                        prefix: "/auth".to_string(),
                        service_endpoint: AUTH.to_string(),
                        endpoint_type: BackendKind::GcpCloudRunServiceUrl,
                        cacheable: Some(false),
                        requires_challenge_token: Some(false),
                        requires_access_token: Some(false),
                        path_rules: vec![PathRuleConfig {
                            path: "/auth/login".to_string(),
                            requires_challenge_token: Some(true),
                            ..PathRuleConfig::default()
                        }],
                    },
                ],
            )]
            .into_iter()
            .collect(),
        );
        config
    }

    /// Fake upstream answering the token endpoint, the challenge service, the
    /// verification endpoint and the backends.
    fn upstream(backend: impl Fn(&RecordedRequest) -> Response<Bytes> + Send + Sync + 'static) -> Arc<FakeHttpClient> {
        FakeHttpClient::new(move |req| {
            let url = req.uri.to_string();
            if url.starts_with(TOKEN_ENDPOINT) {
                Ok(json_response(StatusCode::OK, &json!({"id_token": "id-tok"})))
            } else if url.starts_with(CHALLENGE) {
                let ok = req.body_json()["response"] == "good";
                Ok(json_response(StatusCode::OK, &json!({"success": ok})))
            } else if url.ends_with("/auth/verify-access-token") {
                let status = if req.body_json()["accessToken"] == "good" {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                };
                Ok(json_response(status, &json!({})))
            } else {
                Ok(backend(req))
            }
        })
    }

    fn ok_backend() -> Arc<FakeHttpClient> {
        upstream(|_| json_response(StatusCode::OK, &json!({"ok": true})))
    }

    fn gateway_with(config: GatewayConfig, client: Arc<FakeHttpClient>) -> GatewayService {
        GatewayService::new(Arc::new(config), client, Arc::new(MemoryCacheStore::new())).unwrap()
    }

    fn gateway(client: Arc<FakeHttpClient>) -> GatewayService {
        gateway_with(config(), client)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn message(response: &Response<Bytes>) -> String {
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        body["error"]["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_aws_route_is_signed_and_forwarded() {
        let client = ok_backend();
        let gateway = gateway(client.clone());

        let response = gateway
            .handle_request(get("/projects/42?b=2&a=1"), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let sent = client.requests_to(PROJECTS);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].uri.to_string(),
            "https://projects.example.test/projects/42?b=2&a=1"
        );
        let authorization = sent[0].headers.get(header::AUTHORIZATION).unwrap();
        assert!(
            authorization
                .to_str()
                .unwrap()
                .starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/")
        );
        assert!(sent[0].headers.contains_key("x-amz-date"));
        assert!(sent[0].headers.contains_key("x-amz-content-sha256"));
    }

    #[tokio::test]
    async fn test_gcp_route_carries_identity_token() {
        let client = ok_backend();
        let gateway = gateway(client.clone());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from("{\"email\":\"a@b.c\"}"))
            .unwrap();
        let response = gateway.handle_request(request, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let sent = client.requests_to(AUTH);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].headers.get("x-serverless-authorization").unwrap(),
            "Bearer id-tok"
        );
        assert_eq!(sent[0].body, Bytes::from_static(b"{\"email\":\"a@b.c\"}"));
        assert!(!sent[0].headers.contains_key(header::CONNECTION));
        assert_eq!(client.requests_to(TOKEN_ENDPOINT).len(), 1);
    }

    #[tokio::test]
    async fn test_rejections_carry_normalized_headers() {
        let gateway = gateway(ok_backend());
        let request = Request::builder()
            .uri("/unknown")
            .header(header::ORIGIN, "https://allowed")
            .body(Body::empty())
            .unwrap();

        let response = gateway.handle_request(request, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(message(&response), "Not Found: No route found for path: /unknown");
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://allowed"
        );
        assert_eq!(response.headers().get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_preflight() {
        let client = ok_backend();
        let gateway = gateway(client.clone());
        let preflight = |origin: &'static str| {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/projects/42")
                .header(header::ORIGIN, origin)
                .body(Body::empty())
                .unwrap()
        };

        let allowed = gateway.handle_request(preflight("https://allowed"), None).await;
        assert_eq!(allowed.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://allowed"
        );

        let denied = gateway.handle_request(preflight("https://evil"), None).await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert_eq!(message(&denied), "CORS preflight not allowed");
        assert!(!denied.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_payload_too_large_stops_pipeline() {
        let mut config = config();
        config.max_body_size = 4;
        let client = ok_backend();
        let gateway = gateway_with(config, client.clone());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/projects/1")
            .body(Body::from("too big"))
            .unwrap();
        let response = gateway.handle_request(request, None).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_per_path_and_caller() {
        let mut config = config();
        config.rate_limit.requests = 2;
        let gateway = gateway_with(config, ok_backend());
        let peer: SocketAddr = "198.51.100.1:4000".parse().unwrap();

        for _ in 0..2 {
            let response = gateway.handle_request(get("/projects/1"), Some(peer)).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let limited = gateway.handle_request(get("/projects/1"), Some(peer)).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(message(&limited), "Rate limit exceeded");

        let other_path = gateway.handle_request(get("/projects/2"), Some(peer)).await;
        assert_eq!(other_path.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forwarded_for_does_not_reset_quota() {
        let mut config = config();
        config.rate_limit.requests = 2;
        let gateway = gateway_with(config, ok_backend());
        let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();

        let mut limited = 0;
        for i in 0..10 {
            let request = Request::builder()
                .uri("/projects/1")
                .header("x-forwarded-for", format!("10.0.0.{i}"))
                .header("cf-connecting-ip", format!("10.1.0.{i}"))
                .body(Body::empty())
                .unwrap();
            let response = gateway.handle_request(request, Some(peer)).await;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                limited += 1;
            }
        }
        assert_eq!(limited, 8);
    }

    #[tokio::test]
    async fn test_trusted_proxy_forwards_caller_identity() {
        let mut config = config();
        config.rate_limit.requests = 1;
        config.trusted_proxies = vec!["10.0.0.1".to_string()];
        let gateway = gateway_with(config, ok_backend());
        let proxy: SocketAddr = "10.0.0.1:4000".parse().unwrap();

        let from = |caller: &str| {
            Request::builder()
                .uri("/projects/1")
                .header("x-forwarded-for", caller)
                .body(Body::empty())
                .unwrap()
        };
        let first = gateway.handle_request(from("198.51.100.1"), Some(proxy)).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = gateway.handle_request(from("198.51.100.2"), Some(proxy)).await;
        assert_eq!(second.status(), StatusCode::OK);
        let repeat = gateway.handle_request(from("198.51.100.1"), Some(proxy)).await;
        assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_tokens_do_not_accumulate_in_store() {
        let store = Arc::new(MemoryCacheStore::new());
        let gateway =
            GatewayService::new(Arc::new(config()), ok_backend(), store.clone()).unwrap();

        for i in 0..50 {
            let request = Request::builder()
                .uri("/projects/private")
                .header(header::AUTHORIZATION, format!("Bearer junk-{i}"))
                .body(Body::empty())
                .unwrap();
            let response = gateway.handle_request(request, None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        assert!(store.len() >= 50);

        tokio::time::advance(Duration::from_secs(3600 + 1)).await;
        store.purge_expired().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_index_and_documentation_redirect() {
        let client = ok_backend();
        let gateway = gateway(client.clone());

        let index = gateway.handle_request(get("/"), None).await;
        assert_eq!(index.status(), StatusCode::OK);
        assert_eq!(
            index.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        let html = std::str::from_utf8(index.body()).unwrap();
        assert!(html.contains("/projects/documentation"));

        for path in ["/projects", "/projects/"] {
            let redirect = gateway.handle_request(get(path), None).await;
            assert_eq!(redirect.status(), StatusCode::FOUND);
            assert_eq!(
                redirect.headers().get(header::LOCATION).unwrap(),
                "/projects/documentation"
            );
        }
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_challenge_token_required_on_login() {
        let client = ok_backend();
        let gateway = gateway(client.clone());

        let missing = gateway.handle_request(get("/auth/login"), None).await;
        assert_eq!(missing.status(), StatusCode::FORBIDDEN);
        assert_eq!(message(&missing), "Turnstile token required");

        let with_token = |token: &'static str| {
            Request::builder()
                .uri("/auth/login")
                .header("x-cf-turnstile-token", token)
                .body(Body::empty())
                .unwrap()
        };
        let invalid = gateway.handle_request(with_token("bad"), None).await;
        assert_eq!(invalid.status(), StatusCode::FORBIDDEN);
        assert_eq!(message(&invalid), "Invalid Turnstile token");
        assert!(client.requests_to(AUTH).is_empty());

        let valid = gateway.handle_request(with_token("good"), None).await;
        assert_eq!(valid.status(), StatusCode::OK);
        assert_eq!(client.requests_to(AUTH).len(), 1);
    }

    #[tokio::test]
    async fn test_access_token_required_by_path_rule() {
        let client = ok_backend();
        let gateway = gateway(client.clone());
        let with_bearer = |token: &'static str| {
            Request::builder()
                .uri("/projects/private")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };

        let missing = gateway.handle_request(get("/projects/private"), None).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let invalid = gateway.handle_request(with_bearer("bad"), None).await;
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
        assert!(client.requests_to(PROJECTS).is_empty());

        let valid = gateway.handle_request(with_bearer("good"), None).await;
        assert_eq!(valid.status(), StatusCode::OK);
        gateway.handle_request(with_bearer("good"), None).await;

        let verify_calls = client
            .requests()
            .into_iter()
            .filter(|r| r.uri.path() == "/auth/verify-access-token")
            .count();
        assert_eq!(verify_calls, 2);
        assert_eq!(client.requests_to(PROJECTS).len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_auth_service_is_503() {
        let client = FakeHttpClient::new(|req| {
            if req.uri.path() == "/auth/verify-access-token" {
                Err(HttpClientError::ConnectionError("refused".to_string()))
            } else {
                Ok(json_response(StatusCode::OK, &json!({"id_token": "id-tok"})))
            }
        });
        let gateway = gateway(client);
        let request = Request::builder()
            .uri("/projects/private")
            .header(header::AUTHORIZATION, "Bearer abc")
            .body(Body::empty())
            .unwrap();

        let response = gateway.handle_request(request, None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(message(&response), "Auth service unavailable");
    }

    #[tokio::test]
    async fn test_backend_failure_is_503() {
        let client = FakeHttpClient::unreachable();
        let response = gateway(client).handle_request(get("/projects/1"), None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(message(&response), "API Gateway unavailable");
    }

    async fn wait_for_store() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_cacheable_response_is_replayed() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let client = upstream(move |_| {
            *counter.lock().unwrap() += 1;
            Response::builder()
                .header(header::CACHE_CONTROL, "s-maxage=120")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Bytes::from_static(b"{\"id\":42}"))
                .unwrap()
        });
        let gateway = gateway(client);

        let first = gateway.handle_request(get("/projects/42"), None).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(
            first.headers().get(header::CACHE_CONTROL).unwrap(),
            &gateway.config().security_headers.cache_control
        );
        wait_for_store().await;

        let second = gateway.handle_request(get("/projects/42"), None).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.body(), &Bytes::from_static(b"{\"id\":42}"));
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_no_cache_without_cache_control_or_with_authorization() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let client = upstream(move |req| {
            *counter.lock().unwrap() += 1;
            let mut builder = Response::builder();
            if req.uri.path() == "/projects/cached" {
                builder = builder.header(header::CACHE_CONTROL, "max-age=60");
            }
            builder.body(Bytes::from_static(b"{}")).unwrap()
        });
        let gateway = gateway(client);

        for _ in 0..2 {
            gateway.handle_request(get("/projects/plain"), None).await;
            wait_for_store().await;
        }
        assert_eq!(*hits.lock().unwrap(), 2);

        let authorized = || {
            Request::builder()
                .uri("/projects/cached")
                .header(header::AUTHORIZATION, "Bearer someone")
                .body(Body::empty())
                .unwrap()
        };
        for _ in 0..2 {
            gateway.handle_request(authorized(), None).await;
            wait_for_store().await;
        }
        assert_eq!(*hits.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_error_responses_are_not_cached() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let client = upstream(move |_| {
            *counter.lock().unwrap() += 1;
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header(header::CACHE_CONTROL, "max-age=60")
                .body(Bytes::from_static(b"{}"))
                .unwrap()
        });
        let gateway = gateway(client);

        for _ in 0..2 {
            let response = gateway.handle_request(get("/projects/1"), None).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            wait_for_store().await;
        }
        assert_eq!(*hits.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_foreign_origin_is_rejected_before_routing() {
        let client = ok_backend();
        let request = Request::builder()
            .uri("/projects/1")
            .header(header::ORIGIN, HeaderValue::from_static("https://evil"))
            .body(Body::empty())
            .unwrap();
        let response = gateway(client.clone()).handle_request(request, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(message(&response), "Forbidden - Origin Not Allowed");
        assert_eq!(client.request_count(), 0);
    }
}
