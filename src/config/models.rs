//! Configuration data structures for the gateway.
//!
//! These types map directly to YAML / JSON / TOML configuration files and to
//! environment variables (see [`crate::config::loader`]). Every section has
//! defaults so that an empty configuration still produces a runnable gateway
//! for the built-in route table.
use std::{collections::HashMap, net::IpAddr, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8787";
pub const DEFAULT_ENVIRONMENT: &str = "prod";
pub const DEFAULT_MAX_BODY_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_CHALLENGE_ENDPOINT: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Kind of backend a route forwards to; decides how the outbound request is
/// authenticated.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendKind {
    /// Signed with AWS Signature Version 4.
    AwsLambdaFunctionUrl,
    /// Carries an identity token in `X-Serverless-Authorization`.
    GcpCloudRunServiceUrl,
    /// Forwarded without credentials.
    Other,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::AwsLambdaFunctionUrl => "AWS_LAMBDA_FUNCTION_URL",
            BackendKind::GcpCloudRunServiceUrl => "GCP_CLOUD_RUN_SERVICE_URL",
            BackendKind::Other => "OTHER",
        }
    }

    /// Short label used for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            BackendKind::AwsLambdaFunctionUrl => "aws_lambda",
            BackendKind::GcpCloudRunServiceUrl => "gcp_cloud_run",
            BackendKind::Other => "other",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy overrides for one exact path below a route prefix.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PathRuleConfig {
    pub path: String,
    #[serde(default)]
    pub cacheable: Option<bool>,
    #[serde(default)]
    pub requires_challenge_token: Option<bool>,
    #[serde(default)]
    pub requires_access_token: Option<bool>,
}

/// One route prefix of an environment's route table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteEntryConfig {
    pub prefix: String,
    pub service_endpoint: String,
    pub endpoint_type: BackendKind,
    #[serde(default)]
    pub cacheable: Option<bool>,
    #[serde(default)]
    pub requires_challenge_token: Option<bool>,
    #[serde(default)]
    pub requires_access_token: Option<bool>,
    #[serde(default)]
    pub path_rules: Vec<PathRuleConfig>,
}

/// CORS allow-lists applied to preflights and to every response.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
    pub vary: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allowed_methods: ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: [
                "Authorization",
                "Content-Type",
                "X-Requested-With",
                "Accept",
                "Origin",
                "X-CF-Turnstile-Token",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            expose_headers: ["Content-Length", "Content-Type", "Cache-Control"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            allow_credentials: true,
            max_age_secs: 3600,
            vary: "Origin".to_string(),
        }
    }
}

impl CorsConfig {
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }

    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(method))
    }
}

/// Security header values stamped onto every response.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    pub cache_control: String,
    pub content_security_policy: String,
    /// Only applied when the response has no `Content-Type`.
    pub content_type: String,
    pub strict_transport_security: String,
    pub x_content_type_options: String,
    pub x_frame_options: String,
    pub permissions_policy: String,
    pub referrer_policy: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            cache_control: "no-store, max-age=0".to_string(),
            content_security_policy: "default-src 'none'; frame-ancestors 'none'".to_string(),
            content_type: "application/json; charset=utf-8".to_string(),
            strict_transport_security: "max-age=31536000; includeSubDomains; preload".to_string(),
            x_content_type_options: "nosniff".to_string(),
            x_frame_options: "DENY".to_string(),
            permissions_policy: "camera=(), microphone=(), geolocation=()".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
        }
    }
}

/// Rate limit applied per (path, caller) key.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub period: String, // Parsed by humantime, e.g., "1s", "5m", "1h"
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            period: "60s".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AwsConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Explicit signing region; otherwise derived from the backend host.
    pub region: Option<String>,
    /// Signing service name.
    pub service: String,
    /// Memoize derived signing keys for the current UTC day.
    pub cache_signing_keys: bool,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            access_key_id: None,
            secret_access_key: None,
            region: None,
            service: "lambda".to_string(),
            cache_signing_keys: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GcpConfig {
    pub service_account_email: Option<String>,
    /// PEM, or base64 of the PKCS#8 DER key.
    pub service_account_key: Option<String>,
    pub token_endpoint: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            service_account_email: None,
            service_account_key: None,
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ChallengeConfig {
    pub secret_key: Option<String>,
    pub verify_url: String,
    pub token_header: String,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            verify_url: DEFAULT_CHALLENGE_ENDPOINT.to_string(),
            token_header: "x-cf-turnstile-token".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AccessTokenConfig {
    /// Route prefix whose backend hosts the verification endpoint.
    pub auth_route_prefix: String,
    pub verify_path: String,
    pub cache_ttl_secs: u64,
}

impl Default for AccessTokenConfig {
    fn default() -> Self {
        Self {
            auth_route_prefix: "/auth".to_string(),
            verify_path: "/auth/verify-access-token".to_string(),
            cache_ttl_secs: 900,
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub environment: String,
    pub listen_addr: String,
    pub max_body_size: u64,
    pub upstream_timeout: String, // Parsed by humantime
    pub cors: CorsConfig,
    pub security_headers: SecurityHeadersConfig,
    pub rate_limit: RateLimitConfig,
    pub aws: AwsConfig,
    pub gcp: GcpConfig,
    pub challenge: ChallengeConfig,
    pub access_token: AccessTokenConfig,
    /// Peers allowed to supply the caller address through `cf-connecting-ip`
    /// or `X-Forwarded-For`. Empty means every caller is identified by its
    /// socket address.
    pub trusted_proxies: Vec<String>,
    /// Replaces the built-in route table when present.
    pub routes: Option<HashMap<String, Vec<RouteEntryConfig>>>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            upstream_timeout: "30s".to_string(),
            cors: CorsConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
            rate_limit: RateLimitConfig::default(),
            aws: AwsConfig::default(),
            gcp: GcpConfig::default(),
            challenge: ChallengeConfig::default(),
            access_token: AccessTokenConfig::default(),
            trusted_proxies: Vec::new(),
            routes: None,
        }
    }
}

impl GatewayConfig {
    /// The configured route table, or the built-in one.
    pub fn route_table(&self) -> HashMap<String, Vec<RouteEntryConfig>> {
        self.routes
            .clone()
            .unwrap_or_else(crate::config::routes::builtin_routes)
    }

    pub fn upstream_timeout(&self) -> eyre::Result<Duration> {
        humantime::parse_duration(&self.upstream_timeout).map_err(|e| {
            eyre::eyre!(
                "Invalid upstream_timeout '{}': {}",
                self.upstream_timeout,
                e
            )
        })
    }

    pub fn trusted_proxy_addrs(&self) -> eyre::Result<Vec<IpAddr>> {
        self.trusted_proxies
            .iter()
            .map(|proxy| {
                proxy
                    .trim()
                    .parse::<IpAddr>()
                    .map_err(|e| eyre::eyre!("Invalid trusted proxy '{}': {}", proxy, e))
            })
            .collect()
    }

    pub fn rate_limit_period(&self) -> eyre::Result<Duration> {
        humantime::parse_duration(&self.rate_limit.period).map_err(|e| {
            eyre::eyre!("Invalid rate_limit.period '{}': {}", self.rate_limit.period, e)
        })
    }
}
