//! AWS Signature Version 4 signing for outbound backend requests.
//!
//! The signer never touches the caller's request: it builds a signed copy
//! carrying `x-amz-date`, `host`, `x-amz-content-sha256` and `Authorization`.
//! The body must already be buffered so that the bytes hashed here are the
//! bytes forwarded.
//!
//! Derived signing keys are scoped to `(secret, date, region, service)` and
//! may be reused for the whole UTC day. [`SigningKeyCache`] memoizes them;
//! the produced signatures are identical with or without the cache.
pub mod canonical;

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderValue, Request, header};
use scc::HashMap;

use self::canonical::CanonicalRequest;
use crate::core::crypto::{EMPTY_PAYLOAD_SHA256, hmac_sha256, sha256_hex};

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const DEFAULT_REGION: &str = "af-south-1";
pub const DEFAULT_SERVICE: &str = "lambda";
const KEY_PREFIX: &str = "AWS4";
const SCOPE_TERMINATOR: &str = "aws4_request";

pub const X_AMZ_DATE: &str = "x-amz-date";
pub const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SigningError {
    #[error("outbound request URI has no host: {0}")]
    MissingHost(String),

    #[error("invalid header value for '{name}'")]
    InvalidHeader { name: &'static str },

    #[error("HMAC key rejected")]
    InvalidKey,
}

/// Static access key pair used to sign requests.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Result of a signing operation, including the intermediate values that
/// feed the signature.
#[derive(Debug)]
pub struct SignedRequest {
    pub request: Request<Bytes>,
    pub canonical_request: CanonicalRequest,
    pub string_to_sign: String,
    pub signature: String,
}

/// Memoized signing keys for the current UTC day.
///
/// Keys are indexed by a digest of the secret rather than the secret itself.
/// Entries from earlier days are dropped whenever a new day's key is stored.
#[derive(Clone, Default)]
pub struct SigningKeyCache {
    keys: Arc<HashMap<SigningScope, Vec<u8>>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SigningScope {
    secret_digest: String,
    date_stamp: String,
    region: String,
    service: String,
}

impl SigningKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_derive(
        &self,
        secret: &str,
        date_stamp: &str,
        region: &str,
        service: &str,
    ) -> Result<Vec<u8>, SigningError> {
        let scope = SigningScope {
            secret_digest: sha256_hex(secret),
            date_stamp: date_stamp.to_string(),
            region: region.to_string(),
            service: service.to_string(),
        };

        if let Some(entry) = self.keys.get_async(&scope).await {
            return Ok(entry.get().clone());
        }

        let key = derive_signing_key(secret, date_stamp, region, service)?;
        self.keys
            .retain_async(|cached, _| cached.date_stamp == date_stamp)
            .await;
        let _ = self.keys.insert_async(scope, key.clone()).await;
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Signs requests for `AWS_LAMBDA_FUNCTION_URL`-style backends.
#[derive(Clone, Default)]
pub struct RequestSigner {
    key_cache: Option<SigningKeyCache>,
}

impl RequestSigner {
    /// Signer that memoizes derived keys per UTC day.
    pub fn new() -> Self {
        Self {
            key_cache: Some(SigningKeyCache::new()),
        }
    }

    /// Signer that re-derives the key on every request.
    pub fn without_key_cache() -> Self {
        Self { key_cache: None }
    }

    /// Sign `request` with the current time and return the signed copy.
    pub async fn sign(
        &self,
        request: &Request<Bytes>,
        credentials: &AwsCredentials,
        region: Option<&str>,
        service: &str,
    ) -> Result<Request<Bytes>, SigningError> {
        self.sign_at(request, credentials, region, service, Utc::now())
            .await
            .map(|signed| signed.request)
    }

    /// Sign `request` as of `now`.
    pub async fn sign_at(
        &self,
        request: &Request<Bytes>,
        credentials: &AwsCredentials,
        region: Option<&str>,
        service: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedRequest, SigningError> {
        let uri = request.uri();
        let host = uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .ok_or_else(|| SigningError::MissingHost(uri.to_string()))?;

        let region = region
            .map(str::to_string)
            .or_else(|| uri.host().and_then(region_from_host))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let body = request.body();
        let payload_hash = if body.is_empty() {
            EMPTY_PAYLOAD_SHA256.to_string()
        } else {
            sha256_hex(body)
        };

        let mut headers = request.headers().clone();
        headers.insert(X_AMZ_DATE, header_value(&amz_date, "x-amz-date")?);
        headers.insert(header::HOST, header_value(&host, "host")?);
        headers.insert(
            X_AMZ_CONTENT_SHA256,
            header_value(&payload_hash, "x-amz-content-sha256")?,
        );

        let mut signed_headers = vec!["host", X_AMZ_CONTENT_SHA256, X_AMZ_DATE];
        if headers.contains_key(header::CONTENT_TYPE) {
            signed_headers.push("content-type");
        }

        let canonical_request = CanonicalRequest::new(
            request.method().as_str(),
            uri.path(),
            uri.query(),
            &headers,
            &signed_headers,
            &payload_hash,
        );

        let credential_scope = format!("{date_stamp}/{region}/{service}/{SCOPE_TERMINATOR}");
        let string_to_sign = [
            ALGORITHM,
            amz_date.as_str(),
            credential_scope.as_str(),
            canonical_request.hash().as_str(),
        ]
        .join("\n");

        let signing_key = match &self.key_cache {
            Some(cache) => {
                cache
                    .get_or_derive(&credentials.secret_access_key, &date_stamp, &region, service)
                    .await?
            }
            None => derive_signing_key(
                &credentials.secret_access_key,
                &date_stamp,
                &region,
                service,
            )?,
        };
        let signature = hex::encode(
            hmac_sha256(&signing_key, string_to_sign.as_bytes())
                .map_err(|_| SigningError::InvalidKey)?,
        );

        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={}, Signature={signature}",
            credentials.access_key_id, canonical_request.signed_headers
        );
        headers.insert(
            header::AUTHORIZATION,
            header_value(&authorization, "authorization")?,
        );

        let mut signed = Request::builder()
            .method(request.method().clone())
            .uri(uri.clone())
            .version(request.version())
            .body(body.clone())
            .map_err(|_| SigningError::InvalidHeader { name: "request" })?;
        *signed.headers_mut() = headers;

        tracing::debug!(
            region = %region,
            service = %service,
            signed_headers = %canonical_request.signed_headers,
            "Signed outbound request"
        );

        Ok(SignedRequest {
            request: signed,
            canonical_request,
            string_to_sign,
            signature,
        })
    }
}

/// Four-step HMAC chain: secret → date → region → service → terminator.
pub fn derive_signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let step = |key: &[u8], data: &str| {
        hmac_sha256(key, data.as_bytes()).map_err(|_| SigningError::InvalidKey)
    };
    let k_date = step(format!("{KEY_PREFIX}{secret}").as_bytes(), date_stamp)?;
    let k_region = step(&k_date, region)?;
    let k_service = step(&k_region, service)?;
    step(&k_service, SCOPE_TERMINATOR)
}

/// Extract the region from hosts shaped like `<id>.<service>-url.<region>.<suffix>`,
/// e.g. `abc.lambda-url.eu-west-1.on.aws`.
pub fn region_from_host(host: &str) -> Option<String> {
    let labels: Vec<&str> = host.split('.').collect();
    let marker = labels.iter().position(|label| label.ends_with("-url"))?;
    if marker == 0 {
        return None;
    }
    // The region must be followed by at least one suffix label.
    match (labels.get(marker + 1), labels.get(marker + 2)) {
        (Some(region), Some(_)) if !region.is_empty() => Some((*region).to_string()),
        _ => None,
    }
}

fn header_value(value: &str, name: &'static str) -> Result<HeaderValue, SigningError> {
    HeaderValue::from_str(value).map_err(|_| SigningError::InvalidHeader { name })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 45).unwrap()
    }

    fn credentials() -> AwsCredentials {
        AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn request(body: &'static [u8]) -> Request<Bytes> {
        Request::builder()
            .method("POST")
            .uri("https://abc123.lambda-url.eu-west-1.on.aws/projects/42?b=2&a=1")
            .header("content-type", "application/json")
            .body(Bytes::from_static(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_signature_is_deterministic() {
        let signer = RequestSigner::without_key_cache();
        let req = request(b"{\"x\":1}");
        let first = signer
            .sign_at(&req, &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();
        let second = signer
            .sign_at(&req, &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();

        assert_eq!(first.canonical_request, second.canonical_request);
        assert_eq!(first.string_to_sign, second.string_to_sign);
        assert_eq!(first.signature, second.signature);
    }

    #[tokio::test]
    async fn test_key_cache_is_transparent() {
        let cached = RequestSigner::new();
        let uncached = RequestSigner::without_key_cache();
        let req = request(b"payload");

        let a = cached
            .sign_at(&req, &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();
        let b = cached
            .sign_at(&req, &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();
        let c = uncached
            .sign_at(&req, &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();

        assert_eq!(a.signature, b.signature);
        assert_eq!(a.signature, c.signature);
    }

    #[tokio::test]
    async fn test_key_cache_drops_previous_days() {
        let signer = RequestSigner::new();
        let req = request(b"");
        let day_one = fixed_now();
        let day_two = Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 1).unwrap();

        signer
            .sign_at(&req, &credentials(), None, "lambda", day_one)
            .await
            .unwrap();
        signer
            .sign_at(&req, &credentials(), None, "lambda", day_two)
            .await
            .unwrap();

        assert_eq!(signer.key_cache.as_ref().map(|c| c.len()), Some(1));
    }

    #[tokio::test]
    async fn test_signed_request_headers_and_authorization_format() {
        let signer = RequestSigner::new();
        let req = request(b"{\"x\":1}");
        let signed = signer
            .sign_at(&req, &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();
        let headers = signed.request.headers();

        assert_eq!(headers.get(X_AMZ_DATE).unwrap(), "20240315T123045Z");
        assert_eq!(
            headers.get("host").unwrap(),
            "abc123.lambda-url.eu-west-1.on.aws"
        );
        assert_eq!(
            headers.get(X_AMZ_CONTENT_SHA256).unwrap().to_str().unwrap(),
            sha256_hex(b"{\"x\":1}")
        );

        let auth = headers.get("authorization").unwrap().to_str().unwrap();
        assert_eq!(
            auth,
            format!(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240315/eu-west-1/lambda/aws4_request, \
                 SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date, Signature={}",
                signed.signature
            )
        );
        assert_eq!(signed.request.body(), req.body());
    }

    #[tokio::test]
    async fn test_signing_leaves_original_untouched() {
        let signer = RequestSigner::new();
        let req = request(b"body");
        let _ = signer.sign(&req, &credentials(), None, "lambda").await.unwrap();

        assert!(req.headers().get("authorization").is_none());
        assert!(req.headers().get(X_AMZ_DATE).is_none());
    }

    #[tokio::test]
    async fn test_empty_body_uses_constant_hash_and_skips_content_type() {
        let signer = RequestSigner::new();
        let req = Request::builder()
            .method("GET")
            .uri("https://abc.lambda-url.af-south-1.on.aws/projects")
            .body(Bytes::new())
            .unwrap();
        let signed = signer
            .sign_at(&req, &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();

        assert_eq!(signed.canonical_request.payload_hash, EMPTY_PAYLOAD_SHA256);
        assert_eq!(
            signed.canonical_request.signed_headers,
            "host;x-amz-content-sha256;x-amz-date"
        );
    }

    #[tokio::test]
    async fn test_canonical_request_uses_sorted_query() {
        let signer = RequestSigner::new();
        let signed = signer
            .sign_at(&request(b""), &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();
        assert_eq!(signed.canonical_request.query, "a=1&b=2");
        assert_eq!(signed.canonical_request.uri, "/projects/42");
    }

    #[test]
    fn test_string_to_sign_scope_uses_explicit_region() {
        let key_a = derive_signing_key("secret", "20240315", "us-east-1", "lambda").unwrap();
        let key_b = derive_signing_key("secret", "20240315", "eu-west-1", "lambda").unwrap();
        assert_ne!(key_a, key_b);
        assert_eq!(key_a.len(), 32);
    }

    #[test]
    fn test_derive_signing_key_matches_published_example() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_region_from_host() {
        assert_eq!(
            region_from_host("abc.lambda-url.eu-west-1.on.aws").as_deref(),
            Some("eu-west-1")
        );
        assert_eq!(region_from_host("example.com"), None);
        assert_eq!(region_from_host("abc.lambda-url.eu-west-1"), None);
        assert_eq!(region_from_host("127.0.0.1"), None);
    }

    #[tokio::test]
    async fn test_region_defaults_when_host_has_no_region() {
        let signer = RequestSigner::new();
        let req = Request::builder()
            .uri("http://127.0.0.1:9000/projects")
            .body(Bytes::new())
            .unwrap();
        let signed = signer
            .sign_at(&req, &credentials(), None, "lambda", fixed_now())
            .await
            .unwrap();
        assert!(signed.string_to_sign.contains("/af-south-1/lambda/aws4_request"));
        assert_eq!(signed.request.headers().get("host").unwrap(), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_missing_host_is_an_error() {
        let signer = RequestSigner::new();
        let req = Request::builder().uri("/relative").body(Bytes::new()).unwrap();
        let result = signer.sign(&req, &credentials(), None, "lambda").await;
        assert!(matches!(result, Err(SigningError::MissingHost(_))));
    }
}
