//! Shared fixtures for unit tests.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use once_cell::sync::Lazy;
use rsa::{
    RsaPrivateKey,
    pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding},
};

use crate::{
    core::token::ServiceAccount,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};

/// A request as seen by [`FakeHttpClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Responder = dyn Fn(&RecordedRequest) -> HttpClientResult<Response<Bytes>> + Send + Sync;

/// Recording `HttpClient` that answers from a closure.
pub struct FakeHttpClient {
    responder: Box<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeHttpClient {
    pub fn new(
        responder: impl Fn(&RecordedRequest) -> HttpClientResult<Response<Bytes>>
        + Send
        + Sync
        + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always answer with `status` and a JSON body.
    pub fn json(status: StatusCode, body: serde_json::Value) -> Arc<Self> {
        Self::new(move |_| Ok(json_response(status, &body)))
    }

    /// Always fail with a connection error.
    pub fn unreachable() -> Arc<Self> {
        Self::new(|_| Err(HttpClientError::ConnectionError("connection refused".into())))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests sent to a URL starting with `prefix`.
    pub fn requests_to(&self, prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.uri.to_string().starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn send_request(&self, req: Request<Bytes>) -> HttpClientResult<Response<Bytes>> {
        let (parts, body) = req.into_parts();
        let recorded = RecordedRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        };
        self.requests.lock().unwrap().push(recorded.clone());
        (self.responder)(&recorded)
    }
}

pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Bytes> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Bytes::from(body.to_string()))
        .unwrap()
}

static TEST_KEY: Lazy<RsaPrivateKey> = Lazy::new(|| {
    let mut rng = rsa::rand_core::OsRng;
    RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate key")
});

/// Service account whose key is base64 PKCS#8 DER, the way it is supplied
/// through the environment.
pub fn test_service_account() -> ServiceAccount {
    let der = TEST_KEY.to_pkcs8_der().expect("failed to encode private key");
    ServiceAccount::new(
        "gateway@test-project.iam.gserviceaccount.com",
        STANDARD.encode(der.as_bytes()),
    )
}

pub fn test_public_key_pem() -> String {
    TEST_KEY
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("failed to encode public key")
}
