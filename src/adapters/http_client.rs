use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use eyre::Result;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;
use tracing::Instrument;

use crate::{
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup::create_backend_span,
};

const USER_AGENT: &str = concat!("edgeguard/", env!("CARGO_PKG_VERSION"));

/// HTTP client adapter using Hyper with Rustls.
///
/// Every call is bounded by a single timeout covering connect, headers and
/// body. There are no retries: a failed call is terminal for the request
/// that made it.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::info!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(https_connector);

        tracing::debug!(timeout = ?request_timeout, "Created upstream HTTP client");
        Ok(Self {
            client,
            timeout: request_timeout,
        })
    }

    /// Ensure `Host` and `User-Agent` are present on the outgoing request.
    fn add_common_headers(req: &mut Request<Bytes>) -> HttpClientResult<()> {
        let uri = req.uri().clone();
        let host = uri.host().ok_or_else(|| {
            HttpClientError::InvalidRequest(format!("Outgoing URI has no host: {uri}"))
        })?;

        let headers = req.headers_mut();
        if !headers.contains_key(header::HOST) {
            let host_value = match uri.port_u16() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            let value = HeaderValue::from_str(&host_value)
                .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
            headers.insert(header::HOST, value);
        }
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        }
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, mut req: Request<Bytes>) -> HttpClientResult<Response<Bytes>> {
        Self::add_common_headers(&mut req)?;

        let backend_identifier = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );

        let span = create_backend_span(&backend_identifier, req.method().as_str(), req.uri().path());

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let outgoing = Request::from_parts(parts, Full::new(body));

        let client = self.client.clone();
        let timeout_secs = self.timeout.as_secs();

        let call = async move {
            let response = client.request(outgoing).await.map_err(|e| {
                HttpClientError::ConnectionError(format!("Request to {method} {uri} failed: {e}"))
            })?;

            let (mut parts, body) = response.into_parts();
            let bytes = body
                .collect()
                .await
                .map_err(|e| HttpClientError::Body(e.to_string()))?
                .to_bytes();

            // The body is buffered; framing is re-derived downstream.
            parts.headers.remove(header::TRANSFER_ENCODING);
            Ok::<_, HttpClientError>(Response::from_parts(parts, bytes))
        };

        let result = match timeout(self.timeout, call).instrument(span.clone()).await {
            Ok(result) => result,
            Err(_) => Err(HttpClientError::Timeout(timeout_secs)),
        };

        match &result {
            Ok(response) => {
                span.record("http.status_code", response.status().as_u16());
            }
            Err(e) => {
                span.record("http.status_code", 599u16);
                span.in_scope(|| {
                    tracing::warn!(backend = %backend_identifier, error = %e, "Upstream call failed");
                });
            }
        }

        result
    }
}
