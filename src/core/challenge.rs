//! Anti-bot challenge token verification.
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, header};
use serde::{Deserialize, Serialize};

use crate::{
    config::models::ChallengeConfig, error::GatewayError,
    ports::http_client::HttpClient,
};

#[derive(Serialize)]
struct VerifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
    remoteip: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
}

/// Verifies the challenge token a client sends in a request header against
/// the external siteverify service.
#[derive(Clone)]
pub struct ChallengeVerifier {
    client: Arc<dyn HttpClient>,
    config: ChallengeConfig,
}

impl ChallengeVerifier {
    pub fn new(client: Arc<dyn HttpClient>, config: ChallengeConfig) -> Self {
        Self { client, config }
    }

    /// Succeeds only when the token is present and the service answers
    /// `{"success": true}`. Every other outcome is a rejection.
    pub async fn verify(
        &self,
        headers: &HeaderMap,
        client_ip: Option<&str>,
    ) -> Result<(), GatewayError> {
        let token = headers
            .get(self.config.token_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(GatewayError::ChallengeTokenMissing)?;

        let Some(secret) = self.config.secret_key.as_deref() else {
            tracing::error!("Challenge secret is not configured, rejecting request");
            return Err(GatewayError::ChallengeTokenInvalid);
        };

        let remote_ip = client_ip.unwrap_or_default();
        if self.check(secret, token, &remote_ip).await {
            Ok(())
        } else {
            Err(GatewayError::ChallengeTokenInvalid)
        }
    }

    async fn check(&self, secret: &str, token: &str, remote_ip: &str) -> bool {
        let payload = VerifyRequest {
            secret,
            response: token,
            remoteip: remote_ip,
        };
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode challenge verification request");
                return false;
            }
        };

        let request = match Request::builder()
            .method(Method::POST)
            .uri(&self.config.verify_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))
        {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(error = %e, "Invalid challenge verification URL");
                return false;
            }
        };

        match self.client.send_request(request).await {
            Ok(response) => serde_json::from_slice::<VerifyResponse>(response.body())
                .map(|parsed| parsed.success)
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        status = %response.status(),
                        error = %e,
                        "Unreadable challenge verification response"
                    );
                    false
                }),
            Err(e) => {
                tracing::warn!(error = %e, "Challenge verification request failed");
                false
            }
        }
    }
}
