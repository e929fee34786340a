//! Outbound credential attachment per backend kind.
use bytes::Bytes;
use http::{HeaderValue, Request};

use crate::{
    config::models::{BackendKind, GatewayConfig},
    core::{
        signer::{AwsCredentials, RequestSigner, SigningError},
        token::{IdTokenIssuer, IssuanceError, ServiceAccount},
    },
};

pub const X_SERVERLESS_AUTHORIZATION: &str = "x-serverless-authorization";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CredentialError {
    #[error("AWS credentials are not configured")]
    MissingAwsCredentials,

    #[error("GCP service account is not configured")]
    MissingServiceAccount,

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Issuance(#[from] IssuanceError),

    #[error("identity token is not a valid header value")]
    InvalidToken,
}

/// Credential material and the engines that turn it into request
/// authentication.
#[derive(Clone)]
pub struct BackendCredentials {
    signer: RequestSigner,
    aws: Option<AwsCredentials>,
    aws_region: Option<String>,
    aws_service: String,
    issuer: IdTokenIssuer,
    service_account: Option<ServiceAccount>,
}

impl BackendCredentials {
    pub fn from_config(config: &GatewayConfig, issuer: IdTokenIssuer) -> Self {
        let aws = match (&config.aws.access_key_id, &config.aws.secret_access_key) {
            (Some(id), Some(secret)) => Some(AwsCredentials::new(id, secret)),
            _ => None,
        };
        let service_account = match (
            &config.gcp.service_account_email,
            &config.gcp.service_account_key,
        ) {
            (Some(email), Some(key)) => Some(ServiceAccount::new(email, key)),
            _ => None,
        };
        let signer = if config.aws.cache_signing_keys {
            RequestSigner::new()
        } else {
            RequestSigner::without_key_cache()
        };

        Self {
            signer,
            aws,
            aws_region: config.aws.region.clone(),
            aws_service: config.aws.service.clone(),
            issuer,
            service_account,
        }
    }

    /// Authenticate `request` for a backend of `kind` rooted at `audience`.
    ///
    /// Signed backends get a SigV4 `Authorization` header, token-authenticated
    /// backends an identity token for `audience`, others pass through.
    pub async fn attach(
        &self,
        kind: BackendKind,
        audience: &str,
        request: Request<Bytes>,
    ) -> Result<Request<Bytes>, CredentialError> {
        match kind {
            BackendKind::AwsLambdaFunctionUrl => {
                let credentials = self
                    .aws
                    .as_ref()
                    .ok_or(CredentialError::MissingAwsCredentials)?;
                Ok(self
                    .signer
                    .sign(
                        &request,
                        credentials,
                        self.aws_region.as_deref(),
                        &self.aws_service,
                    )
                    .await?)
            }
            BackendKind::GcpCloudRunServiceUrl => {
                let account = self
                    .service_account
                    .as_ref()
                    .ok_or(CredentialError::MissingServiceAccount)?;
                let token = self.issuer.get_token(account, audience).await?;
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| CredentialError::InvalidToken)?;
                let mut request = request;
                request
                    .headers_mut()
                    .insert(X_SERVERLESS_AUTHORIZATION, value);
                Ok(request)
            }
            BackendKind::Other => Ok(request),
        }
    }
}
