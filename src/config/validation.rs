use std::{collections::HashSet, net::SocketAddr};

use crate::config::models::{BackendKind, GatewayConfig, RouteEntryConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, reporting every problem at once.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.max_body_size == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_size".to_string(),
                message: "Maximum body size must be greater than 0".to_string(),
            });
        }

        if let Err(e) = config.upstream_timeout() {
            errors.push(ValidationError::InvalidField {
                field: "upstream_timeout".to_string(),
                message: e.to_string(),
            });
        }

        errors.extend(Self::validate_rate_limit(config));

        if let Err(e) = config.trusted_proxy_addrs() {
            errors.push(ValidationError::InvalidField {
                field: "trusted_proxies".to_string(),
                message: e.to_string(),
            });
        }

        for (url, field) in [
            (&config.gcp.token_endpoint, "gcp.token_endpoint"),
            (&config.challenge.verify_url, "challenge.verify_url"),
        ] {
            if let Err(e) = Self::validate_url(url, field) {
                errors.push(e);
            }
        }

        let table = config.route_table();
        for (environment, entries) in &table {
            errors.extend(Self::validate_environment_routes(environment, entries));
        }

        match table.get(&config.environment) {
            Some(entries) => errors.extend(Self::validate_credentials(config, entries)),
            None => {
                let mut available: Vec<&str> = table.keys().map(String::as_str).collect();
                available.sort_unstable();
                errors.push(ValidationError::InvalidField {
                    field: "environment".to_string(),
                    message: format!(
                        "Unknown environment '{}'. Available environments: {}",
                        config.environment,
                        available.join(", ")
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_rate_limit(config: &GatewayConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if config.rate_limit.requests == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.requests".to_string(),
                message: "Rate limit requests must be greater than 0".to_string(),
            });
        }
        match config.rate_limit_period() {
            Ok(period) if period.is_zero() => errors.push(ValidationError::InvalidField {
                field: "rate_limit.period".to_string(),
                message: "Period must be greater than zero".to_string(),
            }),
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::InvalidField {
                field: "rate_limit.period".to_string(),
                message: "Period must be a duration like '1s', '1m', or '1h'".to_string(),
            }),
        }
        errors
    }

    fn validate_environment_routes(
        environment: &str,
        entries: &[RouteEntryConfig],
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        if entries.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("routes.{environment}"),
            });
        }

        for entry in entries {
            let context = format!("routes.{environment} '{}'", entry.prefix);

            if entry.prefix.is_empty() || !entry.prefix.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: context.clone(),
                    message: "Route prefixes must start with '/'".to_string(),
                });
            }

            if !seen.insert(entry.prefix.as_str()) {
                errors.push(ValidationError::RouteConflict {
                    message: format!(
                        "Prefix '{}' is declared more than once in environment '{environment}'",
                        entry.prefix
                    ),
                });
            }

            if let Err(e) =
                Self::validate_url(&entry.service_endpoint, &format!("{context} service_endpoint"))
            {
                errors.push(e);
            }

            for rule in &entry.path_rules {
                if !rule.path.starts_with(&entry.prefix) {
                    errors.push(ValidationError::InvalidField {
                        field: format!("{context} path_rules"),
                        message: format!(
                            "Path rule '{}' is not below prefix '{}'",
                            rule.path, entry.prefix
                        ),
                    });
                }
            }
        }

        errors
    }

    /// Credentials needed by the routes of the active environment.
    fn validate_credentials(
        config: &GatewayConfig,
        entries: &[RouteEntryConfig],
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let uses = |kind: BackendKind| entries.iter().any(|e| e.endpoint_type == kind);

        let needs_access_token = entries.iter().any(|e| {
            e.requires_access_token.unwrap_or(true)
                || e.path_rules.iter().any(|r| r.requires_access_token == Some(true))
        });
        let needs_challenge = entries.iter().any(|e| {
            e.requires_challenge_token.unwrap_or(false)
                || e.path_rules
                    .iter()
                    .any(|r| r.requires_challenge_token == Some(true))
        });
        let auth_route = entries
            .iter()
            .find(|e| e.prefix == config.access_token.auth_route_prefix);

        if uses(BackendKind::AwsLambdaFunctionUrl) {
            Self::require(&mut errors, &config.aws.access_key_id, "aws.access_key_id");
            Self::require(&mut errors, &config.aws.secret_access_key, "aws.secret_access_key");
        }

        let gcp_for_auth = needs_access_token
            && auth_route.is_some_and(|e| e.endpoint_type == BackendKind::GcpCloudRunServiceUrl);
        if uses(BackendKind::GcpCloudRunServiceUrl) || gcp_for_auth {
            Self::require(
                &mut errors,
                &config.gcp.service_account_email,
                "gcp.service_account_email",
            );
            Self::require(
                &mut errors,
                &config.gcp.service_account_key,
                "gcp.service_account_key",
            );
        }

        if needs_challenge {
            Self::require(&mut errors, &config.challenge.secret_key, "challenge.secret_key");
        }

        if needs_access_token && auth_route.is_none() {
            errors.push(ValidationError::MissingField {
                field: format!(
                    "route '{}' (required for access-token verification in '{}')",
                    config.access_token.auth_route_prefix, config.environment
                ),
            });
        }

        errors
    }

    fn require(errors: &mut Vec<ValidationError>, value: &Option<String>, field: &str) {
        if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
            errors.push(ValidationError::MissingField {
                field: field.to_string(),
            });
        }
    }

    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL: {e}"),
            }),
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
