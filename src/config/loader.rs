use std::{collections::HashMap, path::Path};

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Flat environment variables mapped onto nested configuration keys.
const ENV_OVERRIDES: [(&str, &str); 6] = [
    ("AWS_ACCESS_KEY_ID", "aws.access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "aws.secret_access_key"),
    ("AWS_REGION", "aws.region"),
    ("GCP_SERVICE_ACCOUNT_EMAIL", "gcp.service_account_email"),
    ("GCP_SERVICE_ACCOUNT_KEY", "gcp.service_account_key"),
    ("TURNSTILE_SECRET_KEY", "challenge.secret_key"),
];

const LIST_KEYS: [&str; 5] = [
    "trusted_proxies",
    "cors.allowed_origins",
    "cors.allowed_methods",
    "cors.allowed_headers",
    "cors.expose_headers",
];

/// Load configuration from built-in defaults, an optional file and the
/// process environment, in increasing order of precedence.
pub fn load_config(config_path: Option<&Path>) -> Result<GatewayConfig> {
    let env: HashMap<String, String> = std::env::vars().collect();
    load_config_with_env(config_path, env)
}

/// Same as [`load_config`] but reads variables from `env` instead of the
/// process environment.
pub fn load_config_with_env(
    config_path: Option<&Path>,
    env: HashMap<String, String>,
) -> Result<GatewayConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::Yaml, // Default to YAML
        };
        let path_str = path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;
        builder = builder.add_source(File::new(path_str, format).required(true));
    }

    let mut environment = Environment::default()
        .separator("__")
        .list_separator(",")
        .try_parsing(true);
    for key in LIST_KEYS {
        environment = environment.with_list_parse_key(key);
    }
    builder = builder.add_source(environment.source(Some(env.clone().into_iter().collect())));

    for (var, key) in ENV_OVERRIDES {
        builder = builder
            .set_override_option(key, env.get(var).cloned())
            .with_context(|| format!("Failed to apply {var}"))?;
    }

    let source = config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "environment".to_string());

    let settings = builder
        .build()
        .with_context(|| format!("Failed to build config from {source}"))?;

    let gateway_config: GatewayConfig = settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {source}"))?;

    Ok(gateway_config)
}
