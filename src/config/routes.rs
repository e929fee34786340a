//! Built-in route table.
//!
//! Entries are listed in match order; the first prefix that matches wins.
use std::collections::HashMap;

use crate::config::models::{BackendKind, PathRuleConfig, RouteEntryConfig};

pub const ENVIRONMENTS: [&str; 3] = ["local", "dev", "prod"];

// `local` shares the dev backends.
const DEV_PROJECTS_ENDPOINT: &str =
    "https://7bu6jnh7kljhlykmi6iiuwqoe40yupit.lambda-url.af-south-1.on.aws";
const DEV_AUTH_ENDPOINT: &str = "https://from-the-hart-auth-915273311819.africa-south1.run.app";
const PROD_PROJECTS_ENDPOINT: &str =
    "https://27zsxewc6uucq23tpr2erpygki0bwxya.lambda-url.af-south-1.on.aws";
const PROD_AUTH_ENDPOINT: &str = "https://from-the-hart-auth-247813151171.africa-south1.run.app";

const CHALLENGE_PATHS: [&str; 3] = ["/auth/login", "/auth/register", "/auth/forgot-password"];

fn projects_route(endpoint: &str, cacheable: bool) -> RouteEntryConfig {
    RouteEntryConfig {
        prefix: "/projects".to_string(),
        service_endpoint: endpoint.to_string(),
        endpoint_type: BackendKind::AwsLambdaFunctionUrl,
        cacheable: Some(cacheable),
        requires_challenge_token: None,
        requires_access_token: Some(false),
        path_rules: Vec::new(),
    }
}

fn auth_route(endpoint: &str, challenge: bool) -> RouteEntryConfig {
    let mut path_rules: Vec<PathRuleConfig> = CHALLENGE_PATHS
        .iter()
        .map(|path| PathRuleConfig {
            path: path.to_string(),
            requires_challenge_token: Some(challenge),
            ..Default::default()
        })
        .collect();
    path_rules.push(PathRuleConfig {
        path: "/auth/resend-verification".to_string(),
        requires_access_token: Some(true),
        ..Default::default()
    });

    RouteEntryConfig {
        prefix: "/auth".to_string(),
        service_endpoint: endpoint.to_string(),
        endpoint_type: BackendKind::GcpCloudRunServiceUrl,
        cacheable: None,
        requires_challenge_token: None,
        requires_access_token: Some(false),
        path_rules,
    }
}

/// Route table shipped with the binary, keyed by environment.
pub fn builtin_routes() -> HashMap<String, Vec<RouteEntryConfig>> {
    HashMap::from([
        (
            "local".to_string(),
            vec![
                projects_route(DEV_PROJECTS_ENDPOINT, true),
                auth_route(DEV_AUTH_ENDPOINT, false),
            ],
        ),
        (
            "dev".to_string(),
            vec![
                projects_route(DEV_PROJECTS_ENDPOINT, false),
                auth_route(DEV_AUTH_ENDPOINT, true),
            ],
        ),
        (
            "prod".to_string(),
            vec![
                projects_route(PROD_PROJECTS_ENDPOINT, true),
                auth_route(PROD_AUTH_ENDPOINT, true),
            ],
        ),
    ])
}
