//! Path + environment to backend resolution.
//!
//! Each environment keeps its prefixes in declaration order and the FIRST
//! prefix the path starts with wins, even when a later, longer prefix would
//! also match. `/` only matches the root path itself.
use std::collections::HashMap;

use crate::config::models::{BackendKind, PathRuleConfig, RouteEntryConfig};

pub const DEFAULT_CACHEABLE: bool = false;
pub const DEFAULT_REQUIRES_CHALLENGE_TOKEN: bool = false;
pub const DEFAULT_REQUIRES_ACCESS_TOKEN: bool = true;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("No route found for path: {0}")]
    NotFound(String),

    #[error("Invalid environment: {environment}. Available environments: {available}")]
    InvalidEnvironment {
        environment: String,
        available: String,
    },
}

/// Fully resolved routing decision for one request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub prefix: String,
    pub service_endpoint: String,
    pub kind: BackendKind,
    pub cacheable: bool,
    pub requires_challenge_token: bool,
    pub requires_access_token: bool,
}

#[derive(Debug, Clone, Default)]
struct PolicyFlags {
    cacheable: Option<bool>,
    requires_challenge_token: Option<bool>,
    requires_access_token: Option<bool>,
}

impl From<&PathRuleConfig> for PolicyFlags {
    fn from(rule: &PathRuleConfig) -> Self {
        Self {
            cacheable: rule.cacheable,
            requires_challenge_token: rule.requires_challenge_token,
            requires_access_token: rule.requires_access_token,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    prefix: String,
    service_endpoint: String,
    kind: BackendKind,
    defaults: PolicyFlags,
    overrides: HashMap<String, PolicyFlags>,
}

impl CompiledRoute {
    fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix) && (self.prefix != "/" || path == "/")
    }

    fn describe(&self, path: Option<&str>) -> RouteDescriptor {
        let rule = path.and_then(|p| self.overrides.get(p));
        let pick = |from_rule: Option<bool>, from_prefix: Option<bool>, fallback: bool| {
            from_rule.or(from_prefix).unwrap_or(fallback)
        };

        RouteDescriptor {
            prefix: self.prefix.clone(),
            service_endpoint: self.service_endpoint.clone(),
            kind: self.kind,
            cacheable: pick(
                rule.and_then(|r| r.cacheable),
                self.defaults.cacheable,
                DEFAULT_CACHEABLE,
            ),
            requires_challenge_token: pick(
                rule.and_then(|r| r.requires_challenge_token),
                self.defaults.requires_challenge_token,
                DEFAULT_REQUIRES_CHALLENGE_TOKEN,
            ),
            requires_access_token: pick(
                rule.and_then(|r| r.requires_access_token),
                self.defaults.requires_access_token,
                DEFAULT_REQUIRES_ACCESS_TOKEN,
            ),
        }
    }
}

/// Immutable route table built once at startup.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    environments: HashMap<String, Vec<CompiledRoute>>,
}

impl RouteTable {
    pub fn from_config(config: &HashMap<String, Vec<RouteEntryConfig>>) -> Self {
        let environments = config
            .iter()
            .map(|(environment, entries)| {
                let routes = entries
                    .iter()
                    .map(|entry| CompiledRoute {
                        prefix: entry.prefix.clone(),
                        service_endpoint: entry.service_endpoint.trim_end_matches('/').to_string(),
                        kind: entry.endpoint_type,
                        defaults: PolicyFlags {
                            cacheable: entry.cacheable,
                            requires_challenge_token: entry.requires_challenge_token,
                            requires_access_token: entry.requires_access_token,
                        },
                        overrides: entry
                            .path_rules
                            .iter()
                            .map(|rule| (rule.path.clone(), PolicyFlags::from(rule)))
                            .collect(),
                    })
                    .collect();
                (environment.clone(), routes)
            })
            .collect();

        Self { environments }
    }

    /// Resolve `path` for `environment`, applying any exact-path override.
    pub fn resolve(&self, path: &str, environment: &str) -> Result<RouteDescriptor, RouteError> {
        self.routes(environment)?
            .iter()
            .find(|route| route.matches(path))
            .map(|route| route.describe(Some(path)))
            .ok_or_else(|| RouteError::NotFound(path.to_string()))
    }

    /// Prefix-level descriptors of `environment`, in match order.
    pub fn descriptors(&self, environment: &str) -> Result<Vec<RouteDescriptor>, RouteError> {
        Ok(self
            .routes(environment)?
            .iter()
            .map(|route| route.describe(None))
            .collect())
    }

    /// Prefix-level descriptor for an exact prefix.
    pub fn find_prefix(&self, environment: &str, prefix: &str) -> Option<RouteDescriptor> {
        self.environments
            .get(environment)?
            .iter()
            .find(|route| route.prefix == prefix)
            .map(|route| route.describe(None))
    }

    /// The configured prefix (other than `/`) that `path` equals, ignoring
    /// one trailing `/`.
    pub fn is_exact_prefix(&self, environment: &str, path: &str) -> Option<String> {
        let normalized = match path.strip_suffix('/') {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => path,
        };
        if normalized == "/" {
            return None;
        }
        self.environments
            .get(environment)?
            .iter()
            .find(|route| route.prefix == normalized)
            .map(|route| route.prefix.clone())
    }

    pub fn environments(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.environments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn routes(&self, environment: &str) -> Result<&[CompiledRoute], RouteError> {
        self.environments
            .get(environment)
            .map(Vec::as_slice)
            .ok_or_else(|| RouteError::InvalidEnvironment {
                environment: environment.to_string(),
                available: self.environments().join(", "),
            })
    }
}
