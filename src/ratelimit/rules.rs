//! Per-route rate limit rules and matching.
//!
//! Routes can carry their own quota and key strategy on top of the global
//! limit. A rule's `path` is either an exact path (`/api/data`) or a prefix
//! pattern ending in `/*` (`/api/*`, which matches `/api` and everything
//! below it).

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::key::KeyStrategy;
use super::quota::Quota;
use crate::error::{Result, SlidegateError};

/// A set of route rules, loadable on its own from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRules {
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// A quota override for the routes matching `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Exact path or `/prefix/*` pattern
    pub path: String,
    /// Length of the rolling window in milliseconds
    pub window_ms: u64,
    /// Maximum admitted requests per key per window
    pub max_requests: u64,
    /// Key strategy for this route; the global strategy when unset
    #[serde(default)]
    pub key: Option<KeyStrategy>,
    /// Optional name for logs and responses
    #[serde(default)]
    pub name: Option<String>,
    /// Rejection message for this route; the global message when unset
    #[serde(default)]
    pub message: Option<String>,
}

impl RouteRule {
    /// Whether this rule applies to a request path.
    pub fn matches(&self, path: &str) -> bool {
        match self.path.strip_suffix("/*") {
            Some(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            None => self.path == path,
        }
    }

    /// The validated quota for this rule.
    pub fn quota(&self) -> Result<Quota> {
        Quota::new(self.window_ms, self.max_requests).map_err(|e| {
            SlidegateError::Config(format!("route `{}`: {}", self.path, e))
        })
    }

    /// Name used in logs: the configured name, or the path.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.path)
    }
}

impl RouteRules {
    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SlidegateError::Config(format!("Failed to parse route rules: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(path: &str) -> RouteRule {
        RouteRule {
            path: path.to_string(),
            window_ms: 60_000,
            max_requests: 2000,
            key: None,
            name: None,
            message: None,
        }
    }

    #[test]
    fn test_exact_match() {
        let rule = rule("/api/data");
        assert!(rule.matches("/api/data"));
        assert!(!rule.matches("/api/data/1"));
        assert!(!rule.matches("/api"));
    }

    #[test]
    fn test_prefix_match() {
        let rule = rule("/api/*");
        assert!(rule.matches("/api"));
        assert!(rule.matches("/api/data"));
        assert!(rule.matches("/api/user-data/7"));
        assert!(!rule.matches("/apiary"));
        assert!(!rule.matches("/"));
    }

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
routes:
  - path: /api/data
    window_ms: 60000
    max_requests: 2000
  - path: /api/user-data
    window_ms: 60000
    max_requests: 10000
    name: per-user
    message: Too many requests from this API key.
    key:
      strategy: api_key
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.routes.len(), 2);
        assert_eq!(rules.routes[0].key, None);
        assert_eq!(rules.routes[0].label(), "/api/data");
        assert_eq!(rules.routes[1].key, Some(KeyStrategy::api_key()));
        assert_eq!(rules.routes[1].label(), "per-user");
        assert_eq!(rules.routes[0].message, None);
        assert_eq!(
            rules.routes[1].message.as_deref(),
            Some("Too many requests from this API key.")
        );
    }

    #[test]
    fn test_invalid_quota_names_route() {
        let mut bad = rule("/api/data");
        bad.max_requests = 0;

        let err = bad.quota().unwrap_err();
        assert!(err.to_string().contains("/api/data"));
    }

    #[test]
    fn test_parse_error() {
        let result = RouteRules::from_yaml("routes: [ { path: 3 ");
        assert!(matches!(result, Err(SlidegateError::Config(_))));
    }
}
