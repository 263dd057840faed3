//! Configuration management for Slidegate.
//!
//! Configuration is read from a YAML file layered with `SLIDEGATE__`
//! environment variables (`SLIDEGATE__RATE_LIMITING__MAX_REQUESTS=50`).
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SlidegateError};
use crate::ratelimit::{KeyStrategy, Quota, RouteRule, RouteRules, DEFAULT_MAX_TRACKED_KEYS};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SLIDEGATE";

/// Main configuration for the Slidegate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlidegateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of the global rolling window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Global quota per key per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// How the global limiter derives caller keys
    #[serde(default)]
    pub key: KeyStrategy,

    /// Cap on distinct keys tracked by each limiter
    #[serde(default = "default_max_tracked_keys")]
    pub max_tracked_keys: usize,

    /// Interval between background sweeps of idle keys
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Response body message for rejected requests
    #[serde(default = "default_message")]
    pub message: String,

    /// Per-route overrides
    #[serde(default)]
    pub routes: Vec<RouteRule>,

    /// Optional YAML file with additional route rules
    #[serde(default)]
    pub routes_path: Option<PathBuf>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            key: KeyStrategy::default(),
            max_tracked_keys: default_max_tracked_keys(),
            sweep_interval_ms: default_sweep_interval_ms(),
            message: default_message(),
            routes: Vec::new(),
            routes_path: None,
        }
    }
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u64 {
    100
}

fn default_max_tracked_keys() -> usize {
    DEFAULT_MAX_TRACKED_KEYS
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_message() -> String {
    "Too many requests, please try again later.".to_string()
}

impl RateLimitingConfig {
    /// The validated global quota.
    pub fn quota(&self) -> Result<Quota> {
        Quota::new(self.window_ms, self.max_requests)
    }

    /// Interval between background sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Append the rules from `routes_path`, if set, to the inline routes.
    pub fn load_routes_file(&mut self) -> Result<()> {
        if let Some(path) = self.routes_path.take() {
            let rules = RouteRules::from_file(&path)?;
            info!(
                path = %path.display(),
                routes = rules.routes.len(),
                "Route rules loaded"
            );
            self.routes.extend(rules.routes);
        }
        Ok(())
    }

    /// Check every quota and limit up front.
    pub fn validate(&self) -> Result<()> {
        self.quota()?;
        for rule in &self.routes {
            rule.quota()?;
        }
        if self.max_tracked_keys == 0 {
            return Err(SlidegateError::Config(
                "max_tracked_keys must be positive".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(SlidegateError::Config(
                "sweep_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings given on the command line, applied over the loaded file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub http_addr: Option<SocketAddr>,
    pub window_ms: Option<u64>,
    pub max_requests: Option<u64>,
}

impl SlidegateConfig {
    /// Load configuration from a YAML file, with environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let mut config: SlidegateConfig = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| SlidegateError::Config(e.to_string()))?;

        config.rate_limiting.load_routes_file()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SlidegateError::Config(e.to_string()))
    }

    /// Replace the fields set in `overrides`.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(http_addr) = overrides.http_addr {
            self.server.http_addr = http_addr;
        }
        if let Some(window_ms) = overrides.window_ms {
            self.rate_limiting.window_ms = window_ms;
        }
        if let Some(max_requests) = overrides.max_requests {
            self.rate_limiting.max_requests = max_requests;
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()
    }
}
