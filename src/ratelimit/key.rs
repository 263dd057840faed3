//! Caller key derivation.
//!
//! A [`KeyStrategy`] maps the parts of an inbound request to the opaque
//! string the limiter buckets on. Keys carry a strategy prefix
//! (`ip:`, `api_key:`, `user:`) so they read clearly in logs.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header carrying the caller's API key by default.
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the authenticated user id by default.
pub const DEFAULT_USER_HEADER: &str = "x-user-id";

/// Errors raised when no key can be derived for a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("missing required header `{0}`")]
    MissingHeader(String),
    #[error("client address could not be determined")]
    UnknownClient,
}

/// Read-only header access, so key extraction does not depend on any
/// particular HTTP framework.
pub trait HeaderLookup {
    /// Value of the header `name` (lowercase), if present and valid text.
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderLookup for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// The request attributes key strategies may look at.
pub struct RequestContext<'a> {
    /// Request path, used for route matching
    pub path: &'a str,
    /// Socket peer address, when known
    pub peer: Option<IpAddr>,
    /// Request headers
    pub headers: &'a dyn HeaderLookup,
}

impl<'a> RequestContext<'a> {
    pub fn new(path: &'a str, peer: Option<IpAddr>, headers: &'a dyn HeaderLookup) -> Self {
        Self {
            path,
            peer,
            headers,
        }
    }

    /// Non-empty, trimmed value of a header.
    fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .header(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// How a caller key is derived from a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Client IP: first `x-forwarded-for` hop, then `cf-connecting-ip`,
    /// then the socket peer
    Ip,
    /// API key header, with an optional shared bucket for callers that
    /// send none
    ApiKey {
        #[serde(default = "default_api_key_header")]
        header: String,
        #[serde(default)]
        fallback: Option<String>,
    },
    /// Authenticated user id placed in a header by an upstream auth layer
    User {
        #[serde(default = "default_user_header")]
        header: String,
    },
    /// One bucket shared by every caller
    Global,
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

fn default_user_header() -> String {
    DEFAULT_USER_HEADER.to_string()
}

impl Default for KeyStrategy {
    fn default() -> Self {
        KeyStrategy::Ip
    }
}

impl KeyStrategy {
    /// API key strategy reading the default header with no fallback.
    pub fn api_key() -> Self {
        KeyStrategy::ApiKey {
            header: default_api_key_header(),
            fallback: None,
        }
    }

    /// User strategy reading the default header.
    pub fn user() -> Self {
        KeyStrategy::User {
            header: default_user_header(),
        }
    }

    /// Short name used in logs and response bodies.
    pub fn name(&self) -> &'static str {
        match self {
            KeyStrategy::Ip => "ip",
            KeyStrategy::ApiKey { .. } => "api_key",
            KeyStrategy::User { .. } => "user",
            KeyStrategy::Global => "global",
        }
    }

    /// Derive the limiter key for a request.
    pub fn extract(&self, ctx: &RequestContext<'_>) -> Result<String, KeyError> {
        match self {
            KeyStrategy::Ip => {
                let forwarded = ctx
                    .header("x-forwarded-for")
                    .and_then(|value| value.split(',').next())
                    .map(str::trim)
                    .filter(|hop| !hop.is_empty());

                if let Some(addr) = forwarded.or_else(|| ctx.header("cf-connecting-ip")) {
                    return Ok(format!("ip:{}", addr));
                }

                ctx.peer
                    .map(|peer| format!("ip:{}", peer))
                    .ok_or(KeyError::UnknownClient)
            }
            KeyStrategy::ApiKey { header, fallback } => match ctx.header(header) {
                Some(key) => Ok(format!("api_key:{}", key)),
                None => fallback
                    .as_ref()
                    .map(|bucket| format!("api_key:{}", bucket))
                    .ok_or_else(|| KeyError::MissingHeader(header.clone())),
            },
            KeyStrategy::User { header } => ctx
                .header(header)
                .map(|user| format!("user:{}", user))
                .ok_or_else(|| KeyError::MissingHeader(header.clone())),
            KeyStrategy::Global => Ok("global".to_string()),
        }
    }
}
