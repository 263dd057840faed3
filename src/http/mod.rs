//! HTTP dispatch layer.
//!
//! Derives caller keys from inbound requests, consults the
//! [`RateLimitPolicy`](crate::ratelimit::RateLimitPolicy) and either rejects
//! with `429 Too Many Requests` or forwards to the handler, decorating the
//! response with rate limit headers.

mod middleware;
mod routes;
mod server;

use std::sync::Arc;

use crate::ratelimit::RateLimitPolicy;

pub use middleware::{
    rate_limit, RATELIMIT_LIMIT, RATELIMIT_REMAINING, RATELIMIT_RESET,
};
pub use routes::router;
pub use server::HttpServer;

/// Shared state handed to every handler.
pub struct AppState {
    pub policy: Arc<RateLimitPolicy>,
}

impl AppState {
    pub fn new(policy: Arc<RateLimitPolicy>) -> Self {
        Self { policy }
    }
}
