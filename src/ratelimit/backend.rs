//! Rate limiter trait for abstracting over limiter implementations.

use super::quota::Quota;
use super::window::Decision;

/// Trait for rate limiter implementations.
///
/// The policy and the HTTP layer only talk to limiters through this trait,
/// so each limiter carries its own clock and no generic parameter leaks into
/// the request path.
pub trait RateLimiterBackend: Send + Sync {
    /// Admit or reject a request for `key` at the backend's current time.
    fn check(&self, key: &str) -> Decision;

    /// The backend's current time in milliseconds.
    fn now(&self) -> u64;

    /// The quota applied to every key.
    fn quota(&self) -> Quota;

    /// Drop keys with no in-window entries. Returns how many were removed.
    fn sweep(&self) -> usize;

    /// Forget all keys.
    fn reset(&self);

    /// Number of keys currently tracked.
    fn tracked_keys(&self) -> usize;
}
