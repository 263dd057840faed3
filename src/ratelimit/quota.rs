//! Quota definitions.

use std::fmt;

use crate::error::{Result, SlidegateError};

/// An immutable request budget: at most `max_requests` admissions per key
/// within any trailing window of `window_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quota {
    window_ms: u64,
    max_requests: u64,
}

impl Quota {
    /// Create a quota, rejecting zero values.
    pub fn new(window_ms: u64, max_requests: u64) -> Result<Self> {
        if window_ms == 0 {
            return Err(SlidegateError::InvalidQuota(
                "window_ms must be positive".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(SlidegateError::InvalidQuota(
                "max_requests must be positive".to_string(),
            ));
        }
        Ok(Self {
            window_ms,
            max_requests,
        })
    }

    /// Length of the rolling window in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Maximum admitted requests per key per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} req / {}ms", self.max_requests, self.window_ms)
    }
}
