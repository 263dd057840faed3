//! Per-key sliding window log.

use std::collections::VecDeque;

use super::quota::Quota;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request was admitted
    pub admitted: bool,
    /// The quota's request budget
    pub limit: u64,
    /// Slots left in the current window after this decision
    pub remaining: u64,
    /// Earliest time (ms) at which a slot frees up, or the check time when
    /// the window is empty
    pub reset_at: u64,
}

impl Decision {
    /// Milliseconds from `now` until `reset_at`.
    pub fn retry_after_ms(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now)
    }

    /// Whether `self` leaves the caller with less headroom than `other`.
    pub fn is_tighter_than(&self, other: &Decision) -> bool {
        (self.remaining, std::cmp::Reverse(self.reset_at))
            < (other.remaining, std::cmp::Reverse(other.reset_at))
    }
}

/// Timestamps of admitted requests for a single key, oldest first.
///
/// Every retained timestamp lies in the half-open interval
/// `(now - window, now]` after a call to [`WindowLog::prune`].
#[derive(Debug, Clone, Default)]
pub struct WindowLog {
    hits: VecDeque<u64>,
}

impl WindowLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject a request arriving at `now`.
    ///
    /// `now` is clamped to the newest retained timestamp so a clock that
    /// moves backwards cannot expire entries early. Rejected requests are
    /// not recorded.
    pub fn try_admit(&mut self, now: u64, quota: &Quota) -> Decision {
        let now = self.clamp(now);
        self.prune(now, quota.window_ms());

        let admitted = (self.hits.len() as u64) < quota.max_requests();
        if admitted {
            self.hits.push_back(now);
        }

        Decision {
            admitted,
            limit: quota.max_requests(),
            remaining: quota.max_requests().saturating_sub(self.hits.len() as u64),
            reset_at: self.reset_at(now, quota.window_ms()),
        }
    }

    /// Report what a request at `now` would see, without recording it.
    pub fn peek(&self, now: u64, quota: &Quota) -> Decision {
        let now = self.clamp(now);
        let window_ms = quota.window_ms();
        let mut live = self.hits.iter().filter(|&&hit| now - hit < window_ms);

        let oldest = live.next().copied();
        let count = oldest.map_or(0, |_| 1 + live.count() as u64);

        Decision {
            admitted: count < quota.max_requests(),
            limit: quota.max_requests(),
            remaining: quota.max_requests().saturating_sub(count),
            reset_at: oldest.map_or(now, |hit| hit.saturating_add(window_ms)),
        }
    }

    /// Drop every entry with `now - entry >= window_ms`.
    pub fn prune(&mut self, now: u64, window_ms: u64) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_sub(oldest) >= window_ms {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Timestamp of the most recent admission, if any.
    pub fn newest(&self) -> Option<u64> {
        self.hits.back().copied()
    }

    /// Number of retained timestamps.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    fn clamp(&self, now: u64) -> u64 {
        self.newest().map_or(now, |newest| now.max(newest))
    }

    fn reset_at(&self, now: u64, window_ms: u64) -> u64 {
        self.hits
            .front()
            .map_or(now, |&oldest| oldest.saturating_add(window_ms))
    }
}
