//! Core rate limiter implementation.

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, MonotonicClock};
use super::quota::Quota;
use super::window::{Decision, WindowLog};

/// Default cap on the number of distinct keys tracked at once.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 100_000;

/// Sliding-window-log rate limiter with per-key isolation.
///
/// Each key owns a [`WindowLog`] stored in a sharded map. The whole
/// read-decide-write sequence of [`RateLimiter::check`] runs while holding
/// that key's shard lock, so concurrent requests for the same key are
/// serialized and never over-admit.
pub struct RateLimiter<C: Clock = MonotonicClock> {
    /// Quota shared by every key
    quota: Quota,
    /// Window logs indexed by caller key
    windows: DashMap<String, WindowLog>,
    /// Upper bound on tracked keys before eviction kicks in
    max_tracked_keys: usize,
    clock: C,
}

impl RateLimiter<MonotonicClock> {
    /// Create a rate limiter backed by the monotonic clock.
    pub fn new(quota: Quota) -> Self {
        Self::with_clock(quota, MonotonicClock::new())
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(quota: Quota, clock: C) -> Self {
        Self {
            quota,
            windows: DashMap::new(),
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            clock,
        }
    }

    /// Set the tracked-key cap. A cap of zero is raised to one.
    pub fn with_max_tracked_keys(mut self, max_tracked_keys: usize) -> Self {
        self.max_tracked_keys = max_tracked_keys.max(1);
        self
    }

    /// The quota applied to every key.
    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    /// Current reading of the limiter's clock.
    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Admit or reject a request for `key` arriving at `now` (ms).
    ///
    /// An empty key is a valid key: every caller presenting one shares a
    /// single bucket.
    pub fn check(&self, key: &str, now: u64) -> Decision {
        let decision = match self.windows.get_mut(key) {
            Some(mut window) => window.try_admit(now, &self.quota),
            None => {
                self.ensure_capacity(now);
                self.windows
                    .entry(key.to_owned())
                    .or_default()
                    .try_admit(now, &self.quota)
            }
        };

        if decision.admitted {
            trace!(
                key = %key,
                remaining = decision.remaining,
                reset_at = decision.reset_at,
                "Request admitted"
            );
        } else {
            debug!(
                key = %key,
                limit = decision.limit,
                reset_at = decision.reset_at,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// [`RateLimiter::check`] at the limiter's own clock reading.
    pub fn check_now(&self, key: &str) -> Decision {
        self.check(key, self.now())
    }

    /// Report the decision metadata `key` would see at `now` without
    /// recording a request.
    pub fn peek(&self, key: &str, now: u64) -> Decision {
        match self.windows.get(key) {
            Some(window) => window.peek(now, &self.quota),
            None => WindowLog::new().peek(now, &self.quota),
        }
    }

    /// Drop every key with no entries inside the window ending at `now`.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self, now: u64) -> usize {
        let window_ms = self.quota.window_ms();
        let mut removed = 0;

        self.windows.retain(|_, window| {
            window.prune(now, window_ms);
            let keep = !window.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed = removed, remaining = self.windows.len(), "Swept idle keys");
        }
        removed
    }

    /// Forget every key.
    pub fn reset(&self) {
        self.windows.clear();
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Make room for new keys when the map is at its cap.
    ///
    /// Idle keys are swept first. If the map is still above the low-water
    /// mark, the least recently active keys are evicted in one batch down to
    /// it, so the following inserts find headroom without scanning the map.
    /// Concurrent inserts may briefly overshoot the cap by the number of
    /// racing callers.
    fn ensure_capacity(&self, now: u64) {
        if self.windows.len() < self.max_tracked_keys {
            return;
        }

        self.sweep(now);

        let excess = self.windows.len().saturating_sub(self.low_water_mark());
        if excess == 0 {
            return;
        }

        let mut by_recency: Vec<(u64, String)> = self
            .windows
            .iter()
            .map(|entry| (entry.value().newest().unwrap_or(0), entry.key().clone()))
            .collect();
        if excess < by_recency.len() {
            by_recency.select_nth_unstable(excess);
            by_recency.truncate(excess);
        }

        for (_, key) in &by_recency {
            self.windows.remove(key);
        }

        warn!(
            evicted = by_recency.len(),
            max_tracked_keys = self.max_tracked_keys,
            "Tracked key cap reached, evicted least recently active keys"
        );
    }

    /// Key count eviction reclaims down to: a tenth below the cap, and at
    /// least one slot.
    fn low_water_mark(&self) -> usize {
        self.max_tracked_keys - (self.max_tracked_keys / 10).max(1)
    }
}

impl<C: Clock> RateLimiterBackend for RateLimiter<C> {
    fn check(&self, key: &str) -> Decision {
        self.check_now(key)
    }

    fn now(&self) -> u64 {
        RateLimiter::now(self)
    }

    fn quota(&self) -> Quota {
        self.quota
    }

    fn sweep(&self) -> usize {
        RateLimiter::sweep(self, self.now())
    }

    fn reset(&self) {
        RateLimiter::reset(self)
    }

    fn tracked_keys(&self) -> usize {
        RateLimiter::tracked_keys(self)
    }
}
