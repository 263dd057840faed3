//! Layered rate limit policy: one global limiter plus per-route limiters.

use std::sync::Arc;
use tracing::{debug, info};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, MonotonicClock};
use super::key::{KeyError, KeyStrategy, RequestContext};
use super::limiter::RateLimiter;
use super::rules::RouteRule;
use super::window::Decision;
use crate::config::RateLimitingConfig;
use crate::error::Result;

/// Scope name of the limiter that applies to every request.
pub const GLOBAL_SCOPE: &str = "global";

/// A limiter together with where it applies and how it keys callers.
struct LimitScope {
    name: String,
    rule: Option<RouteRule>,
    key: KeyStrategy,
    message: String,
    limiter: Arc<dyn RateLimiterBackend>,
}

impl LimitScope {
    fn applies_to(&self, path: &str) -> bool {
        self.rule.as_ref().map_or(true, |rule| rule.matches(path))
    }
}

/// Result of evaluating every applicable limiter for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    /// The rejecting decision, or the tightest admitting one
    pub decision: Decision,
    /// Scope that produced `decision`
    pub scope: String,
    /// Rejection message configured for that scope
    pub message: String,
    /// Clock reading the decision was made at
    pub now: u64,
}

impl PolicyOutcome {
    pub fn admitted(&self) -> bool {
        self.decision.admitted
    }

    pub fn retry_after_ms(&self) -> u64 {
        self.decision.retry_after_ms(self.now)
    }
}

/// The full set of limiters applied to inbound requests.
///
/// Every request passes the global limiter; route limiters apply in
/// addition when their rule matches the request path. Evaluation runs in
/// order and stops at the first rejection, so slots already taken by
/// earlier scopes stay taken.
pub struct RateLimitPolicy {
    global: LimitScope,
    routes: Vec<LimitScope>,
}

impl RateLimitPolicy {
    /// Build a policy from configuration using the monotonic clock.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        Self::with_clock(config, MonotonicClock::new())
    }

    /// Build a policy whose limiters all read `clock`.
    pub fn with_clock<C>(config: &RateLimitingConfig, clock: C) -> Result<Self>
    where
        C: Clock + Clone + 'static,
    {
        let global = RateLimiter::with_clock(config.quota()?, clock.clone())
            .with_max_tracked_keys(config.max_tracked_keys);

        info!(
            quota = %global.quota(),
            key = config.key.name(),
            "Global limiter configured"
        );

        let mut routes = Vec::with_capacity(config.routes.len());
        for rule in &config.routes {
            let limiter = RateLimiter::with_clock(rule.quota()?, clock.clone())
                .with_max_tracked_keys(config.max_tracked_keys);

            info!(
                route = %rule.path,
                scope = %rule.label(),
                quota = %limiter.quota(),
                "Route limiter configured"
            );

            routes.push(LimitScope {
                name: rule.label().to_string(),
                key: rule.key.clone().unwrap_or_else(|| config.key.clone()),
                message: rule.message.clone().unwrap_or_else(|| config.message.clone()),
                rule: Some(rule.clone()),
                limiter: Arc::new(limiter),
            });
        }

        Ok(Self {
            global: LimitScope {
                name: GLOBAL_SCOPE.to_string(),
                rule: None,
                key: config.key.clone(),
                message: config.message.clone(),
                limiter: Arc::new(global),
            },
            routes,
        })
    }

    /// Evaluate a request against every applicable limiter.
    ///
    /// Keys for all applicable scopes are derived before any limiter is
    /// consulted, so a request without a usable key consumes no quota.
    pub fn evaluate(&self, ctx: &RequestContext<'_>) -> std::result::Result<PolicyOutcome, KeyError> {
        let global_key = self.global.key.extract(ctx)?;
        let route_keys = self
            .routes
            .iter()
            .filter(|scope| scope.applies_to(ctx.path))
            .map(|scope| scope.key.extract(ctx).map(|key| (scope, key)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut tightest = Self::check_scope(&self.global, &global_key);
        if !tightest.admitted() {
            return Ok(tightest);
        }

        for (scope, key) in route_keys {
            let outcome = Self::check_scope(scope, &key);
            if !outcome.admitted() {
                return Ok(outcome);
            }
            if outcome.decision.is_tighter_than(&tightest.decision) {
                tightest = outcome;
            }
        }

        Ok(tightest)
    }

    fn check_scope(scope: &LimitScope, key: &str) -> PolicyOutcome {
        let decision = scope.limiter.check(key);
        let outcome = PolicyOutcome {
            decision,
            scope: scope.name.clone(),
            message: scope.message.clone(),
            now: scope.limiter.now(),
        };

        if !decision.admitted {
            debug!(
                scope = %scope.name,
                key = %key,
                retry_after_ms = outcome.retry_after_ms(),
                "Request rejected"
            );
        }
        outcome
    }

    fn scopes(&self) -> impl Iterator<Item = &LimitScope> {
        std::iter::once(&self.global).chain(self.routes.iter())
    }

    /// Sweep idle keys from every limiter. Returns the total removed.
    pub fn sweep(&self) -> usize {
        self.scopes().map(|scope| scope.limiter.sweep()).sum()
    }

    /// Forget every key in every limiter.
    pub fn reset(&self) {
        for scope in self.scopes() {
            scope.limiter.reset();
        }
    }

    /// Keys tracked across all limiters.
    pub fn tracked_keys(&self) -> usize {
        self.scopes().map(|scope| scope.limiter.tracked_keys()).sum()
    }

    /// Names of all scopes, global first.
    pub fn scope_names(&self) -> Vec<&str> {
        self.scopes().map(|scope| scope.name.as_str()).collect()
    }
}
