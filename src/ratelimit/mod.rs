//! Rate limiting logic and state management.

mod backend;
mod clock;
mod key;
mod limiter;
mod policy;
mod quota;
mod rules;
mod sweeper;
mod window;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use key::{HeaderLookup, KeyError, KeyStrategy, RequestContext};
pub use limiter::{RateLimiter, DEFAULT_MAX_TRACKED_KEYS};
pub use policy::{PolicyOutcome, RateLimitPolicy, GLOBAL_SCOPE};
pub use quota::Quota;
pub use rules::{RouteRule, RouteRules};
pub use sweeper::Sweeper;
pub use window::{Decision, WindowLog};
