//! Rate limiting middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{instrument, warn};

use super::AppState;
use crate::ratelimit::{HeaderLookup, PolicyOutcome, RequestContext};

/// Quota of the scope reported in the response.
pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Slots left in that scope's window.
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Seconds until a slot frees up.
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

impl HeaderLookup for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Admit or reject a request according to the shared policy.
#[instrument(
    skip_all,
    fields(method = %request.method(), path = %request.uri().path())
)]
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let evaluated = {
        let ctx = RequestContext::new(request.uri().path(), peer, request.headers());
        state.policy.evaluate(&ctx)
    };

    let outcome = match evaluated {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, "Could not derive rate limit key");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response();
        }
    };

    if !outcome.admitted() {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": outcome.message,
                "scope": outcome.scope,
                "retry_after_ms": outcome.retry_after_ms(),
            })),
        )
            .into_response();

        let headers = response.headers_mut();
        apply_rate_limit_headers(headers, &outcome);
        headers.insert(RETRY_AFTER, HeaderValue::from(reset_secs(&outcome)));
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &outcome);
    response
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, outcome: &PolicyOutcome) {
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(outcome.decision.limit));
    headers.insert(
        RATELIMIT_REMAINING,
        HeaderValue::from(outcome.decision.remaining),
    );
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_secs(outcome)));
}

/// Whole seconds until reset, rounded up so clients never retry early.
fn reset_secs(outcome: &PolicyOutcome) -> u64 {
    outcome.retry_after_ms().div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::Decision;

    fn outcome(reset_at: u64, now: u64) -> PolicyOutcome {
        PolicyOutcome {
            decision: Decision {
                admitted: false,
                limit: 3,
                remaining: 0,
                reset_at,
            },
            scope: "global".to_string(),
            message: "Too many requests, please try again later.".to_string(),
            now,
        }
    }

    #[test]
    fn test_reset_secs_rounds_up() {
        assert_eq!(reset_secs(&outcome(1000, 0)), 1);
        assert_eq!(reset_secs(&outcome(1001, 0)), 2);
        assert_eq!(reset_secs(&outcome(500, 499)), 1);
        assert_eq!(reset_secs(&outcome(500, 500)), 0);
    }

    #[test]
    fn test_headers_applied() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&mut headers, &outcome(2500, 0));

        assert_eq!(headers[&RATELIMIT_LIMIT], "3");
        assert_eq!(headers[&RATELIMIT_REMAINING], "0");
        assert_eq!(headers[&RATELIMIT_RESET], "3");
    }

    #[test]
    fn test_header_lookup_on_header_map() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("ak_1"));

        assert_eq!(HeaderLookup::header(&headers, "x-api-key"), Some("ak_1"));
        assert_eq!(HeaderLookup::header(&headers, "x-user-id"), None);
    }
}
