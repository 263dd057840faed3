//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::routes::router;
use super::AppState;
use crate::error::{Result, SlidegateError};

/// HTTP server fronting the rate limit policy.
pub struct HttpServer {
    /// Bound listener
    listener: TcpListener,
    /// Shared application state
    state: Arc<AppState>,
}

impl HttpServer {
    /// Bind the listen address. Port 0 picks a free port; see
    /// [`HttpServer::local_addr`].
    pub async fn bind(addr: SocketAddr, state: Arc<AppState>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    /// The address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Starting HTTP server with graceful shutdown");

        let app = router(self.state);
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            SlidegateError::Server(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use crate::http::{RATELIMIT_LIMIT, RATELIMIT_REMAINING, RATELIMIT_RESET};
    use crate::ratelimit::{ManualClock, RateLimitPolicy};
    use reqwest::StatusCode;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct TestServer {
        base: String,
        clock: ManualClock,
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<Result<()>>,
    }

    impl TestServer {
        async fn start(yaml: &str) -> Self {
            let config: RateLimitingConfig = serde_yaml::from_str(yaml).unwrap();
            let clock = ManualClock::new(0);
            let policy = RateLimitPolicy::with_clock(&config, clock.clone()).unwrap();
            let state = Arc::new(AppState::new(Arc::new(policy)));

            let server = HttpServer::bind("127.0.0.1:0".parse().unwrap(), state)
                .await
                .unwrap();
            let addr = server.local_addr().unwrap();

            let (shutdown, rx) = oneshot::channel::<()>();
            let handle = tokio::spawn(server.serve_with_shutdown(async {
                let _ = rx.await;
            }));

            Self {
                base: format!("http://{}", addr),
                clock,
                shutdown,
                handle,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn stop(self) {
            let _ = self.shutdown.send(());
            self.handle.await.unwrap().unwrap();
        }
    }

    fn header(response: &reqwest::Response, name: &axum::http::HeaderName) -> String {
        response.headers()[name.as_str()].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_admitted_requests_carry_headers() {
        let server = TestServer::start("window_ms: 60000\nmax_requests: 3").await;
        let client = reqwest::Client::new();

        let response = client.get(server.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, &RATELIMIT_LIMIT), "3");
        assert_eq!(header(&response, &RATELIMIT_REMAINING), "2");
        assert_eq!(header(&response, &RATELIMIT_RESET), "60");
        assert_eq!(response.text().await.unwrap(), "Hello from Slidegate!");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_rejects_with_429_until_window_rolls() {
        let server = TestServer::start("window_ms: 1000\nmax_requests: 2").await;
        let client = reqwest::Client::new();

        for _ in 0..2 {
            let response = client.get(server.url("/api/data")).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        server.clock.advance(300);
        let response = client.get(server.url("/api/data")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&response, &RATELIMIT_REMAINING), "0");
        assert_eq!(response.headers()["retry-after"], "1");

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Too many requests, please try again later.");
        assert_eq!(body["scope"], "global");
        assert_eq!(body["retry_after_ms"], 700);

        server.clock.advance(700);
        let response = client.get(server.url("/api/data")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_forwarded_clients_are_isolated() {
        let server = TestServer::start("window_ms: 60000\nmax_requests: 1").await;
        let client = reqwest::Client::new();

        let first = client
            .get(server.url("/"))
            .header("x-forwarded-for", "203.0.113.1")
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let repeat = client
            .get(server.url("/"))
            .header("x-forwarded-for", "203.0.113.1")
            .send()
            .await
            .unwrap();
        assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = client
            .get(server.url("/"))
            .header("x-forwarded-for", "203.0.113.2")
            .send()
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_missing_api_key_is_bad_request() {
        let server = TestServer::start(
            r#"
max_requests: 100
routes:
  - path: /api/user-data
    window_ms: 60000
    max_requests: 1
    key:
      strategy: api_key
"#,
        )
        .await;
        let client = reqwest::Client::new();

        let response = client.get(server.url("/api/user-data")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "missing required header `x-api-key`");

        let response = client
            .get(server.url("/api/user-data"))
            .header("x-api-key", "ak_1")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, &RATELIMIT_LIMIT), "1");

        let response = client
            .get(server.url("/api/user-data"))
            .header("x-api-key", "ak_1")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_route_rejection_uses_configured_message() {
        let server = TestServer::start(
            r#"
max_requests: 100
routes:
  - path: /api/data
    window_ms: 60000
    max_requests: 1
    message: Data quota exhausted.
"#,
        )
        .await;
        let client = reqwest::Client::new();

        let response = client.get(server.url("/api/data")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = client.get(server.url("/api/data")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Data quota exhausted.");
        assert_eq!(body["scope"], "/api/data");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_health_reports_state() {
        let server = TestServer::start("max_requests: 10").await;
        let client = reqwest::Client::new();

        let response = client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tracked_keys"], 1);
        assert_eq!(body["scopes"][0], "global");

        server.stop().await;
    }
}
