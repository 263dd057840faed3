use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slidegate::config::{ConfigOverrides, SlidegateConfig};
use slidegate::http::{AppState, HttpServer};
use slidegate::ratelimit::{RateLimitPolicy, Sweeper};

/// Sliding-window rate limiting gateway.
#[derive(Parser, Debug)]
#[command(name = "slidegate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides the configuration file)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Global window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Global quota per key per window
    #[arg(long)]
    max_requests: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting Slidegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => SlidegateConfig::from_file(path)?,
        None => SlidegateConfig::default(),
    };
    config.apply_overrides(&ConfigOverrides {
        http_addr: args.listen,
        window_ms: args.window_ms,
        max_requests: args.max_requests,
    });
    config.validate()?;
    info!(
        http_addr = %config.server.http_addr,
        window_ms = config.rate_limiting.window_ms,
        max_requests = config.rate_limiting.max_requests,
        routes = config.rate_limiting.routes.len(),
        "Configuration loaded"
    );

    let policy = Arc::new(RateLimitPolicy::from_config(&config.rate_limiting)?);
    info!("Rate limit policy initialized");

    let sweeper = Sweeper::spawn(policy.clone(), config.rate_limiting.sweep_interval());

    let server = HttpServer::bind(config.server.http_addr, Arc::new(AppState::new(policy))).await?;
    info!("Listening on {}", server.local_addr()?);

    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.shutdown().await;
    info!("Slidegate stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve once SIGINT (Ctrl+C) or SIGTERM arrives. A signal whose handler
/// cannot be installed never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal = received, "Shutdown requested, draining connections");
}
