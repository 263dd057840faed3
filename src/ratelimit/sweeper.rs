//! Background reclamation of idle keys.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::policy::RateLimitPolicy;

/// Handle to the periodic sweep task.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a task sweeping `policy` every `interval` on the current runtime.
    pub fn spawn(policy: Arc<RateLimitPolicy>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing to sweep yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = policy.sweep();
                        debug!(
                            removed = removed,
                            tracked_keys = policy.tracked_keys(),
                            "Sweep complete"
                        );
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "Key sweeper started");
        Self { shutdown_tx, handle }
    }

    /// Stop the sweep task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
        info!("Key sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::key::RequestContext;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_sweeper_reclaims_idle_keys() {
        let clock = ManualClock::new(0);
        let config = RateLimitingConfig {
            window_ms: 1000,
            max_requests: 5,
            ..Default::default()
        };
        let policy = Arc::new(RateLimitPolicy::with_clock(&config, clock.clone()).unwrap());

        let headers: HashMap<String, String> = HashMap::new();
        let peer = Some("192.0.2.1".parse().unwrap());
        policy
            .evaluate(&RequestContext::new("/", peer, &headers))
            .unwrap();
        assert_eq!(policy.tracked_keys(), 1);

        let sweeper = Sweeper::spawn(policy.clone(), Duration::from_millis(10));
        clock.advance(1000);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(policy.tracked_keys(), 0);
        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_shutdown_is_prompt() {
        let policy = Arc::new(RateLimitPolicy::from_config(&RateLimitingConfig::default()).unwrap());
        let sweeper = Sweeper::spawn(policy, Duration::from_secs(3600));

        tokio::time::timeout(Duration::from_secs(1), sweeper.shutdown())
            .await
            .expect("sweeper did not stop");
    }
}
