//! Background liveness watchdog
//!
//! Probes the latest block on a fixed interval and forces a rotation once the
//! consecutive-failure threshold is reached.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;
use crate::providers::resilient::{ProbeOutcome, ResilientClient};

/// Watchdog for one resilient client
pub struct Watchdog {
    client: Arc<ResilientClient>,
    config: WatchdogConfig,
}

impl Watchdog {
    pub fn new(client: Arc<ResilientClient>, config: WatchdogConfig) -> Self {
        Self { client, config }
    }

    /// Run one probe
    pub async fn tick(&self) -> ProbeOutcome {
        let outcome = self.client.probe(self.config.failure_threshold).await;

        match &outcome {
            ProbeOutcome::Healthy { block } => {
                debug!(role = %self.client.role(), block = block, "Watchdog probe healthy");
            }
            ProbeOutcome::Failed { consecutive } => {
                warn!(
                    role = %self.client.role(),
                    consecutive_failures = consecutive,
                    threshold = self.config.failure_threshold,
                    "Watchdog probe failed"
                );
            }
            ProbeOutcome::Rotated { endpoint } => {
                info!(role = %self.client.role(), endpoint = endpoint, "Watchdog forced rotation");
            }
            ProbeOutcome::Superseded => {
                debug!(role = %self.client.role(), "Watchdog probe overtaken by a rotation");
            }
        }

        outcome
    }

    /// Spawn the probe loop until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the client was just connected
            interval.tick().await;

            info!(
                role = %self.client.role(),
                interval_ms = self.config.interval_ms,
                threshold = self.config.failure_threshold,
                "Watchdog started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.tick().await;
                    }
                }
            }

            debug!(role = %self.client.role(), "Watchdog stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockConnector;
    use crate::PoolRole;
    use std::time::Duration;

    #[tokio::test]
    async fn test_watchdog_loop_rotates_unhealthy_endpoint() {
        let connector = MockConnector::new();
        let urls = vec!["ws://a.local".to_string(), "ws://b.local".to_string()];
        let client = Arc::new(
            ResilientClient::connect(PoolRole::Read, &urls, Arc::new(connector.clone()), Duration::from_millis(100))
                .await
                .unwrap(),
        );
        connector.endpoint("ws://a.local").set_healthy(false);

        let cancel = CancellationToken::new();
        let handle = Watchdog::new(
            client.clone(),
            WatchdogConfig {
                interval_ms: 10,
                failure_threshold: 2,
            },
        )
        .spawn(cancel.clone());

        let mut rotated = false;
        for _ in 0..100 {
            if client.active_endpoint().await == "ws://b.local" {
                rotated = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        cancel.cancel();
        handle.await.unwrap();
        assert!(rotated);
    }
}
