//! Runtime: bootstrap, then the event loop
//!
//! Bootstrap connects the chain client, scans every exchange, and runs one
//! full detection pass. The event loop then dispatches swap notifications
//! and periodic rescans on one task; watchdogs and retention pruning run on
//! their own tasks until the cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use qenus_pool_dataplane::prices::TokenPriceSource;
use qenus_pool_dataplane::providers::{ChainClient, EndpointConnector, Watchdog};
use qenus_pool_dataplane::scanner::{BootstrapScanner, ScanReport};
use qenus_pool_dataplane::{PoolRegistry, SharedRegistry};

use crate::book::OpportunityBook;
use crate::config::ArbConfig;
use crate::detectors::DetectorManager;
use crate::driver::EventRecomputeDriver;
use crate::error::Result;
use crate::sink::SinkSet;
use crate::types::OpportunityRecord;

/// State produced by [`Runtime::bootstrap`]
pub struct Bootstrapped {
    pub client: ChainClient,
    pub registry: SharedRegistry,
    pub scanner: BootstrapScanner,
    pub manager: Arc<DetectorManager>,
    pub report: ScanReport,
    pub initial: Vec<OpportunityRecord>,
}

pub struct Runtime {
    config: ArbConfig,
    connector: Arc<dyn EndpointConnector>,
    prices: Arc<dyn TokenPriceSource>,
    sinks: SinkSet,
    book: Arc<OpportunityBook>,
}

impl Runtime {
    pub fn new(
        config: ArbConfig,
        connector: Arc<dyn EndpointConnector>,
        prices: Arc<dyn TokenPriceSource>,
        sinks: SinkSet,
        book: Arc<OpportunityBook>,
    ) -> Self {
        Self {
            config,
            connector,
            prices,
            sinks,
            book,
        }
    }

    pub fn book(&self) -> &Arc<OpportunityBook> {
        &self.book
    }

    /// Connect, scan and seed the initial opportunity set
    pub async fn bootstrap(&self) -> Result<Bootstrapped> {
        let dataplane = &self.config.dataplane;
        info!(chain = %dataplane.chain, exchanges = dataplane.exchanges.len(), "Bootstrapping");

        let client = ChainClient::connect(&dataplane.endpoints, self.connector.clone()).await?;
        let registry = PoolRegistry::shared();

        let mut scanner = BootstrapScanner::new(dataplane, client.clone(), registry.clone(), self.prices.clone());
        let report = scanner.scan().await;

        let manager = Arc::new(DetectorManager::from_config(&self.config.strategy, &dataplane.exchanges));
        let initial = {
            let registry = registry.read();
            manager.full_pass(&registry)
        };
        self.sinks.publish_all(&initial).await;

        Ok(Bootstrapped {
            client,
            registry,
            scanner,
            manager,
            report,
            initial,
        })
    }

    /// Bootstrap, then dispatch until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Bootstrapped {
            client,
            registry,
            mut scanner,
            manager,
            ..
        } = self.bootstrap().await?;

        let (mut driver, mut notifications) = EventRecomputeDriver::new(
            client.clone(),
            registry.clone(),
            manager.clone(),
            self.sinks.clone(),
            self.config.dataplane.events.clone(),
        );
        if let Err(e) = driver.subscribe_tracked().await {
            error!(error = %e, "Swap subscription failed, retrying after next rescan");
        }

        let mut tasks = vec![Watchdog::new(client.read().clone(), self.config.dataplane.watchdog.clone())
            .spawn(cancel.child_token())];
        if let Some(write) = client.write() {
            tasks.push(Watchdog::new(write.clone(), self.config.dataplane.watchdog.clone()).spawn(cancel.child_token()));
        }
        tasks.push(spawn_pruner(
            self.book.clone(),
            Duration::from_secs(self.config.runtime.opportunity_retention_secs),
            Duration::from_secs(self.config.runtime.prune_interval_secs),
            cancel.child_token(),
        ));

        let mut rescan = match self.config.runtime.rescan_interval_secs {
            0 => None,
            secs => {
                let mut timer = interval(Duration::from_secs(secs));
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                timer.tick().await;
                Some(timer)
            }
        };

        info!(pools = registry.read().len(), "Event loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = notifications.recv() => match received {
                    Some(log) => {
                        driver.drain(log, &mut notifications).await;
                    }
                    None => {
                        warn!("Notification channel closed");
                        break;
                    }
                },
                _ = next_tick(&mut rescan) => {
                    let report = scanner.scan().await;
                    let records = {
                        let registry = registry.read();
                        manager.full_pass(&registry)
                    };
                    self.sinks.publish_all(&records).await;

                    match driver.subscribe_tracked().await {
                        Ok(covered) => debug!(inserted = report.pools_inserted, covered, "Rescan complete"),
                        Err(e) => error!(error = %e, "Subscribing new pools failed"),
                    }
                }
            }
        }

        cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        info!(opportunities = self.book.len(), "Runtime stopped");
        Ok(())
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Periodically drop book records older than `retention`
pub fn spawn_pruner(
    book: Arc<OpportunityBook>,
    retention: Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
                    let pruned = book.prune(cutoff);
                    if pruned > 0 {
                        debug!(pruned, remaining = book.len(), "Pruned expired opportunities");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityKind;
    use ethers::types::Address;

    #[tokio::test]
    async fn test_pruner_expires_records() {
        let book = Arc::new(OpportunityBook::new());
        let mut stale = OpportunityRecord::new(
            OpportunityKind::Direct,
            vec![Address::repeat_byte(1), Address::repeat_byte(2), Address::repeat_byte(1)],
            vec![Address::repeat_byte(0xa0), Address::repeat_byte(0xa1)],
            vec!["uniswap".to_string(), "sushiswap".to_string()],
            0.01,
            1_000.0,
        );
        stale.detected_at = Utc::now() - chrono::Duration::seconds(60);
        book.insert(stale);

        let cancel = CancellationToken::new();
        let handle = spawn_pruner(book.clone(), Duration::from_secs(30), Duration::from_millis(10), cancel.clone());

        for _ in 0..100 {
            if book.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        cancel.cancel();
        handle.await.unwrap();
        assert!(book.is_empty());
    }
}
