//! Event recompute driver
//!
//! Swap logs for every tracked pool arrive on one bounded channel. The
//! dispatcher drains whatever is queued, marks each notified pool DIRTY once
//! (later notifications for a pool that is already DIRTY are coalesced), then
//! walks the dirty pools in first-arrival order:
//!
//! `STABLE -> DIRTY -> REFRESHING -> STABLE`
//!
//! REFRESHING re-reads reserves for that single pool; the recompute that
//! follows only looks at its pair group and the cycles it closes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ethers::types::{Address, Filter, Log, H256};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use qenus_pool_dataplane::config::EventsConfig;
use qenus_pool_dataplane::contracts::event_topic;
use qenus_pool_dataplane::providers::{ChainClient, SubscriptionId};
use qenus_pool_dataplane::{DataplaneError, SharedRegistry};

use crate::detectors::DetectorManager;
use crate::error::{IntelligenceError, Result};
use crate::sink::SinkSet;
use crate::types::OpportunityRecord;

/// Per-pool recompute state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolState {
    #[default]
    Stable,
    Dirty,
    Refreshing,
}

/// What happened to one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Pool moved from STABLE to DIRTY
    Dirty,
    /// Pool was already DIRTY or REFRESHING
    Coalesced,
    /// Address is not in the registry; dropped
    Unknown,
}

/// Counters for one drain of the notification queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub notifications: usize,
    pub coalesced: usize,
    pub unknown: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub emitted: usize,
}

pub struct EventRecomputeDriver {
    client: ChainClient,
    registry: SharedRegistry,
    manager: Arc<DetectorManager>,
    sinks: SinkSet,
    events: EventsConfig,
    topic: H256,
    tx: mpsc::Sender<Log>,
    states: HashMap<Address, PoolState>,
    subscribed: HashSet<Address>,
    subscriptions: Vec<SubscriptionId>,
}

impl EventRecomputeDriver {
    /// Driver plus the receiving end of its notification channel
    pub fn new(
        client: ChainClient,
        registry: SharedRegistry,
        manager: Arc<DetectorManager>,
        sinks: SinkSet,
        events: EventsConfig,
    ) -> (Self, mpsc::Receiver<Log>) {
        let (tx, rx) = mpsc::channel(events.channel_capacity.max(1));
        let topic = event_topic(&events.swap_event_signature);

        let driver = Self {
            client,
            registry,
            manager,
            sinks,
            events,
            topic,
            tx,
            states: HashMap::new(),
            subscribed: HashSet::new(),
            subscriptions: Vec::new(),
        };
        (driver, rx)
    }

    /// Subscribe to swap logs of every registered pool not yet covered.
    ///
    /// Addresses are grouped `addresses_per_subscription` per filter. Returns
    /// the number of newly covered pools.
    pub async fn subscribe_tracked(&mut self) -> Result<usize> {
        let pending: Vec<Address> = {
            let registry = self.registry.read();
            registry
                .addresses()
                .into_iter()
                .filter(|address| !self.subscribed.contains(address))
                .collect()
        };

        let mut covered = 0;
        for chunk in pending.chunks(self.events.addresses_per_subscription.max(1)) {
            let filter = Filter::new().address(chunk.to_vec()).topic0(self.topic);
            let id = self.client.subscribe_logs(filter, self.tx.clone()).await?;

            self.subscriptions.push(id);
            self.subscribed.extend(chunk.iter().copied());
            covered += chunk.len();
        }

        if covered > 0 {
            info!(
                pools = covered,
                subscriptions = self.subscriptions.len(),
                topic = ?self.topic,
                "Subscribed to swap notifications"
            );
        }
        Ok(covered)
    }

    pub fn state(&self, pool: Address) -> PoolState {
        self.states.get(&pool).copied().unwrap_or_default()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Record a notification for `pool`
    pub fn notify(&mut self, pool: Address) -> Notification {
        metrics::increment_counter!("notifications_total");

        if self.registry.read().id_of(pool).is_none() {
            let err = DataplaneError::UnknownPool(pool);
            warn!(error = %err, "Dropping notification");
            return Notification::Unknown;
        }

        let state = self.states.entry(pool).or_default();
        match *state {
            PoolState::Stable => {
                *state = PoolState::Dirty;
                Notification::Dirty
            }
            PoolState::Dirty | PoolState::Refreshing => Notification::Coalesced,
        }
    }

    /// Process `first` and everything already queued behind it
    pub async fn drain(&mut self, first: Log, rx: &mut mpsc::Receiver<Log>) -> DrainReport {
        let mut report = DrainReport::default();
        let mut dirty = Vec::new();

        let mut next = Some(first);
        while let Some(log) = next {
            report.notifications += 1;
            match self.notify(log.address) {
                Notification::Dirty => dirty.push(log.address),
                Notification::Coalesced => report.coalesced += 1,
                Notification::Unknown => report.unknown += 1,
            }
            next = rx.try_recv().ok();
        }

        for pool in dirty {
            match self.refresh_and_recompute(pool).await {
                Ok(records) => {
                    report.refreshed += 1;
                    report.emitted += self.sinks.publish_all(&records).await;
                }
                Err(IntelligenceError::Dataplane(e @ DataplaneError::AllEndpointsExhausted { .. })) => {
                    error!(pool = ?pool, error = %e, "Reserve refresh abandoned");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(pool = ?pool, error = %e, "Reserve refresh failed, pool skipped");
                    report.failed += 1;
                }
            }
        }

        debug!(
            notifications = report.notifications,
            coalesced = report.coalesced,
            refreshed = report.refreshed,
            emitted = report.emitted,
            "Notification queue drained"
        );
        report
    }

    /// Re-read reserves for one pool and recompute its neighborhood
    pub async fn refresh_and_recompute(&mut self, pool: Address) -> Result<Vec<OpportunityRecord>> {
        self.states.insert(pool, PoolState::Refreshing);
        let snapshot = self.client.get_reserves(pool).await;
        self.states.insert(pool, PoolState::Stable);

        let snapshot = snapshot?;
        let id = self.registry.write().apply_snapshot(pool, &snapshot)?;

        let registry = self.registry.read();
        Ok(self.manager.recompute(&registry, id))
    }
}
