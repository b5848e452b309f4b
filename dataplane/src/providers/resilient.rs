//! Resilient client over one endpoint pool
//!
//! A failed or timed-out call rotates to the next endpoint and is retried
//! exactly once. Every rotation re-arms the subscription registry against the
//! new endpoint, in registration order, before the rotation completes. A
//! healthy watchdog probe re-arms any subscription whose stream has ended.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, Bytes, Filter, Log, H256};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::providers::endpoint::{EndpointPool, RotationReason};
use crate::providers::transport::{ChainTransport, EndpointConnector, SubscriptionHandle};
use crate::{DataplaneError, Endpoint, PoolRole, Result};

/// Identifier returned by [`ResilientClient::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// A registered (filter, sink) pair
#[derive(Debug)]
struct Subscription {
    id: SubscriptionId,
    filter: Filter,
    sink: mpsc::Sender<Log>,
    handle: Option<SubscriptionHandle>,
}

/// Ordered list of subscriptions; survives rotation
#[derive(Debug, Default)]
struct SubscriptionRegistry {
    entries: Vec<Subscription>,
    next_id: u64,
}

impl SubscriptionRegistry {
    fn register(&mut self, filter: Filter, sink: mpsc::Sender<Log>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push(Subscription {
            id,
            filter,
            sink,
            handle: None,
        });
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        before != self.entries.len()
    }

    fn disarm_all(&mut self) {
        for entry in &mut self.entries {
            entry.handle = None;
        }
    }

    /// Entries whose stream ended or was never armed
    fn lapsed(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_lapsed()).count()
    }
}

impl Subscription {
    fn is_lapsed(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| !handle.is_active())
    }
}

/// Mutable client state; guarded by one async mutex so rotations serialize
struct ClientState {
    pool: EndpointPool,
    transport: Option<Arc<dyn ChainTransport>>,
    subscriptions: SubscriptionRegistry,

    /// Bumped on every successful rotation
    generation: u64,
}

/// Outcome of one watchdog probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Endpoint answered with the latest block
    Healthy { block: u64 },

    /// Probe failed; threshold not yet reached
    Failed { consecutive: u32 },

    /// Threshold reached and the pool rotated
    Rotated { endpoint: String },

    /// A rotation finished while the probe was in flight; the result was discarded
    Superseded,
}

/// Snapshot of a client's endpoint state for health reporting
#[derive(Debug, Clone)]
pub struct ClientStatus {
    pub role: PoolRole,
    pub active_endpoint: String,
    pub active_index: usize,
    pub rotations: u64,
    pub subscriptions: usize,
    pub lapsed_subscriptions: usize,
    pub endpoint_failures: Vec<(String, u64)>,
}

/// Failover client bound to one endpoint pool
pub struct ResilientClient {
    role: PoolRole,
    connector: Arc<dyn EndpointConnector>,
    request_timeout: Duration,
    state: Mutex<ClientState>,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("role", &self.role)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ResilientClient {
    /// Connect to the first reachable endpoint of `urls`
    pub async fn connect(
        role: PoolRole,
        urls: &[String],
        connector: Arc<dyn EndpointConnector>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let mut pool = EndpointPool::new(role, urls)?;
        let mut last_error = String::new();

        info!(role = %role, endpoint_count = pool.len(), "Creating resilient client");

        for _ in 0..pool.len() {
            match open(connector.as_ref(), pool.active(), request_timeout).await {
                Ok(transport) => {
                    info!(role = %role, endpoint = pool.active().url, "Resilient client connected");
                    pool.record_success();

                    return Ok(Self {
                        role,
                        connector,
                        request_timeout,
                        state: Mutex::new(ClientState {
                            pool,
                            transport: Some(transport),
                            subscriptions: SubscriptionRegistry::default(),
                            generation: 0,
                        }),
                    });
                }
                Err(e) => {
                    warn!(role = %role, endpoint = pool.active().url, error = %e, "Initial connect failed");
                    last_error = e.to_string();
                    pool.record_failure();
                    pool.rotate();
                }
            }
        }

        Err(DataplaneError::AllEndpointsExhausted {
            role: role.name().to_string(),
            attempts: pool.len(),
            last_error,
        })
    }

    pub fn role(&self) -> PoolRole {
        self.role
    }

    /// Run `operation` against the active endpoint, rotating and retrying once on failure
    pub async fn call<T, F>(&self, operation: F) -> Result<T>
    where
        F: Fn(Arc<dyn ChainTransport>) -> BoxFuture<'static, Result<T>>,
        T: Send,
    {
        let (transport, generation) = self.current().await?;

        let first = match self.attempt(&operation, transport).await {
            Ok(value) => {
                self.record_success(generation).await;
                return Ok(value);
            }
            Err(e) if !e.triggers_rotation() => return Err(e),
            Err(e) => e,
        };

        warn!(role = %self.role, error = %first, "Call failed, rotating endpoint");
        let (transport, generation) = self.rotate_after_failure(generation, &first).await?;

        match self.attempt(&operation, transport).await {
            Ok(value) => {
                self.record_success(generation).await;
                Ok(value)
            }
            Err(e) if !e.triggers_rotation() => Err(e),
            Err(e) => Err(self.surface_retry_failure(generation, e).await),
        }
    }

    /// `eth_call` convenience wrapper
    pub async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.call(move |transport| {
            let data = data.clone();
            Box::pin(async move { transport.call(to, data).await })
        })
        .await
    }

    /// Latest block number
    pub async fn block_number(&self) -> Result<u64> {
        self.call(|transport| Box::pin(async move { transport.block_number().await }))
            .await
    }

    /// Broadcast a signed transaction
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        self.call(move |transport| {
            let raw = raw.clone();
            Box::pin(async move { transport.send_raw_transaction(raw).await })
        })
        .await
    }

    /// Register a log subscription; it is re-armed on every rotation
    pub async fn subscribe(&self, filter: Filter, sink: mpsc::Sender<Log>) -> Result<SubscriptionId> {
        let mut state = self.state.lock().await;
        let id = state.subscriptions.register(filter.clone(), sink.clone());

        let transport = state
            .transport
            .clone()
            .ok_or_else(|| DataplaneError::internal("resilient client has no transport"))?;

        match transport.subscribe_logs(filter, sink).await {
            Ok(handle) => {
                if let Some(entry) = state.subscriptions.entries.iter_mut().find(|e| e.id == id) {
                    entry.handle = Some(handle);
                }
                debug!(role = %self.role, subscription = id.0, endpoint = transport.endpoint(), "Subscription armed");
                Ok(id)
            }
            Err(e) if e.triggers_rotation() => {
                warn!(role = %self.role, error = %e, "Subscribe failed, rotating endpoint");
                state.pool.record_failure();
                self.rotate_locked(&mut state, RotationReason::CallerFailure)
                    .await
                    .map_err(|e| {
                        state.subscriptions.remove(id);
                        e
                    })?;
                Ok(id)
            }
            Err(e) => {
                state.subscriptions.remove(id);
                Err(e)
            }
        }
    }

    /// Drop a subscription
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.lock().await.subscriptions.remove(id)
    }

    /// Rotate to the next endpoint regardless of health
    pub async fn force_rotate(&self, reason: RotationReason) -> Result<String> {
        let mut state = self.state.lock().await;
        self.rotate_locked(&mut state, reason).await?;
        Ok(state.pool.active().url.clone())
    }

    /// One liveness probe; rotates once `failure_threshold` consecutive probes fail
    pub async fn probe(&self, failure_threshold: u32) -> ProbeOutcome {
        let (transport, generation) = {
            let state = self.state.lock().await;
            (state.transport.clone(), state.generation)
        };

        let outcome = match transport {
            Some(transport) => tokio::time::timeout(self.request_timeout, transport.block_number())
                .await
                .map_err(|_| DataplaneError::endpoint_unavailable(transport.endpoint(), "probe timed out"))
                .and_then(|result| result),
            None => Err(DataplaneError::internal("resilient client has no transport")),
        };

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(role = %self.role, endpoint = state.pool.active().url, "Probe outcome superseded by rotation");
            return ProbeOutcome::Superseded;
        }

        match outcome {
            Ok(block) => {
                state.pool.reset_probe_failures();
                match self.rearm_lapsed(&mut state).await {
                    Ok(_) => ProbeOutcome::Healthy { block },
                    Err(e) => {
                        warn!(role = %self.role, error = %e, "Re-arming lapsed subscriptions failed, rotating");
                        state.pool.record_failure();
                        match self.rotate_locked(&mut state, RotationReason::Watchdog).await {
                            Ok(()) => ProbeOutcome::Rotated {
                                endpoint: state.pool.active().url.clone(),
                            },
                            Err(e) => {
                                error!(role = %self.role, error = %e, "Watchdog rotation failed");
                                ProbeOutcome::Failed { consecutive: 0 }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                let consecutive = state.pool.record_probe_failure();
                warn!(
                    role = %self.role,
                    endpoint = state.pool.active().url,
                    consecutive_failures = consecutive,
                    error = %e,
                    "Liveness probe failed"
                );

                if consecutive < failure_threshold {
                    return ProbeOutcome::Failed { consecutive };
                }

                state.pool.reset_probe_failures();
                state.pool.record_failure();
                match self.rotate_locked(&mut state, RotationReason::Watchdog).await {
                    Ok(()) => ProbeOutcome::Rotated {
                        endpoint: state.pool.active().url.clone(),
                    },
                    Err(e) => {
                        error!(role = %self.role, error = %e, "Watchdog rotation failed");
                        ProbeOutcome::Failed { consecutive }
                    }
                }
            }
        }
    }

    /// Current endpoint state
    pub async fn status(&self) -> ClientStatus {
        let state = self.state.lock().await;
        ClientStatus {
            role: self.role,
            active_endpoint: state.pool.active().url.clone(),
            active_index: state.pool.active_index(),
            rotations: state.pool.rotations(),
            subscriptions: state.subscriptions.entries.len(),
            lapsed_subscriptions: state.subscriptions.lapsed(),
            endpoint_failures: state
                .pool
                .endpoints()
                .iter()
                .map(|e| (e.url.clone(), e.failures))
                .collect(),
        }
    }

    pub async fn active_endpoint(&self) -> String {
        self.state.lock().await.pool.active().url.clone()
    }

    async fn current(&self) -> Result<(Arc<dyn ChainTransport>, u64)> {
        let mut state = self.state.lock().await;
        if let Some(transport) = state.transport.clone() {
            return Ok((transport, state.generation));
        }

        // A previous rotation cycle failed completely; start a fresh one
        state.pool.reset_cycle();
        self.rotate_locked(&mut state, RotationReason::ConnectFailure).await?;
        let transport = state
            .transport
            .clone()
            .ok_or_else(|| DataplaneError::internal("rotation finished without a transport"))?;
        Ok((transport, state.generation))
    }

    async fn attempt<T, F>(&self, operation: &F, transport: Arc<dyn ChainTransport>) -> Result<T>
    where
        F: Fn(Arc<dyn ChainTransport>) -> BoxFuture<'static, Result<T>>,
    {
        let endpoint = transport.endpoint().to_string();
        match tokio::time::timeout(self.request_timeout, operation(transport)).await {
            Ok(result) => result,
            Err(_) => Err(DataplaneError::endpoint_unavailable(endpoint, "request timed out")),
        }
    }

    async fn record_success(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.generation == generation {
            state.pool.record_success();
        }
    }

    /// Rotate unless another caller already rotated past `generation`.
    ///
    /// A single-endpoint pool wraps onto the same endpoint and reconnects.
    /// Exhaustion is only judged after the retry.
    async fn rotate_after_failure(
        &self,
        generation: u64,
        failure: &DataplaneError,
    ) -> Result<(Arc<dyn ChainTransport>, u64)> {
        let mut state = self.state.lock().await;

        if state.generation == generation {
            state.pool.record_failure();
            debug!(role = %self.role, error = %failure, "Rotating after caller failure");
            self.rotate_locked(&mut state, RotationReason::CallerFailure).await?;
        }

        let transport = state
            .transport
            .clone()
            .ok_or_else(|| DataplaneError::internal("rotation finished without a transport"))?;
        Ok((transport, state.generation))
    }

    async fn surface_retry_failure(&self, generation: u64, failure: DataplaneError) -> DataplaneError {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return failure;
        }

        if state.pool.record_failure() {
            return self.exhausted(&mut state, failure.to_string());
        }
        failure
    }

    fn exhausted(&self, state: &mut ClientState, last_error: String) -> DataplaneError {
        error!(
            role = %self.role,
            attempts = state.pool.len(),
            error = last_error,
            "All endpoints failed within one rotation cycle"
        );
        state.pool.reset_cycle();
        DataplaneError::AllEndpointsExhausted {
            role: self.role.name().to_string(),
            attempts: state.pool.len(),
            last_error,
        }
    }

    /// Move to the next endpoint that accepts a connection and re-arms every subscription
    async fn rotate_locked(&self, state: &mut ClientState, reason: RotationReason) -> Result<()> {
        let previous = state.pool.active().url.clone();
        state.subscriptions.disarm_all();
        state.transport = None;

        let mut reason = reason;
        let mut last_error = String::new();

        for _ in 0..state.pool.len() {
            state.pool.rotate();
            let endpoint = state.pool.active().clone();

            let transport = match open(self.connector.as_ref(), &endpoint, self.request_timeout).await {
                Ok(transport) => transport,
                Err(e) => {
                    warn!(role = %self.role, endpoint = endpoint.url, error = %e, "Endpoint connect failed");
                    last_error = e.to_string();
                    state.pool.record_failure();
                    reason = RotationReason::ConnectFailure;
                    continue;
                }
            };

            match Self::rearm(&mut state.subscriptions, transport.as_ref()).await {
                Ok(armed) => {
                    state.transport = Some(transport);
                    state.generation += 1;
                    metrics::increment_counter!("rotations_total", "role" => self.role.name(), "reason" => reason.name());

                    info!(
                        role = %self.role,
                        reason = %reason,
                        from = previous,
                        endpoint = endpoint.url,
                        subscriptions = armed,
                        "Rotated endpoint"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(role = %self.role, endpoint = endpoint.url, error = %e, "Re-arming subscriptions failed");
                    last_error = e.to_string();
                    state.subscriptions.disarm_all();
                    state.pool.record_failure();
                    reason = RotationReason::ConnectFailure;
                }
            }
        }

        error!(role = %self.role, error = last_error, "No endpoint accepted the rotation");
        Err(DataplaneError::AllEndpointsExhausted {
            role: self.role.name().to_string(),
            attempts: state.pool.len(),
            last_error,
        })
    }

    /// Re-arm subscriptions whose stream ended on the active transport.
    /// Entries whose receiver is gone are dropped instead.
    async fn rearm_lapsed(&self, state: &mut ClientState) -> Result<usize> {
        let before = state.subscriptions.entries.len();
        state.subscriptions.entries.retain(|entry| !entry.sink.is_closed());
        let dropped = before - state.subscriptions.entries.len();
        if dropped > 0 {
            debug!(role = %self.role, dropped, "Dropped subscriptions without a receiver");
        }

        let Some(transport) = state.transport.clone() else {
            return Ok(0);
        };

        let mut rearmed = 0;
        for entry in state.subscriptions.entries.iter_mut().filter(|entry| entry.is_lapsed()) {
            let handle = transport
                .subscribe_logs(entry.filter.clone(), entry.sink.clone())
                .await?;
            entry.handle = Some(handle);
            rearmed += 1;
        }

        if rearmed > 0 {
            warn!(role = %self.role, endpoint = transport.endpoint(), rearmed, "Re-armed ended subscriptions");
        }
        Ok(rearmed)
    }

    async fn rearm(subscriptions: &mut SubscriptionRegistry, transport: &dyn ChainTransport) -> Result<usize> {
        for entry in &mut subscriptions.entries {
            let handle = transport
                .subscribe_logs(entry.filter.clone(), entry.sink.clone())
                .await?;
            entry.handle = Some(handle);
        }
        Ok(subscriptions.entries.len())
    }
}

/// Connect with the request timeout as the upper bound
async fn open(connector: &dyn EndpointConnector, endpoint: &Endpoint, timeout: Duration) -> Result<Arc<dyn ChainTransport>> {
    match tokio::time::timeout(timeout, connector.connect(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(DataplaneError::endpoint_unavailable(endpoint.url.as_str(), "connect timed out")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockConnector, log_for};

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ws://node-{}.local", i)).collect()
    }

    async fn client(connector: &MockConnector, n: usize) -> ResilientClient {
        ResilientClient::connect(
            PoolRole::Read,
            &urls(n),
            Arc::new(connector.clone()),
            Duration::from_millis(200),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_forced_rotations_wrap_to_first_endpoint() {
        let connector = MockConnector::new();
        let client = client(&connector, 3).await;

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(client.force_rotate(RotationReason::Forced).await.unwrap());
        }

        assert_eq!(seen, vec!["ws://node-1.local", "ws://node-2.local", "ws://node-0.local"]);
        assert_eq!(client.status().await.active_index, 0);
    }

    #[tokio::test]
    async fn test_failed_call_rotates_and_retries_once() {
        let connector = MockConnector::new();
        connector.endpoint("ws://node-0.local").set_healthy(false);
        let client = client(&connector, 3).await;

        let block = client.block_number().await.unwrap();
        assert_eq!(block, connector.block_number());
        assert_eq!(client.active_endpoint().await, "ws://node-1.local");
        assert_eq!(connector.endpoint("ws://node-0.local").calls(), 1);
        assert_eq!(connector.endpoint("ws://node-1.local").calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_failure_is_surfaced() {
        let connector = MockConnector::new();
        for i in 0..3 {
            connector.endpoint(&format!("ws://node-{}.local", i)).set_healthy(false);
        }
        let client = client(&connector, 3).await;

        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, DataplaneError::EndpointUnavailable { .. }));
        // Exactly one retry: the third endpoint was never asked
        assert_eq!(connector.endpoint("ws://node-2.local").calls(), 0);
    }

    #[tokio::test]
    async fn test_two_endpoint_pool_reports_exhaustion() {
        let connector = MockConnector::new();
        connector.endpoint("ws://node-0.local").set_healthy(false);
        connector.endpoint("ws://node-1.local").set_healthy(false);
        let client = client(&connector, 2).await;

        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, DataplaneError::AllEndpointsExhausted { .. }));
    }

    #[tokio::test]
    async fn test_read_failures_do_not_rotate() {
        let connector = MockConnector::new();
        let client = client(&connector, 2).await;

        // No canned response for this call: the mock reverts
        let err = client.eth_call(Address::repeat_byte(7), Bytes::from(vec![1, 2, 3, 4])).await.unwrap_err();
        assert!(matches!(err, DataplaneError::DecodeOrReadFailure { .. }));
        assert_eq!(client.status().await.rotations, 0);
    }

    #[tokio::test]
    async fn test_subscriptions_survive_rotation() {
        let connector = MockConnector::new();
        let client = client(&connector, 2).await;
        let pool = Address::repeat_byte(0x11);

        let (tx, mut rx) = mpsc::channel(16);
        client.subscribe(Filter::new().address(pool), tx).await.unwrap();

        connector.endpoint("ws://node-0.local").set_healthy(false);
        client.force_rotate(RotationReason::Forced).await.unwrap();

        connector.emit(log_for(pool));
        let log = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(log.address, pool);
        assert_eq!(connector.endpoint("ws://node-1.local").subscription_count(), 1);
        assert_eq!(connector.endpoint("ws://node-0.local").subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_rearm_preserves_registration_order() {
        let connector = MockConnector::new();
        let client = client(&connector, 2).await;

        let first = Address::repeat_byte(0x01);
        let second = Address::repeat_byte(0x02);
        let (tx, _rx) = mpsc::channel(16);
        client.subscribe(Filter::new().address(first), tx.clone()).await.unwrap();
        client.subscribe(Filter::new().address(second), tx).await.unwrap();

        client.force_rotate(RotationReason::Forced).await.unwrap();
        let order = connector.endpoint("ws://node-1.local").subscribed_addresses();
        assert_eq!(order, vec![first, second]);
    }

    #[tokio::test]
    async fn test_watchdog_rotates_at_threshold() {
        let connector = MockConnector::new();
        let client = client(&connector, 2).await;
        connector.endpoint("ws://node-0.local").set_healthy(false);

        assert_eq!(client.probe(3).await, ProbeOutcome::Failed { consecutive: 1 });
        assert_eq!(client.probe(3).await, ProbeOutcome::Failed { consecutive: 2 });
        assert_eq!(
            client.probe(3).await,
            ProbeOutcome::Rotated {
                endpoint: "ws://node-1.local".to_string()
            }
        );
        assert!(matches!(client.probe(3).await, ProbeOutcome::Healthy { .. }));
    }

    #[tokio::test]
    async fn test_rotation_skips_unreachable_endpoint() {
        let connector = MockConnector::new();
        let client = client(&connector, 3).await;
        connector.endpoint("ws://node-1.local").set_reachable(false);

        let endpoint = client.force_rotate(RotationReason::Forced).await.unwrap();
        assert_eq!(endpoint, "ws://node-2.local");
    }

    #[tokio::test]
    async fn test_timed_out_call_rotates_and_retries() {
        let connector = MockConnector::new();
        let client = client(&connector, 2).await;
        connector.endpoint("ws://node-0.local").set_latency(Duration::from_millis(400));

        let block = client.block_number().await.unwrap();
        assert_eq!(block, connector.block_number());
        assert_eq!(client.active_endpoint().await, "ws://node-1.local");
        assert_eq!(connector.endpoint("ws://node-0.local").calls(), 1);
        assert_eq!(connector.endpoint("ws://node-1.local").calls(), 1);
    }

    #[tokio::test]
    async fn test_single_endpoint_reconnects_and_retries() {
        let connector = MockConnector::new();
        let client = client(&connector, 1).await;
        let solo = connector.endpoint("ws://node-0.local");
        solo.set_latency(Duration::from_millis(400));

        let recovery = {
            let solo = solo.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                solo.set_latency(Duration::ZERO);
            })
        };

        let block = client.block_number().await.unwrap();
        recovery.await.unwrap();

        assert_eq!(block, connector.block_number());
        assert_eq!(solo.calls(), 2);
        // Initial connect plus the reconnect on rotation
        assert_eq!(solo.connects(), 2);
        assert_eq!(client.status().await.rotations, 1);
    }

    #[tokio::test]
    async fn test_single_endpoint_exhausts_after_one_retry() {
        let connector = MockConnector::new();
        let client = client(&connector, 1).await;
        let solo = connector.endpoint("ws://node-0.local");
        solo.set_healthy(false);

        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, DataplaneError::AllEndpointsExhausted { .. }));
        assert_eq!(solo.calls(), 2);
    }

    #[tokio::test]
    async fn test_probe_overtaken_by_caller_rotation() {
        let connector = MockConnector::new();
        let client = Arc::new(client(&connector, 2).await);
        let dead = connector.endpoint("ws://node-0.local");
        dead.set_healthy(false);
        dead.set_latency(Duration::from_millis(100));

        let probing = {
            let client = client.clone();
            tokio::spawn(async move { client.probe(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.force_rotate(RotationReason::CallerFailure).await.unwrap();

        assert_eq!(probing.await.unwrap(), ProbeOutcome::Superseded);
        assert_eq!(client.active_endpoint().await, "ws://node-1.local");
        assert_eq!(client.status().await.endpoint_failures[1].1, 0);
    }

    #[tokio::test]
    async fn test_healthy_probe_rearms_ended_subscription() {
        let connector = MockConnector::new();
        let client = client(&connector, 2).await;
        let pool = Address::repeat_byte(0x22);
        let endpoint = connector.endpoint("ws://node-0.local");

        let (tx, mut rx) = mpsc::channel(16);
        client.subscribe(Filter::new().address(pool), tx).await.unwrap();

        endpoint.end_subscriptions();
        assert_eq!(endpoint.subscription_count(), 0);
        assert_eq!(connector.emit(log_for(pool)), 0);
        assert_eq!(client.status().await.lapsed_subscriptions, 1);

        assert!(matches!(client.probe(3).await, ProbeOutcome::Healthy { .. }));
        assert_eq!(client.status().await.lapsed_subscriptions, 0);
        assert_eq!(client.active_endpoint().await, "ws://node-0.local");
        assert_eq!(endpoint.subscription_count(), 1);

        assert_eq!(connector.emit(log_for(pool)), 1);
        let log = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(log.address, pool);
    }

    #[tokio::test]
    async fn test_hanging_connect_is_bounded() {
        let connector = MockConnector::new();
        let client = client(&connector, 3).await;
        connector.endpoint("ws://node-1.local").set_connect_latency(Duration::from_secs(5));

        let endpoint = tokio::time::timeout(Duration::from_secs(2), client.force_rotate(RotationReason::Forced))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint, "ws://node-2.local");
    }
}
