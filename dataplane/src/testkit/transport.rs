//! In-memory endpoints implementing [`EndpointConnector`] / [`ChainTransport`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, ValueOrArray, H256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::contracts::{event_topic, UNISWAP_V2_SWAP_SIGNATURE};
use crate::providers::transport::{ChainTransport, EndpointConnector, SubscriptionHandle};
use crate::testkit::chain::MockChain;
use crate::{DataplaneError, Endpoint, Result};

/// A swap log emitted by `pool`
pub fn log_for(pool: Address) -> Log {
    Log {
        address: pool,
        topics: vec![event_topic(UNISWAP_V2_SWAP_SIGNATURE)],
        ..Default::default()
    }
}

#[derive(Debug)]
struct MockSubscription {
    filter: Filter,
    sink: mpsc::Sender<Log>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct EndpointState {
    url: String,
    healthy: AtomicBool,
    reachable: AtomicBool,
    latency_ms: AtomicU64,
    connect_latency_ms: AtomicU64,
    calls: AtomicU32,
    connects: AtomicU32,
    subscriptions: Mutex<Vec<MockSubscription>>,
}

/// Control handle for one scripted endpoint
#[derive(Debug, Clone)]
pub struct MockEndpoint {
    state: Arc<EndpointState>,
}

impl MockEndpoint {
    fn new(url: &str) -> Self {
        Self {
            state: Arc::new(EndpointState {
                url: url.to_string(),
                healthy: AtomicBool::new(true),
                reachable: AtomicBool::new(true),
                latency_ms: AtomicU64::new(0),
                connect_latency_ms: AtomicU64::new(0),
                calls: AtomicU32::new(0),
                connects: AtomicU32::new(0),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Unhealthy endpoints accept connections but fail every request
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Unreachable endpoints refuse connections
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delay applied to every request
    pub fn set_latency(&self, latency: Duration) {
        self.state.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay before a connection attempt is answered
    pub fn set_connect_latency(&self, latency: Duration) {
        self.state.connect_latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// End every live log stream, as a node dropping its subscriptions would
    pub fn end_subscriptions(&self) {
        for sub in self.state.subscriptions.lock().unwrap().iter() {
            sub.cancel.cancel();
        }
    }

    /// Requests received (block number, calls, broadcasts)
    pub fn calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.prune();
        self.state.subscriptions.lock().unwrap().len()
    }

    /// Addresses of live subscriptions, in arming order
    pub fn subscribed_addresses(&self) -> Vec<Address> {
        self.prune();
        let subscriptions = self.state.subscriptions.lock().unwrap();
        let mut addresses = Vec::new();
        for sub in subscriptions.iter() {
            match &sub.filter.address {
                Some(ValueOrArray::Value(address)) => addresses.push(*address),
                Some(ValueOrArray::Array(list)) => addresses.extend(list.iter().copied()),
                None => {}
            }
        }
        addresses
    }

    fn prune(&self) {
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .retain(|sub| !sub.cancel.is_cancelled());
    }

    fn deliver(&self, log: &Log) -> usize {
        self.prune();
        let subscriptions = self.state.subscriptions.lock().unwrap();
        let mut delivered = 0;
        for sub in subscriptions.iter().filter(|sub| filter_matches(&sub.filter, log)) {
            if sub.sink.try_send(log.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    async fn begin_request(&self) -> Result<()> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.state.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.state.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DataplaneError::endpoint_unavailable(
                self.state.url.as_str(),
                "mock endpoint unhealthy",
            ))
        }
    }
}

fn filter_matches(filter: &Filter, log: &Log) -> bool {
    let address_ok = match &filter.address {
        None => true,
        Some(ValueOrArray::Value(address)) => *address == log.address,
        Some(ValueOrArray::Array(list)) => list.contains(&log.address),
    };

    let topic_ok = match &filter.topics[0] {
        None => true,
        Some(ValueOrArray::Value(None)) => true,
        Some(ValueOrArray::Value(Some(topic))) => log.topics.first() == Some(topic),
        Some(ValueOrArray::Array(topics)) => topics
            .iter()
            .any(|topic: &Option<H256>| topic.is_none() || log.topics.first() == topic.as_ref()),
    };

    address_ok && topic_ok
}

#[derive(Debug, Default)]
struct ConnectorInner {
    chain: MockChain,
    endpoints: Mutex<HashMap<String, MockEndpoint>>,
    block_number: AtomicU64,
}

/// Connector handing out scripted endpoints that share one [`MockChain`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    inner: Arc<ConnectorInner>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        let inner = ConnectorInner::default();
        inner.block_number.store(19_000_000, Ordering::SeqCst);
        Self { inner: Arc::new(inner) }
    }

    /// Control handle for `url`, created on first use
    pub fn endpoint(&self, url: &str) -> MockEndpoint {
        self.inner
            .endpoints
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert_with(|| MockEndpoint::new(url))
            .clone()
    }

    pub fn chain(&self) -> &MockChain {
        &self.inner.chain
    }

    pub fn block_number(&self) -> u64 {
        self.inner.block_number.load(Ordering::SeqCst)
    }

    /// Fan a log out to every live matching subscription; returns deliveries
    pub fn emit(&self, log: Log) -> usize {
        let endpoints: Vec<MockEndpoint> = self.inner.endpoints.lock().unwrap().values().cloned().collect();
        endpoints.iter().map(|endpoint| endpoint.deliver(&log)).sum()
    }
}

#[async_trait]
impl EndpointConnector for MockConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn ChainTransport>> {
        let handle = self.endpoint(&endpoint.url);
        handle.state.connects.fetch_add(1, Ordering::SeqCst);

        let latency = handle.state.connect_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if !handle.state.reachable.load(Ordering::SeqCst) {
            return Err(DataplaneError::endpoint_unavailable(
                endpoint.url.as_str(),
                "mock endpoint unreachable",
            ));
        }

        Ok(Arc::new(MockTransport {
            endpoint: handle,
            connector: self.clone(),
        }))
    }
}

struct MockTransport {
    endpoint: MockEndpoint,
    connector: MockConnector,
}

#[async_trait]
impl ChainTransport for MockTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint.state.url
    }

    async fn block_number(&self) -> Result<u64> {
        self.endpoint.begin_request().await?;
        Ok(self.connector.block_number())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.endpoint.begin_request().await?;
        self.connector
            .chain()
            .respond(to, &data)
            .ok_or_else(|| DataplaneError::read_failure(format!("{:?}", to), "execution reverted"))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        self.endpoint.begin_request().await?;
        Ok(H256::from(ethers::utils::keccak256(&raw)))
    }

    async fn subscribe_logs(&self, filter: Filter, sink: mpsc::Sender<Log>) -> Result<SubscriptionHandle> {
        if !self.endpoint.state.healthy.load(Ordering::SeqCst) {
            return Err(DataplaneError::endpoint_unavailable(
                self.endpoint.state.url.as_str(),
                "mock endpoint unhealthy",
            ));
        }

        let cancel = CancellationToken::new();
        self.endpoint.state.subscriptions.lock().unwrap().push(MockSubscription {
            filter,
            sink,
            cancel: cancel.clone(),
        });
        Ok(SubscriptionHandle::new(cancel))
    }
}
