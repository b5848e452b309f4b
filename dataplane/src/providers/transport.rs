//! Transport seam between the resilient client and a concrete RPC endpoint
//!
//! `EthersConnector` builds `Provider<Ws>` for `ws(s)://` endpoints (native
//! `eth_subscribe`) and `Provider<Http>` otherwise (filter polling).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, Ws};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Filter, Log, NameOrAddress, H256};
use futures::{Stream, StreamExt};
use reqwest::Client;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{DataplaneError, Endpoint, Result};

/// Keeps a log subscription alive; dropping it tears the subscription down.
/// It reports inactive once the underlying stream has ended.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One live connection to one endpoint
#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// Endpoint URL this transport talks to
    fn endpoint(&self) -> &str;

    /// Latest block number (also the liveness probe)
    async fn block_number(&self) -> Result<u64>;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Broadcast an already-signed transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;

    /// Forward logs matching `filter` into `sink` until the handle is dropped
    async fn subscribe_logs(&self, filter: Filter, sink: mpsc::Sender<Log>) -> Result<SubscriptionHandle>;
}

/// Opens transports for endpoints
#[async_trait]
pub trait EndpointConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn ChainTransport>>;
}

/// Production connector backed by ethers providers
#[derive(Debug, Clone)]
pub struct EthersConnector {
    /// Connect/request timeout
    request_timeout: Duration,

    /// Filter polling interval for HTTP endpoints
    poll_interval: Duration,
}

impl EthersConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            poll_interval: Duration::from_millis(1_000),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl EndpointConnector for EthersConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn ChainTransport>> {
        let url = Url::parse(&endpoint.url)
            .map_err(|e| DataplaneError::invalid_config(format!("Invalid endpoint URL {}: {}", endpoint.url, e)))?;

        let provider = if endpoint.is_websocket() {
            info!(endpoint = endpoint.url, "Connecting WebSocket provider");

            let ws = tokio::time::timeout(self.request_timeout, Ws::connect(url.as_str()))
                .await
                .map_err(|_| DataplaneError::endpoint_unavailable(endpoint.url.as_str(), "connect timed out"))?
                .map_err(|e| DataplaneError::endpoint_unavailable(endpoint.url.as_str(), e))?;

            EthersProvider::Ws(Provider::new(ws))
        } else {
            info!(endpoint = endpoint.url, "Initializing HTTP provider");

            let http_client = Client::builder().timeout(self.request_timeout).build()?;
            let provider = Provider::new(Http::new_with_client(url, http_client)).interval(self.poll_interval);

            EthersProvider::Http(provider)
        };

        Ok(Arc::new(EthersTransport {
            endpoint: endpoint.url.clone(),
            provider,
        }))
    }
}

#[derive(Debug, Clone)]
enum EthersProvider {
    Http(Provider<Http>),
    Ws(Provider<Ws>),
}

/// `ChainTransport` over an ethers provider
#[derive(Debug)]
pub struct EthersTransport {
    endpoint: String,
    provider: EthersProvider,
}

impl EthersTransport {
    fn classify(&self, err: ProviderError) -> DataplaneError {
        classify_provider_error(&self.endpoint, err)
    }
}

/// Split provider errors into endpoint failures and contract read failures.
///
/// A node that answered with a revert is healthy; the contract is not.
fn classify_provider_error(endpoint: &str, err: ProviderError) -> DataplaneError {
    let reverted = match &err {
        ProviderError::JsonRpcClientError(inner) => inner
            .as_error_response()
            .map(|resp| resp.code == 3 || resp.message.to_lowercase().contains("revert"))
            .unwrap_or(false),
        ProviderError::SerdeJson(_) | ProviderError::HexError(_) => true,
        _ => false,
    };

    if reverted {
        DataplaneError::read_failure(endpoint, err)
    } else {
        DataplaneError::endpoint_unavailable(endpoint, err)
    }
}

fn call_request(to: Address, data: Bytes) -> TypedTransaction {
    let mut tx = TypedTransaction::default();
    tx.set_to(NameOrAddress::Address(to));
    tx.set_data(data);
    tx
}

#[async_trait]
impl ChainTransport for EthersTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn block_number(&self) -> Result<u64> {
        let block = match &self.provider {
            EthersProvider::Http(p) => p.get_block_number().await,
            EthersProvider::Ws(p) => p.get_block_number().await,
        }
        .map_err(|e| self.classify(e))?;

        Ok(block.as_u64())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = call_request(to, data);
        match &self.provider {
            EthersProvider::Http(p) => p.call(&tx, None).await,
            EthersProvider::Ws(p) => p.call(&tx, None).await,
        }
        .map_err(|e| self.classify(e))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let hash = match &self.provider {
            EthersProvider::Http(p) => p.send_raw_transaction(raw).await.map(|pending| *pending),
            EthersProvider::Ws(p) => p.send_raw_transaction(raw).await.map(|pending| *pending),
        }
        .map_err(|e| self.classify(e))?;

        debug!(endpoint = self.endpoint, tx_hash = ?hash, "Raw transaction broadcast");
        Ok(hash)
    }

    async fn subscribe_logs(&self, filter: Filter, sink: mpsc::Sender<Log>) -> Result<SubscriptionHandle> {
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<(), ProviderError>>();
        let endpoint = self.endpoint.clone();
        let token = cancel.clone();

        match self.provider.clone() {
            EthersProvider::Ws(provider) => {
                tokio::spawn(async move {
                    match provider.subscribe_logs(&filter).await {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            forward_logs(stream, sink, token, &endpoint).await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                });
            }
            EthersProvider::Http(provider) => {
                tokio::spawn(async move {
                    match provider.watch(&filter).await {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            forward_logs(stream, sink, token, &endpoint).await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                });
            }
        }

        ready_rx
            .await
            .map_err(|_| DataplaneError::internal("log subscription task dropped before reporting"))?
            .map_err(|e| self.classify(e))?;

        Ok(SubscriptionHandle::new(cancel))
    }
}

async fn forward_logs<S>(stream: S, sink: mpsc::Sender<Log>, cancel: CancellationToken, endpoint: &str)
where
    S: Stream<Item = Log>,
{
    tokio::pin!(stream);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(log) => {
                    if sink.send(log).await.is_err() {
                        debug!(endpoint = endpoint, "Log receiver dropped");
                        break;
                    }
                }
                None => {
                    warn!(endpoint = endpoint, "Log subscription stream ended");
                    break;
                }
            }
        }
    }

    // The handle reports inactive from here on; the watchdog re-arms it
    cancel.cancel();
}
