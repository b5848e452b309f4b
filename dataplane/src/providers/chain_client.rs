//! Chain client: independent read and write endpoint pools
//!
//! Reads, contract calls and subscriptions go through the read pool; raw
//! transaction broadcast goes through the write pool. A rotation on one side
//! never touches the other.

use std::sync::Arc;

use ethers::types::{Address, Bytes, Filter, Log, H256};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::EndpointsConfig;
use crate::contracts::AbiManager;
use crate::providers::resilient::{ResilientClient, SubscriptionId};
use crate::providers::transport::EndpointConnector;
use crate::{PoolRole, ReserveSnapshot, Result};

/// Read/write client pair for one chain
#[derive(Debug, Clone)]
pub struct ChainClient {
    read: Arc<ResilientClient>,
    write: Option<Arc<ResilientClient>>,
}

impl ChainClient {
    /// Connect both endpoint pools; the write pool is optional
    pub async fn connect(config: &EndpointsConfig, connector: Arc<dyn EndpointConnector>) -> Result<Self> {
        let read = ResilientClient::connect(
            PoolRole::Read,
            &config.read,
            connector.clone(),
            config.request_timeout(),
        )
        .await?;

        let write = if config.write.is_empty() {
            None
        } else {
            Some(Arc::new(
                ResilientClient::connect(PoolRole::Write, &config.write, connector, config.request_timeout()).await?,
            ))
        };

        Ok(Self {
            read: Arc::new(read),
            write,
        })
    }

    pub fn read(&self) -> &Arc<ResilientClient> {
        &self.read
    }

    pub fn write(&self) -> Option<&Arc<ResilientClient>> {
        self.write.as_ref()
    }

    /// Latest block number
    pub async fn block_number(&self) -> Result<u64> {
        self.read.block_number().await
    }

    /// Subscribe to logs through the read pool
    pub async fn subscribe_logs(&self, filter: Filter, sink: mpsc::Sender<Log>) -> Result<SubscriptionId> {
        self.read.subscribe(filter, sink).await
    }

    /// Broadcast a signed transaction through the write pool
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        match &self.write {
            Some(write) => write.send_raw_transaction(raw).await,
            None => Err(crate::DataplaneError::invalid_config("no write endpoints configured")),
        }
    }

    /// Pair count of a factory
    pub async fn all_pairs_length(&self, factory: Address) -> Result<u64> {
        let calldata = AbiManager::encode_all_pairs_length_call()?;
        let output = self.read.eth_call(factory, calldata).await?;
        AbiManager::decode_all_pairs_length_output(&output)
    }

    /// Pair address at `index` of a factory
    pub async fn pair_at_index(&self, factory: Address, index: u64) -> Result<Address> {
        let calldata = AbiManager::encode_all_pairs_call(index)?;
        let output = self.read.eth_call(factory, calldata).await?;
        AbiManager::decode_all_pairs_output(&output)
    }

    /// `(token0, token1)` of a pair
    pub async fn pair_tokens(&self, pair: Address) -> Result<(Address, Address)> {
        let output = self.read.eth_call(pair, AbiManager::encode_token0_call()?).await?;
        let token0 = AbiManager::decode_token_output("token0", &output)?;

        let output = self.read.eth_call(pair, AbiManager::encode_token1_call()?).await?;
        let token1 = AbiManager::decode_token_output("token1", &output)?;

        Ok((token0, token1))
    }

    /// Current reserves of a pair
    pub async fn get_reserves(&self, pair: Address) -> Result<ReserveSnapshot> {
        let calldata = AbiManager::encode_get_reserves_call()?;
        let output = self.read.eth_call(pair, calldata).await?;
        let snapshot = AbiManager::decode_get_reserves_output(&output)?;

        debug!(
            pool = ?pair,
            reserve0 = %snapshot.reserve0,
            reserve1 = %snapshot.reserve1,
            "Retrieved reserves"
        );

        Ok(snapshot)
    }

    /// ERC20 decimals
    pub async fn token_decimals(&self, token: Address) -> Result<u8> {
        let calldata = AbiManager::encode_erc20_decimals_call()?;
        let output = self.read.eth_call(token, calldata).await?;
        AbiManager::decode_erc20_decimals_output(&output)
    }
}
