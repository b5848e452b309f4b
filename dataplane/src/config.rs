//! Configuration for the chain-data layer

use std::collections::HashMap;
use std::time::Duration;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Chain, DataplaneError, Result};

/// Chain-data configuration: endpoints, exchanges and the liquidity gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDataConfig {
    /// Chain being tracked
    pub chain: Chain,

    /// Endpoint pools
    pub endpoints: EndpointsConfig,

    /// Liveness watchdog
    pub watchdog: WatchdogConfig,

    /// Exchanges to enumerate at bootstrap
    pub exchanges: Vec<ExchangeConfig>,

    /// Liquidity gate
    pub liquidity: LiquidityConfig,

    /// Known token prices and metadata, keyed by address
    pub tokens: HashMap<Address, TokenConfig>,

    /// Swap notification settings
    pub events: EventsConfig,
}

/// Read and write endpoint lists; the two are never shared
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Ordered read endpoints
    pub read: Vec<String>,

    /// Ordered write/broadcast endpoints
    pub write: Vec<String>,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl EndpointsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Background liveness probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Probe interval in milliseconds
    pub interval_ms: u64,

    /// Consecutive probe failures before forcing a rotation
    pub failure_threshold: u32,
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// One exchange factory to enumerate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Exchange name, also the fee table key
    pub name: String,

    /// Factory contract address; a missing factory skips the exchange
    #[serde(default)]
    pub factory: Option<Address>,

    /// Fee override in basis points
    #[serde(default)]
    pub fee_bps: Option<u32>,

    /// Pairs fetched per enumeration page
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Optional cap on enumerated pairs
    #[serde(default)]
    pub max_pairs: Option<u64>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_page_size() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

/// Liquidity gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityConfig {
    /// Minimum USD value each reserve must exceed
    pub min_reserve_usd: f64,
}

/// Static token metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Symbol for logging
    #[serde(default)]
    pub symbol: Option<String>,

    /// USD price used by the liquidity gate
    pub usd_price: f64,

    /// Decimals; read on-chain when absent
    #[serde(default)]
    pub decimals: Option<u8>,
}

/// Swap notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Event signature whose topic marks a reserve change
    pub swap_event_signature: String,

    /// Pool addresses per log subscription
    pub addresses_per_subscription: usize,

    /// Capacity of the notification channel
    pub channel_capacity: usize,
}

impl Default for ChainDataConfig {
    fn default() -> Self {
        Self {
            chain: Chain::Ethereum,
            endpoints: EndpointsConfig {
                read: vec!["ws://127.0.0.1:8546".to_string()],
                write: vec!["http://127.0.0.1:8545".to_string()],
                request_timeout_ms: 5_000,
            },
            watchdog: WatchdogConfig {
                interval_ms: 10_000,
                failure_threshold: 3,
            },
            exchanges: Vec::new(),
            liquidity: LiquidityConfig {
                min_reserve_usd: 10_000.0,
            },
            tokens: HashMap::new(),
            events: EventsConfig {
                swap_event_signature: crate::contracts::UNISWAP_V2_SWAP_SIGNATURE.to_string(),
                addresses_per_subscription: 500,
                channel_capacity: 4_096,
            },
        }
    }
}

impl ChainDataConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.read.is_empty() {
            return Err(DataplaneError::invalid_config("at least one read endpoint is required"));
        }

        for url in self.endpoints.read.iter().chain(self.endpoints.write.iter()) {
            if Url::parse(url).is_err() {
                return Err(DataplaneError::invalid_config(format!("Invalid endpoint URL: {}", url)));
            }
        }

        if let Some(shared) = self
            .endpoints
            .read
            .iter()
            .find(|url| self.endpoints.write.contains(url))
        {
            return Err(DataplaneError::invalid_config(format!(
                "Endpoint {} is listed as both read and write",
                shared
            )));
        }

        if self.endpoints.request_timeout_ms == 0 {
            return Err(DataplaneError::invalid_config("request_timeout_ms must be greater than 0"));
        }

        if self.watchdog.failure_threshold == 0 {
            return Err(DataplaneError::invalid_config("watchdog failure_threshold must be greater than 0"));
        }

        if self.events.addresses_per_subscription == 0 || self.events.channel_capacity == 0 {
            return Err(DataplaneError::invalid_config(
                "addresses_per_subscription and channel_capacity must be greater than 0",
            ));
        }

        if self.liquidity.min_reserve_usd < 0.0 {
            return Err(DataplaneError::invalid_config("min_reserve_usd cannot be negative"));
        }

        Ok(())
    }

    /// Enabled exchanges
    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }
}
