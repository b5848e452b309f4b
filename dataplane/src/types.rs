//! Core data types shared by the dataplane and its consumers

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Which side of the chain client an endpoint pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolRole {
    /// Reads, contract calls and log subscriptions
    Read,
    /// Raw transaction broadcast
    Write,
}

impl PoolRole {
    pub fn name(&self) -> &'static str {
        match self {
            PoolRole::Read => "read",
            PoolRole::Write => "write",
        }
    }
}

impl std::fmt::Display for PoolRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single RPC endpoint and its lifetime failure count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint URL (http(s) or ws(s))
    pub url: String,

    /// Failures recorded against this endpoint; never decreases
    pub failures: u64,
}

impl Endpoint {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            failures: 0,
        }
    }

    /// Whether the endpoint speaks a pub/sub transport
    pub fn is_websocket(&self) -> bool {
        self.url.starts_with("ws://") || self.url.starts_with("wss://")
    }
}

/// Arena index of a pool inside the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub usize);

/// Order-independent key for a token pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(Address, Address);

impl PairKey {
    /// Build the key; `PairKey::new(a, b) == PairKey::new(b, a)`
    pub fn new(a: Address, b: Address) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Lower-sorted token
    pub fn first(&self) -> Address {
        self.0
    }

    /// Higher-sorted token
    pub fn second(&self) -> Address {
        self.1
    }
}

/// Output of a pair's `getReserves()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveSnapshot {
    pub reserve0: U256,
    pub reserve1: U256,
    pub block_timestamp_last: u32,
}

/// One constant-product liquidity pair on one exchange
///
/// Reserves are raw token base units; no decimal normalization is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    /// Exchange name, used for fee lookup
    pub exchange: String,

    /// Pair contract address (unique key)
    pub address: Address,

    pub token0: Address,
    pub token1: Address,

    pub reserve0: U256,
    pub reserve1: U256,

    /// `blockTimestampLast` reported by the pair
    pub block_timestamp_last: u32,

    /// Local time of the last reserve write
    pub updated_at: DateTime<Utc>,

    /// Bumped on every reserve write
    pub version: u64,
}

impl Pool {
    /// Create a new pool record
    pub fn new<S: Into<String>>(
        exchange: S,
        address: Address,
        token0: Address,
        token1: Address,
        reserve0: U256,
        reserve1: U256,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            address,
            token0,
            token1,
            reserve0,
            reserve1,
            block_timestamp_last: 0,
            updated_at: Utc::now(),
            version: 0,
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(self.token0, self.token1)
    }

    pub fn contains(&self, token: Address) -> bool {
        self.token0 == token || self.token1 == token
    }

    /// The token on the other side of `token`, if `token` belongs to the pool
    pub fn other_token(&self, token: Address) -> Option<Address> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    /// Reserve held for `token`
    pub fn reserve_of(&self, token: Address) -> Option<U256> {
        if token == self.token0 {
            Some(self.reserve0)
        } else if token == self.token1 {
            Some(self.reserve1)
        } else {
            None
        }
    }
}

/// Lossy conversion of a 256-bit integer into a float
pub fn u256_to_f64(value: U256) -> f64 {
    const LIMB: f64 = 18_446_744_073_709_551_616.0; // 2^64
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * LIMB + *limb as f64)
}
