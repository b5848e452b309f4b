//! # Qenus Pool Dataplane
//!
//! The chain-data layer of the arbitrage stack - keeps an RPC connection alive
//! across unreliable endpoints, maintains the in-memory pool registry, and
//! seeds it from exchange factories.

pub mod config;
pub mod contracts;
pub mod error;
pub mod prices;
pub mod providers;
pub mod registry;
pub mod scanner;
pub mod types;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

// Re-export commonly used types
pub use config::ChainDataConfig;
pub use error::{DataplaneError, Result};
pub use registry::{PoolRegistry, SharedRegistry, Upsert};
pub use types::*;

/// Current version of the dataplane
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Chain whose pools are tracked; one per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[serde(alias = "mainnet")]
    Ethereum,
    Arbitrum,
    Optimism,
    Base,
    #[serde(alias = "bnb")]
    Bsc,
    Polygon,
}

impl Chain {
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Bsc => "bsc",
            Chain::Polygon => "polygon",
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
