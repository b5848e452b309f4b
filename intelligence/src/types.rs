//! Core types for the intelligence layer

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opportunity shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    /// Same pair, two exchanges
    Direct,
    /// Three-pool token cycle
    Triangular,
}

impl OpportunityKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpportunityKind::Direct => "direct",
            OpportunityKind::Triangular => "triangular",
        }
    }
}

impl std::fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An emitted arbitrage opportunity; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    /// Stable identifier used by downstream stages to resolve the record
    pub id: Uuid,

    pub kind: OpportunityKind,

    /// Token route, closed (first token repeated at the end)
    pub route: Vec<Address>,

    /// Pools in trade order
    pub pools: Vec<Address>,

    /// Exchange of each pool, same order as `pools`
    pub exchanges: Vec<String>,

    /// Fractional profit after fees
    pub edge: f64,

    /// `edge` times the configured notional
    pub estimated_profit_usd: f64,

    pub detected_at: DateTime<Utc>,
}

impl OpportunityRecord {
    pub fn new(
        kind: OpportunityKind,
        route: Vec<Address>,
        pools: Vec<Address>,
        exchanges: Vec<String>,
        edge: f64,
        notional_usd: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            route,
            pools,
            exchanges,
            edge,
            estimated_profit_usd: edge * notional_usd,
            detected_at: Utc::now(),
        }
    }

    /// Age relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.detected_at
    }
}
