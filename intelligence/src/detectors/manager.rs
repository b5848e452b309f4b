//! Detector manager - orchestrates the direct and triangle detectors

use tracing::{debug, info};

use qenus_pool_dataplane::config::ExchangeConfig;
use qenus_pool_dataplane::{PoolId, PoolRegistry};

use crate::config::StrategyConfig;
use crate::detectors::pricing::FeeTable;
use crate::detectors::{DirectArbDetector, TriangleArbDetector};
use crate::types::OpportunityRecord;

pub struct DetectorManager {
    direct: Option<DirectArbDetector>,
    triangle: Option<TriangleArbDetector>,
    max_per_pass: usize,
}

impl DetectorManager {
    pub fn new(strategy: &StrategyConfig, fees: FeeTable) -> Self {
        Self {
            direct: strategy.direct_enabled.then(|| {
                DirectArbDetector::new(fees.clone(), strategy.notional_usd, strategy.min_profit_usd_direct)
            }),
            triangle: strategy.triangular_enabled.then(|| {
                TriangleArbDetector::new(fees, strategy.notional_usd, strategy.min_profit_usd_triangular)
            }),
            max_per_pass: strategy.max_opportunities_per_pass,
        }
    }

    /// Manager whose fee table comes from exchange overrides and the strategy default
    pub fn from_config<'a>(strategy: &StrategyConfig, exchanges: impl IntoIterator<Item = &'a ExchangeConfig>) -> Self {
        Self::new(strategy, FeeTable::from_exchanges(exchanges, strategy.default_fee_bps))
    }

    /// Exhaustive pass over every pair group and every triangle
    pub fn full_pass(&self, registry: &PoolRegistry) -> Vec<OpportunityRecord> {
        let mut records = Vec::new();

        if let Some(detector) = &self.direct {
            records.extend(detector.detect_all(registry));
        }
        if let Some(detector) = &self.triangle {
            records.extend(detector.detect_all(registry));
        }

        let ranked = self.rank(records);
        info!(pools = registry.len(), opportunities = ranked.len(), "Full pass complete");
        ranked
    }

    /// Recompute only around `pool`: its pair group and the cycles it closes
    pub fn recompute(&self, registry: &PoolRegistry, pool: PoolId) -> Vec<OpportunityRecord> {
        let mut records = Vec::new();

        if let Some(detector) = &self.direct {
            records.extend(detector.detect_around(registry, pool));
        }
        if let Some(detector) = &self.triangle {
            records.extend(detector.detect_around(registry, pool));
        }

        let ranked = self.rank(records);
        debug!(pool = pool.0, opportunities = ranked.len(), "Localized recompute");
        ranked
    }

    /// Descending estimated profit; discovery order breaks ties
    fn rank(&self, mut records: Vec<OpportunityRecord>) -> Vec<OpportunityRecord> {
        records.sort_by(|a, b| b.estimated_profit_usd.total_cmp(&a.estimated_profit_usd));
        records.truncate(self.max_per_pass);
        records
    }
}
