//! Direct arbitrage: one token pair priced differently on two exchanges

use tracing::debug;

use qenus_pool_dataplane::{Pool, PoolId, PoolRegistry};

use crate::detectors::pricing::{price, FeeTable};
use crate::types::{OpportunityKind, OpportunityRecord};

/// Relative price gap minus both fees, never negative.
///
/// `|pA - pB| / midpoint(pA, pB) - (feeA + feeB)`; zero or non-finite prices
/// yield `0.0`.
pub fn estimate_direct_edge(price_a: f64, price_b: f64, fee_a: f64, fee_b: f64) -> f64 {
    if !(price_a.is_finite() && price_b.is_finite()) || price_a <= 0.0 || price_b <= 0.0 {
        return 0.0;
    }
    if price_a == price_b {
        return 0.0;
    }

    let midpoint = (price_a + price_b) / 2.0;
    let edge = (price_a - price_b).abs() / midpoint - (fee_a + fee_b);
    if edge.is_finite() && edge > 0.0 {
        edge
    } else {
        0.0
    }
}

/// Direct arbitrage detector over pair groups
#[derive(Debug, Clone)]
pub struct DirectArbDetector {
    fees: FeeTable,
    notional_usd: f64,
    min_profit_usd: f64,
}

impl DirectArbDetector {
    pub fn new(fees: FeeTable, notional_usd: f64, min_profit_usd: f64) -> Self {
        Self {
            fees,
            notional_usd,
            min_profit_usd,
        }
    }

    /// Every pair group in the registry
    pub fn detect_all(&self, registry: &PoolRegistry) -> Vec<OpportunityRecord> {
        registry
            .pair_groups()
            .filter(|(_, ids)| ids.len() >= 2)
            .flat_map(|(_, ids)| self.detect_group(registry, ids, None))
            .collect()
    }

    /// Only pairings of `pool` with the rest of its pair group
    pub fn detect_around(&self, registry: &PoolRegistry, pool: PoolId) -> Vec<OpportunityRecord> {
        let Some(anchor) = registry.pool(pool) else {
            return Vec::new();
        };
        self.detect_group(registry, registry.pair_ids(anchor.token0, anchor.token1), Some(pool))
    }

    fn detect_group(&self, registry: &PoolRegistry, ids: &[PoolId], anchor: Option<PoolId>) -> Vec<OpportunityRecord> {
        let mut records = Vec::new();

        for (i, &id_a) in ids.iter().enumerate() {
            for &id_b in &ids[i + 1..] {
                if anchor.map_or(false, |p| p != id_a && p != id_b) {
                    continue;
                }

                let (Some(a), Some(b)) = (registry.pool(id_a), registry.pool(id_b)) else {
                    continue;
                };
                if a.exchange == b.exchange {
                    continue;
                }

                if let Some(record) = self.evaluate(a, b) {
                    records.push(record);
                }
            }
        }

        records
    }

    fn evaluate(&self, a: &Pool, b: &Pool) -> Option<OpportunityRecord> {
        // Orient both prices by the pair key so token0/token1 order does not matter
        let key = a.pair_key();
        let (first, second) = (key.first(), key.second());
        let oriented = |pool: &Pool| -> Option<f64> { Some(price(pool.reserve_of(first)?, pool.reserve_of(second)?)) };
        let (price_a, price_b) = (oriented(a)?, oriented(b)?);

        let edge = estimate_direct_edge(price_a, price_b, self.fees.fraction(&a.exchange), self.fees.fraction(&b.exchange));
        let profit = edge * self.notional_usd;
        if edge <= 0.0 || profit < self.min_profit_usd {
            return None;
        }

        // Sell `second` where it buys the most `first`, then sell `first` back on the other pool
        let (rich, cheap) = if price_a >= price_b { (a, b) } else { (b, a) };

        debug!(
            pair = ?key,
            rich = ?rich.address,
            cheap = ?cheap.address,
            price_a,
            price_b,
            edge,
            "Direct opportunity"
        );

        Some(OpportunityRecord::new(
            OpportunityKind::Direct,
            vec![second, first, second],
            vec![rich.address, cheap.address],
            vec![rich.exchange.clone(), cheap.exchange.clone()],
            edge,
            self.notional_usd,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, U256};
    use proptest::prelude::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_equal_prices_yield_zero_edge() {
        assert_eq!(estimate_direct_edge(100.0, 100.0, 0.0, 0.0), 0.0);
        assert_eq!(estimate_direct_edge(100.0, 100.0, 0.003, 0.003), 0.0);
        assert_eq!(estimate_direct_edge(0.0, 100.0, 0.0, 0.0), 0.0);
        assert_eq!(estimate_direct_edge(f64::NAN, 100.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_fees_consume_small_gaps() {
        // 1% gap, 0.6% total fees
        let edge = estimate_direct_edge(100.0, 101.0, 0.003, 0.003);
        assert!((edge - (1.0 / 100.5 - 0.006)).abs() < 1e-12);
        assert_eq!(estimate_direct_edge(100.0, 100.2, 0.003, 0.003), 0.0);
    }

    #[test]
    fn test_same_exchange_pools_are_not_paired() {
        let mut registry = PoolRegistry::new();
        let (a, b) = (addr(1), addr(2));
        registry.upsert_pool(Pool::new("uniswap", addr(0xa0), a, b, U256::from(100_000), U256::from(1_000)));
        registry.upsert_pool(Pool::new("uniswap", addr(0xa1), a, b, U256::from(200_000), U256::from(1_000)));

        let detector = DirectArbDetector::new(FeeTable::new(0), 10_000.0, 0.0);
        assert!(detector.detect_all(&registry).is_empty());
    }

    #[test]
    fn test_orientation_independent_of_token_order() {
        let mut registry = PoolRegistry::new();
        let (a, b) = (addr(1), addr(2));
        // Same price, tokens listed in opposite order
        registry.upsert_pool(Pool::new("uniswap", addr(0xa0), a, b, U256::from(100_000), U256::from(1_000)));
        registry.upsert_pool(Pool::new("sushiswap", addr(0xa1), b, a, U256::from(1_000), U256::from(100_000)));

        let detector = DirectArbDetector::new(FeeTable::new(0), 10_000.0, 0.0);
        assert!(detector.detect_all(&registry).is_empty());
    }

    proptest! {
        #[test]
        fn prop_direct_edge_non_negative(
            price_a in 0.0f64..1e12,
            price_b in 0.0f64..1e12,
            fee_a in 0.0f64..0.1,
            fee_b in 0.0f64..0.1,
        ) {
            prop_assert!(estimate_direct_edge(price_a, price_b, fee_a, fee_b) >= 0.0);
            prop_assert_eq!(estimate_direct_edge(price_a, price_a, fee_a, fee_b), 0.0);
        }
    }
}
