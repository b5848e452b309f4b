//! Triangular arbitrage: three-pool token cycles A -> B -> C -> A

use std::collections::HashSet;

use ethers::types::Address;
use tracing::debug;

use qenus_pool_dataplane::{PoolId, PoolRegistry};

use crate::detectors::pricing::{leg_rate, FeeTable};
use crate::types::{OpportunityKind, OpportunityRecord};

/// `product(rates) - 1 - sum(fees)`, clamped to zero.
///
/// Any zero or non-finite leg rate yields `0.0`.
pub fn triangular_edge(rates: [f64; 3], fees: [f64; 3]) -> f64 {
    if rates.iter().any(|r| !r.is_finite() || *r <= 0.0) {
        return 0.0;
    }

    let cycle_rate: f64 = rates.iter().product();
    let edge = cycle_rate - 1.0 - fees.iter().sum::<f64>();
    if edge.is_finite() && edge > 0.0 {
        edge
    } else {
        0.0
    }
}

/// A directed cycle; leg `i` sells `tokens[i]` into pool `legs[i]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triangle {
    pub legs: [PoolId; 3],
    pub tokens: [Address; 3],
}

impl Triangle {
    /// Legs rotated so the smallest id comes first; equal for every
    /// starting point of the same directed cycle
    pub fn canonical(&self) -> [PoolId; 3] {
        let start = (0..3).min_by_key(|&i| self.legs[i]).unwrap_or(0);
        [
            self.legs[start],
            self.legs[(start + 1) % 3],
            self.legs[(start + 2) % 3],
        ]
    }
}

/// Every directed cycle that uses `pool` as one of its legs.
///
/// Walks the adjacency of the pool's far token for the second leg and the
/// pair index for the closing leg, so cost is bounded by local token degree.
pub fn triangles_through(registry: &PoolRegistry, pool: PoolId) -> Vec<Triangle> {
    let Some(first) = registry.pool(pool) else {
        return Vec::new();
    };

    let mut triangles = Vec::new();
    for (a, b) in [(first.token0, first.token1), (first.token1, first.token0)] {
        for &second_id in registry.token_ids(b) {
            if second_id == pool {
                continue;
            }
            let Some(c) = registry.pool(second_id).and_then(|second| second.other_token(b)) else {
                continue;
            };
            if c == a || c == b {
                continue;
            }

            for &third_id in registry.pair_ids(c, a) {
                if third_id == pool || third_id == second_id {
                    continue;
                }
                triangles.push(Triangle {
                    legs: [pool, second_id, third_id],
                    tokens: [a, b, c],
                });
            }
        }
    }

    triangles
}

/// Triangle arbitrage detector over token adjacency
#[derive(Debug, Clone)]
pub struct TriangleArbDetector {
    fees: FeeTable,
    notional_usd: f64,
    min_profit_usd: f64,
}

impl TriangleArbDetector {
    pub fn new(fees: FeeTable, notional_usd: f64, min_profit_usd: f64) -> Self {
        Self {
            fees,
            notional_usd,
            min_profit_usd,
        }
    }

    /// Exhaustive pass; each directed cycle is evaluated once
    pub fn detect_all(&self, registry: &PoolRegistry) -> Vec<OpportunityRecord> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (id, _) in registry.iter() {
            for triangle in triangles_through(registry, id) {
                if !seen.insert(triangle.canonical()) {
                    continue;
                }
                if let Some(record) = self.evaluate(registry, &triangle) {
                    records.push(record);
                }
            }
        }

        debug!(cycles = seen.len(), emitted = records.len(), "Triangle full pass");
        records
    }

    /// Only cycles that pass through `pool`
    pub fn detect_around(&self, registry: &PoolRegistry, pool: PoolId) -> Vec<OpportunityRecord> {
        triangles_through(registry, pool)
            .iter()
            .filter_map(|triangle| self.evaluate(registry, triangle))
            .collect()
    }

    fn evaluate(&self, registry: &PoolRegistry, triangle: &Triangle) -> Option<OpportunityRecord> {
        let mut rates = [0.0; 3];
        let mut fees = [0.0; 3];
        let mut pools = Vec::with_capacity(3);
        let mut exchanges = Vec::with_capacity(3);

        for i in 0..3 {
            let pool = registry.pool(triangle.legs[i])?;
            rates[i] = leg_rate(pool, triangle.tokens[i])?;
            fees[i] = self.fees.fraction(&pool.exchange);
            pools.push(pool.address);
            exchanges.push(pool.exchange.clone());
        }

        let edge = triangular_edge(rates, fees);
        let profit = edge * self.notional_usd;
        if edge <= 0.0 || profit < self.min_profit_usd {
            return None;
        }

        debug!(pools = ?pools, rates = ?rates, edge, "Triangular opportunity");

        let [a, b, c] = triangle.tokens;
        Some(OpportunityRecord::new(
            OpportunityKind::Triangular,
            vec![a, b, c, a],
            pools,
            exchanges,
            edge,
            self.notional_usd,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use qenus_pool_dataplane::Pool;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn pool(address: u8, token0: u8, token1: u8) -> Pool {
        Pool::new("uniswap", addr(address), addr(token0), addr(token1), U256::from(1_000), U256::from(1_000))
    }

    #[test]
    fn test_unit_cycle_with_fees_is_zero() {
        assert_eq!(triangular_edge([1.0, 1.0, 1.0], [0.003, 0.003, 0.003]), 0.0);
        assert_eq!(triangular_edge([2.0, 0.5, 1.0], [0.0001, 0.0, 0.0]), 0.0);
        assert_eq!(triangular_edge([2.0, 0.0, 1.0], [0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_edge_subtracts_fees_from_gross() {
        let edge = triangular_edge([2.0, 0.6, 0.9], [0.002, 0.002, 0.002]);
        assert!((edge - 0.074).abs() < 1e-9);
    }

    #[test]
    fn test_triangles_through_finds_both_directions() {
        let mut registry = PoolRegistry::new();
        let p = registry.upsert_pool(pool(0xa0, 1, 2)).id();
        registry.upsert_pool(pool(0xa1, 2, 3));
        registry.upsert_pool(pool(0xa2, 3, 1));
        // Not part of any cycle
        registry.upsert_pool(pool(0xa3, 2, 4));

        let triangles = triangles_through(&registry, p);
        assert_eq!(triangles.len(), 2);
        assert!(triangles.iter().all(|t| t.legs[0] == p));
        assert_ne!(triangles[0].canonical(), triangles[1].canonical());
    }

    #[test]
    fn test_parallel_pools_multiply_cycles() {
        let mut registry = PoolRegistry::new();
        let p = registry.upsert_pool(pool(0xa0, 1, 2)).id();
        registry.upsert_pool(pool(0xa1, 2, 3));
        registry.upsert_pool(pool(0xa2, 3, 1));
        registry.upsert_pool(pool(0xa4, 1, 3));

        // Two closing legs for C -> A, in both directions
        assert_eq!(triangles_through(&registry, p).len(), 4);
    }

    #[test]
    fn test_full_pass_dedupes_rotations() {
        let mut registry = PoolRegistry::new();
        let (a, b, c) = (addr(1), addr(2), addr(3));
        // A->B 2.0, B->C 0.6, C->A 0.9
        registry.upsert_pool(Pool::new("uniswap", addr(0xa0), a, b, U256::from(1_000_000), U256::from(2_000_000)));
        registry.upsert_pool(Pool::new("uniswap", addr(0xa1), b, c, U256::from(1_000_000), U256::from(600_000)));
        registry.upsert_pool(Pool::new("uniswap", addr(0xa2), c, a, U256::from(1_000_000), U256::from(900_000)));

        let detector = TriangleArbDetector::new(FeeTable::new(20), 10_000.0, 0.0);
        let records = detector.detect_all(&registry);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].route, vec![a, b, c, a]);
        assert!((records[0].edge - 0.074).abs() < 1e-9);
    }
}
