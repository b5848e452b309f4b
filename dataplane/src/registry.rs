//! Pool registry: the authoritative set of tracked pools
//!
//! Pools live in an append-only arena addressed by [`PoolId`]. Three indices
//! point into it: by pool address, by unordered token pair, and by member
//! token. Membership never shrinks during a run; only reserves change, and
//! every reserve write bumps the pool's version.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use ethers::types::{Address, U256};
use parking_lot::RwLock;
use tracing::debug;

use crate::{DataplaneError, PairKey, Pool, PoolId, ReserveSnapshot, Result};

/// Registry shared between the scanner, the driver and the engine.
///
/// Guards are short-lived and never held across an `.await`.
pub type SharedRegistry = Arc<RwLock<PoolRegistry>>;

/// Result of an [`PoolRegistry::upsert_pool`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted(PoolId),
    Refreshed(PoolId),
}

impl Upsert {
    pub fn id(&self) -> PoolId {
        match self {
            Upsert::Inserted(id) | Upsert::Refreshed(id) => *id,
        }
    }
}

#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: Vec<Pool>,
    by_address: HashMap<Address, PoolId>,
    by_pair: HashMap<PairKey, Vec<PoolId>>,
    by_token: HashMap<Address, Vec<PoolId>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry behind a lock
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert a pool, or refresh the reserves of an already registered address.
    ///
    /// Index membership is written only on first insert, so repeated calls
    /// never duplicate entries.
    pub fn upsert_pool(&mut self, pool: Pool) -> Upsert {
        if let Some(&id) = self.by_address.get(&pool.address) {
            let existing = &mut self.pools[id.0];
            existing.reserve0 = pool.reserve0;
            existing.reserve1 = pool.reserve1;
            existing.block_timestamp_last = pool.block_timestamp_last;
            existing.updated_at = Utc::now();
            existing.version += 1;
            return Upsert::Refreshed(id);
        }

        let id = PoolId(self.pools.len());
        self.by_address.insert(pool.address, id);
        self.by_pair.entry(pool.pair_key()).or_default().push(id);
        self.by_token.entry(pool.token0).or_default().push(id);
        if pool.token1 != pool.token0 {
            self.by_token.entry(pool.token1).or_default().push(id);
        }

        debug!(pool = ?pool.address, exchange = pool.exchange, id = id.0, "Pool registered");
        self.pools.push(pool);
        Upsert::Inserted(id)
    }

    /// Update reserves and timestamp of a registered pool
    pub fn refresh_reserves(&mut self, address: Address, reserve0: U256, reserve1: U256) -> Result<PoolId> {
        let id = *self
            .by_address
            .get(&address)
            .ok_or(DataplaneError::UnknownPool(address))?;

        let pool = &mut self.pools[id.0];
        pool.reserve0 = reserve0;
        pool.reserve1 = reserve1;
        pool.updated_at = Utc::now();
        pool.version += 1;
        Ok(id)
    }

    /// [`Self::refresh_reserves`] from a `getReserves()` snapshot
    pub fn apply_snapshot(&mut self, address: Address, snapshot: &ReserveSnapshot) -> Result<PoolId> {
        let id = self.refresh_reserves(address, snapshot.reserve0, snapshot.reserve1)?;
        self.pools[id.0].block_timestamp_last = snapshot.block_timestamp_last;
        Ok(id)
    }

    pub fn pool(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(id.0)
    }

    pub fn id_of(&self, address: Address) -> Option<PoolId> {
        self.by_address.get(&address).copied()
    }

    pub fn pool_by_address(&self, address: Address) -> Option<&Pool> {
        self.id_of(address).and_then(|id| self.pool(id))
    }

    /// Ids of every pool trading `a`/`b`, in insertion order
    pub fn pair_ids(&self, a: Address, b: Address) -> &[PoolId] {
        self.by_pair
            .get(&PairKey::new(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids of every pool containing `token`, in insertion order
    pub fn token_ids(&self, token: Address) -> &[PoolId] {
        self.by_token.get(&token).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pools_for_pair(&self, a: Address, b: Address) -> Vec<&Pool> {
        self.resolve(self.pair_ids(a, b))
    }

    pub fn pools_for_token(&self, token: Address) -> Vec<&Pool> {
        self.resolve(self.token_ids(token))
    }

    /// Pair groups in arbitrary order
    pub fn pair_groups(&self) -> impl Iterator<Item = (&PairKey, &[PoolId])> {
        self.by_pair.iter().map(|(key, ids)| (key, ids.as_slice()))
    }

    /// Pools in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &Pool)> {
        self.pools.iter().enumerate().map(|(i, pool)| (PoolId(i), pool))
    }

    /// Every tracked pool address, in insertion order
    pub fn addresses(&self) -> Vec<Address> {
        self.pools.iter().map(|pool| pool.address).collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.by_token.len()
    }

    fn resolve(&self, ids: &[PoolId]) -> Vec<&Pool> {
        ids.iter().filter_map(|id| self.pool(*id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn pool(address: u8, token0: u8, token1: u8) -> Pool {
        Pool::new("uniswap", addr(address), addr(token0), addr(token1), U256::from(1_000), U256::from(2_000))
    }

    #[test]
    fn test_indices_cover_both_tokens() {
        let mut registry = PoolRegistry::new();
        registry.upsert_pool(pool(0xa0, 1, 2));
        registry.upsert_pool(pool(0xa1, 2, 1));
        registry.upsert_pool(pool(0xa2, 2, 3));

        assert_eq!(registry.pools_for_pair(addr(1), addr(2)).len(), 2);
        assert_eq!(registry.pools_for_pair(addr(2), addr(1)).len(), 2);
        assert_eq!(registry.pools_for_token(addr(2)).len(), 3);
        assert_eq!(registry.pools_for_token(addr(3)).len(), 1);
        assert!(registry.pools_for_pair(addr(1), addr(3)).is_empty());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut registry = PoolRegistry::new();
        assert!(matches!(registry.upsert_pool(pool(0xa0, 1, 2)), Upsert::Inserted(PoolId(0))));

        let mut updated = pool(0xa0, 1, 2);
        updated.reserve0 = U256::from(5);
        assert!(matches!(registry.upsert_pool(updated), Upsert::Refreshed(PoolId(0))));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pair_ids(addr(1), addr(2)), &[PoolId(0)]);
        assert_eq!(registry.token_ids(addr(1)), &[PoolId(0)]);
        assert_eq!(registry.token_ids(addr(2)), &[PoolId(0)]);

        let stored = registry.pool_by_address(addr(0xa0)).unwrap();
        assert_eq!(stored.reserve0, U256::from(5));
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn test_refresh_unknown_pool_fails() {
        let mut registry = PoolRegistry::new();
        let err = registry
            .refresh_reserves(addr(0xee), U256::from(1), U256::from(1))
            .unwrap_err();
        assert!(matches!(err, DataplaneError::UnknownPool(a) if a == addr(0xee)));
    }

    #[test]
    fn test_refresh_touches_only_target() {
        let mut registry = PoolRegistry::new();
        registry.upsert_pool(pool(0xa0, 1, 2));
        registry.upsert_pool(pool(0xa1, 1, 2));
        let untouched = registry.pool_by_address(addr(0xa1)).unwrap().clone();

        registry
            .refresh_reserves(addr(0xa0), U256::from(7), U256::from(9))
            .unwrap();

        let refreshed = registry.pool_by_address(addr(0xa0)).unwrap();
        assert_eq!((refreshed.reserve0, refreshed.reserve1), (U256::from(7), U256::from(9)));
        assert_eq!(refreshed.version, 1);
        assert_eq!(registry.pool_by_address(addr(0xa1)).unwrap(), &untouched);
    }
}
