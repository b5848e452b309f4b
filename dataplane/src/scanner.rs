//! Bootstrap scanner: factory enumeration and the liquidity gate
//!
//! For each configured exchange the scanner walks the factory's pair list in
//! index pages, reads tokens and reserves of every new pair, values both
//! reserves in USD and registers the pairs that clear the gate. Pairs that
//! fail the gate are remembered and never read again during the run; pairs
//! already registered only get their reserves refreshed on later scans.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use ethers::types::{Address, U256};
use tracing::{debug, error, info, warn};

use crate::config::{ChainDataConfig, ExchangeConfig};
use crate::prices::TokenPriceSource;
use crate::providers::ChainClient;
use crate::registry::{SharedRegistry, Upsert};
use crate::types::u256_to_f64;
use crate::{DataplaneError, Pool, ReserveSnapshot, Result};

/// Outcome of the liquidity gate for one pool
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Admit { usd0: f64, usd1: f64 },
    BelowThreshold { usd0: f64, usd1: f64 },
    MissingPrice(Address),
    MissingDecimals(Address),
}

/// Minimum USD value both reserves must exceed
#[derive(Debug, Clone, Copy)]
pub struct LiquidityGate {
    min_reserve_usd: f64,
}

impl LiquidityGate {
    pub fn new(min_reserve_usd: f64) -> Self {
        Self { min_reserve_usd }
    }

    /// USD value of a raw reserve
    pub fn reserve_usd(reserve: U256, decimals: u8, usd_price: f64) -> f64 {
        u256_to_f64(reserve) / 10f64.powi(decimals as i32) * usd_price
    }

    pub fn evaluate(&self, pool: &Pool, prices: &HashMap<Address, f64>, decimals: &HashMap<Address, u8>) -> GateDecision {
        let side = |token: Address, reserve: U256| -> std::result::Result<f64, GateDecision> {
            let usd = *prices.get(&token).ok_or(GateDecision::MissingPrice(token))?;
            let decimals = *decimals.get(&token).ok_or(GateDecision::MissingDecimals(token))?;
            Ok(Self::reserve_usd(reserve, decimals, usd))
        };

        let usd0 = match side(pool.token0, pool.reserve0) {
            Ok(usd) => usd,
            Err(decision) => return decision,
        };
        let usd1 = match side(pool.token1, pool.reserve1) {
            Ok(usd) => usd,
            Err(decision) => return decision,
        };

        if usd0 > self.min_reserve_usd && usd1 > self.min_reserve_usd {
            GateDecision::Admit { usd0, usd1 }
        } else {
            GateDecision::BelowThreshold { usd0, usd1 }
        }
    }
}

/// Counters for one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub exchanges_scanned: usize,
    pub exchanges_skipped: usize,
    pub pairs_enumerated: u64,
    pub pools_inserted: usize,
    pub pools_refreshed: usize,
    pub gated_out: usize,
    pub price_unknown: usize,
    pub read_failures: usize,
}

/// A pair whose tokens and reserves have been read but not yet gated
struct Candidate {
    pool: Pool,
    snapshot: ReserveSnapshot,
}

pub struct BootstrapScanner {
    client: ChainClient,
    registry: SharedRegistry,
    prices: Arc<dyn TokenPriceSource>,
    exchanges: Vec<ExchangeConfig>,
    gate: LiquidityGate,
    decimals: HashMap<Address, u8>,
    rejected: HashSet<Address>,
}

impl BootstrapScanner {
    pub fn new(
        config: &ChainDataConfig,
        client: ChainClient,
        registry: SharedRegistry,
        prices: Arc<dyn TokenPriceSource>,
    ) -> Self {
        let decimals = config
            .tokens
            .iter()
            .filter_map(|(address, token)| token.decimals.map(|d| (*address, d)))
            .collect();

        Self {
            client,
            registry,
            prices,
            exchanges: config.enabled_exchanges().cloned().collect(),
            gate: LiquidityGate::new(config.liquidity.min_reserve_usd),
            decimals,
            rejected: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Pools turned away by the gate so far
    pub fn rejected(&self) -> &HashSet<Address> {
        &self.rejected
    }

    /// Enumerate every configured exchange once
    pub async fn scan(&mut self) -> ScanReport {
        let start = Instant::now();
        let mut report = ScanReport::default();

        for exchange in self.exchanges.clone() {
            let Some(factory) = exchange.factory else {
                let err = DataplaneError::invalid_config(format!("exchange {} has no factory address", exchange.name));
                warn!(exchange = exchange.name, error = %err, "Skipping exchange");
                report.exchanges_skipped += 1;
                continue;
            };

            match self.scan_exchange(&exchange, factory, &mut report).await {
                Ok(()) => report.exchanges_scanned += 1,
                Err(e) => {
                    error!(exchange = exchange.name, factory = ?factory, error = %e, "Exchange scan abandoned");
                    report.exchanges_skipped += 1;
                }
            }
        }

        let tracked = self.registry.read().len();
        metrics::gauge!("pools_tracked", tracked as f64);

        info!(
            pools_tracked = tracked,
            inserted = report.pools_inserted,
            refreshed = report.pools_refreshed,
            gated_out = report.gated_out,
            read_failures = report.read_failures,
            duration_ms = start.elapsed().as_millis() as u64,
            "Bootstrap scan complete"
        );

        report
    }

    async fn scan_exchange(&mut self, exchange: &ExchangeConfig, factory: Address, report: &mut ScanReport) -> Result<()> {
        let count = self.client.all_pairs_length(factory).await?;
        let limit = exchange.max_pairs.map_or(count, |cap| cap.min(count));
        let page_size = exchange.page_size.max(1);

        info!(exchange = exchange.name, factory = ?factory, pairs = count, limit, "Enumerating factory");

        let mut start = 0;
        while start < limit {
            let end = (start + page_size).min(limit);
            let mut candidates = Vec::new();

            for index in start..end {
                report.pairs_enumerated += 1;
                let pair = match self.client.pair_at_index(factory, index).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!(exchange = exchange.name, index, error = %e, "Pair enumeration failed");
                        report.read_failures += 1;
                        continue;
                    }
                };

                if let Some(candidate) = self.read_pair(exchange, pair, report).await {
                    candidates.push(candidate);
                }
            }

            self.admit(candidates, report).await;
            start = end;
        }

        Ok(())
    }

    /// Refresh a registered pair, or read a new one into a gate candidate
    async fn read_pair(&mut self, exchange: &ExchangeConfig, pair: Address, report: &mut ScanReport) -> Option<Candidate> {
        if self.rejected.contains(&pair) {
            return None;
        }

        let registered = self.registry.read().id_of(pair).is_some();
        if registered {
            match self.client.get_reserves(pair).await {
                Ok(snapshot) => {
                    let refreshed = self.registry.write().apply_snapshot(pair, &snapshot);
                    if refreshed.is_ok() {
                        report.pools_refreshed += 1;
                    }
                }
                Err(e) => {
                    debug!(pool = ?pair, error = %e, "Reserve refresh failed");
                    report.read_failures += 1;
                }
            }
            return None;
        }

        let read = async {
            let (token0, token1) = self.client.pair_tokens(pair).await?;
            let snapshot = self.client.get_reserves(pair).await?;
            Ok::<_, DataplaneError>((token0, token1, snapshot))
        };

        match read.await {
            Ok((token0, token1, snapshot)) => {
                let mut pool = Pool::new(
                    exchange.name.clone(),
                    pair,
                    token0,
                    token1,
                    snapshot.reserve0,
                    snapshot.reserve1,
                );
                pool.block_timestamp_last = snapshot.block_timestamp_last;
                Some(Candidate { pool, snapshot })
            }
            Err(e) => {
                debug!(pool = ?pair, exchange = exchange.name, error = %e, "Skipping unreadable pair");
                report.read_failures += 1;
                None
            }
        }
    }

    /// Gate a page of candidates with one price lookup
    async fn admit(&mut self, candidates: Vec<Candidate>, report: &mut ScanReport) {
        if candidates.is_empty() {
            return;
        }

        let mut tokens: Vec<Address> = candidates
            .iter()
            .flat_map(|c| [c.pool.token0, c.pool.token1])
            .collect();
        tokens.sort();
        tokens.dedup();

        let prices = match self.prices.get_usd_prices(&tokens).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(tokens = tokens.len(), error = %e, "Price lookup failed, page deferred to next scan");
                report.price_unknown += candidates.len();
                return;
            }
        };

        for token in tokens.iter().filter(|t| prices.contains_key(t)) {
            self.resolve_decimals(*token).await;
        }

        for candidate in candidates {
            match self.gate.evaluate(&candidate.pool, &prices, &self.decimals) {
                GateDecision::Admit { usd0, usd1 } => {
                    let address = candidate.pool.address;
                    let upsert = self.registry.write().upsert_pool(candidate.pool);
                    if let Upsert::Inserted(id) = upsert {
                        debug!(
                            pool = ?address,
                            id = id.0,
                            usd0,
                            usd1,
                            block_timestamp_last = candidate.snapshot.block_timestamp_last,
                            "Pool admitted"
                        );
                        report.pools_inserted += 1;
                    }
                }
                GateDecision::BelowThreshold { usd0, usd1 } => {
                    debug!(pool = ?candidate.pool.address, usd0, usd1, "Pool below liquidity threshold");
                    self.rejected.insert(candidate.pool.address);
                    report.gated_out += 1;
                }
                GateDecision::MissingPrice(token) | GateDecision::MissingDecimals(token) => {
                    debug!(pool = ?candidate.pool.address, token = ?token, "Token metadata unavailable");
                    report.price_unknown += 1;
                }
            }
        }
    }

    async fn resolve_decimals(&mut self, token: Address) {
        if self.decimals.contains_key(&token) {
            return;
        }

        match self.client.token_decimals(token).await {
            Ok(decimals) => {
                self.decimals.insert(token, decimals);
            }
            Err(e) => debug!(token = ?token, error = %e, "decimals() read failed"),
        }
    }
}
