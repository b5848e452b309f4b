//! Constant-product spot pricing and the exchange fee table
//!
//! Prices are ratios of raw base-unit reserves. Token decimals are not
//! normalized, so a pair whose tokens differ in decimals prices off by the
//! corresponding power of ten; comparisons inside one pair group stay
//! consistent because every pool in the group shares both tokens.

use std::collections::HashMap;

use ethers::types::{Address, U256};

use qenus_pool_dataplane::config::ExchangeConfig;
use qenus_pool_dataplane::{u256_to_f64, Pool};

/// `a / b`, or `0.0` when either side is zero or the result is not finite
pub fn price(a: U256, b: U256) -> f64 {
    let (a, b) = (u256_to_f64(a), u256_to_f64(b));
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }

    let ratio = a / b;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Pool spot price `reserve0 / reserve1`
pub fn spot_price(pool: &Pool) -> f64 {
    price(pool.reserve0, pool.reserve1)
}

/// Units of the other token received per unit of `from`, ignoring fees.
///
/// Returns `None` when `from` is not one of the pool's tokens.
pub fn leg_rate(pool: &Pool, from: Address) -> Option<f64> {
    let reserve_in = pool.reserve_of(from)?;
    let reserve_out = pool.reserve_of(pool.other_token(from)?)?;
    Some(price(reserve_out, reserve_in))
}

/// Exchange name to fee in basis points, with a default for unknown names
#[derive(Debug, Clone)]
pub struct FeeTable {
    fees: HashMap<String, u32>,
    default_bps: u32,
}

impl FeeTable {
    pub fn new(default_bps: u32) -> Self {
        Self {
            fees: HashMap::new(),
            default_bps,
        }
    }

    /// Table from exchange overrides
    pub fn from_exchanges<'a>(exchanges: impl IntoIterator<Item = &'a ExchangeConfig>, default_bps: u32) -> Self {
        let mut table = Self::new(default_bps);
        for exchange in exchanges {
            if let Some(bps) = exchange.fee_bps {
                table.set(&exchange.name, bps);
            }
        }
        table
    }

    pub fn set(&mut self, exchange: &str, bps: u32) {
        self.fees.insert(exchange.to_string(), bps);
    }

    pub fn bps(&self, exchange: &str) -> u32 {
        self.fees.get(exchange).copied().unwrap_or(self.default_bps)
    }

    /// Fee as a fraction (30 bps = 0.003)
    pub fn fraction(&self, exchange: &str) -> f64 {
        self.bps(exchange) as f64 / 10_000.0
    }
}
