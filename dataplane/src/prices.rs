//! Token USD price lookup used by the liquidity gate

use std::collections::HashMap;

use async_trait::async_trait;
use ethers::types::Address;

use crate::config::TokenConfig;
use crate::Result;

/// USD prices for a batch of tokens.
///
/// Tokens without a known price are absent from the returned map.
#[async_trait]
pub trait TokenPriceSource: Send + Sync {
    async fn get_usd_prices(&self, tokens: &[Address]) -> Result<HashMap<Address, f64>>;
}

/// Fixed prices from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<Address, f64>,
}

impl StaticPriceSource {
    pub fn new(prices: HashMap<Address, f64>) -> Self {
        Self { prices }
    }

    pub fn from_tokens(tokens: &HashMap<Address, TokenConfig>) -> Self {
        Self::new(
            tokens
                .iter()
                .filter(|(_, token)| token.usd_price.is_finite() && token.usd_price > 0.0)
                .map(|(address, token)| (*address, token.usd_price))
                .collect(),
        )
    }

    pub fn set_price(&mut self, token: Address, usd: f64) {
        self.prices.insert(token, usd);
    }
}

#[async_trait]
impl TokenPriceSource for StaticPriceSource {
    async fn get_usd_prices(&self, tokens: &[Address]) -> Result<HashMap<Address, f64>> {
        Ok(tokens
            .iter()
            .filter_map(|token| self.prices.get(token).map(|usd| (*token, *usd)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_tokens_are_omitted() {
        let known = Address::repeat_byte(1);
        let mut tokens = HashMap::new();
        tokens.insert(
            known,
            TokenConfig {
                symbol: Some("WETH".to_string()),
                usd_price: 2_000.0,
                decimals: Some(18),
            },
        );
        tokens.insert(
            Address::repeat_byte(2),
            TokenConfig {
                symbol: None,
                usd_price: 0.0,
                decimals: None,
            },
        );

        let source = StaticPriceSource::from_tokens(&tokens);
        let prices = source
            .get_usd_prices(&[known, Address::repeat_byte(2), Address::repeat_byte(3)])
            .await
            .unwrap();

        assert_eq!(prices.len(), 1);
        assert_eq!(prices[&known], 2_000.0);
    }
}
