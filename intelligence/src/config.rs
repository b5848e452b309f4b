//! Configuration management for the arbitrage intelligence layer
//!
//! Layered with the `config` crate: built-in defaults, then
//! `config/default`, `config/{ENVIRONMENT}`, `config/local`, an optional
//! explicit file, and finally `QENUS_ARB__`-prefixed environment variables
//! (`QENUS_ARB__STRATEGY__NOTIONAL_USD=5000`).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use qenus_pool_dataplane::ChainDataConfig;

use crate::error::{IntelligenceError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArbConfig {
    /// Endpoints, exchanges, liquidity gate and token metadata
    pub dataplane: ChainDataConfig,

    /// Opportunity thresholds
    pub strategy: StrategyConfig,

    /// Timers
    pub runtime: RuntimeConfig,

    /// Prometheus exporter
    pub monitoring: MonitoringConfig,
}

/// Detection thresholds and sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Fixed notional used to turn an edge into USD profit
    pub notional_usd: f64,

    /// Minimum USD profit for a direct opportunity
    pub min_profit_usd_direct: f64,

    /// Minimum USD profit for a triangular opportunity
    pub min_profit_usd_triangular: f64,

    /// Fee applied to exchanges without an override
    pub default_fee_bps: u32,

    /// Cap on records emitted per full pass or recompute
    pub max_opportunities_per_pass: usize,

    #[serde(default = "default_true")]
    pub direct_enabled: bool,

    #[serde(default = "default_true")]
    pub triangular_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Timer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Full rescan interval; 0 disables periodic rescans
    pub rescan_interval_secs: u64,

    /// How long emitted records stay in the opportunity book
    pub opportunity_retention_secs: u64,

    /// Retention pruning interval
    pub prune_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub prometheus_enabled: bool,
    pub prometheus_bind: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            notional_usd: 10_000.0,
            min_profit_usd_direct: 10.0,
            min_profit_usd_triangular: 10.0,
            default_fee_bps: 30,
            max_opportunities_per_pass: 100,
            direct_enabled: true,
            triangular_enabled: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            rescan_interval_secs: 600,
            opportunity_retention_secs: 300,
            prune_interval_secs: 30,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_bind: "0.0.0.0:9100".to_string(),
        }
    }
}

impl ArbConfig {
    /// Load configuration from files and environment
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            // Start with built-in defaults
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(
                File::with_name(&format!(
                    "config/{}",
                    std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
                ))
                .required(false),
            )
            // Add local config (gitignored)
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let config: Self = builder
            .add_source(Environment::with_prefix("QENUS_ARB").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.dataplane.validate()?;

        let strategy = &self.strategy;
        if !(strategy.notional_usd.is_finite() && strategy.notional_usd > 0.0) {
            return Err(IntelligenceError::invalid_strategy("notional_usd must be positive"));
        }

        if strategy.min_profit_usd_direct < 0.0 || strategy.min_profit_usd_triangular < 0.0 {
            return Err(IntelligenceError::invalid_strategy("minimum profit thresholds cannot be negative"));
        }

        if strategy.default_fee_bps >= 10_000 {
            return Err(IntelligenceError::invalid_strategy("default_fee_bps must be below 10000"));
        }

        if let Some(exchange) = self
            .dataplane
            .exchanges
            .iter()
            .find(|e| e.fee_bps.map_or(false, |bps| bps >= 10_000))
        {
            return Err(IntelligenceError::invalid_strategy(format!(
                "fee_bps for {} must be below 10000",
                exchange.name
            )));
        }

        if strategy.max_opportunities_per_pass == 0 {
            return Err(IntelligenceError::invalid_strategy("max_opportunities_per_pass must be greater than 0"));
        }

        if self.runtime.prune_interval_secs == 0 {
            return Err(IntelligenceError::invalid_strategy("prune_interval_secs must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ArbConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_notional_rejected() {
        let mut config = ArbConfig::default();
        config.strategy.notional_usd = 0.0;
        assert!(matches!(config.validate(), Err(IntelligenceError::InvalidStrategy(_))));
    }

    #[test]
    fn test_dataplane_errors_propagate() {
        let mut config = ArbConfig::default();
        config.dataplane.endpoints.read.clear();
        assert!(matches!(config.validate(), Err(IntelligenceError::Dataplane(_))));
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let config = ArbConfig::load(None).unwrap();
        assert_eq!(config.strategy.default_fee_bps, 30);
        assert_eq!(config.dataplane.events.addresses_per_subscription, 500);
    }
}
