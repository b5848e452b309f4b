//! Qenus Arbitrage Intelligence
//!
//! Turns pool registry state into arbitrage opportunities. A bootstrap scan
//! seeds the registry and one exhaustive pass seeds the opportunity set;
//! after that every swap notification triggers a reserve refresh and a
//! recompute limited to the touched pool's neighborhood.
//!
//! ## Outputs:
//! - **OpportunityRecord**: direct and triangular opportunities, handed to
//!   sinks (execution channel, opportunity book, log)

pub mod book;
pub mod config;
pub mod detectors;
pub mod driver;
pub mod error;
pub mod runtime;
pub mod sink;
pub mod types;

pub use book::OpportunityBook;
pub use config::{ArbConfig, MonitoringConfig, RuntimeConfig, StrategyConfig};
pub use detectors::{DetectorManager, DirectArbDetector, FeeTable, TriangleArbDetector};
pub use driver::{DrainReport, EventRecomputeDriver, PoolState};
pub use error::{IntelligenceError, Result};
pub use runtime::{Bootstrapped, Runtime};
pub use sink::{BookSink, ChannelSink, LogSink, OpportunitySink, SinkSet};
pub use types::*;

/// Version of the intelligence layer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
