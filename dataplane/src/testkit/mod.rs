//! Shared test utilities for the dataplane and its dependents.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests and dependent crates).
//!
//! - [`transport`] - `MockConnector` / `MockEndpoint`: scripted endpoints with
//!   health switches, call counters and log fan-out.
//! - [`chain`] - `MockChain`: canned contract responses for factories, pairs
//!   and ERC20 metadata.

pub mod chain;
pub mod transport;

pub use chain::MockChain;
pub use transport::{log_for, MockConnector, MockEndpoint};
