//! Provider management for the chain-data layer
//!
//! Endpoint pools with round-robin rotation, a resilient client that re-arms
//! subscriptions after every rotation, and a liveness watchdog.

pub mod chain_client;
pub mod endpoint;
pub mod resilient;
pub mod transport;
pub mod watchdog;

// Re-export commonly used types
pub use chain_client::ChainClient;
pub use endpoint::{EndpointPool, RotationReason};
pub use resilient::{ClientStatus, ProbeOutcome, ResilientClient, SubscriptionId};
pub use transport::{ChainTransport, EndpointConnector, EthersConnector, SubscriptionHandle};
pub use watchdog::Watchdog;
