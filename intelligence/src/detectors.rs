//! Opportunity detection over the pool registry
//!
//! Detectors are pure functions of registry state. The direct detector
//! compares pools inside one pair group; the triangle detector walks token
//! adjacency for three-pool cycles. Both can run over the whole registry
//! (bootstrap and periodic full passes) or only around one changed pool.

pub mod direct;
pub mod manager;
pub mod pricing;
pub mod triangular;

pub use direct::{estimate_direct_edge, DirectArbDetector};
pub use manager::DetectorManager;
pub use pricing::{leg_rate, price, spot_price, FeeTable};
pub use triangular::{triangles_through, triangular_edge, Triangle, TriangleArbDetector};
