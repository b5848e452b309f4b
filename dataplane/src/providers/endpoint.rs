//! Endpoint pool state machine
//!
//! Tracks the active endpoint of one pool (read or write), failure counters
//! and round-robin rotation.

use crate::{DataplaneError, Endpoint, PoolRole, Result};

/// Why a rotation happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// A caller's request failed or timed out
    CallerFailure,

    /// The liveness watchdog reached its failure threshold
    Watchdog,

    /// The next endpoint refused the connection or could not re-arm subscriptions
    ConnectFailure,

    /// Explicit operator/test request
    Forced,
}

impl RotationReason {
    pub fn name(&self) -> &'static str {
        match self {
            RotationReason::CallerFailure => "caller_failure",
            RotationReason::Watchdog => "watchdog_threshold",
            RotationReason::ConnectFailure => "connect_failure",
            RotationReason::Forced => "forced",
        }
    }
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered endpoints of one role with an active cursor
#[derive(Debug, Clone)]
pub struct EndpointPool {
    role: PoolRole,
    endpoints: Vec<Endpoint>,
    active: usize,

    /// Consecutive endpoint failures since the last success; reaching
    /// `endpoints.len()` means the whole pool failed within one cycle
    cycle_failures: usize,

    /// Consecutive failed liveness probes
    probe_failures: u32,

    rotations: u64,
}

impl EndpointPool {
    /// Create a pool from ordered URLs
    pub fn new(role: PoolRole, urls: &[String]) -> Result<Self> {
        if urls.is_empty() {
            return Err(DataplaneError::invalid_config(format!("{} endpoint pool is empty", role)));
        }

        Ok(Self {
            role,
            endpoints: urls.iter().map(Endpoint::new).collect(),
            active: 0,
            cycle_failures: 0,
            probe_failures: 0,
            rotations: 0,
        })
    }

    pub fn role(&self) -> PoolRole {
        self.role
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn active(&self) -> &Endpoint {
        &self.endpoints[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Advance to the next endpoint, wrapping; returns the new index
    pub fn rotate(&mut self) -> usize {
        self.active = (self.active + 1) % self.endpoints.len();
        self.rotations += 1;
        self.active
    }

    /// Record a failure against the active endpoint.
    ///
    /// Returns `true` once every endpoint failed within the current cycle.
    pub fn record_failure(&mut self) -> bool {
        self.endpoints[self.active].failures += 1;
        self.cycle_failures += 1;
        self.is_exhausted()
    }

    pub fn record_success(&mut self) {
        self.cycle_failures = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.cycle_failures >= self.endpoints.len()
    }

    /// Start a fresh cycle (after an exhausted operation was abandoned)
    pub fn reset_cycle(&mut self) {
        self.cycle_failures = 0;
    }

    /// Count a failed liveness probe; returns the consecutive count
    pub fn record_probe_failure(&mut self) -> u32 {
        self.probe_failures += 1;
        self.probe_failures
    }

    pub fn reset_probe_failures(&mut self) {
        self.probe_failures = 0;
    }

    pub fn probe_failures(&self) -> u32 {
        self.probe_failures
    }
}
