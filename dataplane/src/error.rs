//! Error types for the pool dataplane

use ethers::types::Address;
use thiserror::Error;

/// Result type alias for dataplane operations
pub type Result<T> = std::result::Result<T, DataplaneError>;

/// Error taxonomy for the chain-data layer
///
/// Network-layer failures (`EndpointUnavailable`) are recovered locally by
/// rotation. Data-layer failures (`UnknownPool`, `DecodeOrReadFailure`) are
/// isolated to a single pool or pair.
#[derive(Error, Debug)]
pub enum DataplaneError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Endpoint unavailable: {endpoint} - {reason}")]
    EndpointUnavailable { endpoint: String, reason: String },

    #[error("All {attempts} {role} endpoints exhausted: {last_error}")]
    AllEndpointsExhausted {
        role: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Unknown pool: {0:?}")]
    UnknownPool(Address),

    #[error("Contract read failed: {target} - {message}")]
    DecodeOrReadFailure { target: String, message: String },

    #[error("Price source error: {message}")]
    PriceSource { message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DataplaneError {
    /// Create a new endpoint-unavailable error
    pub fn endpoint_unavailable<S: Into<String>, R: ToString>(endpoint: S, reason: R) -> Self {
        Self::EndpointUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new contract read/decode error
    pub fn read_failure<S: Into<String>, M: ToString>(target: S, message: M) -> Self {
        Self::DecodeOrReadFailure {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this failure should move the client to the next endpoint
    pub fn triggers_rotation(&self) -> bool {
        matches!(
            self,
            DataplaneError::EndpointUnavailable { .. } | DataplaneError::Network(_)
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            DataplaneError::EndpointUnavailable { .. } => true,
            DataplaneError::AllEndpointsExhausted { .. } => true,
            DataplaneError::Network(_) => true,
            DataplaneError::PriceSource { .. } => true,
            _ => false,
        }
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            DataplaneError::Config(_) => "config",
            DataplaneError::InvalidConfig { .. } => "config",
            DataplaneError::EndpointUnavailable { .. } => "endpoint",
            DataplaneError::AllEndpointsExhausted { .. } => "endpoint_exhausted",
            DataplaneError::UnknownPool(_) => "unknown_pool",
            DataplaneError::DecodeOrReadFailure { .. } => "contract_read",
            DataplaneError::PriceSource { .. } => "price_source",
            DataplaneError::Network(_) => "network",
            DataplaneError::Serialization(_) => "serialization",
            DataplaneError::Io(_) => "io",
            DataplaneError::Internal(_) => "internal",
        }
    }
}
