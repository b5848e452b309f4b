//! Error types for the arbitrage intelligence layer

use thiserror::Error;

/// Result type alias for intelligence layer operations
pub type Result<T> = std::result::Result<T, IntelligenceError>;

#[derive(Error, Debug)]
pub enum IntelligenceError {
    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Dataplane error: {0}")]
    Dataplane(#[from] qenus_pool_dataplane::DataplaneError),

    #[error("Sink {sink} rejected opportunity: {message}")]
    Sink { sink: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntelligenceError {
    /// Create an invalid strategy error
    pub fn invalid_strategy<S: Into<String>>(message: S) -> Self {
        Self::InvalidStrategy(message.into())
    }

    /// Create a sink error
    pub fn sink<S: Into<String>, M: ToString>(sink: S, message: M) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: message.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            IntelligenceError::Dataplane(e) => e.is_retryable(),
            IntelligenceError::Sink { .. } => true,
            _ => false,
        }
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            IntelligenceError::InvalidStrategy(_) => "strategy",
            IntelligenceError::Config(_) => "config",
            IntelligenceError::Dataplane(e) => e.category(),
            IntelligenceError::Sink { .. } => "sink",
            IntelligenceError::Serialization(_) => "serialization",
            IntelligenceError::Io(_) => "io",
            IntelligenceError::Internal(_) => "internal",
        }
    }
}
