//! Error types for SAMM operations.

use thiserror::Error;

/// Main error type for all SAMM operations.
#[derive(Debug, Error)]
pub enum SammError {
    #[error("scope depth limit {max} exceeded")]
    ScopeDepthExceeded { max: usize },

    #[error("scope underflow: the global scope cannot be exited")]
    ScopeUnderflow,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("pool `{pool}` exhausted: {reason}")]
    PoolExhausted { pool: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for SAMM operations.
pub type Result<T> = std::result::Result<T, SammError>;
