//! Error types for CFG construction.
//!
//! The builder never fails on a well-formed program: unresolved jumps are
//! warnings and dead code is recorded, not rejected. Errors are reserved for
//! malformed ASTs and internal limits.

use thiserror::Error;

/// Errors raised during CFG construction.
#[derive(Debug, Error)]
pub enum CfgError {
    #[error("maximum nesting depth {max} exceeded while building `{function}`")]
    MaxDepthExceeded { function: String, max: usize },

    #[error("nested procedure definition `{inner}` inside `{outer}`")]
    NestedDefinition { outer: String, inner: String },

    #[error("malformed AST: {0}")]
    MalformedAst(String),
}

/// Result alias for CFG operations.
pub type Result<T> = std::result::Result<T, CfgError>;
