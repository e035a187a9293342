//! Error types for the runtime.
//!
//! Most list operations are deliberately infallible (null lists tolerated,
//! out-of-range reads return zero); errors are reserved for resource
//! failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("worker thread spawn failed: {0}")]
    WorkerSpawn(String),

    #[error(transparent)]
    Memory(#[from] samm::SammError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
