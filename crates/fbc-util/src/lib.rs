//! fbc-util - Foundation Types for the FasterBASIC Compiler
//!
//! Small zero-cost utilities shared by the compiler crates. The main export
//! is [`IndexVec`], a vector indexed by a dedicated newtype id. Compiler
//! entities (basic blocks, statements) are stored in owning `IndexVec`s and
//! referenced by id everywhere else, so cyclic structures like control-flow
//! graphs never hold references into themselves.

pub mod index_vec;

pub use index_vec::{Idx, IndexVec};

// Re-export the hash collections the whole workspace uses for hot maps.
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
