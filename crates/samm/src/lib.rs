//! # SAMM - Scope-Aware Memory Manager
//!
//! SAMM provides scoped lifetime management for FasterBASIC runtime objects:
//! class instances, lists, list atoms and string descriptors. It is not a
//! tracing collector - cleanup is driven entirely by scope exits and explicit
//! deletes.
//!
//! ## Overview
//!
//! - **Scope stack**: entering a scope pushes an empty tracking record;
//!   exiting detaches the record and hands it to the cleanup machinery as one
//!   batch. The global scope (depth 0) is never popped.
//! - **Background worker**: a single dedicated thread drains a bounded queue
//!   of cleanup batches in FIFO order, dispatching a per-kind cleanup
//!   callback for every tracked pointer. If the queue is full the producer
//!   runs its batch synchronously; batches are never dropped.
//! - **Bloom filter**: an add-only bit array answering "was this pointer
//!   probably freed already?". A hit on `delete` suppresses the free and
//!   bumps a counter; false positives are safe, false negatives cannot occur
//!   for pointers freed through SAMM.
//! - **Slab pools**: fixed-slot-size allocators for the runtime's small
//!   objects, plus a six-class size-class router for variable-size class
//!   instances.
//!
//! ## Lock discipline
//!
//! No operation holds two of {scope mutex, queue mutex, any pool mutex} at
//! once. The worker pops under the queue lock, releases it, runs cleanup
//! callbacks (which may take pool locks), then briefly takes the scope lock
//! to arm the Bloom filter.
//!
//! ## Environment
//!
//! - `SAMM_TRACE=1` - verbose per-call logging to standard error.
//! - `SAMM_STATS=1` - statistics dump at shutdown.
//!
//! ## Quick start
//!
//! ```rust
//! use samm::{Samm, SammConfig, AllocKind};
//!
//! let samm = Samm::new(SammConfig::small_for_tests()).unwrap();
//! samm.enter_scope().unwrap();
//! samm.track(0x1000, AllocKind::Generic);
//! samm.exit_scope().unwrap();
//! samm.wait();
//! samm.shutdown();
//! ```

pub mod bloom;
pub mod config;
pub mod error;
pub mod manager;
pub mod pool;
pub mod queue;
pub mod scope;
pub mod stats;
mod worker;

pub use bloom::BloomFilter;
pub use config::SammConfig;
pub use error::{Result, SammError};
pub use manager::{global, Samm};
pub use pool::size_class::{size_to_class, SizeClassAllocator, OVERSIZE_CLASS, SIZE_CLASSES};
pub use pool::{PoolReport, SlabPool};
pub use scope::AllocKind;
pub use stats::SammSnapshot;

/// Read a `NAME=1` style environment flag once.
pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}
