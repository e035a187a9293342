//! Configuration for the memory manager.
//!
//! All tunables live here with their defaults. `validate()` is called once
//! at `Samm::new`; an invalid configuration is a caller bug surfaced as an
//! error, not a panic.

use crate::error::{Result, SammError};

/// Tuning parameters for a SAMM instance.
///
/// # Examples
///
/// ```rust
/// use samm::SammConfig;
///
/// // Defaults match the shipping runtime.
/// let config = SammConfig::default();
/// assert!(config.validate().is_ok());
///
/// // Tests shrink the Bloom filter and run cleanup synchronously.
/// let config = SammConfig {
///     bloom_bits: 1 << 16,
///     background_worker: false,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SammConfig {
    /// Maximum scope nesting depth. Entering a scope beyond this fails.
    ///
    /// Default: 1024
    pub max_scope_depth: usize,

    /// Initial capacity of each scope's tracking vectors; they double on
    /// overflow.
    ///
    /// Default: 32
    pub scope_initial_capacity: usize,

    /// Cleanup queue capacity in batches. Must be a power of two. When the
    /// queue is full, producers run their batch synchronously.
    ///
    /// Default: 256
    pub queue_capacity: usize,

    /// Bloom filter size in bits. Must be a nonzero multiple of 64.
    ///
    /// Default: 96 Mbit (12 MiB)
    pub bloom_bits: usize,

    /// Hash probes per pointer in the Bloom filter.
    ///
    /// Default: 10
    pub bloom_hashes: u32,

    /// Spawn the background cleanup worker. With this off (or if thread
    /// spawning fails at init) every batch runs synchronously on the
    /// producing thread.
    ///
    /// Default: true
    pub background_worker: bool,

    /// Cap on slabs per pool before `alloc` falls back to the system
    /// allocator.
    ///
    /// Default: 1024
    pub max_slabs_per_pool: usize,
}

impl Default for SammConfig {
    fn default() -> Self {
        Self {
            max_scope_depth: 1024,
            scope_initial_capacity: 32,
            queue_capacity: 256,
            bloom_bits: 96 * (1 << 20),
            bloom_hashes: 10,
            background_worker: true,
            max_slabs_per_pool: 1024,
        }
    }
}

impl SammConfig {
    /// A configuration sized for unit tests: tiny Bloom filter, synchronous
    /// cleanup.
    pub fn small_for_tests() -> Self {
        Self {
            bloom_bits: 1 << 16,
            background_worker: false,
            ..Default::default()
        }
    }

    /// Check parameter sanity.
    pub fn validate(&self) -> Result<()> {
        if self.max_scope_depth == 0 {
            return Err(SammError::Configuration(
                "max_scope_depth must be nonzero".to_string(),
            ));
        }
        if self.queue_capacity == 0 || !self.queue_capacity.is_power_of_two() {
            return Err(SammError::Configuration(format!(
                "queue_capacity must be a nonzero power of two, got {}",
                self.queue_capacity
            )));
        }
        if self.bloom_bits == 0 || self.bloom_bits % 64 != 0 {
            return Err(SammError::Configuration(format!(
                "bloom_bits must be a nonzero multiple of 64, got {}",
                self.bloom_bits
            )));
        }
        if self.bloom_hashes == 0 {
            return Err(SammError::Configuration(
                "bloom_hashes must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
