//! fbc-runtime - List and Message Runtime for FasterBASIC
//!
//! The data-model half of the runtime: heterogeneous atom lists, reference
//! counted string descriptors, message envelopes for worker threads, class
//! vtables for `MATCH TYPE`, and the C ABI surface the backend emits calls
//! against.
//!
//! Everything small and fixed-size (list headers, atoms, string
//! descriptors) comes from dedicated SAMM slab pools; variable-size class
//! instances go through the six-class size router. Objects are
//! scope-tracked in SAMM so BASIC scopes clean up after themselves.
//!
//! ## Ownership rules
//!
//! - A string atom holds exactly one reference on its descriptor; removing
//!   the atom releases exactly one.
//! - A nested-list atom owns its nested list; freeing the outer list frees
//!   the inner recursively (copies own copies).
//! - A message envelope has exactly one owner at any instant: sender until
//!   push, queue until pop, receiver until consumption. Bounce forwarding
//!   moves the same envelope back into a queue without touching the
//!   payload.
//!
//! The SAMM sweep at scope exit returns shells (headers, atoms,
//! descriptors) to their pools independently, without walking structures -
//! everything tracked in the scope dies together, so per-edge ownership
//! bookkeeping applies only to the explicit mutation paths.
//!
//! `BASIC_MEMORY_STATS=1` prints the full message-memory dashboard at
//! runtime shutdown.

pub mod class;
pub mod error;
pub mod list;
pub mod message;
pub mod string;

#[allow(clippy::missing_safety_doc)]
pub mod ffi;

pub use class::VTable;
pub use error::{Result, RuntimeError};
pub use list::{AtomKind, ListAtom, ListHeader};
pub use message::envelope::{Envelope, MsgKind};
pub use message::worker::{WorkerContext, WorkerHandle};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use samm::{AllocKind, Samm, SammConfig, SizeClassAllocator, SlabPool};

use message::stats::MsgStats;

/// The three fixed-size pools behind list and string storage.
pub struct ListPools {
    pub headers: SlabPool,
    pub atoms: SlabPool,
    pub strings: SlabPool,
}

impl ListPools {
    fn new(max_slabs: usize) -> Result<Self> {
        Ok(Self {
            headers: SlabPool::new("list_header", 32, 256, max_slabs)?,
            atoms: SlabPool::new("list_atom", 24, 512, max_slabs)?,
            strings: SlabPool::new("string_desc", 40, 256, max_slabs)?,
        })
    }

    /// Small standalone pools for unit tests.
    #[cfg(test)]
    pub(crate) fn new_for_tests() -> Self {
        match Self::new(8) {
            Ok(pools) => pools,
            Err(e) => panic!("test pools failed to initialize: {}", e),
        }
    }
}

/// One runtime instance: SAMM, pools, message statistics.
///
/// Production code uses the process-wide [`Runtime::global`]; tests build
/// isolated instances with small configurations.
pub struct Runtime {
    pub samm: Samm,
    pub(crate) pools: Arc<ListPools>,
    pub(crate) objects: Arc<SizeClassAllocator>,
    pub(crate) msg_stats: Arc<MsgStats>,
    bounce_enabled: AtomicBool,
    stats_on_drop: bool,
}

impl Runtime {
    pub fn new(config: SammConfig) -> Result<Runtime> {
        let max_slabs = config.max_slabs_per_pool;
        let samm = Samm::new(config)?;
        let pools = Arc::new(ListPools::new(max_slabs)?);
        let objects = Arc::new(SizeClassAllocator::new("object", 64, max_slabs)?);

        // Scope-exit cleanups: shells go straight back to their pools.
        // Structures are never walked here - nested pieces carry their own
        // tracking entries.
        {
            let pools_for_lists = Arc::clone(&pools);
            samm.register_cleanup(AllocKind::List, move |ptr| {
                pools_for_lists.headers.free(ptr);
            });
        }
        {
            let pools_for_atoms = Arc::clone(&pools);
            samm.register_cleanup(AllocKind::ListAtom, move |ptr| {
                pools_for_atoms.atoms.free(ptr);
            });
        }
        {
            let pools_for_strings = Arc::clone(&pools);
            samm.register_cleanup(AllocKind::Str, move |ptr| {
                string::destroy(&pools_for_strings, ptr);
            });
        }
        {
            let objects_for_cleanup = Arc::clone(&objects);
            samm.register_cleanup(AllocKind::Object, move |ptr| {
                class::destroy_object(&objects_for_cleanup, ptr);
            });
        }

        Ok(Runtime {
            samm,
            pools,
            objects,
            msg_stats: Arc::new(MsgStats::default()),
            bounce_enabled: AtomicBool::new(true),
            stats_on_drop: env_flag("BASIC_MEMORY_STATS"),
        })
    }

    /// Test knob for the zero-copy bounce path.
    pub fn set_bounce_enabled(&self, enabled: bool) {
        self.bounce_enabled.store(enabled, Ordering::Release);
    }

    pub fn bounce_enabled(&self) -> bool {
        self.bounce_enabled.load(Ordering::Acquire)
    }

    pub fn message_stats(&self) -> &MsgStats {
        &self.msg_stats
    }

    pub fn pool_report_headers(&self) -> samm::PoolReport {
        self.pools.headers.report()
    }

    pub fn pool_report_atoms(&self) -> samm::PoolReport {
        self.pools.atoms.report()
    }

    pub fn pool_report_strings(&self) -> samm::PoolReport {
        self.pools.strings.report()
    }

    // Marshalling entry points (the SEND side of the ABI).

    pub fn marshal_int(&self, value: i64) -> Envelope {
        message::envelope::marshal_int(&self.msg_stats, value)
    }

    pub fn marshal_float(&self, value: f64) -> Envelope {
        message::envelope::marshal_float(&self.msg_stats, value)
    }

    pub fn marshal_str(&self, text: &str) -> Envelope {
        message::envelope::marshal_str(&self.msg_stats, text)
    }

    pub fn marshal_udt(&self, bytes: &[u8], type_id: u32) -> Envelope {
        message::envelope::marshal_udt(&self.msg_stats, bytes, type_id)
    }

    pub fn marshal_array_f64(&self, dims: &[u32], data: &[f64]) -> Envelope {
        message::envelope::marshal_array_f64(&self.msg_stats, dims, data)
    }

    /// The full diagnostics dump: pools, SAMM counters, message dashboard.
    pub fn memory_report(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.pools.headers.report().render());
        out.push('\n');
        out.push_str(&self.pools.atoms.report().render());
        out.push('\n');
        out.push_str(&self.pools.strings.report().render());
        out.push('\n');
        out.push_str(&self.samm.snapshot().render());
        out.push_str(&self.msg_stats.render());
        out
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.samm.wait();
        if self.stats_on_drop {
            eprintln!("{}", self.memory_report());
        }
        for report in [
            self.pools.headers.leak_report(),
            self.pools.atoms.leak_report(),
            self.pools.strings.leak_report(),
        ]
        .into_iter()
        .flatten()
        {
            eprintln!("[runtime] {}", report);
        }
    }
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    /// The process-wide runtime used by the C ABI, created on first use.
    pub fn global() -> &'static Runtime {
        GLOBAL.get_or_init(|| match Runtime::new(SammConfig::default()) {
            Ok(rt) => rt,
            // Default configuration always validates.
            Err(e) => panic!("runtime default configuration rejected: {}", e),
        })
    }
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}
