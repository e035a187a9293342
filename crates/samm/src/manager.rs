//! The SAMM facade: scope operations, tracking, delete, cleanup dispatch.
//!
//! All shared state lives behind an `Arc` so the worker thread and the
//! public handle see the same scopes, queue, registry and counters. Every
//! scope-stack mutation happens under the one scope mutex; statistics are
//! lock-free atomics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::SammConfig;
use crate::env_flag;
use crate::error::{Result, SammError};
use crate::queue::{CleanupBatch, CleanupQueue};
use crate::scope::{AllocKind, ScopeStack, KIND_COUNT};
use crate::stats::{SammSnapshot, SammStats};
use crate::worker;

type CleanupFn = Box<dyn Fn(usize) + Send + Sync>;

/// Per-kind cleanup callbacks, installed once by the runtime at startup.
pub(crate) struct CleanupTable {
    entries: [Option<CleanupFn>; KIND_COUNT],
}

impl CleanupTable {
    fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| None),
        }
    }

    pub(crate) fn get(&self, kind: AllocKind) -> Option<&CleanupFn> {
        self.entries[kind.index()].as_ref()
    }

    fn set(&mut self, kind: AllocKind, cleanup: CleanupFn) {
        self.entries[kind.index()] = Some(cleanup);
    }
}

/// State shared between the public handle and the worker thread.
pub(crate) struct Shared {
    pub(crate) scopes: Mutex<ScopeStack>,
    pub(crate) queue: CleanupQueue,
    pub(crate) cleanups: RwLock<CleanupTable>,
    pub(crate) stats: SammStats,
    pub(crate) trace: bool,
    worker_active: AtomicBool,
}

/// The scope-aware memory manager.
///
/// Dropping (or explicitly shutting down) a `Samm` stops the worker after
/// the queue drains. All operations are thread-safe.
pub struct Samm {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats_on_shutdown: bool,
    shut_down: AtomicBool,
}

impl Samm {
    /// Validate the configuration, allocate the Bloom filter and scope
    /// stack, and start the background worker (unless disabled).
    pub fn new(config: SammConfig) -> Result<Samm> {
        config.validate()?;
        let trace = env_flag("SAMM_TRACE");
        let stats_on_shutdown = env_flag("SAMM_STATS");

        let shared = Arc::new(Shared {
            scopes: Mutex::new(ScopeStack::new(&config)),
            queue: CleanupQueue::new(config.queue_capacity),
            cleanups: RwLock::new(CleanupTable::new()),
            stats: SammStats::default(),
            trace,
            worker_active: AtomicBool::new(false),
        });

        let worker_handle = if config.background_worker {
            let handle = worker::spawn(Arc::clone(&shared));
            shared
                .worker_active
                .store(handle.is_some(), Ordering::Release);
            handle
        } else {
            None
        };

        Ok(Samm {
            shared,
            worker: Mutex::new(worker_handle),
            stats_on_shutdown,
            shut_down: AtomicBool::new(false),
        })
    }

    fn trace_log(&self, message: impl FnOnce() -> String) {
        if self.shared.trace {
            eprintln!("[SAMM] {}", message());
        }
    }

    /// Push a fresh scope. Fails when the configured depth is exceeded.
    pub fn enter_scope(&self) -> Result<()> {
        let depth = {
            let mut scopes = self.shared.scopes.lock();
            scopes
                .enter()
                .map_err(|max| SammError::ScopeDepthExceeded { max })?
        };
        SammStats::bump(&self.shared.stats.scopes_entered);
        self.shared.stats.note_depth(depth);
        self.trace_log(|| format!("enter_scope -> depth {}", depth));
        Ok(())
    }

    /// Pop the current scope; its tracked pointers become one cleanup batch.
    ///
    /// Returns immediately: the batch is queued for the worker, or run
    /// synchronously on this thread if the queue is full or no worker is
    /// running. An empty scope schedules nothing.
    pub fn exit_scope(&self) -> Result<()> {
        let detached = {
            let mut scopes = self.shared.scopes.lock();
            scopes.exit().ok_or(SammError::ScopeUnderflow)?
        };
        SammStats::bump(&self.shared.stats.scopes_exited);
        let (ptrs, kinds) = detached;
        self.trace_log(|| format!("exit_scope ({} tracked)", ptrs.len()));
        if ptrs.is_empty() {
            return Ok(());
        }

        let batch = CleanupBatch::new(ptrs, kinds);
        SammStats::bump(&self.shared.stats.cleanup_batches);

        if self.shared.worker_active.load(Ordering::Acquire) {
            if let Err(batch) = self.shared.queue.push(batch) {
                // Queue full: never drop, run on this thread instead.
                SammStats::bump(&self.shared.stats.queue_full_fallbacks);
                let start = Instant::now();
                worker::process_batch(&self.shared, batch);
                self.shared.queue.add_cleanup_time(start.elapsed());
            }
        } else {
            let start = Instant::now();
            worker::process_batch(&self.shared, batch);
            self.shared.queue.add_cleanup_time(start.elapsed());
        }
        Ok(())
    }

    /// Record `ptr` in the current scope.
    pub fn track(&self, ptr: usize, kind: AllocKind) {
        self.shared.scopes.lock().track(ptr, kind);
        SammStats::bump(&self.shared.stats.objects_tracked);
        self.trace_log(|| format!("track {:#x} {:?}", ptr, kind));
    }

    /// Remove `ptr` from whichever scope tracks it, innermost first.
    /// No-op (returning false) when untracked.
    pub fn untrack(&self, ptr: usize) -> bool {
        let found = self.shared.scopes.lock().untrack(ptr).is_some();
        SammStats::bump(&self.shared.stats.untrack_calls);
        found
    }

    /// Promote `ptr` to a scope `parent_offset` levels outside the one it
    /// currently lives in. Clamps at the global scope.
    pub fn retain(&self, ptr: usize, parent_offset: usize) -> bool {
        let moved = self.shared.scopes.lock().retain(ptr, parent_offset);
        SammStats::bump(&self.shared.stats.retain_calls);
        self.trace_log(|| format!("retain {:#x} +{} -> {}", ptr, parent_offset, moved));
        moved
    }

    /// Explicit delete with double-free protection.
    ///
    /// A Bloom hit means "probably freed already": the free is suppressed
    /// and counted. Otherwise the pointer is untracked, added to the filter,
    /// and its kind's cleanup runs on this thread. Returns whether the
    /// cleanup ran.
    pub fn delete(&self, ptr: usize) -> bool {
        let kind = {
            let mut scopes = self.shared.scopes.lock();
            if scopes.bloom_check(ptr) {
                SammStats::bump(&self.shared.stats.double_free_hits);
                drop(scopes);
                self.trace_log(|| format!("delete {:#x}: probable double free, skipped", ptr));
                return false;
            }
            let kind = scopes
                .untrack(ptr)
                .map(|(_, kind)| kind)
                .unwrap_or(AllocKind::Unknown);
            scopes.bloom_add(ptr);
            kind
        };
        // Cleanup runs outside the scope lock: callbacks may take pool locks.
        worker::dispatch(&self.shared, ptr, kind);
        SammStats::bump(&self.shared.stats.objects_deleted);
        self.trace_log(|| format!("delete {:#x} {:?}", ptr, kind));
        true
    }

    /// Install the cleanup callback for one allocation kind.
    pub fn register_cleanup(&self, kind: AllocKind, cleanup: impl Fn(usize) + Send + Sync + 'static) {
        self.shared.cleanups.write().set(kind, Box::new(cleanup));
    }

    /// Spin (1 ms naps) until every queued batch has been processed.
    pub fn wait(&self) {
        loop {
            let queued = self.shared.stats.cleanup_batches.load(Ordering::Acquire);
            let done = self.shared.stats.batches_processed.load(Ordering::Acquire);
            if done >= queued {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Current scope depth (global scope is 0).
    pub fn scope_depth(&self) -> usize {
        self.shared.scopes.lock().depth()
    }

    /// Number of pointers tracked in the current scope.
    pub fn tracked_in_current_scope(&self) -> usize {
        self.shared.scopes.lock().current_len()
    }

    /// Bloom-filter view of `ptr`: true means "probably freed".
    pub fn probably_freed(&self, ptr: usize) -> bool {
        self.shared.scopes.lock().bloom_check(ptr)
    }

    /// Copy out every counter.
    pub fn snapshot(&self) -> SammSnapshot {
        let mut snap = self.shared.stats.snapshot();
        {
            let scopes = self.shared.scopes.lock();
            snap.bloom_memory_bytes = scopes.bloom().memory_bytes();
            snap.bloom_items = scopes.bloom().items_added();
        }
        snap.cleanup_time_ms = self.shared.queue.cleanup_time_ms();
        snap
    }

    /// Pending batches in the cleanup queue.
    pub fn queued_batches(&self) -> usize {
        self.shared.queue.len()
    }

    /// Drain the queue, stop the worker, and (under `SAMM_STATS=1`) print
    /// the statistics report. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.queue.request_shutdown();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        self.shared.worker_active.store(false, Ordering::Release);
        if self.stats_on_shutdown {
            eprintln!("{}", self.snapshot().render());
        }
    }
}

impl Drop for Samm {
    fn drop(&mut self) {
        self.shutdown();
    }
}

static GLOBAL: OnceLock<Samm> = OnceLock::new();

/// The process-wide manager used by the runtime ABI. Created on first use
/// with the default configuration.
pub fn global() -> &'static Samm {
    GLOBAL.get_or_init(|| match Samm::new(SammConfig::default()) {
        Ok(samm) => samm,
        // The default configuration always validates; reaching this is a
        // bug in `SammConfig::default`.
        Err(e) => panic!("SAMM default configuration rejected: {}", e),
    })
}
