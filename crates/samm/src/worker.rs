//! Background cleanup worker.
//!
//! One dedicated thread drains the cleanup queue in FIFO order. Per pointer
//! it dispatches the registered cleanup callback for the pointer's kind,
//! then briefly takes the scope lock to arm the Bloom filter so a later
//! `delete` of the same address is flagged. The queue lock is never held
//! while callbacks run.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use log::warn;

use crate::manager::Shared;
use crate::queue::CleanupBatch;
use crate::scope::AllocKind;
use crate::stats::SammStats;

pub(crate) fn spawn(shared: Arc<Shared>) -> Option<JoinHandle<()>> {
    let builder = std::thread::Builder::new().name("samm-cleanup".to_string());
    match builder.spawn(move || run(shared)) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("cleanup worker spawn failed, falling back to synchronous cleanup: {}", e);
            None
        }
    }
}

fn run(shared: Arc<Shared>) {
    while let Some(batch) = shared.queue.pop_blocking() {
        let start = Instant::now();
        process_batch(&shared, batch);
        shared.queue.add_cleanup_time(start.elapsed());
    }
}

/// Run one batch to completion. Also called on producer threads when the
/// queue is full or the worker is disabled.
pub(crate) fn process_batch(shared: &Shared, batch: CleanupBatch) {
    for (ptr, kind) in batch.iter() {
        dispatch(shared, ptr, kind);
        shared.scopes.lock().bloom_add(ptr);
        SammStats::bump(&shared.stats.objects_cleaned);
    }
    SammStats::bump(&shared.stats.batches_processed);
}

/// Invoke the registered cleanup callback for one pointer.
pub(crate) fn dispatch(shared: &Shared, ptr: usize, kind: AllocKind) {
    let table = shared.cleanups.read();
    match table.get(kind) {
        Some(cleanup) => cleanup(ptr),
        None => {
            if shared.trace {
                eprintln!("[SAMM] no cleanup registered for {:?} ptr {:#x}", kind, ptr);
            }
        }
    }
}
