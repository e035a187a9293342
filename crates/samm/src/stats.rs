//! SAMM statistics.
//!
//! Plain atomic fetch-add counters, readable without any lock. The single
//! non-atomic statistic (cleanup time) lives under the queue mutex in
//! `queue.rs`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub(crate) struct SammStats {
    pub scopes_entered: AtomicU64,
    pub scopes_exited: AtomicU64,
    pub objects_tracked: AtomicU64,
    pub objects_cleaned: AtomicU64,
    pub objects_deleted: AtomicU64,
    pub cleanup_batches: AtomicU64,
    pub batches_processed: AtomicU64,
    pub double_free_hits: AtomicU64,
    pub retain_calls: AtomicU64,
    pub untrack_calls: AtomicU64,
    pub queue_full_fallbacks: AtomicU64,
    pub peak_scope_depth: AtomicUsize,
}

impl SammStats {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_depth(&self, depth: usize) {
        self.peak_scope_depth.fetch_max(depth, Ordering::Relaxed);
    }
}

/// A point-in-time copy of every counter, for reports and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SammSnapshot {
    pub scopes_entered: u64,
    pub scopes_exited: u64,
    pub objects_tracked: u64,
    pub objects_cleaned: u64,
    pub objects_deleted: u64,
    pub cleanup_batches: u64,
    pub batches_processed: u64,
    pub double_free_hits: u64,
    pub retain_calls: u64,
    pub untrack_calls: u64,
    pub queue_full_fallbacks: u64,
    pub peak_scope_depth: usize,
    pub bloom_memory_bytes: usize,
    pub bloom_items: u64,
    pub cleanup_time_ms: u64,
}

impl SammStats {
    pub fn snapshot(&self) -> SammSnapshot {
        SammSnapshot {
            scopes_entered: self.scopes_entered.load(Ordering::Relaxed),
            scopes_exited: self.scopes_exited.load(Ordering::Relaxed),
            objects_tracked: self.objects_tracked.load(Ordering::Relaxed),
            objects_cleaned: self.objects_cleaned.load(Ordering::Relaxed),
            objects_deleted: self.objects_deleted.load(Ordering::Relaxed),
            cleanup_batches: self.cleanup_batches.load(Ordering::Relaxed),
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            double_free_hits: self.double_free_hits.load(Ordering::Relaxed),
            retain_calls: self.retain_calls.load(Ordering::Relaxed),
            untrack_calls: self.untrack_calls.load(Ordering::Relaxed),
            queue_full_fallbacks: self.queue_full_fallbacks.load(Ordering::Relaxed),
            peak_scope_depth: self.peak_scope_depth.load(Ordering::Relaxed),
            bloom_memory_bytes: 0,
            bloom_items: 0,
            cleanup_time_ms: 0,
        }
    }
}

impl SammSnapshot {
    /// Render the shutdown report printed under `SAMM_STATS=1`.
    pub fn render(&self) -> String {
        format!(
            "SAMM statistics:\n\
             \x20 scopes entered/exited:   {}/{}\n\
             \x20 peak scope depth:        {}\n\
             \x20 objects tracked:         {}\n\
             \x20 objects cleaned:         {}\n\
             \x20 objects deleted:         {}\n\
             \x20 cleanup batches:         {} queued, {} processed\n\
             \x20 queue-full fallbacks:    {}\n\
             \x20 double-free catches:     {}\n\
             \x20 retain calls:            {}\n\
             \x20 untrack calls:           {}\n\
             \x20 bloom filter:            {} bytes, {} items\n\
             \x20 cleanup time:            {} ms\n",
            self.scopes_entered,
            self.scopes_exited,
            self.peak_scope_depth,
            self.objects_tracked,
            self.objects_cleaned,
            self.objects_deleted,
            self.cleanup_batches,
            self.batches_processed,
            self.queue_full_fallbacks,
            self.double_free_hits,
            self.retain_calls,
            self.untrack_calls,
            self.bloom_memory_bytes,
            self.bloom_items,
            self.cleanup_time_ms,
        )
    }
}
