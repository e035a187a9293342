//! Message-memory statistics: the `BASIC_MEMORY_STATS=1` dashboard.
//!
//! Everything is a relaxed atomic counter; the dashboard is a best-effort
//! snapshot, exact once producers and consumers have stopped.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MsgStats {
    pub envelopes_created: AtomicU64,
    pub envelopes_freed: AtomicU64,
    pub envelopes_forwarded: AtomicU64,
    pub envelopes_peak: AtomicU64,
    pub payload_bytes_allocated: AtomicU64,
    pub payload_bytes_freed: AtomicU64,
    pub string_clones: AtomicU64,
    /// Indexed by `MsgKind` tag value.
    pub by_kind: [AtomicU64; 8],
    pub queue_pushed: AtomicU64,
    pub queue_popped: AtomicU64,
    pub back_pressure_waits: AtomicU64,
    pub pop_empty_waits: AtomicU64,
    pub dropped_drained: AtomicU64,
    pub queues_created: AtomicU64,
    pub queues_destroyed: AtomicU64,
    pub workers_spawned: AtomicU64,
    pub workers_joined: AtomicU64,
}

impl MsgStats {
    pub(crate) fn note_created(&self, kind_tag: u8, payload_len: usize) {
        let created = self.envelopes_created.fetch_add(1, Ordering::Relaxed) + 1;
        let freed = self.envelopes_freed.load(Ordering::Relaxed);
        self.envelopes_peak
            .fetch_max(created.saturating_sub(freed), Ordering::Relaxed);
        self.payload_bytes_allocated
            .fetch_add(payload_len as u64, Ordering::Relaxed);
        if let Some(counter) = self.by_kind.get(kind_tag as usize) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn note_freed(&self, payload_len: usize) {
        self.envelopes_freed.fetch_add(1, Ordering::Relaxed);
        self.payload_bytes_freed
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub fn envelopes_in_flight(&self) -> u64 {
        self.envelopes_created
            .load(Ordering::Relaxed)
            .saturating_sub(self.envelopes_freed.load(Ordering::Relaxed))
    }

    /// Render the dashboard.
    pub fn render(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let mut by_kind = String::new();
        for (tag, counter) in self.by_kind.iter().enumerate() {
            let n = load(counter);
            if n > 0 {
                by_kind.push_str(&format!(" kind{}={}", tag, n));
            }
        }
        format!(
            "message memory:\n\
             \x20 envelopes: {} created, {} freed, {} forwarded, peak {}\n\
             \x20 payload bytes: {} allocated, {} freed\n\
             \x20 string clones: {}\n\
             \x20 by type:{}\n\
             \x20 queue traffic: {} pushed, {} popped, {} dropped_drained\n\
             \x20 waits: {} back-pressure, {} pop-empty\n\
             \x20 queues: {} created, {} destroyed\n\
             \x20 workers: {} spawned, {} joined\n",
            load(&self.envelopes_created),
            load(&self.envelopes_freed),
            load(&self.envelopes_forwarded),
            load(&self.envelopes_peak),
            load(&self.payload_bytes_allocated),
            load(&self.payload_bytes_freed),
            load(&self.string_clones),
            if by_kind.is_empty() { " none" } else { by_kind.as_str() },
            load(&self.queue_pushed),
            load(&self.queue_popped),
            load(&self.dropped_drained),
            load(&self.back_pressure_waits),
            load(&self.pop_empty_waits),
            load(&self.queues_created),
            load(&self.queues_destroyed),
            load(&self.workers_spawned),
            load(&self.workers_joined),
        )
    }
}
