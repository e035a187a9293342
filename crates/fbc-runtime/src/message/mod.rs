//! Worker messaging: envelopes, bounded SPSC queues, worker handles.
//!
//! Each spawned worker owns two bounded queues: the *outbox* carries
//! parent-to-worker envelopes, the *inbox* worker-to-parent. Delivery is
//! strict FIFO per queue; `SEND` blocks on a full queue (back-pressure) and
//! `RECEIVE` on an empty one. `AWAIT` joins the thread and drains both
//! queues so every envelope is accounted for.

pub mod envelope;
pub mod queue;
pub mod stats;
pub mod worker;

/// Capacity of each per-worker queue, in envelopes.
pub const QUEUE_CAPACITY: usize = 256;
