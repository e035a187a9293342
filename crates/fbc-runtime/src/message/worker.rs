//! Worker threads: one OS thread per SPAWN, joined on AWAIT.
//!
//! The parent keeps a [`WorkerHandle`]; the worker body receives a
//! [`WorkerContext`]. Cancellation is a single cooperative atomic flag.
//! When the body returns, the worker wrapper drains its unread inbound
//! messages (unblocking any parent SEND stuck on a full queue) and raises
//! the done flag; AWAIT then joins the thread and drains the other
//! direction, so after AWAIT both queues are empty and every envelope is
//! freed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{Result, RuntimeError};
use crate::message::envelope::Envelope;
use crate::message::queue::{message_queue, QueueReceiver, QueueSender};
use crate::message::stats::MsgStats;
use crate::message::QUEUE_CAPACITY;
use crate::Runtime;

/// Parent-side handle for one spawned worker.
pub struct WorkerHandle {
    /// `None` once the sender is disconnected during teardown.
    outbox: Option<QueueSender>,
    inbox: QueueReceiver,
    thread: Option<JoinHandle<f64>>,
    cancel: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    stats: Arc<MsgStats>,
}

/// Worker-side view: the opposite queue endpoints plus the cancel flag.
pub struct WorkerContext {
    inbound: QueueReceiver,
    outbound: QueueSender,
    cancel: Arc<AtomicBool>,
    stats: Arc<MsgStats>,
    bounce_enabled: bool,
}

/// SPAWN: start one OS thread running `body`.
pub fn worker_spawn<F>(rt: &Runtime, body: F) -> Result<WorkerHandle>
where
    F: FnOnce(&WorkerContext) -> f64 + Send + 'static,
{
    let stats = Arc::clone(&rt.msg_stats);
    let (outbox_tx, outbox_rx) = message_queue(QUEUE_CAPACITY, &stats);
    let (inbox_tx, inbox_rx) = message_queue(QUEUE_CAPACITY, &stats);
    let cancel = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));

    let context = WorkerContext {
        inbound: outbox_rx,
        outbound: inbox_tx,
        cancel: Arc::clone(&cancel),
        stats: Arc::clone(&stats),
        bounce_enabled: rt.bounce_enabled(),
    };
    let done_flag = Arc::clone(&done);

    let handle = std::thread::Builder::new()
        .name("fb-worker".to_string())
        .spawn(move || {
            let result = body(&context);
            // Unread parent->worker messages are dead; dropping the
            // receiver afterwards unblocks any SEND stuck on a full queue.
            context.inbound.drain();
            done_flag.store(true, Ordering::Release);
            result
        })
        .map_err(|e| RuntimeError::WorkerSpawn(e.to_string()))?;

    stats.workers_spawned.fetch_add(1, Ordering::Relaxed);
    Ok(WorkerHandle {
        outbox: Some(outbox_tx),
        inbox: inbox_rx,
        thread: Some(handle),
        cancel,
        done,
        stats,
    })
}

impl WorkerHandle {
    /// SEND: push an envelope toward the worker; blocks under
    /// back-pressure.
    pub fn send(&self, envelope: Envelope) {
        if let Some(outbox) = &self.outbox {
            outbox.send_blocking(envelope);
        }
    }

    /// RECEIVE: pop the next worker-to-parent envelope; blocks while
    /// empty, `None` once the worker is gone and the queue drained.
    pub fn receive(&self) -> Option<Envelope> {
        self.inbox.recv_blocking()
    }

    /// HASMESSAGE: non-blocking check.
    pub fn has_message(&self) -> bool {
        !self.inbox.is_empty()
    }

    /// READY: has the worker body returned?
    pub fn ready(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// CANCEL: cooperative only; the worker polls `cancelled`.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// AWAIT: join the worker, drain both queues, recover the scalar
    /// result. The handle is consumed; after this it no longer exists.
    pub fn join(mut self) -> f64 {
        let result = match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(value) => value,
                Err(_) => {
                    // A fault in a worker takes the process down; panics
                    // never cross the thread boundary silently.
                    log::error!("worker thread panicked; aborting");
                    std::process::abort();
                }
            },
            None => 0.0,
        };
        self.inbox.drain();
        self.stats.workers_joined.fetch_add(1, Ordering::Relaxed);
        result
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // A dropped handle (no AWAIT) still cancels, joins and drains so
        // no thread or envelope outlives it. Disconnecting the sender
        // first wakes a worker blocked in receive.
        if let Some(thread) = self.thread.take() {
            self.cancel.store(true, Ordering::Release);
            self.outbox = None;
            if thread.join().is_err() {
                log::error!("worker thread panicked; aborting");
                std::process::abort();
            }
            self.inbox.drain();
            self.stats.workers_joined.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl WorkerContext {
    /// Worker-side RECEIVE(PARENT).
    pub fn receive(&self) -> Option<Envelope> {
        self.inbound.recv_blocking()
    }

    /// Non-blocking variant backing HASMESSAGE-style polling loops.
    pub fn try_receive(&self) -> Option<Envelope> {
        self.inbound.try_recv()
    }

    pub fn has_message(&self) -> bool {
        !self.inbound.is_empty()
    }

    /// Worker-side SEND PARENT.
    pub fn send(&self, envelope: Envelope) {
        self.outbound.send_blocking(envelope);
    }

    /// CANCELLED(PARENT): acquire-load of the cancel flag.
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Worker-side marshalling (workers have no `Runtime` reference).
    pub fn marshal_int(&self, value: i64) -> Envelope {
        crate::message::envelope::marshal_int(&self.stats, value)
    }

    pub fn marshal_float(&self, value: f64) -> Envelope {
        crate::message::envelope::marshal_float(&self.stats, value)
    }

    pub fn marshal_str(&self, text: &str) -> Envelope {
        crate::message::envelope::marshal_str(&self.stats, text)
    }

    pub fn marshal_udt(&self, bytes: &[u8], type_id: u32) -> Envelope {
        crate::message::envelope::marshal_udt(&self.stats, bytes, type_id)
    }

    /// Bounce forwarding: re-send a received envelope without the
    /// unmarshal/marshal round trip.
    ///
    /// With the optimization disabled (test knob) an observably identical
    /// copy is sent instead and the original is freed, exercising the
    /// fallback path the compiler emits for UDTs with reference fields.
    pub fn bounce(&self, envelope: Envelope) {
        if self.bounce_enabled {
            self.stats
                .envelopes_forwarded
                .fetch_add(1, Ordering::Relaxed);
            self.outbound.send_blocking(envelope);
        } else {
            let copy = envelope.duplicate();
            drop(envelope);
            self.outbound.send_blocking(copy);
        }
    }
}
