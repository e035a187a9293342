//! Counted wrappers around the bounded SPSC channel endpoints.
//!
//! Back-pressure and empty-queue waits are counted on the slow paths only:
//! the fast path is a lock-free try. Disconnection (the peer side gone) is
//! not an error - a send to a finished worker is drained, a receive from
//! one returns nothing.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::message::envelope::Envelope;
use crate::message::stats::MsgStats;

/// Create one counted queue (a sender/receiver pair).
pub(crate) fn message_queue(
    capacity: usize,
    stats: &Arc<MsgStats>,
) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = bounded(capacity);
    stats.queues_created.fetch_add(1, Ordering::Relaxed);
    (
        QueueSender {
            tx,
            stats: Arc::clone(stats),
        },
        QueueReceiver {
            rx,
            stats: Arc::clone(stats),
        },
    )
}

pub(crate) struct QueueSender {
    tx: Sender<Envelope>,
    stats: Arc<MsgStats>,
}

impl QueueSender {
    /// Push, blocking under back-pressure. If the receiving side is gone
    /// the envelope is dropped and counted as drained.
    pub(crate) fn send_blocking(&self, envelope: Envelope) {
        match self.tx.try_send(envelope) {
            Ok(()) => {
                self.stats.queue_pushed.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(envelope)) => {
                self.stats
                    .back_pressure_waits
                    .fetch_add(1, Ordering::Relaxed);
                match self.tx.send(envelope) {
                    Ok(()) => {
                        self.stats.queue_pushed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_returned) => {
                        // Receiver gone while we were blocked: the envelope
                        // drops here, exactly as if AWAIT had drained it.
                        self.stats.dropped_drained.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(TrySendError::Disconnected(_returned)) => {
                self.stats.dropped_drained.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

pub(crate) struct QueueReceiver {
    rx: Receiver<Envelope>,
    stats: Arc<MsgStats>,
}

impl QueueReceiver {
    /// Pop the head, blocking while empty. `None` when the sending side is
    /// gone and the queue is drained.
    pub(crate) fn recv_blocking(&self) -> Option<Envelope> {
        match self.rx.try_recv() {
            Ok(envelope) => {
                self.stats.queue_popped.fetch_add(1, Ordering::Relaxed);
                Some(envelope)
            }
            Err(TryRecvError::Empty) => {
                self.stats.pop_empty_waits.fetch_add(1, Ordering::Relaxed);
                match self.rx.recv() {
                    Ok(envelope) => {
                        self.stats.queue_popped.fetch_add(1, Ordering::Relaxed);
                        Some(envelope)
                    }
                    Err(_) => None,
                }
            }
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Non-blocking pop.
    pub(crate) fn try_recv(&self) -> Option<Envelope> {
        match self.rx.try_recv() {
            Ok(envelope) => {
                self.stats.queue_popped.fetch_add(1, Ordering::Relaxed);
                Some(envelope)
            }
            Err(_) => None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Pop-and-drop everything queued, counting each envelope. Used by
    /// AWAIT and by the worker wrapper on exit.
    pub(crate) fn drain(&self) -> usize {
        let mut drained = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            drop(envelope);
            drained += 1;
        }
        self.stats
            .dropped_drained
            .fetch_add(drained as u64, Ordering::Relaxed);
        drained
    }
}

impl Drop for QueueReceiver {
    fn drop(&mut self) {
        self.stats.queues_destroyed.fetch_add(1, Ordering::Relaxed);
    }
}
