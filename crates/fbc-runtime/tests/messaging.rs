//! Worker Messaging Tests - FIFO, Bounce, Drain, Cancellation
//!
//! End-to-end scenarios over real OS threads: strict per-queue ordering,
//! the zero-copy bounce equivalence, AWAIT's drain guarantee, cooperative
//! cancellation, and the parallel-sum integration with balanced
//! message-memory counters.

use std::sync::atomic::Ordering;

use fbc_runtime::message::worker::worker_spawn;
use fbc_runtime::{MsgKind, Runtime};
use samm::SammConfig;

fn rt() -> Runtime {
    Runtime::new(SammConfig::small_for_tests()).expect("runtime init")
}

const POINT_TYPE: u32 = 11;
const RANGE_TYPE: u32 = 12;
const RESULT_TYPE: u32 = 13;

fn two_i64(a: i64, b: i64) -> Vec<u8> {
    let mut bytes = a.to_le_bytes().to_vec();
    bytes.extend_from_slice(&b.to_le_bytes());
    bytes
}

fn read_i64(payload: &[u8], index: usize) -> i64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&payload[index * 8..index * 8 + 8]);
    i64::from_le_bytes(b)
}

fn write_i64(payload: &mut [u8], index: usize, value: i64) {
    payload[index * 8..index * 8 + 8].copy_from_slice(&value.to_le_bytes());
}

/// **Bug this finds:** queue reordering or message loss.
/// **Invariant verified:** send order equals receive order, per queue, for
/// a full burst.
#[test]
fn message_delivery_is_strict_fifo() {
    let rt = rt();
    let handle = worker_spawn(&rt, |ctx| {
        // Echo every integer back, multiplied, preserving order.
        while let Some(envelope) = ctx.receive() {
            let value = envelope.as_int();
            if value < 0 {
                break;
            }
            ctx.send(ctx.marshal_int(value * 10));
        }
        0.0
    })
    .expect("spawn");

    for v in 1..=50 {
        handle.send(rt.marshal_int(v));
    }
    for v in 1..=50 {
        let reply = handle.receive().expect("reply");
        assert_eq!(reply.as_int(), v * 10, "out-of-order reply");
    }
    handle.send(rt.marshal_int(-1));
    handle.join();
}

fn run_bounce_round_trip(enabled: bool) -> (i64, i64, u64) {
    let rt = rt();
    rt.set_bounce_enabled(enabled);
    let handle = worker_spawn(&rt, |ctx| {
        if let Some(mut envelope) = ctx.receive() {
            assert_eq!(envelope.kind(), MsgKind::Udt);
            assert_eq!(envelope.type_id(), POINT_TYPE);
            // p.x += 1, in place; no unmarshal into local storage.
            let payload = envelope.payload_mut();
            let x = read_i64(payload, 0);
            write_i64(payload, 0, x + 1);
            ctx.bounce(envelope);
        }
        0.0
    })
    .expect("spawn");

    handle.send(rt.marshal_udt(&two_i64(0, 0), POINT_TYPE));
    let reply = handle.receive().expect("bounced point");
    let x = read_i64(reply.payload(), 0);
    let y = read_i64(reply.payload(), 1);
    drop(reply);
    handle.join();
    let forwarded = rt
        .message_stats()
        .envelopes_forwarded
        .load(Ordering::Relaxed);
    (x, y, forwarded)
}

/// `Point{0,0}` sent to a worker that increments `x` and sends it back.
///
/// **Bug this finds:** the zero-copy path producing different bytes than
/// the copy path, or the forwarded counter firing on the wrong path.
#[test]
fn bounce_equivalence_with_optimization_on_and_off() {
    let (x_on, y_on, forwarded_on) = run_bounce_round_trip(true);
    let (x_off, y_off, forwarded_off) = run_bounce_round_trip(false);
    assert_eq!((x_on, y_on), (1, 0));
    assert_eq!((x_off, y_off), (1, 0));
    assert_eq!(forwarded_on, 1);
    assert_eq!(forwarded_off, 0);
}

/// Four workers splitting a sum; results match the sequential computation
/// and every message-memory counter balances after the joins.
///
/// **Bug this finds:** envelope leaks across threads, queue lifecycle
/// imbalance, lost partial results.
#[test]
fn parallel_sum_integration_balances_counters() {
    let rt = rt();
    let total_n = 40_000i64;
    let workers = 4;
    let chunk = total_n / workers;

    let mut handles = Vec::new();
    for w in 0..workers {
        let handle = worker_spawn(&rt, |ctx| {
            if let Some(envelope) = ctx.receive() {
                assert_eq!(envelope.type_id(), RANGE_TYPE);
                let start = read_i64(envelope.payload(), 0);
                let end = read_i64(envelope.payload(), 1);
                let partial: f64 = (start..end).map(|i| (i as f64).sqrt()).sum();
                let mut bytes = partial.to_bits().to_le_bytes().to_vec();
                bytes.extend_from_slice(&0u64.to_le_bytes());
                ctx.send(ctx.marshal_udt(&bytes, RESULT_TYPE));
            }
            1.0
        })
        .expect("spawn");
        handle.send(rt.marshal_udt(&two_i64(w * chunk, (w + 1) * chunk), RANGE_TYPE));
        handles.push(handle);
    }

    let mut parallel_sum = 0.0f64;
    let mut completed = 0.0f64;
    for handle in handles {
        let result = handle.receive().expect("work result");
        assert_eq!(result.type_id(), RESULT_TYPE);
        let bits = read_i64(result.payload(), 0) as u64;
        parallel_sum += f64::from_bits(bits);
        drop(result);
        completed += handle.join();
    }
    assert_eq!(completed, 4.0);

    let sequential: f64 = (0..total_n).map(|i| (i as f64).sqrt()).sum();
    // Partials associate differently than the sequential sum; allow the
    // rounding slack that reassociation can introduce at this length.
    assert!(
        (parallel_sum - sequential).abs() <= 1e-10 * sequential.abs().max(1.0),
        "parallel {} vs sequential {}",
        parallel_sum,
        sequential
    );

    let stats = rt.message_stats();
    let load = |c: &std::sync::atomic::AtomicU64| c.load(Ordering::Relaxed);
    assert_eq!(
        load(&stats.envelopes_created),
        load(&stats.envelopes_freed),
        "envelope leak"
    );
    assert_eq!(
        load(&stats.payload_bytes_allocated),
        load(&stats.payload_bytes_freed),
        "payload byte leak"
    );
    assert_eq!(
        load(&stats.queues_created),
        load(&stats.queues_destroyed),
        "queue lifecycle imbalance"
    );
    assert_eq!(load(&stats.dropped_drained), 0);
}

/// **Bug this finds:** AWAIT leaving unread envelopes alive.
/// **Invariant verified:** after AWAIT both queues are empty and
/// created == freed for the handle's traffic.
#[test]
fn await_drains_unread_messages() {
    let rt = rt();
    let handle = worker_spawn(&rt, |ctx| {
        for i in 0..10 {
            ctx.send(ctx.marshal_int(i));
        }
        42.0
    })
    .expect("spawn");

    // Read only three of the ten.
    for _ in 0..3 {
        handle.receive().expect("message");
    }
    let result = handle.join();
    assert_eq!(result, 42.0);

    let stats = rt.message_stats();
    assert_eq!(stats.envelopes_in_flight(), 0);
    assert_eq!(stats.dropped_drained.load(Ordering::Relaxed), 7);
}

/// **Bug this finds:** cancellation flag visibility across threads.
/// **Invariant verified:** CANCEL before the worker's first check is
/// always observed; the worker still finishes normally.
#[test]
fn cancel_before_check_is_observed() {
    let rt = rt();
    let handle = worker_spawn(&rt, |ctx| {
        // Wait for the go signal, then poll the flag.
        let _ = ctx.receive();
        if ctx.cancelled() {
            7.0
        } else {
            0.0
        }
    })
    .expect("spawn");

    handle.cancel();
    handle.send(rt.marshal_int(1));
    assert_eq!(handle.join(), 7.0);
}

/// **Bug this finds:** a parent SEND stuck forever on the full queue of a
/// worker that already exited.
/// **Invariant verified:** the blocked SEND unblocks; the undelivered
/// envelopes are accounted as drained; counters balance.
#[test]
fn worker_exit_unblocks_back_pressured_sender() {
    let rt = rt();
    let handle = worker_spawn(&rt, |_ctx| {
        // Consume nothing; exit after a moment so the parent can fill the
        // queue and block.
        std::thread::sleep(std::time::Duration::from_millis(50));
        0.0
    })
    .expect("spawn");

    // Capacity is 256; push past it. The overflow send blocks until the
    // worker's exit drain disconnects the queue.
    for i in 0..300 {
        handle.send(rt.marshal_int(i));
    }
    handle.join();

    let stats = rt.message_stats();
    assert_eq!(stats.envelopes_in_flight(), 0, "every envelope freed");
    assert_eq!(
        stats.envelopes_created.load(Ordering::Relaxed),
        stats.envelopes_freed.load(Ordering::Relaxed)
    );
}

/// HASMESSAGE and READY are non-blocking and eventually consistent.
#[test]
fn has_message_and_ready_track_worker_progress() {
    let rt = rt();
    let handle = worker_spawn(&rt, |ctx| {
        ctx.send(ctx.marshal_int(99));
        5.0
    })
    .expect("spawn");

    // The single message must become visible without blocking the parent.
    while !handle.has_message() {
        std::thread::yield_now();
    }
    assert_eq!(handle.receive().expect("message").as_int(), 99);
    while !handle.ready() {
        std::thread::yield_now();
    }
    assert_eq!(handle.join(), 5.0);
}
