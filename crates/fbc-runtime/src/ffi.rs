//! C ABI for backend-emitted calls.
//!
//! Thin `extern "C"` wrappers over the process-wide [`Runtime::global`].
//! Pointers cross this boundary as plain machine words; envelopes and
//! worker handles are boxed and passed as opaque pointers. Worker-side
//! calls (`worker_*_parent`) resolve the current worker context through a
//! thread-local set for the duration of the worker entry function.

use std::cell::Cell;
use std::ptr;

use samm::AllocKind;

use crate::list::{self, ops, AtomKind};
use crate::message::envelope::{self, Envelope};
use crate::message::worker::{worker_spawn, WorkerContext, WorkerHandle};
use crate::{class, string, Runtime};

fn alloc_kind_from(tag: u8) -> AllocKind {
    match tag {
        0 => AllocKind::Object,
        1 => AllocKind::List,
        2 => AllocKind::ListAtom,
        3 => AllocKind::Str,
        5 => AllocKind::Generic,
        _ => AllocKind::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Memory: SAMM scope operations
// ---------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn samm_enter_scope() -> bool {
    match Runtime::global().samm.enter_scope() {
        Ok(()) => true,
        Err(e) => {
            eprintln!("samm_enter_scope failed: {}", e);
            false
        }
    }
}

#[no_mangle]
pub extern "C" fn samm_exit_scope() -> bool {
    match Runtime::global().samm.exit_scope() {
        Ok(()) => true,
        Err(e) => {
            eprintln!("samm_exit_scope failed: {}", e);
            false
        }
    }
}

#[no_mangle]
pub extern "C" fn samm_track(ptr: usize, kind: u8) {
    Runtime::global().samm.track(ptr, alloc_kind_from(kind));
}

#[no_mangle]
pub extern "C" fn samm_untrack(ptr: usize) -> bool {
    Runtime::global().samm.untrack(ptr)
}

#[no_mangle]
pub extern "C" fn samm_retain(ptr: usize, parent_offset: u32) -> bool {
    Runtime::global().samm.retain(ptr, parent_offset as usize)
}

#[no_mangle]
pub extern "C" fn samm_delete(ptr: usize) -> bool {
    Runtime::global().samm.delete(ptr)
}

#[no_mangle]
pub extern "C" fn samm_wait() {
    Runtime::global().samm.wait();
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// New tracked descriptor from raw UTF-8 bytes.
///
/// # Safety
/// `data` must point at `len` readable bytes of valid UTF-8.
#[no_mangle]
pub unsafe extern "C" fn str_new(data: *const u8, len: usize) -> usize {
    let text = if data.is_null() || len == 0 {
        ""
    } else {
        match std::str::from_utf8(std::slice::from_raw_parts(data, len)) {
            Ok(s) => s,
            Err(_) => "",
        }
    };
    string::create_tracked(Runtime::global(), text)
}

#[no_mangle]
pub extern "C" fn str_retain(desc: usize) {
    string::retain(desc);
}

#[no_mangle]
pub extern "C" fn str_release(desc: usize) {
    string::release(&Runtime::global().pools, desc);
}

#[no_mangle]
pub extern "C" fn str_len(desc: usize) -> usize {
    string::as_str(desc).len()
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn list_create() -> usize {
    list::list_create(Runtime::global())
}

#[no_mangle]
pub extern "C" fn list_create_typed(kind: u8) -> usize {
    list::list_create_typed(Runtime::global(), AtomKind::from_u8(kind))
}

#[no_mangle]
pub extern "C" fn list_free(list: usize) {
    list::list_free(Runtime::global(), list);
}

#[no_mangle]
pub extern "C" fn list_clear(list: usize) {
    list::list_clear(Runtime::global(), list);
}

#[no_mangle]
pub extern "C" fn list_length(list: usize) -> u64 {
    list::list_length(list)
}

#[no_mangle]
pub extern "C" fn list_empty(list: usize) -> bool {
    list::list_is_empty(list)
}

macro_rules! list_mutator_abi {
    ($name:ident, $inner:path, $ty:ty) => {
        #[no_mangle]
        pub extern "C" fn $name(list: usize, value: $ty) {
            $inner(Runtime::global(), list, value);
        }
    };
}

list_mutator_abi!(list_append_int, ops::list_append_int, i64);
list_mutator_abi!(list_append_float, ops::list_append_float, f64);
list_mutator_abi!(list_append_str, ops::list_append_str, usize);
list_mutator_abi!(list_append_list, ops::list_append_list, usize);
list_mutator_abi!(list_append_object, ops::list_append_object, usize);
list_mutator_abi!(list_prepend_int, ops::list_prepend_int, i64);
list_mutator_abi!(list_prepend_float, ops::list_prepend_float, f64);
list_mutator_abi!(list_prepend_str, ops::list_prepend_str, usize);
list_mutator_abi!(list_prepend_list, ops::list_prepend_list, usize);
list_mutator_abi!(list_prepend_object, ops::list_prepend_object, usize);

macro_rules! list_insert_abi {
    ($name:ident, $inner:path, $ty:ty) => {
        #[no_mangle]
        pub extern "C" fn $name(list: usize, pos: i64, value: $ty) {
            $inner(Runtime::global(), list, pos, value);
        }
    };
}

list_insert_abi!(list_insert_int, ops::list_insert_int, i64);
list_insert_abi!(list_insert_float, ops::list_insert_float, f64);
list_insert_abi!(list_insert_str, ops::list_insert_str, usize);
list_insert_abi!(list_insert_list, ops::list_insert_list, usize);
list_insert_abi!(list_insert_object, ops::list_insert_object, usize);

#[no_mangle]
pub extern "C" fn list_shift_int(list: usize) -> i64 {
    ops::list_shift_int(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_shift_float(list: usize) -> f64 {
    ops::list_shift_float(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_shift_ptr(list: usize) -> usize {
    ops::list_shift_ptr(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_shift(list: usize) {
    ops::list_shift(Runtime::global(), list);
}

#[no_mangle]
pub extern "C" fn list_pop_int(list: usize) -> i64 {
    ops::list_pop_int(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_pop_float(list: usize) -> f64 {
    ops::list_pop_float(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_pop_ptr(list: usize) -> usize {
    ops::list_pop_ptr(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_pop(list: usize) {
    ops::list_pop(Runtime::global(), list);
}

#[no_mangle]
pub extern "C" fn list_remove(list: usize, pos: i64) {
    ops::list_remove(Runtime::global(), list, pos);
}

#[no_mangle]
pub extern "C" fn list_get_int(list: usize, pos: i64) -> i64 {
    ops::list_get_int(list, pos)
}

#[no_mangle]
pub extern "C" fn list_get_float(list: usize, pos: i64) -> f64 {
    ops::list_get_float(list, pos)
}

#[no_mangle]
pub extern "C" fn list_get_str(list: usize, pos: i64) -> usize {
    ops::list_get_str(list, pos)
}

#[no_mangle]
pub extern "C" fn list_get_ptr(list: usize, pos: i64) -> usize {
    ops::list_get_ptr(list, pos)
}

#[no_mangle]
pub extern "C" fn list_head_int(list: usize) -> i64 {
    ops::list_head_int(list)
}

#[no_mangle]
pub extern "C" fn list_head_float(list: usize) -> f64 {
    ops::list_head_float(list)
}

#[no_mangle]
pub extern "C" fn list_head_str(list: usize) -> usize {
    ops::list_head_str(list)
}

#[no_mangle]
pub extern "C" fn list_copy(list: usize) -> usize {
    ops::list_copy(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_reverse(list: usize) -> usize {
    ops::list_reverse(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_rest(list: usize) -> usize {
    ops::list_rest(Runtime::global(), list)
}

#[no_mangle]
pub extern "C" fn list_contains_int(list: usize, needle: i64) -> bool {
    ops::list_contains_int(list, needle)
}

#[no_mangle]
pub extern "C" fn list_contains_float(list: usize, needle: f64) -> bool {
    ops::list_contains_float(list, needle)
}

#[no_mangle]
pub extern "C" fn list_contains_str(list: usize, needle: usize) -> bool {
    ops::list_contains_str(list, needle)
}

#[no_mangle]
pub extern "C" fn list_indexof_int(list: usize, needle: i64) -> u64 {
    ops::list_indexof_int(list, needle)
}

#[no_mangle]
pub extern "C" fn list_indexof_float(list: usize, needle: f64) -> u64 {
    ops::list_indexof_float(list, needle)
}

#[no_mangle]
pub extern "C" fn list_indexof_str(list: usize, needle: usize) -> u64 {
    ops::list_indexof_str(list, needle)
}

#[no_mangle]
pub extern "C" fn list_join(list: usize, separator: usize) -> usize {
    let rt = Runtime::global();
    ops::list_join(rt, list, string::as_str(separator))
}

// ---------------------------------------------------------------------------
// Objects and MATCH TYPE support
// ---------------------------------------------------------------------------

/// # Safety
/// `vtable` must point at a live, 'static vtable record.
#[no_mangle]
pub unsafe extern "C" fn object_new(vtable: *const class::VTable, size: usize) -> usize {
    if vtable.is_null() {
        return 0;
    }
    class::object_new(Runtime::global(), &*vtable, size)
}

#[no_mangle]
pub extern "C" fn object_class_id(obj: usize) -> u32 {
    class::object_class_id(obj)
}

#[no_mangle]
pub extern "C" fn object_instance_of(obj: usize, class_id: u32) -> bool {
    class::object_instance_of(obj, class_id)
}

// ---------------------------------------------------------------------------
// Marshalling and envelopes
// ---------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn marshal_int(value: i64) -> *mut Envelope {
    Box::into_raw(Box::new(envelope::marshal_int(
        &Runtime::global().msg_stats,
        value,
    )))
}

#[no_mangle]
pub extern "C" fn marshal_float(value: f64) -> *mut Envelope {
    Box::into_raw(Box::new(envelope::marshal_float(
        &Runtime::global().msg_stats,
        value,
    )))
}

#[no_mangle]
pub extern "C" fn marshal_str(desc: usize) -> *mut Envelope {
    Box::into_raw(Box::new(envelope::marshal_str(
        &Runtime::global().msg_stats,
        string::as_str(desc),
    )))
}

/// # Safety
/// `data` must point at `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn marshal_udt(data: *const u8, len: usize, type_id: u32) -> *mut Envelope {
    let bytes = if data.is_null() || len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(data, len)
    };
    Box::into_raw(Box::new(envelope::marshal_udt(
        &Runtime::global().msg_stats,
        bytes,
        type_id,
    )))
}

/// # Safety
/// `dims` must point at `rank` u32 values and `data` at `len` f64 values.
#[no_mangle]
pub unsafe extern "C" fn marshal_array_f64(
    dims: *const u32,
    rank: usize,
    data: *const f64,
    len: usize,
) -> *mut Envelope {
    let dims = if dims.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(dims, rank)
    };
    let data = if data.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(data, len)
    };
    Box::into_raw(Box::new(envelope::marshal_array_f64(
        &Runtime::global().msg_stats,
        dims,
        data,
    )))
}

#[no_mangle]
pub extern "C" fn envelope_kind(env: *const Envelope) -> u8 {
    if env.is_null() {
        return 0;
    }
    // SAFETY: callers pass envelopes produced by the marshal functions.
    unsafe { (*env).kind() as u8 }
}

#[no_mangle]
pub extern "C" fn envelope_type_id(env: *const Envelope) -> u32 {
    if env.is_null() {
        return 0;
    }
    // SAFETY: as above.
    unsafe { (*env).type_id() }
}

/// # Safety
/// `env` must be a live envelope; the returned pointer is valid until the
/// envelope is consumed or freed.
#[no_mangle]
pub unsafe extern "C" fn envelope_payload(env: *mut Envelope, out_len: *mut usize) -> *mut u8 {
    if env.is_null() {
        if !out_len.is_null() {
            *out_len = 0;
        }
        return ptr::null_mut();
    }
    let payload = (*env).payload_mut();
    if !out_len.is_null() {
        *out_len = payload.len();
    }
    payload.as_mut_ptr()
}

/// Consume an envelope into an integer (UNMARSHALL for scalars).
///
/// # Safety
/// `env` must be a live envelope pointer from this ABI; it is freed here.
#[no_mangle]
pub unsafe extern "C" fn unmarshal_int(env: *mut Envelope) -> i64 {
    if env.is_null() {
        return 0;
    }
    let envelope = Box::from_raw(env);
    envelope.as_int()
}

/// # Safety
/// As [`unmarshal_int`].
#[no_mangle]
pub unsafe extern "C" fn unmarshal_float(env: *mut Envelope) -> f64 {
    if env.is_null() {
        return 0.0;
    }
    let envelope = Box::from_raw(env);
    envelope.as_float()
}

/// Consume a string envelope into a fresh tracked descriptor.
///
/// # Safety
/// As [`unmarshal_int`].
#[no_mangle]
pub unsafe extern "C" fn unmarshal_str(env: *mut Envelope) -> usize {
    if env.is_null() {
        return 0;
    }
    let envelope = Box::from_raw(env);
    string::create_tracked(Runtime::global(), envelope.as_str())
}

/// # Safety
/// As [`unmarshal_int`].
#[no_mangle]
pub unsafe extern "C" fn envelope_free(env: *mut Envelope) {
    if !env.is_null() {
        drop(Box::from_raw(env));
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

thread_local! {
    static CURRENT_WORKER: Cell<*const WorkerContext> = const { Cell::new(ptr::null()) };
}

fn with_current_worker<R>(default: R, f: impl FnOnce(&WorkerContext) -> R) -> R {
    CURRENT_WORKER.with(|cell| {
        let ctx = cell.get();
        if ctx.is_null() {
            default
        } else {
            // SAFETY: the pointer is set for exactly the lifetime of the
            // worker entry function on this thread.
            f(unsafe { &*ctx })
        }
    })
}

/// SPAWN: run `entry(args)` on a new worker thread.
#[no_mangle]
pub extern "C" fn worker_spawn_entry(
    entry: Option<extern "C" fn(usize) -> f64>,
    args: usize,
) -> *mut WorkerHandle {
    let Some(entry) = entry else {
        return ptr::null_mut();
    };
    let spawned = worker_spawn(Runtime::global(), move |ctx| {
        CURRENT_WORKER.with(|cell| cell.set(ctx as *const WorkerContext));
        let result = entry(args);
        CURRENT_WORKER.with(|cell| cell.set(ptr::null()));
        result
    });
    match spawned {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            eprintln!("worker spawn failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `handle` must be live; `env` is consumed.
#[no_mangle]
pub unsafe extern "C" fn worker_send(handle: *const WorkerHandle, env: *mut Envelope) {
    if handle.is_null() || env.is_null() {
        return;
    }
    (*handle).send(*Box::from_raw(env));
}

/// # Safety
/// `handle` must be live. Returns null when the worker is gone.
#[no_mangle]
pub unsafe extern "C" fn worker_receive(handle: *const WorkerHandle) -> *mut Envelope {
    if handle.is_null() {
        return ptr::null_mut();
    }
    match (*handle).receive() {
        Some(envelope) => Box::into_raw(Box::new(envelope)),
        None => ptr::null_mut(),
    }
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn worker_hasmessage(handle: *const WorkerHandle) -> bool {
    !handle.is_null() && (*handle).has_message()
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn worker_ready(handle: *const WorkerHandle) -> bool {
    !handle.is_null() && (*handle).ready()
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn worker_cancel(handle: *const WorkerHandle) {
    if !handle.is_null() {
        (*handle).cancel();
    }
}

/// AWAIT: join, drain, destroy the handle, return the scalar result.
///
/// # Safety
/// `handle` must be a live pointer from `worker_spawn_entry`; it is
/// invalid after this call.
#[no_mangle]
pub unsafe extern "C" fn worker_await(handle: *mut WorkerHandle) -> f64 {
    if handle.is_null() {
        return 0.0;
    }
    Box::from_raw(handle).join()
}

/// Worker-side CANCELLED(PARENT).
#[no_mangle]
pub extern "C" fn worker_cancelled_parent() -> bool {
    with_current_worker(false, |ctx| ctx.cancelled())
}

/// Worker-side SEND PARENT.
///
/// # Safety
/// `env` is consumed.
#[no_mangle]
pub unsafe extern "C" fn worker_send_parent(env: *mut Envelope) {
    if env.is_null() {
        return;
    }
    let envelope = *Box::from_raw(env);
    with_current_worker((), |ctx| ctx.send(envelope));
}

/// Worker-side RECEIVE(PARENT).
#[no_mangle]
pub extern "C" fn worker_receive_parent() -> *mut Envelope {
    with_current_worker(ptr::null_mut(), |ctx| match ctx.receive() {
        Some(envelope) => Box::into_raw(Box::new(envelope)),
        None => ptr::null_mut(),
    })
}

/// Worker-side bounce: forward a received envelope to the parent without
/// copying the payload.
///
/// # Safety
/// `env` is consumed.
#[no_mangle]
pub unsafe extern "C" fn worker_bounce_parent(env: *mut Envelope) {
    if env.is_null() {
        return;
    }
    let envelope = *Box::from_raw(env);
    with_current_worker((), |ctx| ctx.bounce(envelope));
}
