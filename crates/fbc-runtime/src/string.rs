//! Reference-counted string descriptors.
//!
//! A descriptor is a 32-byte record (refcount, length, capacity, data
//! pointer) living in a 40-byte pool slot. The byte buffer is a separate
//! heap allocation. Refcounts are atomic because an explicit delete can
//! race the cleanup worker.
//!
//! Two free paths exist:
//! - [`release`]: decrement, destroy at zero. Used by every explicit
//!   mutation path (atom removal, list free).
//! - [`destroy`]: unconditional teardown. Used by the SAMM sweep, where the
//!   whole scope dies at once and counts no longer matter.

use std::sync::atomic::{AtomicU64, Ordering};

use samm::AllocKind;

use crate::{ListPools, Runtime};

/// String descriptor layout. Lives in the `string_desc` pool.
#[repr(C)]
pub struct StrDesc {
    pub refs: AtomicU64,
    pub len: u64,
    pub cap: u64,
    pub data: usize,
}

#[inline]
fn desc<'a>(addr: usize) -> &'a StrDesc {
    // SAFETY: callers pass addresses produced by `create`; slots stay alive
    // until `destroy` returns them to the pool.
    unsafe { &*(addr as *const StrDesc) }
}

/// Allocate a descriptor for a copy of `text`. Refcount starts at one.
pub fn create(pools: &ListPools, text: &str) -> usize {
    let addr = pools.strings.alloc();
    let bytes: Box<[u8]> = text.as_bytes().to_vec().into_boxed_slice();
    let len = bytes.len();
    let data = Box::into_raw(bytes) as *mut u8 as usize;
    // SAFETY: addr is a fresh zeroed 40-byte slot, large enough for StrDesc.
    unsafe {
        let d = addr as *mut StrDesc;
        (*d).refs = AtomicU64::new(1);
        (*d).len = len as u64;
        (*d).cap = len as u64;
        (*d).data = data;
    }
    addr
}

/// Create a descriptor and register it with the current SAMM scope.
pub fn create_tracked(rt: &Runtime, text: &str) -> usize {
    let addr = create(&rt.pools, text);
    rt.samm.track(addr, AllocKind::Str);
    addr
}

/// Take one additional reference.
pub fn retain(addr: usize) {
    if addr == 0 {
        return;
    }
    desc(addr).refs.fetch_add(1, Ordering::Relaxed);
}

/// Drop one reference; destroys the descriptor when it was the last.
pub fn release(pools: &ListPools, addr: usize) {
    if addr == 0 {
        return;
    }
    if desc(addr).refs.fetch_sub(1, Ordering::AcqRel) == 1 {
        destroy(pools, addr);
    }
}

/// Unconditional teardown: free the byte buffer and return the slot.
pub fn destroy(pools: &ListPools, addr: usize) {
    if addr == 0 {
        return;
    }
    let (data, len) = {
        let d = desc(addr);
        (d.data, d.len as usize)
    };
    if data != 0 {
        // SAFETY: data/len were produced by Box::into_raw of a boxed slice
        // in `create` (cap == len by construction).
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                data as *mut u8,
                len,
            )));
        }
    }
    pools.strings.free(addr);
}

/// Current reference count (diagnostics and tests).
pub fn refcount(addr: usize) -> u64 {
    if addr == 0 {
        return 0;
    }
    desc(addr).refs.load(Ordering::Relaxed)
}

/// Borrow the descriptor's bytes.
pub fn as_str<'a>(addr: usize) -> &'a str {
    if addr == 0 {
        return "";
    }
    let d = desc(addr);
    if d.data == 0 {
        return "";
    }
    // SAFETY: the buffer holds exactly `len` bytes copied from a &str.
    unsafe {
        std::str::from_utf8_unchecked(std::slice::from_raw_parts(
            d.data as *const u8,
            d.len as usize,
        ))
    }
}

/// Content equality between two descriptors.
pub fn eq(a: usize, b: usize) -> bool {
    if a == b {
        return true;
    }
    as_str(a) == as_str(b)
}
