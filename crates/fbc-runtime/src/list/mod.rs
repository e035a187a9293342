//! Heterogeneous atom lists.
//!
//! A list is a pool-allocated 32-byte header pointing at a singly-linked
//! chain of 24-byte atoms. Each atom is a tagged 64-bit value: integer,
//! float bits, string descriptor, nested list, or opaque object. Lists and
//! atoms are SAMM-tracked at creation; the explicit mutation paths below
//! untrack whatever they free so the scope sweep never sees it again.

pub mod ops;

use samm::AllocKind;

use crate::{string, Runtime};

/// Atom kind tags. Int and Long share tag 1; Single and Double share tag 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AtomKind {
    /// Also the "Any" element-type hint on list headers.
    Sentinel = 0,
    Int = 1,
    Float = 2,
    Str = 3,
    List = 4,
    Object = 5,
}

impl AtomKind {
    pub fn from_u8(tag: u8) -> AtomKind {
        match tag {
            1 => AtomKind::Int,
            2 => AtomKind::Float,
            3 => AtomKind::Str,
            4 => AtomKind::List,
            5 => AtomKind::Object,
            _ => AtomKind::Sentinel,
        }
    }
}

/// List atom layout: tag, 8-byte value, next pointer. 24-byte pool slot.
#[repr(C)]
pub struct ListAtom {
    pub kind: u8,
    _pad: [u8; 7],
    pub value: u64,
    pub next: usize,
}

/// List header layout: element-type hint, flags, length, head/tail. 32-byte
/// pool slot. The hint affects binding-site type checks only, never storage.
#[repr(C)]
pub struct ListHeader {
    pub kind_hint: u8,
    pub flags: u8,
    _pad: [u8; 6],
    pub length: u64,
    pub head: usize,
    pub tail: usize,
}

#[inline]
pub(crate) fn hdr(addr: usize) -> *mut ListHeader {
    addr as *mut ListHeader
}

#[inline]
pub(crate) fn atom(addr: usize) -> *mut ListAtom {
    addr as *mut ListAtom
}

/// Create a heterogeneous (`Any`-hinted) list.
pub fn list_create(rt: &Runtime) -> usize {
    list_create_typed(rt, AtomKind::Sentinel)
}

/// Create a list with an element-type hint.
pub fn list_create_typed(rt: &Runtime, hint: AtomKind) -> usize {
    let addr = rt.pools.headers.alloc();
    // SAFETY: fresh zeroed 32-byte slot.
    unsafe { (*hdr(addr)).kind_hint = hint as u8 };
    rt.samm.track(addr, AllocKind::List);
    addr
}

/// Allocate and track one atom.
pub(crate) fn atom_new(rt: &Runtime, kind: AtomKind, value: u64) -> usize {
    let addr = rt.pools.atoms.alloc();
    // SAFETY: fresh zeroed 24-byte slot.
    unsafe {
        let a = atom(addr);
        (*a).kind = kind as u8;
        (*a).value = value;
        (*a).next = 0;
    }
    rt.samm.track(addr, AllocKind::ListAtom);
    addr
}

/// Release whatever an atom's value owns: one string reference, or a whole
/// nested list. Scalars and opaque objects are untouched.
pub(crate) fn release_payload(rt: &Runtime, kind: u8, value: u64) {
    match AtomKind::from_u8(kind) {
        AtomKind::Str => string::release(&rt.pools, value as usize),
        AtomKind::List => list_free(rt, value as usize),
        _ => {}
    }
}

/// Return an atom shell to its pool. The payload must already be released
/// or transferred.
pub(crate) fn atom_free(rt: &Runtime, addr: usize) {
    rt.samm.untrack(addr);
    rt.pools.atoms.free(addr);
}

/// Free a list: full payload release on every atom, then shells and header
/// back to their pools.
pub fn list_free(rt: &Runtime, list: usize) {
    if list == 0 {
        return;
    }
    free_chain(rt, list);
    rt.samm.untrack(list);
    rt.pools.headers.free(list);
}

/// Like `list_free`, but the (emptied) header survives.
pub fn list_clear(rt: &Runtime, list: usize) {
    if list == 0 {
        return;
    }
    free_chain(rt, list);
}

fn free_chain(rt: &Runtime, list: usize) {
    // SAFETY: list is a live header; atoms form a well-linked chain.
    unsafe {
        let h = hdr(list);
        let mut cursor = (*h).head;
        while cursor != 0 {
            let a = atom(cursor);
            let next = (*a).next;
            release_payload(rt, (*a).kind, (*a).value);
            atom_free(rt, cursor);
            cursor = next;
        }
        (*h).head = 0;
        (*h).tail = 0;
        (*h).length = 0;
    }
}

/// Element count; null lists read as empty.
pub fn list_length(list: usize) -> u64 {
    if list == 0 {
        return 0;
    }
    // SAFETY: live header.
    unsafe { (*hdr(list)).length }
}

pub fn list_is_empty(list: usize) -> bool {
    list_length(list) == 0
}

/// Walk the chain and cross-check the header: length matches reachable
/// atoms, tail is the last atom (or null iff empty). Diagnostics and tests.
pub fn list_check_consistency(list: usize) -> bool {
    if list == 0 {
        return true;
    }
    // SAFETY: live header and chain.
    unsafe {
        let h = hdr(list);
        let mut count = 0u64;
        let mut cursor = (*h).head;
        let mut last = 0usize;
        while cursor != 0 {
            count += 1;
            if count > (*h).length {
                return false;
            }
            last = cursor;
            cursor = (*atom(cursor)).next;
        }
        count == (*h).length && last == (*h).tail
    }
}
