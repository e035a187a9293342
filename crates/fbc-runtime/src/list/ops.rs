//! List operations: positional access, mutation, copies, queries, join.
//!
//! Positions are 1-based throughout. Null list arguments are tolerated and
//! read as empty; out-of-range reads return zero values; invalid removals
//! are no-ops. Nothing here ever aborts.

use crate::list::{
    atom, atom_free, atom_new, hdr, list_create_typed, release_payload, AtomKind,
};
use crate::{string, Runtime};

// ---------------------------------------------------------------------------
// Linking primitives
// ---------------------------------------------------------------------------

fn link_tail(list: usize, new_atom: usize) {
    // SAFETY: live header/atoms; new_atom is fresh with next == 0.
    unsafe {
        let h = hdr(list);
        if (*h).tail == 0 {
            (*h).head = new_atom;
            (*h).tail = new_atom;
        } else {
            (*atom((*h).tail)).next = new_atom;
            (*h).tail = new_atom;
        }
        (*h).length += 1;
    }
}

fn link_head(list: usize, new_atom: usize) {
    // SAFETY: live header/atoms.
    unsafe {
        let h = hdr(list);
        (*atom(new_atom)).next = (*h).head;
        (*h).head = new_atom;
        if (*h).tail == 0 {
            (*h).tail = new_atom;
        }
        (*h).length += 1;
    }
}

/// Insert so the new atom becomes the `pos`-th element.
///
/// Clamps: `pos <= 1` prepends, `pos >= length + 1` appends (the tail
/// pointer moves only in that appending case). `pos == length` inserts
/// just before the current tail.
fn link_at(list: usize, pos: i64, new_atom: usize) {
    let length = super::list_length(list) as i64;
    if pos <= 1 {
        link_head(list, new_atom);
        return;
    }
    if pos >= length + 1 {
        link_tail(list, new_atom);
        return;
    }
    // SAFETY: 2 <= pos <= length, so the predecessor walk stays in range.
    unsafe {
        let h = hdr(list);
        let mut pred = (*h).head;
        for _ in 0..(pos - 2) {
            pred = (*atom(pred)).next;
        }
        (*atom(new_atom)).next = (*atom(pred)).next;
        (*atom(pred)).next = new_atom;
        (*h).length += 1;
    }
}

// ---------------------------------------------------------------------------
// Append / prepend / insert
// ---------------------------------------------------------------------------

macro_rules! mutators_for_kind {
    ($append:ident, $prepend:ident, $insert:ident, $ty:ty, $kind:expr, $encode:expr) => {
        pub fn $append(rt: &Runtime, list: usize, value: $ty) {
            if list == 0 {
                return;
            }
            let encode: fn(&Runtime, $ty) -> u64 = $encode;
            let a = atom_new(rt, $kind, encode(rt, value));
            link_tail(list, a);
        }

        pub fn $prepend(rt: &Runtime, list: usize, value: $ty) {
            if list == 0 {
                return;
            }
            let encode: fn(&Runtime, $ty) -> u64 = $encode;
            let a = atom_new(rt, $kind, encode(rt, value));
            link_head(list, a);
        }

        pub fn $insert(rt: &Runtime, list: usize, pos: i64, value: $ty) {
            if list == 0 {
                return;
            }
            let encode: fn(&Runtime, $ty) -> u64 = $encode;
            let a = atom_new(rt, $kind, encode(rt, value));
            link_at(list, pos, a);
        }
    };
}

mutators_for_kind!(
    list_append_int,
    list_prepend_int,
    list_insert_int,
    i64,
    AtomKind::Int,
    |_, v| v as u64
);

mutators_for_kind!(
    list_append_float,
    list_prepend_float,
    list_insert_float,
    f64,
    AtomKind::Float,
    |_, v| v.to_bits()
);

// String mutators take one extra reference on the descriptor.
mutators_for_kind!(
    list_append_str,
    list_prepend_str,
    list_insert_str,
    usize,
    AtomKind::Str,
    |_, desc| {
        string::retain(desc);
        desc as u64
    }
);

// Nested-list mutators take ownership of the nested list.
mutators_for_kind!(
    list_append_list,
    list_prepend_list,
    list_insert_list,
    usize,
    AtomKind::List,
    |_, nested| nested as u64
);

mutators_for_kind!(
    list_append_object,
    list_prepend_object,
    list_insert_object,
    usize,
    AtomKind::Object,
    |_, obj| obj as u64
);

// ---------------------------------------------------------------------------
// Shift / pop / remove
// ---------------------------------------------------------------------------

fn unlink_head(rt: &Runtime, list: usize) -> Option<(u8, u64)> {
    if list == 0 {
        return None;
    }
    // SAFETY: live header/chain; head nonzero when length nonzero.
    unsafe {
        let h = hdr(list);
        let first = (*h).head;
        if first == 0 {
            return None;
        }
        let a = atom(first);
        (*h).head = (*a).next;
        if (*h).head == 0 {
            (*h).tail = 0;
        }
        (*h).length -= 1;
        let result = ((*a).kind, (*a).value);
        atom_free(rt, first);
        Some(result)
    }
}

fn unlink_tail(rt: &Runtime, list: usize) -> Option<(u8, u64)> {
    if list == 0 {
        return None;
    }
    // SAFETY: live header/chain.
    unsafe {
        let h = hdr(list);
        let last = (*h).tail;
        if last == 0 {
            return None;
        }
        if (*h).head == last {
            return unlink_head(rt, list);
        }
        let mut pred = (*h).head;
        while (*atom(pred)).next != last {
            pred = (*atom(pred)).next;
        }
        (*atom(pred)).next = 0;
        (*h).tail = pred;
        (*h).length -= 1;
        let a = atom(last);
        let result = ((*a).kind, (*a).value);
        atom_free(rt, last);
        Some(result)
    }
}

fn consume_as_int(rt: &Runtime, entry: Option<(u8, u64)>) -> i64 {
    match entry {
        Some((kind, value)) => match AtomKind::from_u8(kind) {
            AtomKind::Int => value as i64,
            AtomKind::Float => f64::from_bits(value) as i64,
            _ => {
                release_payload(rt, kind, value);
                0
            }
        },
        None => 0,
    }
}

fn consume_as_float(rt: &Runtime, entry: Option<(u8, u64)>) -> f64 {
    match entry {
        Some((kind, value)) => match AtomKind::from_u8(kind) {
            AtomKind::Float => f64::from_bits(value),
            AtomKind::Int => value as i64 as f64,
            _ => {
                release_payload(rt, kind, value);
                0.0
            }
        },
        None => 0.0,
    }
}

/// Remove the head and return it as an integer (zero on empty).
pub fn list_shift_int(rt: &Runtime, list: usize) -> i64 {
    let entry = unlink_head(rt, list);
    consume_as_int(rt, entry)
}

pub fn list_shift_float(rt: &Runtime, list: usize) -> f64 {
    let entry = unlink_head(rt, list);
    consume_as_float(rt, entry)
}

/// Remove the head and transfer payload ownership to the caller: the shell
/// is freed, the payload is not released.
pub fn list_shift_ptr(rt: &Runtime, list: usize) -> usize {
    match unlink_head(rt, list) {
        Some((_, value)) => value as usize,
        None => 0,
    }
}

/// Remove the head with full payload cleanup.
pub fn list_shift(rt: &Runtime, list: usize) {
    if let Some((kind, value)) = unlink_head(rt, list) {
        release_payload(rt, kind, value);
    }
}

pub fn list_pop_int(rt: &Runtime, list: usize) -> i64 {
    let entry = unlink_tail(rt, list);
    consume_as_int(rt, entry)
}

pub fn list_pop_float(rt: &Runtime, list: usize) -> f64 {
    let entry = unlink_tail(rt, list);
    consume_as_float(rt, entry)
}

pub fn list_pop_ptr(rt: &Runtime, list: usize) -> usize {
    match unlink_tail(rt, list) {
        Some((_, value)) => value as usize,
        None => 0,
    }
}

pub fn list_pop(rt: &Runtime, list: usize) {
    if let Some((kind, value)) = unlink_tail(rt, list) {
        release_payload(rt, kind, value);
    }
}

/// Remove the `pos`-th element with full cleanup. Out-of-range is a no-op.
pub fn list_remove(rt: &Runtime, list: usize, pos: i64) {
    let length = super::list_length(list) as i64;
    if list == 0 || pos < 1 || pos > length {
        return;
    }
    if pos == 1 {
        list_shift(rt, list);
        return;
    }
    if pos == length {
        list_pop(rt, list);
        return;
    }
    // SAFETY: 2 <= pos < length keeps the predecessor walk in range.
    unsafe {
        let h = hdr(list);
        let mut pred = (*h).head;
        for _ in 0..(pos - 2) {
            pred = (*atom(pred)).next;
        }
        let victim = (*atom(pred)).next;
        (*atom(pred)).next = (*atom(victim)).next;
        (*h).length -= 1;
        let a = atom(victim);
        release_payload(rt, (*a).kind, (*a).value);
        atom_free(rt, victim);
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

fn atom_at(list: usize, pos: i64) -> Option<(u8, u64)> {
    if list == 0 || pos < 1 {
        return None;
    }
    // SAFETY: bounded walk over a live chain.
    unsafe {
        let mut cursor = (*hdr(list)).head;
        let mut index = 1i64;
        while cursor != 0 {
            if index == pos {
                let a = atom(cursor);
                return Some(((*a).kind, (*a).value));
            }
            cursor = (*atom(cursor)).next;
            index += 1;
        }
    }
    None
}

pub fn list_get_int(list: usize, pos: i64) -> i64 {
    match atom_at(list, pos) {
        Some((kind, value)) => match AtomKind::from_u8(kind) {
            AtomKind::Int => value as i64,
            AtomKind::Float => f64::from_bits(value) as i64,
            _ => 0,
        },
        None => 0,
    }
}

pub fn list_get_float(list: usize, pos: i64) -> f64 {
    match atom_at(list, pos) {
        Some((kind, value)) => match AtomKind::from_u8(kind) {
            AtomKind::Float => f64::from_bits(value),
            AtomKind::Int => value as i64 as f64,
            _ => 0.0,
        },
        None => 0.0,
    }
}

/// Borrowing read of a string descriptor; no reference is taken.
pub fn list_get_str(list: usize, pos: i64) -> usize {
    match atom_at(list, pos) {
        Some((kind, value)) if AtomKind::from_u8(kind) == AtomKind::Str => value as usize,
        _ => 0,
    }
}

/// Borrowing read of a pointer-kind value (nested list or object).
pub fn list_get_ptr(list: usize, pos: i64) -> usize {
    match atom_at(list, pos) {
        Some((kind, value))
            if matches!(AtomKind::from_u8(kind), AtomKind::List | AtomKind::Object) =>
        {
            value as usize
        }
        _ => 0,
    }
}

pub fn list_head_int(list: usize) -> i64 {
    list_get_int(list, 1)
}

pub fn list_head_float(list: usize) -> f64 {
    list_get_float(list, 1)
}

pub fn list_head_str(list: usize) -> usize {
    list_get_str(list, 1)
}

// ---------------------------------------------------------------------------
// Copies
// ---------------------------------------------------------------------------

fn copy_value(rt: &Runtime, kind: u8, value: u64) -> u64 {
    match AtomKind::from_u8(kind) {
        // Copies share the descriptor with one more reference.
        AtomKind::Str => {
            string::retain(value as usize);
            value
        }
        // Nested lists are themselves deep-copied.
        AtomKind::List => list_copy(rt, value as usize) as u64,
        _ => value,
    }
}

fn append_raw(rt: &Runtime, list: usize, kind: u8, value: u64) {
    let a = atom_new(rt, AtomKind::from_u8(kind), value);
    link_tail(list, a);
}

/// Deep copy preserving element order and the type hint.
pub fn list_copy(rt: &Runtime, list: usize) -> usize {
    if list == 0 {
        return 0;
    }
    // SAFETY: live header/chain.
    unsafe {
        let h = hdr(list);
        let out = list_create_typed(rt, AtomKind::from_u8((*h).kind_hint));
        let mut cursor = (*h).head;
        while cursor != 0 {
            let a = atom(cursor);
            let value = copy_value(rt, (*a).kind, (*a).value);
            append_raw(rt, out, (*a).kind, value);
            cursor = (*a).next;
        }
        out
    }
}

/// Copy omitting the first element.
pub fn list_rest(rt: &Runtime, list: usize) -> usize {
    if list == 0 {
        return 0;
    }
    // SAFETY: live header/chain.
    unsafe {
        let h = hdr(list);
        let out = list_create_typed(rt, AtomKind::from_u8((*h).kind_hint));
        let mut cursor = (*h).head;
        if cursor != 0 {
            cursor = (*atom(cursor)).next;
        }
        while cursor != 0 {
            let a = atom(cursor);
            let value = copy_value(rt, (*a).kind, (*a).value);
            append_raw(rt, out, (*a).kind, value);
            cursor = (*a).next;
        }
        out
    }
}

/// Reversed copy, built by prepending.
pub fn list_reverse(rt: &Runtime, list: usize) -> usize {
    if list == 0 {
        return 0;
    }
    // SAFETY: live header/chain.
    unsafe {
        let h = hdr(list);
        let out = list_create_typed(rt, AtomKind::from_u8((*h).kind_hint));
        let mut cursor = (*h).head;
        while cursor != 0 {
            let a = atom(cursor);
            let value = copy_value(rt, (*a).kind, (*a).value);
            let new_atom = atom_new(rt, AtomKind::from_u8((*a).kind), value);
            link_head(out, new_atom);
            cursor = (*a).next;
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn index_where(list: usize, mut matches: impl FnMut(u8, u64) -> bool) -> u64 {
    if list == 0 {
        return 0;
    }
    // SAFETY: live header/chain.
    unsafe {
        let mut cursor = (*hdr(list)).head;
        let mut index = 1u64;
        while cursor != 0 {
            let a = atom(cursor);
            if matches((*a).kind, (*a).value) {
                return index;
            }
            cursor = (*a).next;
            index += 1;
        }
    }
    0
}

/// 1-based index of the first matching integer, 0 when absent.
pub fn list_indexof_int(list: usize, needle: i64) -> u64 {
    index_where(list, |kind, value| {
        AtomKind::from_u8(kind) == AtomKind::Int && value as i64 == needle
    })
}

/// Exact (bitwise value) float equality.
pub fn list_indexof_float(list: usize, needle: f64) -> u64 {
    index_where(list, |kind, value| {
        AtomKind::from_u8(kind) == AtomKind::Float && f64::from_bits(value) == needle
    })
}

/// Content comparison against the needle descriptor.
pub fn list_indexof_str(list: usize, needle: usize) -> u64 {
    index_where(list, |kind, value| {
        AtomKind::from_u8(kind) == AtomKind::Str && string::eq(value as usize, needle)
    })
}

pub fn list_contains_int(list: usize, needle: i64) -> bool {
    list_indexof_int(list, needle) != 0
}

pub fn list_contains_float(list: usize, needle: f64) -> bool {
    list_indexof_float(list, needle) != 0
}

pub fn list_contains_str(list: usize, needle: usize) -> bool {
    list_indexof_str(list, needle) != 0
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Concatenate the elements' text forms with `separator`, returning a new
/// tracked string descriptor. Integers print as decimal, floats in their
/// shortest form, nested structures as placeholders.
pub fn list_join(rt: &Runtime, list: usize, separator: &str) -> usize {
    let mut out = String::new();
    if list != 0 {
        // SAFETY: live header/chain.
        unsafe {
            let mut cursor = (*hdr(list)).head;
            let mut first = true;
            while cursor != 0 {
                let a = atom(cursor);
                if !first {
                    out.push_str(separator);
                }
                first = false;
                match AtomKind::from_u8((*a).kind) {
                    AtomKind::Int => out.push_str(&format!("{}", (*a).value as i64)),
                    AtomKind::Float => out.push_str(&format!("{}", f64::from_bits((*a).value))),
                    AtomKind::Str => out.push_str(string::as_str((*a).value as usize)),
                    AtomKind::List => out.push_str("[List]"),
                    AtomKind::Object => out.push_str("[Object]"),
                    AtomKind::Sentinel => {}
                }
                cursor = (*a).next;
            }
        }
    }
    string::create_tracked(rt, &out)
}
