//! Message envelopes: the self-contained blobs `SEND`/`RECEIVE` move
//! between threads.
//!
//! An envelope is `(kind, declared type id, payload ptr/len, owned flag)`.
//! It has exactly one owner at any instant - sender until push, queue until
//! pop, receiver until consumption - which is what makes the raw payload
//! pointer sound to ship across threads. Bounce forwarding moves the whole
//! envelope value back into a queue; the payload is never copied or
//! re-allocated on that path.

use std::sync::Arc;

use crate::message::stats::MsgStats;

/// Envelope kind tags. Scalar and string tags match the list atom tags;
/// UDT and array blobs extend the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgKind {
    Int = 1,
    Float = 2,
    Str = 3,
    List = 4,
    Object = 5,
    Udt = 6,
    Array = 7,
}

/// Owned payload bytes. `owned == false` wraps foreign memory (FFI blobs
/// whose storage belongs to the caller) and frees nothing on drop.
pub(crate) struct Payload {
    ptr: *mut u8,
    len: usize,
    owned: bool,
}

// SAFETY: a payload is plain bytes with single-owner discipline enforced by
// the envelope ownership rules; no aliasing crosses threads.
unsafe impl Send for Payload {}

impl Payload {
    fn from_vec(bytes: Vec<u8>) -> Payload {
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8;
        Payload { ptr, len, owned: true }
    }

    fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: ptr/len describe a live single-owner buffer.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: single owner, so the mutable borrow is exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if self.owned && !self.ptr.is_null() && self.len > 0 {
            // SAFETY: owned payloads come from Box::into_raw in from_vec.
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.ptr, self.len,
                )));
            }
        }
    }
}

/// One message. Dropping an envelope frees its payload and updates the
/// dashboard counters.
pub struct Envelope {
    kind: MsgKind,
    /// Declared UDT/class type id, 0 for plain values.
    type_id: u32,
    payload: Payload,
    stats: Arc<MsgStats>,
}

impl Envelope {
    pub(crate) fn new(
        stats: Arc<MsgStats>,
        kind: MsgKind,
        type_id: u32,
        bytes: Vec<u8>,
    ) -> Envelope {
        stats.note_created(kind as u8, bytes.len());
        Envelope {
            kind,
            type_id,
            payload: Payload::from_vec(bytes),
            stats,
        }
    }

    /// The byte-identical copy used when the bounce optimization is off.
    pub(crate) fn duplicate(&self) -> Envelope {
        Envelope::new(
            Arc::clone(&self.stats),
            self.kind,
            self.type_id,
            self.payload.as_slice().to_vec(),
        )
    }

    pub fn kind(&self) -> MsgKind {
        self.kind
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// In-place payload access; this is the bounce path's mutation hook.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.payload.as_mut_slice()
    }

    pub fn as_int(&self) -> i64 {
        let mut bytes = [0u8; 8];
        let payload = self.payload.as_slice();
        let n = payload.len().min(8);
        bytes[..n].copy_from_slice(&payload[..n]);
        i64::from_le_bytes(bytes)
    }

    pub fn as_float(&self) -> f64 {
        f64::from_bits(self.as_int() as u64)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.payload.as_slice()).unwrap_or("")
    }
}

impl Drop for Envelope {
    fn drop(&mut self) {
        self.stats.note_freed(self.payload.len);
    }
}

// ---------------------------------------------------------------------------
// Marshalling
// ---------------------------------------------------------------------------

/// `MARSHALL` for scalars and strings; strings are deep-copied into the
/// blob (counted as a string clone).
pub fn marshal_int(stats: &Arc<MsgStats>, value: i64) -> Envelope {
    Envelope::new(Arc::clone(stats), MsgKind::Int, 0, value.to_le_bytes().to_vec())
}

pub fn marshal_float(stats: &Arc<MsgStats>, value: f64) -> Envelope {
    Envelope::new(
        Arc::clone(stats),
        MsgKind::Float,
        0,
        value.to_bits().to_le_bytes().to_vec(),
    )
}

pub fn marshal_str(stats: &Arc<MsgStats>, text: &str) -> Envelope {
    stats
        .string_clones
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Envelope::new(
        Arc::clone(stats),
        MsgKind::Str,
        0,
        text.as_bytes().to_vec(),
    )
}

/// `MARSHALL` for a user-defined struct: a byte copy tagged with the
/// declared type id. String fields must be deep-copied by the caller
/// before marshalling (the compiler emits those clones).
pub fn marshal_udt(stats: &Arc<MsgStats>, bytes: &[u8], type_id: u32) -> Envelope {
    Envelope::new(Arc::clone(stats), MsgKind::Udt, type_id, bytes.to_vec())
}

/// Array blob descriptor: 64 bytes ahead of the raw element bytes. The
/// data offset is blob-relative, so the blob is position-independent; the
/// receiver resolves it against the blob base.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ArrayBlobDesc {
    pub elem_kind: u32,
    pub rank: u32,
    pub dims: [u32; 8],
    pub total_elems: u64,
    pub data_offset: u64,
    _reserved: u64,
}

const ARRAY_DESC_BYTES: usize = 64;

/// `MARSHALL` for a float array: descriptor + raw elements.
pub fn marshal_array_f64(stats: &Arc<MsgStats>, dims: &[u32], data: &[f64]) -> Envelope {
    let mut desc = ArrayBlobDesc {
        elem_kind: MsgKind::Float as u32,
        rank: dims.len().min(8) as u32,
        dims: [0; 8],
        total_elems: data.len() as u64,
        data_offset: ARRAY_DESC_BYTES as u64,
        _reserved: 0,
    };
    for (slot, &d) in desc.dims.iter_mut().zip(dims.iter()) {
        *slot = d;
    }
    let mut bytes = Vec::with_capacity(ARRAY_DESC_BYTES + data.len() * 8);
    // SAFETY: ArrayBlobDesc is repr(C), 64 bytes, all plain integers.
    let desc_bytes = unsafe {
        std::slice::from_raw_parts(&desc as *const ArrayBlobDesc as *const u8, ARRAY_DESC_BYTES)
    };
    bytes.extend_from_slice(desc_bytes);
    for v in data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    Envelope::new(Arc::clone(stats), MsgKind::Array, 0, bytes)
}

/// `UNMARSHALL` for a float array: dimensions plus elements, resolved via
/// the blob-relative data offset.
pub fn unmarshal_array_f64(envelope: &Envelope) -> Option<(Vec<u32>, Vec<f64>)> {
    if envelope.kind() != MsgKind::Array {
        return None;
    }
    let payload = envelope.payload();
    if payload.len() < ARRAY_DESC_BYTES {
        return None;
    }
    // SAFETY: payload starts with a 64-byte repr(C) descriptor we wrote;
    // the blob buffer is only byte-aligned, so read unaligned.
    let desc = unsafe { std::ptr::read_unaligned(payload.as_ptr() as *const ArrayBlobDesc) };
    let dims: Vec<u32> = desc.dims[..desc.rank as usize].to_vec();
    let offset = desc.data_offset as usize;
    let total = desc.total_elems as usize;
    if offset + total * 8 > payload.len() {
        return None;
    }
    let mut data = Vec::with_capacity(total);
    for i in 0..total {
        let mut b = [0u8; 8];
        b.copy_from_slice(&payload[offset + i * 8..offset + i * 8 + 8]);
        data.push(f64::from_le_bytes(b));
    }
    Some((dims, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> Arc<MsgStats> {
        Arc::new(MsgStats::default())
    }

    #[test]
    fn scalar_round_trips() {
        let s = stats();
        let e = marshal_int(&s, -42);
        assert_eq!(e.kind(), MsgKind::Int);
        assert_eq!(e.as_int(), -42);
        let f = marshal_float(&s, 2.5);
        assert_eq!(f.as_float(), 2.5);
    }

    #[test]
    fn string_marshal_counts_a_clone() {
        let s = stats();
        let e = marshal_str(&s, "hello");
        assert_eq!(e.as_str(), "hello");
        assert_eq!(
            s.string_clones.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn udt_round_trip_preserves_bytes_and_type() {
        let s = stats();
        let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let e = marshal_udt(&s, &bytes, 17);
        assert_eq!(e.kind(), MsgKind::Udt);
        assert_eq!(e.type_id(), 17);
        assert_eq!(e.payload(), &bytes);
    }

    #[test]
    fn array_marshal_round_trips() {
        let s = stats();
        let data = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let e = marshal_array_f64(&s, &[2, 3], &data);
        let (dims, out) = unmarshal_array_f64(&e).expect("array blob");
        assert_eq!(dims, vec![2, 3]);
        assert_eq!(out, data.to_vec());
    }

    #[test]
    fn counters_balance_after_drop() {
        let s = stats();
        {
            let _a = marshal_int(&s, 1);
            let _b = marshal_str(&s, "x");
            assert_eq!(s.envelopes_in_flight(), 2);
        }
        assert_eq!(s.envelopes_in_flight(), 0);
        let created = s
            .envelopes_created
            .load(std::sync::atomic::Ordering::Relaxed);
        let freed = s.envelopes_freed.load(std::sync::atomic::Ordering::Relaxed);
        assert_eq!(created, freed);
        assert_eq!(created, 2);
    }

    #[test]
    fn duplicate_is_byte_identical() {
        let s = stats();
        let mut e = marshal_udt(&s, &[9, 9, 9], 3);
        e.payload_mut()[0] = 7;
        let d = e.duplicate();
        assert_eq!(d.payload(), e.payload());
        assert_eq!(d.type_id(), 3);
    }
}
