//! Size-class routing for variable-size class instances.
//!
//! Six fixed classes cover everything up to 1 KiB; anything larger goes to
//! the system allocator and is tagged with the 0xFF sentinel class. Every
//! allocation carries a one-word header recording its class and payload
//! size, so `free` routes without scanning slabs.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::pool::SlabPool;

/// Slot sizes of the six classes.
pub const SIZE_CLASSES: [usize; 6] = [32, 64, 128, 256, 512, 1024];

/// Sentinel class id for allocations served by the system allocator.
pub const OVERSIZE_CLASS: u8 = 0xFF;

const HEADER_BYTES: usize = 8;
const OVERSIZE_ALIGN: usize = 16;

/// Map a total size (payload + header) to a class index, `None` when the
/// request exceeds the largest class.
pub fn size_to_class(total: usize) -> Option<u8> {
    SIZE_CLASSES
        .iter()
        .position(|&class| total <= class)
        .map(|i| i as u8)
}

fn encode_header(class: u8, payload: usize) -> u64 {
    ((payload as u64) << 8) | class as u64
}

fn decode_header(header: u64) -> (u8, usize) {
    ((header & 0xFF) as u8, (header >> 8) as usize)
}

fn oversize_layout(payload: usize) -> Layout {
    match Layout::from_size_align(payload + HEADER_BYTES, OVERSIZE_ALIGN) {
        Ok(layout) => layout,
        // A payload size near usize::MAX is an arithmetic bug upstream.
        Err(_) => panic!("oversize allocation of {} bytes overflows", payload),
    }
}

/// The six class pools plus the oversize escape hatch.
pub struct SizeClassAllocator {
    pools: [SlabPool; 6],
    oversize_allocs: AtomicU64,
    oversize_frees: AtomicU64,
    oversize_bytes: AtomicU64,
}

impl SizeClassAllocator {
    /// One pool per class, each named `<prefix>_<slot size>`.
    pub fn new(prefix: &str, slots_per_slab: usize, max_slabs: usize) -> Result<Self> {
        let mut pools = Vec::with_capacity(6);
        for class in SIZE_CLASSES {
            pools.push(SlabPool::new(
                format!("{}_{}", prefix, class),
                class,
                slots_per_slab,
                max_slabs,
            )?);
        }
        // Length is exactly 6 by construction.
        let pools: [SlabPool; 6] = match pools.try_into() {
            Ok(p) => p,
            Err(_) => unreachable!(),
        };
        Ok(Self {
            pools,
            oversize_allocs: AtomicU64::new(0),
            oversize_frees: AtomicU64::new(0),
            oversize_bytes: AtomicU64::new(0),
        })
    }

    /// Allocate `payload` zeroed bytes; the class header sits just below
    /// the returned address.
    pub fn alloc(&self, payload: usize) -> usize {
        let total = payload + HEADER_BYTES;
        let base = match size_to_class(total) {
            Some(class) => {
                let base = self.pools[class as usize].alloc();
                // SAFETY: pool slots are zeroed, at least `total` bytes, and
                // 8-aligned; the header is the first word.
                unsafe { *(base as *mut u64) = encode_header(class, payload) };
                base
            }
            None => {
                let layout = oversize_layout(payload);
                // SAFETY: layout has nonzero size.
                let ptr = unsafe { alloc_zeroed(layout) };
                if ptr.is_null() {
                    handle_alloc_error(layout);
                }
                let base = ptr as usize;
                // SAFETY: allocation is at least HEADER_BYTES and 16-aligned.
                unsafe { *(base as *mut u64) = encode_header(OVERSIZE_CLASS, payload) };
                self.oversize_allocs.fetch_add(1, Ordering::Relaxed);
                self.oversize_bytes
                    .fetch_add(payload as u64, Ordering::Relaxed);
                base
            }
        };
        base + HEADER_BYTES
    }

    /// Free an address previously returned by [`alloc`](Self::alloc).
    pub fn free(&self, ptr: usize) {
        let base = ptr - HEADER_BYTES;
        // SAFETY: ptr came from alloc, so the header word precedes it.
        let header = unsafe { *(base as *const u64) };
        let (class, payload) = decode_header(header);
        if class == OVERSIZE_CLASS {
            // SAFETY: base was produced by alloc_zeroed with this layout.
            unsafe { dealloc(base as *mut u8, oversize_layout(payload)) };
            self.oversize_frees.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pools[class as usize].free(base);
        }
    }

    /// Payload size recorded for an allocation.
    pub fn payload_size(&self, ptr: usize) -> usize {
        let base = ptr - HEADER_BYTES;
        // SAFETY: as in `free`.
        let header = unsafe { *(base as *const u64) };
        decode_header(header).1
    }

    pub fn pool(&self, class: usize) -> &SlabPool {
        &self.pools[class]
    }

    pub fn oversize_live(&self) -> u64 {
        self.oversize_allocs.load(Ordering::Relaxed) - self.oversize_frees.load(Ordering::Relaxed)
    }

    /// Reports for all six pools plus the oversize counters.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for pool in &self.pools {
            out.push_str(&pool.report().render());
            out.push('\n');
        }
        out.push_str(&format!(
            "oversize: {} allocs, {} frees, {} bytes total\n",
            self.oversize_allocs.load(Ordering::Relaxed),
            self.oversize_frees.load(Ordering::Relaxed),
            self.oversize_bytes.load(Ordering::Relaxed),
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_to_class_picks_smallest_fit() {
        assert_eq!(size_to_class(1), Some(0));
        assert_eq!(size_to_class(32), Some(0));
        assert_eq!(size_to_class(33), Some(1));
        assert_eq!(size_to_class(1024), Some(5));
        assert_eq!(size_to_class(1025), None);
    }

    #[test]
    fn round_trips_through_every_class() {
        let alloc = SizeClassAllocator::new("test", 8, 4).unwrap();
        for payload in [1usize, 24, 56, 120, 248, 504, 1000] {
            let ptr = alloc.alloc(payload);
            assert_ne!(ptr, 0);
            assert_eq!(alloc.payload_size(ptr), payload);
            // Payload is zeroed.
            for i in 0..payload {
                assert_eq!(unsafe { *((ptr + i) as *const u8) }, 0);
            }
            alloc.free(ptr);
        }
        for class in 0..6 {
            assert!(alloc.pool(class).validate());
            assert_eq!(alloc.pool(class).report().in_use, 0);
        }
    }

    #[test]
    fn oversize_bypasses_the_pools() {
        let alloc = SizeClassAllocator::new("big", 8, 4).unwrap();
        let ptr = alloc.alloc(4096);
        assert_eq!(alloc.payload_size(ptr), 4096);
        assert_eq!(alloc.oversize_live(), 1);
        for class in 0..6 {
            assert_eq!(alloc.pool(class).report().total_allocs, 0);
        }
        alloc.free(ptr);
        assert_eq!(alloc.oversize_live(), 0);
    }

    #[test]
    fn class_boundary_payloads_route_by_total_size() {
        let alloc = SizeClassAllocator::new("edge", 8, 4).unwrap();
        // 24-byte payload + 8-byte header = exactly 32: class 0.
        let small = alloc.alloc(24);
        assert_eq!(alloc.pool(0).report().in_use, 1);
        // 25-byte payload tips into class 1.
        let spill = alloc.alloc(25);
        assert_eq!(alloc.pool(1).report().in_use, 1);
        alloc.free(small);
        alloc.free(spill);
    }
}
