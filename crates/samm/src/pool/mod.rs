//! Slab pools: fixed-slot-size allocators for runtime objects.
//!
//! A pool grows one slab at a time; each slab is one contiguous allocation
//! carved into equal slots chained on an intrusive free list (a free slot's
//! first word is the next-slot address, which is why slots must be at least
//! pointer-sized). Slots are zeroed on alloc, not on free. Pools never
//! shrink; slabs go back to the OS only when the pool is dropped.
//!
//! When a pool hits its slab cap, `alloc` falls back to the system
//! allocator with a warning. Fallback addresses are remembered so `free`
//! can route them back to the system allocator.

pub mod size_class;

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};

use log::warn;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::error::{Result, SammError};

/// Slab base alignment. Slot addresses inherit 8-byte alignment from the
/// slot-size rounding in [`SlabPool::new`].
pub const SLOT_ALIGN: usize = 16;

struct Slab {
    base: usize,
}

struct PoolInner {
    slabs: Vec<Slab>,
    /// Head of the intrusive free list; 0 means empty.
    free_head: usize,
    in_use: usize,
    peak_use: usize,
    total_allocs: u64,
    total_frees: u64,
    peak_footprint_bytes: usize,
    /// System-allocator fallback addresses (slab cap reached).
    fallback: FxHashSet<usize>,
    warned_cap: bool,
}

/// A named, lock-protected fixed-slot-size pool.
pub struct SlabPool {
    name: String,
    slot_size: usize,
    slots_per_slab: usize,
    max_slabs: usize,
    slot_layout: Layout,
    slab_layout: Layout,
    inner: Mutex<PoolInner>,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone)]
pub struct PoolReport {
    pub name: String,
    pub slot_size: usize,
    pub slabs: usize,
    pub capacity: usize,
    pub in_use: usize,
    pub peak_use: usize,
    pub total_allocs: u64,
    pub total_frees: u64,
    pub footprint_bytes: usize,
    pub peak_footprint_bytes: usize,
    pub fallback_live: usize,
}

impl PoolReport {
    pub fn usage_percent(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.in_use as f64 * 100.0 / self.capacity as f64
        }
    }

    pub fn render(&self) -> String {
        format!(
            "pool `{}`: slot {} B, {} slabs, {}/{} slots in use ({:.1}%), peak {}, \
             {} allocs / {} frees, footprint {} B (peak {}), {} fallback live",
            self.name,
            self.slot_size,
            self.slabs,
            self.in_use,
            self.capacity,
            self.usage_percent(),
            self.peak_use,
            self.total_allocs,
            self.total_frees,
            self.footprint_bytes,
            self.peak_footprint_bytes,
            self.fallback_live,
        )
    }
}

impl SlabPool {
    /// Create a pool handing out `slots_per_slab` slots of `slot_size`
    /// bytes per slab. `slot_size` is rounded up to a pointer-size multiple
    /// (the free list overlays a next pointer in each free slot).
    pub fn new(
        name: impl Into<String>,
        slot_size: usize,
        slots_per_slab: usize,
        max_slabs: usize,
    ) -> Result<SlabPool> {
        let name = name.into();
        if slot_size < std::mem::size_of::<usize>() {
            return Err(SammError::Configuration(format!(
                "pool `{}`: slot size {} is smaller than a pointer",
                name, slot_size
            )));
        }
        if slots_per_slab == 0 || max_slabs == 0 {
            return Err(SammError::Configuration(format!(
                "pool `{}`: slots_per_slab and max_slabs must be nonzero",
                name
            )));
        }
        let slot_size = slot_size.next_multiple_of(std::mem::size_of::<usize>());
        let slot_layout = Layout::from_size_align(slot_size, SLOT_ALIGN)
            .map_err(|e| SammError::Configuration(format!("pool `{}`: {}", name, e)))?;
        let slab_layout = Layout::from_size_align(slot_size * slots_per_slab, SLOT_ALIGN)
            .map_err(|e| SammError::Configuration(format!("pool `{}`: {}", name, e)))?;
        Ok(SlabPool {
            name,
            slot_size,
            slots_per_slab,
            max_slabs,
            slot_layout,
            slab_layout,
            inner: Mutex::new(PoolInner {
                slabs: Vec::new(),
                free_head: 0,
                in_use: 0,
                peak_use: 0,
                total_allocs: 0,
                total_frees: 0,
                peak_footprint_bytes: 0,
                fallback: FxHashSet::default(),
                warned_cap: false,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    fn grow(&self, inner: &mut PoolInner) {
        // SAFETY: slab_layout has nonzero size (both factors checked at
        // construction).
        let base = unsafe { alloc_zeroed(self.slab_layout) };
        if base.is_null() {
            handle_alloc_error(self.slab_layout);
        }
        let base = base as usize;
        // Thread the new slots in address order.
        for i in (0..self.slots_per_slab).rev() {
            let slot = base + i * self.slot_size;
            // SAFETY: slot lies inside the slab just allocated and is
            // pointer-aligned by the slot-size rounding.
            unsafe { *(slot as *mut usize) = inner.free_head };
            inner.free_head = slot;
        }
        inner.slabs.push(Slab { base });
        let footprint = inner.slabs.len() * self.slab_layout.size()
            + inner.fallback.len() * self.slot_size;
        inner.peak_footprint_bytes = inner.peak_footprint_bytes.max(footprint);
    }

    /// Pop a zeroed slot. Falls back to the system allocator past the slab
    /// cap (with a one-time warning); the slot is still usable and `free`
    /// routes it correctly.
    pub fn alloc(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.free_head == 0 {
            if inner.slabs.len() < self.max_slabs {
                self.grow(&mut inner);
            } else {
                if !inner.warned_cap {
                    warn!(
                        "pool `{}` reached its cap of {} slabs; falling back to the system allocator",
                        self.name, self.max_slabs
                    );
                    inner.warned_cap = true;
                }
                // SAFETY: slot_layout has nonzero size.
                let ptr = unsafe { alloc_zeroed(self.slot_layout) };
                if ptr.is_null() {
                    handle_alloc_error(self.slot_layout);
                }
                let ptr = ptr as usize;
                inner.fallback.insert(ptr);
                inner.total_allocs += 1;
                let footprint = inner.slabs.len() * self.slab_layout.size()
                    + inner.fallback.len() * self.slot_size;
                inner.peak_footprint_bytes = inner.peak_footprint_bytes.max(footprint);
                return ptr;
            }
        }
        let slot = inner.free_head;
        // SAFETY: slot came off the free list, so it is a valid slot whose
        // first word is the next free-list entry.
        unsafe {
            inner.free_head = *(slot as *const usize);
            std::ptr::write_bytes(slot as *mut u8, 0, self.slot_size);
        }
        inner.in_use += 1;
        inner.peak_use = inner.peak_use.max(inner.in_use);
        inner.total_allocs += 1;
        slot
    }

    /// Push a slot back. The slot is not zeroed here; zeroing happens at
    /// the next alloc.
    pub fn free(&self, ptr: usize) {
        let mut inner = self.inner.lock();
        if inner.fallback.remove(&ptr) {
            // SAFETY: ptr was produced by alloc_zeroed with slot_layout.
            unsafe { dealloc(ptr as *mut u8, self.slot_layout) };
            inner.total_frees += 1;
            return;
        }
        debug_assert!(inner.in_use > 0, "pool `{}`: free without alloc", self.name);
        // SAFETY: the caller returns a slot obtained from this pool; its
        // first word becomes the free-list link.
        unsafe { *(ptr as *mut usize) = inner.free_head };
        inner.free_head = ptr;
        inner.in_use = inner.in_use.saturating_sub(1);
        inner.total_frees += 1;
    }

    /// Walk the free list (bounded) and check the conservation invariant
    /// `free + in_use == capacity`. False means corruption (or a cycle).
    pub fn validate(&self) -> bool {
        let inner = self.inner.lock();
        let capacity = inner.slabs.len() * self.slots_per_slab;
        let bound = capacity + 16;
        let mut count = 0usize;
        let mut cursor = inner.free_head;
        while cursor != 0 {
            count += 1;
            if count > bound {
                return false;
            }
            // SAFETY: every free-list entry is a slot whose first word is
            // the next link; the walk is bounded against cycles.
            cursor = unsafe { *(cursor as *const usize) };
        }
        count + inner.in_use == capacity
    }

    /// True if `ptr` lies inside one of this pool's slabs.
    pub fn owns(&self, ptr: usize) -> bool {
        let inner = self.inner.lock();
        inner
            .slabs
            .iter()
            .any(|s| ptr >= s.base && ptr < s.base + self.slab_layout.size())
    }

    pub fn report(&self) -> PoolReport {
        let inner = self.inner.lock();
        let capacity = inner.slabs.len() * self.slots_per_slab;
        PoolReport {
            name: self.name.clone(),
            slot_size: self.slot_size,
            slabs: inner.slabs.len(),
            capacity,
            in_use: inner.in_use,
            peak_use: inner.peak_use,
            total_allocs: inner.total_allocs,
            total_frees: inner.total_frees,
            footprint_bytes: inner.slabs.len() * self.slab_layout.size()
                + inner.fallback.len() * self.slot_size,
            peak_footprint_bytes: inner.peak_footprint_bytes,
            fallback_live: inner.fallback.len(),
        }
    }

    /// Addresses still in use: every slab slot minus the free list. Used by
    /// the shutdown leak report.
    pub fn live_slots(&self) -> Vec<usize> {
        let inner = self.inner.lock();
        let mut free: FxHashSet<usize> = FxHashSet::default();
        let capacity = inner.slabs.len() * self.slots_per_slab;
        let mut cursor = inner.free_head;
        let mut steps = 0usize;
        while cursor != 0 && steps <= capacity + 16 {
            free.insert(cursor);
            // SAFETY: bounded free-list walk as in `validate`.
            cursor = unsafe { *(cursor as *const usize) };
            steps += 1;
        }
        let mut live = Vec::new();
        for slab in &inner.slabs {
            for i in 0..self.slots_per_slab {
                let slot = slab.base + i * self.slot_size;
                if !free.contains(&slot) {
                    live.push(slot);
                }
            }
        }
        live.extend(inner.fallback.iter().copied());
        live
    }

    /// Human-readable leak summary, `None` when everything was returned.
    pub fn leak_report(&self) -> Option<String> {
        let live = self.live_slots();
        if live.is_empty() {
            return None;
        }
        let shown: Vec<String> = live.iter().take(8).map(|p| format!("{:#x}", p)).collect();
        Some(format!(
            "pool `{}`: {} slots still in use at shutdown (first: {})",
            self.name,
            live.len(),
            shown.join(", ")
        ))
    }
}

impl Drop for SlabPool {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        for slab in inner.slabs.drain(..) {
            // SAFETY: each base came from alloc_zeroed with slab_layout.
            unsafe { dealloc(slab.base as *mut u8, self.slab_layout) };
        }
        let fallback: Vec<usize> = inner.fallback.drain().collect();
        for ptr in fallback {
            // SAFETY: fallback entries came from alloc_zeroed with
            // slot_layout.
            unsafe { dealloc(ptr as *mut u8, self.slot_layout) };
        }
    }
}
