//! Class instances, vtables, and the inheritance walk behind `MATCH TYPE`.
//!
//! Every class instance starts with one word pointing at its vtable. The
//! vtable layout is `[class_id, parent_vtable, class_name, destructor,
//! method_0, ...]`; the runtime only reads the first four slots - method
//! dispatch is compiled code's business. Instance storage comes from the
//! six-class size router; the class header written by the allocator routes
//! `free` without any slab scan.

use samm::{AllocKind, SizeClassAllocator};

use crate::Runtime;

/// Destructor slot signature: receives the instance address.
pub type Destructor = extern "C" fn(usize);

/// Fixed vtable prefix read by the runtime. Compiled code appends method
/// slots after this prefix. The parent slot is a nullable pointer on the
/// wire; `Option<&VTable>` has exactly that representation.
#[repr(C)]
pub struct VTable {
    pub class_id: u32,
    _pad: u32,
    /// Parent vtable, `None` at the root.
    pub parent: Option<&'static VTable>,
    /// Nul-terminated class name address (diagnostics only), 0 when unset.
    pub class_name: usize,
    /// Destructor address, 0 when trivial.
    pub destructor: usize,
}

impl VTable {
    /// A root vtable with no parent and no destructor.
    pub const fn leaf(class_id: u32) -> VTable {
        VTable {
            class_id,
            _pad: 0,
            parent: None,
            class_name: 0,
            destructor: 0,
        }
    }

    /// A vtable inheriting from `parent`.
    pub const fn derived(class_id: u32, parent: &'static VTable) -> VTable {
        VTable {
            class_id,
            _pad: 0,
            parent: Some(parent),
            class_name: 0,
            destructor: 0,
        }
    }

    /// A vtable with a destructor slot.
    pub fn with_destructor(class_id: u32, destructor: Destructor) -> VTable {
        VTable {
            class_id,
            _pad: 0,
            parent: None,
            class_name: 0,
            destructor: destructor as usize,
        }
    }
}

/// Allocate a zeroed instance of `size` payload bytes with its vtable slot
/// filled in, tracked in the current scope.
pub fn object_new(rt: &Runtime, vtable: &'static VTable, size: usize) -> usize {
    // Instances always have room for the vtable word.
    let size = size.max(std::mem::size_of::<usize>());
    let addr = rt.objects.alloc(size);
    // SAFETY: fresh allocation of at least one word.
    unsafe { *(addr as *mut usize) = vtable as *const VTable as usize };
    rt.samm.track(addr, AllocKind::Object);
    addr
}

#[inline]
fn vtable_of<'a>(obj: usize) -> Option<&'a VTable> {
    if obj == 0 {
        return None;
    }
    // SAFETY: instances store their vtable address in the first word;
    // vtables are 'static.
    unsafe {
        let addr = *(obj as *const usize);
        if addr == 0 {
            None
        } else {
            Some(&*(addr as *const VTable))
        }
    }
}

/// The instance's own class id, 0 for null.
pub fn object_class_id(obj: usize) -> u32 {
    vtable_of(obj).map(|vt| vt.class_id).unwrap_or(0)
}

/// `CASE <ClassName>` test: true when the instance's class is `class_id`
/// or any descendant of it, walking parent vtable links.
pub fn object_instance_of(obj: usize, class_id: u32) -> bool {
    let mut table = vtable_of(obj);
    while let Some(vt) = table {
        if vt.class_id == class_id {
            return true;
        }
        table = vt.parent;
    }
    false
}

/// Run the vtable destructor (if any) and return the storage. Used by both
/// explicit delete and the SAMM scope sweep.
pub fn destroy_object(objects: &SizeClassAllocator, obj: usize) {
    if obj == 0 {
        return;
    }
    if let Some(vt) = vtable_of(obj) {
        if vt.destructor != 0 {
            // SAFETY: the destructor slot holds either 0 or a valid
            // extern "C" fn(usize), installed by compiled code or
            // `with_destructor`.
            let dtor: Destructor = unsafe { std::mem::transmute(vt.destructor) };
            dtor(obj);
        }
    }
    objects.free(obj);
}
