//! Scope records and the scope stack.
//!
//! A scope is two parallel vectors: raw pointer values and their allocation
//! kinds. The stack is fixed-depth; the global scope at depth 0 exists for
//! the whole process. The Bloom filter lives inside [`ScopeStack`] so that
//! every read and write happens under the one scope lock.

use crate::bloom::BloomFilter;
use crate::config::SammConfig;

/// What a tracked pointer points at; selects the cleanup callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AllocKind {
    Object = 0,
    List = 1,
    ListAtom = 2,
    Str = 3,
    Unknown = 4,
    Generic = 5,
}

/// Number of allocation kinds; sizes the cleanup dispatch table.
pub const KIND_COUNT: usize = 6;

impl AllocKind {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One scope's tracking record: parallel pointer/kind vectors.
#[derive(Debug)]
pub(crate) struct Scope {
    pub(crate) ptrs: Vec<usize>,
    pub(crate) kinds: Vec<AllocKind>,
}

impl Scope {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            ptrs: Vec::with_capacity(capacity),
            kinds: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn track(&mut self, ptr: usize, kind: AllocKind) {
        self.ptrs.push(ptr);
        self.kinds.push(kind);
    }

    /// Remove the first occurrence of `ptr` by swapping with the last entry.
    pub(crate) fn untrack(&mut self, ptr: usize) -> Option<AllocKind> {
        let pos = self.ptrs.iter().position(|&p| p == ptr)?;
        let kind = self.kinds[pos];
        self.ptrs.swap_remove(pos);
        self.kinds.swap_remove(pos);
        Some(kind)
    }

    pub(crate) fn len(&self) -> usize {
        self.ptrs.len()
    }

    /// Detach the vectors, leaving the scope empty. Ownership of the
    /// contents moves to the cleanup batch.
    pub(crate) fn detach(&mut self) -> (Vec<usize>, Vec<AllocKind>) {
        (
            std::mem::take(&mut self.ptrs),
            std::mem::take(&mut self.kinds),
        )
    }
}

/// The scope stack plus the Bloom filter it guards.
pub(crate) struct ScopeStack {
    scopes: Vec<Scope>,
    bloom: BloomFilter,
    initial_capacity: usize,
    max_depth: usize,
    peak_depth: usize,
}

impl ScopeStack {
    pub(crate) fn new(config: &SammConfig) -> Self {
        let mut scopes = Vec::with_capacity(16);
        // Global scope, never popped.
        scopes.push(Scope::with_capacity(config.scope_initial_capacity));
        Self {
            scopes,
            bloom: BloomFilter::new(config.bloom_bits, config.bloom_hashes),
            initial_capacity: config.scope_initial_capacity,
            max_depth: config.max_scope_depth,
            peak_depth: 0,
        }
    }

    /// Current depth; the global scope is depth 0.
    pub(crate) fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub(crate) fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    pub(crate) fn enter(&mut self) -> Result<usize, usize> {
        if self.depth() + 1 > self.max_depth {
            return Err(self.max_depth);
        }
        self.scopes.push(Scope::with_capacity(self.initial_capacity));
        let depth = self.depth();
        self.peak_depth = self.peak_depth.max(depth);
        Ok(depth)
    }

    /// Pop the top scope and return its detached contents. Fails on the
    /// global scope.
    pub(crate) fn exit(&mut self) -> Option<(Vec<usize>, Vec<AllocKind>)> {
        if self.scopes.len() == 1 {
            return None;
        }
        let mut scope = self.scopes.pop()?;
        Some(scope.detach())
    }

    pub(crate) fn track(&mut self, ptr: usize, kind: AllocKind) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.track(ptr, kind);
        }
    }

    /// Search the current scope first, then enclosing scopes; remove the
    /// first occurrence found.
    pub(crate) fn untrack(&mut self, ptr: usize) -> Option<(usize, AllocKind)> {
        for depth in (0..self.scopes.len()).rev() {
            if let Some(kind) = self.scopes[depth].untrack(ptr) {
                return Some((depth, kind));
            }
        }
        None
    }

    /// Lifetime promotion: move `ptr` from the scope it is found in to the
    /// scope `parent_offset` levels further out.
    ///
    /// The offset is relative to the scope the pointer currently lives in,
    /// not the call site - a deliberate match with the shipping runtime's
    /// behavior when the pointer is found in an outer scope.
    pub(crate) fn retain(&mut self, ptr: usize, parent_offset: usize) -> bool {
        match self.untrack(ptr) {
            Some((found_depth, kind)) => {
                let target = found_depth.saturating_sub(parent_offset);
                self.scopes[target].track(ptr, kind);
                true
            }
            None => false,
        }
    }

    pub(crate) fn current_len(&self) -> usize {
        self.scopes.last().map(|s| s.len()).unwrap_or(0)
    }

    pub(crate) fn bloom_add(&mut self, ptr: usize) {
        self.bloom.add(ptr);
    }

    pub(crate) fn bloom_check(&self, ptr: usize) -> bool {
        self.bloom.check(ptr)
    }

    pub(crate) fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> ScopeStack {
        ScopeStack::new(&SammConfig::small_for_tests())
    }

    #[test]
    fn global_scope_cannot_be_exited() {
        let mut s = stack();
        assert_eq!(s.depth(), 0);
        assert!(s.exit().is_none());
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn enter_exit_returns_tracked_pointers() {
        let mut s = stack();
        s.enter().unwrap();
        s.track(0x100, AllocKind::List);
        s.track(0x200, AllocKind::Str);
        let (ptrs, kinds) = s.exit().unwrap();
        assert_eq!(ptrs, vec![0x100, 0x200]);
        assert_eq!(kinds, vec![AllocKind::List, AllocKind::Str]);
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn untrack_searches_outer_scopes() {
        let mut s = stack();
        s.track(0x100, AllocKind::Object);
        s.enter().unwrap();
        let (depth, kind) = s.untrack(0x100).unwrap();
        assert_eq!(depth, 0);
        assert_eq!(kind, AllocKind::Object);
        assert!(s.untrack(0x100).is_none());
    }

    #[test]
    fn retain_promotes_to_enclosing_scope() {
        let mut s = stack();
        s.enter().unwrap();
        s.enter().unwrap();
        s.track(0xabc, AllocKind::List);
        assert!(s.retain(0xabc, 1));
        // Now tracked at depth 1: exiting depth 2 yields nothing...
        let (ptrs, _) = s.exit().unwrap();
        assert!(ptrs.is_empty());
        // ...and exiting depth 1 yields the pointer.
        let (ptrs, _) = s.exit().unwrap();
        assert_eq!(ptrs, vec![0xabc]);
    }

    #[test]
    fn retain_offset_clamps_at_global_scope() {
        let mut s = stack();
        s.enter().unwrap();
        s.track(0xdef, AllocKind::Generic);
        assert!(s.retain(0xdef, 100));
        let (ptrs, _) = s.exit().unwrap();
        assert!(ptrs.is_empty());
        // Pointer ended up in the global scope.
        assert_eq!(s.current_len(), 1);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let config = SammConfig {
            max_scope_depth: 3,
            ..SammConfig::small_for_tests()
        };
        let mut s = ScopeStack::new(&config);
        assert!(s.enter().is_ok());
        assert!(s.enter().is_ok());
        assert!(s.enter().is_ok());
        assert_eq!(s.enter(), Err(3));
        assert_eq!(s.peak_depth(), 3);
    }
}
