//! CFG data model: basic blocks, edges, per-function graphs.
//!
//! A [`Cfg`] owns its blocks in an `IndexVec` arena and its edges in a flat
//! list. Blocks carry parallel `predecessors` / `successors` adjacency kept
//! in lockstep with the edge list by [`Cfg::add_edge`]; duplicates are
//! allowed when two edges of distinct kinds connect the same pair. Once
//! construction completes the graph never mutates.

use fbc_ast::{StmtId, TypeSuffix};
use fbc_util::{define_idx, FxHashMap, FxHashSet, IndexVec};
use indexmap::IndexMap;

define_idx!(BlockId);

/// Kind of a control-flow edge, consulted by the IL emitter when choosing
/// the branch sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Fallthrough,
    ConditionalTrue,
    ConditionalFalse,
    Jump,
    Call,
    Return,
    Exception,
}

/// A directed edge between two blocks.
///
/// `target == None` is the dynamic-return edge produced by RETURN from
/// GOSUB: the destination is only known at runtime, from the GOSUB return
/// stack.
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: BlockId,
    pub target: Option<BlockId>,
    pub kind: EdgeKind,
    /// Short backend-facing tag: `"true"`, `"case_3"`, `"call_sub:Foo:case_0"`.
    pub label: String,
}

/// A maximal straight-line statement sequence.
///
/// Statement references are ids into the AST, which outlives the CFG; the
/// block owns nothing but the id list.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Human-readable tag for diagnostics only.
    pub label: String,
    pub statements: Vec<StmtId>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    /// Source line numbers contributing statements to this block.
    pub source_lines: FxHashSet<u32>,
    pub is_entry: bool,
    pub is_exit: bool,
    pub is_loop_header: bool,
    pub is_loop_exit: bool,
    /// No fallthrough leaves this block (GOTO, RETURN, THROW, END).
    pub is_terminated: bool,
    pub is_unreachable: bool,
}

impl BasicBlock {
    fn new(id: BlockId, label: String) -> Self {
        Self {
            id,
            label,
            statements: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            source_lines: FxHashSet::default(),
            is_entry: false,
            is_exit: false,
            is_loop_header: false,
            is_loop_exit: false,
            is_terminated: false,
            is_unreachable: false,
        }
    }
}

/// Canonical parameter / return types, normalized from BASIC suffix tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Float,
    Double,
    Str,
    Void,
}

impl ValueType {
    /// Normalize a suffix token. Unsuffixed identifiers default to Double,
    /// the dialect's default numeric type.
    pub fn from_suffix(suffix: TypeSuffix) -> Self {
        match suffix {
            TypeSuffix::Int | TypeSuffix::Long => ValueType::Int,
            TypeSuffix::Single => ValueType::Float,
            TypeSuffix::Double | TypeSuffix::None => ValueType::Double,
            TypeSuffix::Str => ValueType::Str,
        }
    }
}

/// A normalized parameter of a per-function CFG.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: ValueType,
}

/// A control-flow graph for one function (or the main program).
#[derive(Debug, Clone)]
pub struct Cfg {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: ValueType,
    pub blocks: IndexVec<BlockId, BasicBlock>,
    pub edges: Vec<Edge>,
    pub entry: BlockId,
    pub exit: BlockId,
    /// Blocks that are GOSUB return points; drives the backend's sparse
    /// RETURN dispatch table.
    pub gosub_return_blocks: FxHashSet<BlockId>,
    /// BASIC line number -> block holding that line's first statement.
    /// Injective: first registration wins.
    pub line_map: FxHashMap<u32, BlockId>,
    /// Label -> block, same discipline as `line_map`.
    pub label_map: FxHashMap<String, BlockId>,
    /// Forward references still unresolved after Phase 2, `(source block,
    /// target description)`. Warnings, not errors: the backend diagnoses the
    /// missing targets.
    pub unresolved_jumps: Vec<(BlockId, String)>,
}

impl Cfg {
    /// Create a CFG with its entry and exit blocks in place.
    pub fn new(name: impl Into<String>, params: Vec<Param>, return_type: ValueType) -> Self {
        let mut blocks = IndexVec::new();
        let entry_id = blocks.push(BasicBlock::new(BlockId(0), "entry".to_string()));
        let exit_id = blocks.push(BasicBlock::new(BlockId(1), "exit".to_string()));
        blocks[entry_id].is_entry = true;
        blocks[exit_id].is_exit = true;
        Self {
            name: name.into(),
            params,
            return_type,
            blocks,
            edges: Vec::new(),
            entry: entry_id,
            exit: exit_id,
            gosub_return_blocks: FxHashSet::default(),
            line_map: FxHashMap::default(),
            label_map: FxHashMap::default(),
            unresolved_jumps: Vec::new(),
        }
    }

    /// Allocate a fresh empty block.
    pub fn new_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = self.blocks.next_index();
        self.blocks.push(BasicBlock::new(id, label.into()))
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    /// Add an edge, keeping the blocks' adjacency lists in lockstep.
    ///
    /// Dynamic-return edges (`target == None`) touch no adjacency list.
    pub fn add_edge(
        &mut self,
        source: BlockId,
        target: Option<BlockId>,
        kind: EdgeKind,
        label: impl Into<String>,
    ) {
        if let Some(t) = target {
            self.blocks[source].successors.push(t);
            self.blocks[t].predecessors.push(source);
        }
        self.edges.push(Edge {
            source,
            target,
            kind,
            label: label.into(),
        });
    }

    /// Outgoing edges of a block.
    pub fn edges_from(&self, source: BlockId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source == source)
    }

    /// All edges connecting `source` to `target`.
    pub fn edges_between(&self, source: BlockId, target: BlockId) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.source == source && e.target == Some(target))
            .collect()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks in reverse post-order, the traversal the IL emitter walks.
    ///
    /// Unreachable blocks are appended after the reachable ones in id order
    /// so the emitter still sees every block exactly once.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited: FxHashSet<BlockId> = FxHashSet::default();
        let mut postorder: Vec<BlockId> = Vec::with_capacity(self.blocks.len());
        // Iterative DFS; (block, next successor index) pairs.
        let mut stack: Vec<(BlockId, usize)> = vec![(self.entry, 0)];
        visited.insert(self.entry);
        while let Some((block, child)) = stack.pop() {
            let succs = &self.blocks[block].successors;
            if child < succs.len() {
                stack.push((block, child + 1));
                let next = succs[child];
                if visited.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        postorder.reverse();
        for id in self.blocks.indices() {
            if !visited.contains(&id) {
                postorder.push(id);
            }
        }
        postorder
    }

    /// BFS from the entry, flagging every unvisited block unreachable.
    /// Run once at the end of construction.
    pub(crate) fn mark_unreachable_blocks(&mut self) {
        let mut visited: FxHashSet<BlockId> = FxHashSet::default();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.entry);
        visited.insert(self.entry);
        while let Some(current) = queue.pop_front() {
            let succs = self.blocks[current].successors.clone();
            for succ in succs {
                if visited.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }
        for id in self.blocks.indices().collect::<Vec<_>>() {
            if !visited.contains(&id) {
                self.blocks[id].is_unreachable = true;
            }
        }
    }

    /// Check the structural invariants; returns one message per violation.
    ///
    /// Checked: edge endpoints exist, successor/predecessor lists mirror the
    /// edge list exactly (as multisets), the entry has no predecessors, the
    /// exit has no successors, terminated blocks have no outgoing
    /// Fallthrough edges, and line-map targets exist.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for edge in &self.edges {
            if !self.blocks.contains(edge.source) {
                problems.push(format!("edge source {:?} does not exist", edge.source));
            }
            if let Some(t) = edge.target {
                if !self.blocks.contains(t) {
                    problems.push(format!("edge target {:?} does not exist", t));
                }
            }
        }

        for (id, block) in self.blocks.iter_enumerated() {
            let mut out: Vec<BlockId> = self
                .edges
                .iter()
                .filter(|e| e.source == id)
                .filter_map(|e| e.target)
                .collect();
            let mut succs = block.successors.clone();
            out.sort();
            succs.sort();
            if out != succs {
                problems.push(format!(
                    "block {:?}: successors {:?} do not match outgoing edges {:?}",
                    id, succs, out
                ));
            }

            let mut inc: Vec<BlockId> = self
                .edges
                .iter()
                .filter(|e| e.target == Some(id))
                .map(|e| e.source)
                .collect();
            let mut preds = block.predecessors.clone();
            inc.sort();
            preds.sort();
            if inc != preds {
                problems.push(format!(
                    "block {:?}: predecessors {:?} do not match incoming edges {:?}",
                    id, preds, inc
                ));
            }

            if block.is_terminated {
                for e in self.edges.iter().filter(|e| e.source == id) {
                    if e.kind == EdgeKind::Fallthrough {
                        problems.push(format!(
                            "terminated block {:?} has a Fallthrough edge to {:?}",
                            id, e.target
                        ));
                    }
                }
            }
        }

        if !self.blocks[self.entry].predecessors.is_empty() {
            problems.push("entry block has predecessors".to_string());
        }
        if !self.blocks[self.exit].successors.is_empty() {
            problems.push("exit block has successors".to_string());
        }

        for (line, block) in &self.line_map {
            if !self.blocks.contains(*block) {
                problems.push(format!("line {} maps to missing block {:?}", line, block));
            }
        }

        problems
    }
}

/// The CFGs of a whole program: `main` plus one per user-defined procedure.
#[derive(Debug, Clone)]
pub struct ProgramCfg {
    pub main: Cfg,
    pub functions: IndexMap<String, Cfg>,
}

impl ProgramCfg {
    /// Look up a procedure CFG by name.
    pub fn function(&self, name: &str) -> Option<&Cfg> {
        self.functions.get(name)
    }

    /// All CFGs in emission order: main first, then procedures in
    /// definition order.
    pub fn all_cfgs(&self) -> impl Iterator<Item = &Cfg> {
        std::iter::once(&self.main).chain(self.functions.values())
    }
}
