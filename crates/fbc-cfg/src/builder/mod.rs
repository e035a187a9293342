//! Single-pass recursive CFG construction.
//!
//! The two-phase "create all blocks, then wire" approach loses context
//! between phases; this builder wires every edge the moment both endpoints
//! exist. A loop's back-edge is added immediately after the recursive build
//! of its body returns, so the invariant "a back-edge targets an
//! earlier-created block" holds by construction. Only genuinely forward
//! references (GOTO to a line not yet seen) go on the deferred list.

mod branches;
mod except;
mod jumps;
mod loops;
mod prescan;

use fbc_ast::{FnDef, JumpTarget, Program, ProgramLine, Stmt, StmtKind};
use indexmap::IndexMap;
use log::warn;

use crate::cfg::{BlockId, Cfg, EdgeKind, Param, ProgramCfg, ValueType};
use crate::context::{LoopContext, SelectContext, SubroutineContext, TryContext};
use crate::error::{CfgError, Result};
use prescan::JumpTargets;

/// Internal limits of the builder.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Maximum statement nesting depth before construction aborts.
    pub max_nesting_depth: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 1024,
        }
    }
}

/// Build the CFGs for a whole program with default limits.
pub fn build_program_cfg(program: &Program) -> Result<ProgramCfg> {
    build_program_cfg_with(program, &BuilderConfig::default())
}

/// Build the CFGs for a whole program.
///
/// A first pass over the top-level statements extracts every SUB, FUNCTION
/// and DEF FN and builds a separate CFG per definition; the main CFG is then
/// built over the remaining statements. Nested definitions are rejected.
pub fn build_program_cfg_with(program: &Program, config: &BuilderConfig) -> Result<ProgramCfg> {
    let mut functions: IndexMap<String, Cfg> = IndexMap::new();

    for stmt in program.top_level_stmts() {
        if let Some((def, ret)) = definition_of(&stmt.kind) {
            reject_nested_definitions(def)?;
            let cfg = build_function_cfg(def, ret, config)?;
            functions.insert(def.name.clone(), cfg);
        }
    }

    let main = build_main_cfg(program, config)?;
    Ok(ProgramCfg { main, functions })
}

/// Return type for a definition statement, `None` for non-definitions.
fn definition_of(kind: &StmtKind) -> Option<(&FnDef, ValueType)> {
    match kind {
        StmtKind::Function(def) => Some((def, ValueType::from_suffix(def.ret_suffix))),
        StmtKind::Sub(def) => Some((def, ValueType::Void)),
        StmtKind::DefFn(def) => Some((def, ValueType::from_suffix(def.ret_suffix))),
        _ => None,
    }
}

fn reject_nested_definitions(outer: &FnDef) -> Result<()> {
    fn walk(outer_name: &str, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            if let Some((inner, _)) = definition_of(&stmt.kind) {
                return Err(CfgError::NestedDefinition {
                    outer: outer_name.to_string(),
                    inner: inner.name.clone(),
                });
            }
            for body in nested_bodies(&stmt.kind) {
                walk(outer_name, body)?;
            }
        }
        Ok(())
    }
    walk(&outer.name, &outer.body)
}

/// Every nested statement body of a construct, for structural walks.
fn nested_bodies(kind: &StmtKind) -> Vec<&[Stmt]> {
    match kind {
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => {
            let mut v: Vec<&[Stmt]> = vec![then_body.as_slice()];
            if let Some(e) = else_body {
                v.push(e.as_slice());
            }
            v
        }
        StmtKind::While { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::Repeat { body, .. }
        | StmtKind::DoLoop { body, .. } => vec![body.as_slice()],
        StmtKind::Select {
            arms, otherwise, ..
        } => {
            let mut v: Vec<&[Stmt]> = arms.iter().map(|a| a.body.as_slice()).collect();
            if let Some(o) = otherwise {
                v.push(o.as_slice());
            }
            v
        }
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            let mut v: Vec<&[Stmt]> = vec![body.as_slice()];
            v.extend(catches.iter().map(|c| c.body.as_slice()));
            if let Some(f) = finally {
                v.push(f.as_slice());
            }
            v
        }
        _ => Vec::new(),
    }
}

fn build_main_cfg(program: &Program, config: &BuilderConfig) -> Result<Cfg> {
    let cfg = Cfg::new("main", Vec::new(), ValueType::Void);
    let mut builder = CfgBuilder::new(cfg, config);
    builder.targets = prescan::prescan_program(program);

    for line in &program.lines {
        builder.begin_line(line);
        for stmt in &line.stmts {
            // Definition bodies are separate CFGs; they contribute nothing
            // to main's control flow.
            if definition_of(&stmt.kind).is_some() {
                continue;
            }
            builder.process_stmt(stmt)?;
        }
    }
    Ok(builder.finish())
}

fn build_function_cfg(def: &FnDef, ret: ValueType, config: &BuilderConfig) -> Result<Cfg> {
    let params: Vec<Param> = def
        .params
        .iter()
        .map(|p| Param {
            name: p.name.clone(),
            ty: ValueType::from_suffix(p.suffix),
        })
        .collect();
    let cfg = Cfg::new(def.name.clone(), params, ret);
    let mut builder = CfgBuilder::new(cfg, config);
    builder.targets = prescan::prescan_body(&def.body);
    let return_block = builder.cfg.exit;
    builder.subroutines.push(SubroutineContext { return_block });
    builder.build_body(&def.body)?;
    Ok(builder.finish())
}

/// A forward reference waiting for its target block to exist.
struct DeferredEdge {
    source: BlockId,
    target: JumpTarget,
    kind: EdgeKind,
    label: String,
}

/// Construction state for one CFG.
pub(crate) struct CfgBuilder<'a> {
    pub(crate) cfg: Cfg,
    pub(crate) current: BlockId,
    pub(crate) targets: JumpTargets,
    deferred: Vec<DeferredEdge>,
    pub(crate) loops: Vec<LoopContext>,
    pub(crate) selects: Vec<SelectContext>,
    pub(crate) tries: Vec<TryContext>,
    pub(crate) subroutines: Vec<SubroutineContext>,
    depth: usize,
    config: &'a BuilderConfig,
}

impl<'a> CfgBuilder<'a> {
    fn new(cfg: Cfg, config: &'a BuilderConfig) -> Self {
        let current = cfg.entry;
        Self {
            cfg,
            current,
            targets: JumpTargets::default(),
            deferred: Vec::new(),
            loops: Vec::new(),
            selects: Vec::new(),
            tries: Vec::new(),
            subroutines: Vec::new(),
            depth: 0,
            config,
        }
    }

    /// Append a statement reference to the current block.
    pub(crate) fn append(&mut self, stmt: &Stmt) {
        let block = self.cfg.block_mut(self.current);
        block.statements.push(stmt.id);
        block.source_lines.insert(stmt.line);
    }

    /// Append a statement reference to a specific block.
    pub(crate) fn append_to(&mut self, block: BlockId, stmt: &Stmt) {
        let b = self.cfg.block_mut(block);
        b.statements.push(stmt.id);
        b.source_lines.insert(stmt.line);
    }

    pub(crate) fn is_terminated(&self, block: BlockId) -> bool {
        self.cfg.block(block).is_terminated
    }

    pub(crate) fn terminate_current(&mut self) {
        self.cfg.block_mut(self.current).is_terminated = true;
    }

    /// Fallthrough from `block` to `to` unless `block` is terminated.
    pub(crate) fn fallthrough_unless_terminated(&mut self, block: BlockId, to: BlockId) {
        if !self.is_terminated(block) {
            self.cfg
                .add_edge(block, Some(to), EdgeKind::Fallthrough, "fallthrough");
        }
    }

    /// Line-number and label bookkeeping at the start of a source line.
    fn begin_line(&mut self, line: &ProgramLine) {
        if let Some(n) = line.number {
            self.maybe_split_for_line(n);
        }
        if let Some(label) = &line.label {
            self.maybe_split_for_label(label);
        }
    }

    /// If the current block already has content (or is the entry block),
    /// start a fresh block so jumps can land on a clean boundary.
    fn split_point(&mut self, tag: String) -> BlockId {
        let cur = self.current;
        let needs_split = !self.cfg.block(cur).statements.is_empty() || cur == self.cfg.entry;
        if needs_split {
            let fresh = self.cfg.new_block(tag);
            self.fallthrough_unless_terminated(cur, fresh);
            self.current = fresh;
        }
        self.current
    }

    fn maybe_split_for_line(&mut self, line: u32) {
        if !self.targets.lines.contains(&line) || self.cfg.line_map.contains_key(&line) {
            return;
        }
        let block = self.split_point(format!("line_{}", line));
        self.cfg.line_map.insert(line, block);
    }

    fn maybe_split_for_label(&mut self, label: &str) {
        if self.cfg.label_map.contains_key(label) {
            return;
        }
        let block = if self.targets.labels.contains(label) {
            self.split_point(format!("label_{}", label))
        } else {
            self.current
        };
        self.cfg.label_map.insert(label.to_string(), block);
    }

    /// Process a nested statement sequence, guarding nesting depth.
    pub(crate) fn build_body(&mut self, body: &[Stmt]) -> Result<()> {
        self.depth += 1;
        if self.depth > self.config.max_nesting_depth {
            return Err(CfgError::MaxDepthExceeded {
                function: self.cfg.name.clone(),
                max: self.config.max_nesting_depth,
            });
        }
        for stmt in body {
            self.process_stmt(stmt)?;
        }
        self.depth -= 1;
        Ok(())
    }

    /// Dispatch one statement.
    pub(crate) fn process_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        // Dead statements after a terminator still get recorded, in a block
        // the reachability pass will flag.
        if self.is_terminated(self.current) {
            let dead = self.cfg.new_block("dead");
            self.current = dead;
        }
        self.maybe_split_for_line(stmt.line);

        match &stmt.kind {
            StmtKind::Let { .. }
            | StmtKind::Print { .. }
            | StmtKind::Dim { .. }
            | StmtKind::Call { .. } => {
                self.append(stmt);
            }

            StmtKind::If {
                then_body,
                else_body,
                goto_target,
                ..
            } => self.build_if(stmt, then_body, else_body.as_deref(), goto_target.as_ref())?,

            StmtKind::While { body, .. } => self.build_while(stmt, body)?,
            StmtKind::For { body, .. } => self.build_for(stmt, body)?,
            StmtKind::Repeat { body, .. } => self.build_repeat(stmt, body)?,
            StmtKind::DoLoop { pre, post, body } => self.build_do(stmt, pre, post, body)?,

            StmtKind::Select {
                arms, otherwise, ..
            } => self.build_select(stmt, arms, otherwise.as_deref())?,

            StmtKind::Try {
                body,
                catches,
                finally,
            } => self.build_try(stmt, body, catches, finally.as_deref())?,

            StmtKind::Goto { target } => self.build_goto(stmt, target),
            StmtKind::Gosub { target } => self.build_gosub(stmt, target),
            StmtKind::ReturnSub => self.build_return(stmt),
            StmtKind::OnGoto { targets, .. } => self.build_on_goto(stmt, targets),
            StmtKind::OnGosub { targets, .. } => self.build_on_gosub(stmt, targets),
            StmtKind::OnCall { subs, .. } => self.build_on_call(stmt, subs),
            StmtKind::Exit(kind) => self.build_exit(stmt, *kind),
            StmtKind::End => self.build_end(stmt),
            StmtKind::Throw { .. } => self.build_throw(stmt),

            StmtKind::Function(def) | StmtKind::Sub(def) | StmtKind::DefFn(def) => {
                return Err(CfgError::NestedDefinition {
                    outer: self.cfg.name.clone(),
                    inner: def.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Look a jump target up in the maps built so far.
    pub(crate) fn lookup_target(&self, target: &JumpTarget) -> Option<BlockId> {
        match target {
            JumpTarget::Line(n) => self.cfg.line_map.get(n).copied(),
            JumpTarget::Label(s) => self.cfg.label_map.get(s).copied(),
        }
    }

    /// Add the edge now if the target is known, otherwise defer it.
    pub(crate) fn jump_or_defer(
        &mut self,
        source: BlockId,
        target: &JumpTarget,
        kind: EdgeKind,
        label: String,
    ) {
        match self.lookup_target(target) {
            Some(block) => self.cfg.add_edge(source, Some(block), kind, label),
            None => self.deferred.push(DeferredEdge {
                source,
                target: target.clone(),
                kind,
                label,
            }),
        }
    }

    /// Phase 2: patch deferred forward references.
    fn resolve_deferred(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);
        for d in deferred {
            match self.lookup_target(&d.target) {
                Some(block) => self.cfg.add_edge(d.source, Some(block), d.kind, d.label),
                None => {
                    warn!(
                        "unresolved jump target `{}` from block {:?} in `{}`",
                        d.target, d.source, self.cfg.name
                    );
                    self.cfg
                        .unresolved_jumps
                        .push((d.source, d.target.to_string()));
                }
            }
        }
    }

    /// Close the graph: final fallthrough to the exit block, deferred-edge
    /// resolution, reachability marking.
    fn finish(mut self) -> Cfg {
        let current = self.current;
        if current != self.cfg.exit {
            let exit = self.cfg.exit;
            self.fallthrough_unless_terminated(current, exit);
        }
        self.resolve_deferred();
        self.cfg.mark_unreachable_blocks();
        self.cfg
    }
}
