//! Branch builders: IF (both forms) and SELECT CASE.

use fbc_ast::{CaseArm, JumpTarget, Stmt};

use crate::cfg::EdgeKind;
use crate::context::SelectContext;
use crate::error::Result;

use super::CfgBuilder;

impl<'a> CfgBuilder<'a> {
    /// Multi-line IF / ELSE, or the single-line `IF cond THEN GOTO n` form
    /// when `goto_target` is present.
    pub(crate) fn build_if(
        &mut self,
        stmt: &Stmt,
        then_body: &[Stmt],
        else_body: Option<&[Stmt]>,
        goto_target: Option<&JumpTarget>,
    ) -> Result<()> {
        let incoming = self.current;
        self.append(stmt);

        if let Some(target) = goto_target {
            self.jump_or_defer(
                incoming,
                target,
                EdgeKind::ConditionalTrue,
                "true".to_string(),
            );
            let merge = self.cfg.new_block("if_merge");
            self.cfg
                .add_edge(incoming, Some(merge), EdgeKind::ConditionalFalse, "false");
            self.current = merge;
            return Ok(());
        }

        let then_entry = self.cfg.new_block("if_then");
        self.cfg
            .add_edge(incoming, Some(then_entry), EdgeKind::ConditionalTrue, "true");

        let else_entry = else_body.map(|_| {
            let e = self.cfg.new_block("if_else");
            self.cfg
                .add_edge(incoming, Some(e), EdgeKind::ConditionalFalse, "false");
            e
        });

        self.current = then_entry;
        self.build_body(then_body)?;
        let then_exit = self.current;
        let then_terminated = self.is_terminated(then_exit);

        let mut else_exit = None;
        if let (Some(entry), Some(body)) = (else_entry, else_body) {
            self.current = entry;
            self.build_body(body)?;
            else_exit = Some((self.current, self.is_terminated(self.current)));
        }

        // Merge block always created; if both arms terminate it simply ends
        // up unreachable, which keeps syntactically-following dead code out
        // of the live graph.
        let merge = self.cfg.new_block("if_merge");
        if !then_terminated {
            self.cfg
                .add_edge(then_exit, Some(merge), EdgeKind::Fallthrough, "fallthrough");
        }
        match else_exit {
            Some((block, terminated)) => {
                if !terminated {
                    self.cfg
                        .add_edge(block, Some(merge), EdgeKind::Fallthrough, "fallthrough");
                }
            }
            None => {
                self.cfg
                    .add_edge(incoming, Some(merge), EdgeKind::ConditionalFalse, "false");
            }
        }
        self.current = merge;
        Ok(())
    }

    /// SELECT CASE: a chain of check blocks, one body per arm, an optional
    /// otherwise block, and a shared exit.
    pub(crate) fn build_select(
        &mut self,
        stmt: &Stmt,
        arms: &[CaseArm],
        otherwise: Option<&[Stmt]>,
    ) -> Result<()> {
        let incoming = self.current;
        self.append(stmt);

        let mut check = self.cfg.new_block("select_check_0");
        self.cfg
            .add_edge(incoming, Some(check), EdgeKind::Fallthrough, "fallthrough");
        let exit = self.cfg.new_block("select_exit");
        let otherwise_block = otherwise.map(|_| self.cfg.new_block("select_otherwise"));

        self.selects.push(SelectContext { exit });

        for (i, arm) in arms.iter().enumerate() {
            let body = self.cfg.new_block(format!("case_{}", i));
            self.cfg
                .add_edge(check, Some(body), EdgeKind::ConditionalTrue, format!("case_{}", i));

            let last = i + 1 == arms.len();
            let next = if last {
                otherwise_block.unwrap_or(exit)
            } else {
                self.cfg.new_block(format!("select_check_{}", i + 1))
            };
            let false_label = if last { "default" } else { "false" };
            self.cfg
                .add_edge(check, Some(next), EdgeKind::ConditionalFalse, false_label);

            self.current = body;
            self.build_body(&arm.body)?;
            if !self.is_terminated(self.current) {
                self.cfg
                    .add_edge(self.current, Some(exit), EdgeKind::Fallthrough, "fallthrough");
            }
            check = next;
        }

        if arms.is_empty() {
            let target = otherwise_block.unwrap_or(exit);
            self.cfg
                .add_edge(check, Some(target), EdgeKind::Fallthrough, "fallthrough");
        }

        if let (Some(block), Some(body)) = (otherwise_block, otherwise) {
            self.current = block;
            self.build_body(body)?;
            if !self.is_terminated(self.current) {
                self.cfg
                    .add_edge(self.current, Some(exit), EdgeKind::Fallthrough, "fallthrough");
            }
        }

        self.selects.pop();
        self.current = exit;
        Ok(())
    }
}
