//! Jump builders: GOTO, GOSUB, RETURN, the ON... family, EXIT, END, THROW.

use fbc_ast::{ExitKind, JumpTarget, Stmt};
use log::warn;

use crate::cfg::EdgeKind;
use crate::context::LoopKind;

use super::CfgBuilder;

impl<'a> CfgBuilder<'a> {
    pub(crate) fn build_goto(&mut self, stmt: &Stmt, target: &JumpTarget) {
        let source = self.current;
        self.append(stmt);
        self.jump_or_defer(source, target, EdgeKind::Jump, "goto".to_string());
        self.terminate_current();
    }

    /// GOSUB transfers control but comes back: a Call edge to the target
    /// plus a fallthrough to a fresh return-point block, which is recorded
    /// for the backend's sparse RETURN dispatch table.
    pub(crate) fn build_gosub(&mut self, stmt: &Stmt, target: &JumpTarget) {
        let source = self.current;
        self.append(stmt);
        self.jump_or_defer(source, target, EdgeKind::Call, format!("gosub:{}", target));

        let return_point = self.cfg.new_block("gosub_return");
        self.cfg.gosub_return_blocks.insert(return_point);
        self.cfg
            .add_edge(source, Some(return_point), EdgeKind::Fallthrough, "return_point");
        self.current = return_point;
    }

    /// RETURN: inside a function body it branches to the function's exit;
    /// at GOSUB level the destination is only known at runtime, so the edge
    /// carries no target.
    pub(crate) fn build_return(&mut self, stmt: &Stmt) {
        let source = self.current;
        self.append(stmt);
        match self.subroutines.last() {
            Some(ctx) => {
                let block = ctx.return_block;
                self.cfg.add_edge(source, Some(block), EdgeKind::Return, "return");
            }
            None => {
                self.cfg
                    .add_edge(source, None, EdgeKind::Return, "gosub_return");
            }
        }
        self.terminate_current();
    }

    pub(crate) fn build_on_goto(&mut self, stmt: &Stmt, targets: &[JumpTarget]) {
        let source = self.current;
        self.append(stmt);
        for (i, target) in targets.iter().enumerate() {
            self.jump_or_defer(
                source,
                target,
                EdgeKind::ConditionalTrue,
                format!("case_{}", i),
            );
        }
        // Selector out of range falls through.
        let next = self.cfg.new_block("on_goto_next");
        self.cfg
            .add_edge(source, Some(next), EdgeKind::ConditionalFalse, "default");
        self.current = next;
    }

    pub(crate) fn build_on_gosub(&mut self, stmt: &Stmt, targets: &[JumpTarget]) {
        let source = self.current;
        self.append(stmt);
        for (i, target) in targets.iter().enumerate() {
            self.jump_or_defer(
                source,
                target,
                EdgeKind::ConditionalTrue,
                format!("call_{}", i),
            );
        }
        // All branches come back to one shared return point.
        let return_point = self.cfg.new_block("on_gosub_return");
        self.cfg.gosub_return_blocks.insert(return_point);
        self.cfg
            .add_edge(source, Some(return_point), EdgeKind::Fallthrough, "return_point");
        self.current = return_point;
    }

    /// ON...CALL dispatches to named SUBs; every edge lands on the shared
    /// continuation and the labels tell the backend which call to emit.
    pub(crate) fn build_on_call(&mut self, stmt: &Stmt, subs: &[String]) {
        let source = self.current;
        self.append(stmt);
        let continuation = self.cfg.new_block("on_call_cont");
        for (i, name) in subs.iter().enumerate() {
            self.cfg.add_edge(
                source,
                Some(continuation),
                EdgeKind::ConditionalTrue,
                format!("call_sub:{}:case_{}", name, i),
            );
        }
        self.cfg.add_edge(
            source,
            Some(continuation),
            EdgeKind::ConditionalFalse,
            "call_default",
        );
        self.current = continuation;
    }

    pub(crate) fn build_exit(&mut self, stmt: &Stmt, kind: ExitKind) {
        let source = self.current;
        self.append(stmt);

        if kind == ExitKind::Select {
            match self.selects.last() {
                Some(ctx) => {
                    let exit = ctx.exit;
                    self.cfg.add_edge(source, Some(exit), EdgeKind::Jump, "exit_select");
                }
                None => warn!("EXIT SELECT outside any SELECT in `{}`", self.cfg.name),
            }
            self.terminate_current();
            return;
        }

        let wanted = match kind {
            ExitKind::For => LoopKind::For,
            ExitKind::While => LoopKind::While,
            ExitKind::Do => LoopKind::Do,
            ExitKind::Repeat => LoopKind::Repeat,
            ExitKind::Select => unreachable!(),
        };
        let label = match kind {
            ExitKind::For => "exit_for",
            ExitKind::While => "exit_while",
            ExitKind::Do => "exit_do",
            ExitKind::Repeat => "exit_repeat",
            ExitKind::Select => unreachable!(),
        };

        match self.loops.iter().rev().find(|l| l.kind == wanted) {
            Some(ctx) => {
                let exit = ctx.exit;
                self.cfg.add_edge(source, Some(exit), EdgeKind::Jump, label);
            }
            None => warn!("{} outside any matching loop in `{}`", label, self.cfg.name),
        }
        self.terminate_current();
    }

    pub(crate) fn build_end(&mut self, stmt: &Stmt) {
        let source = self.current;
        self.append(stmt);
        let exit = self.cfg.exit;
        self.cfg.add_edge(source, Some(exit), EdgeKind::Jump, "end");
        self.terminate_current();
    }

    pub(crate) fn build_throw(&mut self, stmt: &Stmt) {
        let source = self.current;
        self.append(stmt);
        match self.tries.last() {
            Some(ctx) => {
                let catch = ctx.catch_entry;
                self.cfg.add_edge(source, Some(catch), EdgeKind::Exception, "throw");
            }
            None => warn!("unhandled THROW in `{}`: no active TRY", self.cfg.name),
        }
        self.terminate_current();
    }
}
