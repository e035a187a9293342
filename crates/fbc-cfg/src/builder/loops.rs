//! Loop builders: WHILE, FOR, REPEAT...UNTIL and the four DO variants.
//!
//! Pre-test loops share one shape (header / body / exit), post-test loops
//! another (body / condition / exit). Back-edges are wired immediately after
//! the body recursion returns, so a back-edge always targets a block created
//! before its source.

use fbc_ast::{DoCond, Stmt};

use crate::cfg::EdgeKind;
use crate::context::{LoopContext, LoopKind};
use crate::error::{CfgError, Result};

use super::CfgBuilder;

impl<'a> CfgBuilder<'a> {
    pub(crate) fn build_while(&mut self, stmt: &Stmt, body: &[Stmt]) -> Result<()> {
        self.build_pretest_loop(stmt, body, LoopKind::While, "while", false)
    }

    /// Shared shape for WHILE and DO WHILE/UNTIL ... LOOP.
    ///
    /// `exit_on_true` swaps the branch labels: a DO UNTIL header leaves the
    /// loop when its condition is true.
    pub(crate) fn build_pretest_loop(
        &mut self,
        stmt: &Stmt,
        body: &[Stmt],
        kind: LoopKind,
        name: &str,
        exit_on_true: bool,
    ) -> Result<()> {
        let incoming = self.current;
        let header = self.cfg.new_block(format!("{}_header", name));
        self.fallthrough_unless_terminated(incoming, header);
        self.current = header;
        self.append(stmt);
        self.cfg.block_mut(header).is_loop_header = true;

        let body_block = self.cfg.new_block(format!("{}_body", name));
        let exit = self.cfg.new_block(format!("{}_exit", name));
        self.cfg.block_mut(exit).is_loop_exit = true;
        if exit_on_true {
            self.cfg
                .add_edge(header, Some(body_block), EdgeKind::ConditionalFalse, "false");
            self.cfg
                .add_edge(header, Some(exit), EdgeKind::ConditionalTrue, "true");
        } else {
            self.cfg
                .add_edge(header, Some(body_block), EdgeKind::ConditionalTrue, "true");
            self.cfg
                .add_edge(header, Some(exit), EdgeKind::ConditionalFalse, "false");
        }

        self.loops.push(LoopContext { kind, header, exit });
        self.current = body_block;
        self.build_body(body)?;
        self.loops.pop();

        if !self.is_terminated(self.current) {
            self.cfg
                .add_edge(self.current, Some(header), EdgeKind::Jump, "back_edge");
        }
        self.current = exit;
        Ok(())
    }

    pub(crate) fn build_for(&mut self, stmt: &Stmt, body: &[Stmt]) -> Result<()> {
        let incoming = self.current;
        let init = self.cfg.new_block("for_init");
        self.fallthrough_unless_terminated(incoming, init);
        self.current = init;
        self.append(stmt);

        let header = self.cfg.new_block("for_header");
        self.cfg
            .add_edge(init, Some(header), EdgeKind::Fallthrough, "fallthrough");
        self.cfg.block_mut(header).is_loop_header = true;

        let body_block = self.cfg.new_block("for_body");
        let increment = self.cfg.new_block("for_increment");
        let exit = self.cfg.new_block("for_exit");
        self.cfg.block_mut(exit).is_loop_exit = true;
        self.cfg
            .add_edge(header, Some(body_block), EdgeKind::ConditionalTrue, "true");
        self.cfg
            .add_edge(header, Some(exit), EdgeKind::ConditionalFalse, "false");

        self.loops.push(LoopContext {
            kind: LoopKind::For,
            header,
            exit,
        });
        self.current = body_block;
        self.build_body(body)?;
        self.loops.pop();

        self.fallthrough_unless_terminated(self.current, increment);
        self.cfg
            .add_edge(increment, Some(header), EdgeKind::Jump, "back_edge");
        self.current = exit;
        Ok(())
    }

    pub(crate) fn build_repeat(&mut self, stmt: &Stmt, body: &[Stmt]) -> Result<()> {
        self.build_posttest_loop(stmt, body, LoopKind::Repeat, "repeat", true)
    }

    /// Shared shape for REPEAT...UNTIL and DO ... LOOP WHILE/UNTIL.
    ///
    /// `exit_on_true`: UNTIL leaves the loop when the condition is true,
    /// LOOP WHILE when it is false.
    pub(crate) fn build_posttest_loop(
        &mut self,
        stmt: &Stmt,
        body: &[Stmt],
        kind: LoopKind,
        name: &str,
        exit_on_true: bool,
    ) -> Result<()> {
        let incoming = self.current;
        let body_block = self.cfg.new_block(format!("{}_body", name));
        self.fallthrough_unless_terminated(incoming, body_block);
        // The post-test header is the body: the back-edge re-enters it.
        self.cfg.block_mut(body_block).is_loop_header = true;

        let cond = self.cfg.new_block(format!("{}_cond", name));
        let exit = self.cfg.new_block(format!("{}_exit", name));
        self.cfg.block_mut(exit).is_loop_exit = true;
        self.append_to(cond, stmt);
        if exit_on_true {
            self.cfg
                .add_edge(cond, Some(exit), EdgeKind::ConditionalTrue, "true");
            self.cfg
                .add_edge(cond, Some(body_block), EdgeKind::ConditionalFalse, "false");
        } else {
            self.cfg
                .add_edge(cond, Some(body_block), EdgeKind::ConditionalTrue, "true");
            self.cfg
                .add_edge(cond, Some(exit), EdgeKind::ConditionalFalse, "false");
        }

        self.loops.push(LoopContext {
            kind,
            header: body_block,
            exit,
        });
        self.current = body_block;
        self.build_body(body)?;
        self.loops.pop();

        self.fallthrough_unless_terminated(self.current, cond);
        self.current = exit;
        Ok(())
    }

    pub(crate) fn build_do(
        &mut self,
        stmt: &Stmt,
        pre: &DoCond,
        post: &DoCond,
        body: &[Stmt],
    ) -> Result<()> {
        match (pre, post) {
            (DoCond::While(_), DoCond::None) => {
                self.build_pretest_loop(stmt, body, LoopKind::Do, "do", false)
            }
            (DoCond::Until(_), DoCond::None) => {
                self.build_pretest_loop(stmt, body, LoopKind::Do, "do", true)
            }
            (DoCond::None, DoCond::While(_)) => {
                self.build_posttest_loop(stmt, body, LoopKind::Do, "do", false)
            }
            (DoCond::None, DoCond::Until(_)) => {
                self.build_posttest_loop(stmt, body, LoopKind::Do, "do", true)
            }
            (DoCond::None, DoCond::None) => self.build_infinite_do(stmt, body),
            _ => Err(CfgError::MalformedAst(
                "DO loop with both pre- and post-conditions".to_string(),
            )),
        }
    }

    /// `DO ... LOOP` with no condition: the exit block is reachable only
    /// through EXIT DO.
    fn build_infinite_do(&mut self, stmt: &Stmt, body: &[Stmt]) -> Result<()> {
        let incoming = self.current;
        let body_block = self.cfg.new_block("do_body");
        self.fallthrough_unless_terminated(incoming, body_block);
        self.cfg.block_mut(body_block).is_loop_header = true;
        self.current = body_block;
        self.append(stmt);

        let exit = self.cfg.new_block("do_exit");
        self.cfg.block_mut(exit).is_loop_exit = true;

        self.loops.push(LoopContext {
            kind: LoopKind::Do,
            header: body_block,
            exit,
        });
        self.build_body(body)?;
        self.loops.pop();

        if !self.is_terminated(self.current) {
            self.cfg
                .add_edge(self.current, Some(body_block), EdgeKind::Jump, "back_edge");
        }
        self.current = exit;
        Ok(())
    }
}
