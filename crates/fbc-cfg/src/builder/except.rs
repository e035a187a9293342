//! TRY / CATCH / FINALLY builder.
//!
//! THROW inside the try body branches to the first catch block; selecting
//! among multiple catch clauses by error code is a runtime dispatch the
//! backend emits, the same way ON...GOTO case selection is. The try context
//! is popped before catch bodies are built, so a THROW inside a catch
//! propagates to the enclosing TRY.

use fbc_ast::{CatchClause, Stmt};

use crate::cfg::EdgeKind;
use crate::context::TryContext;
use crate::error::Result;

use super::CfgBuilder;

impl<'a> CfgBuilder<'a> {
    pub(crate) fn build_try(
        &mut self,
        stmt: &Stmt,
        body: &[Stmt],
        catches: &[CatchClause],
        finally: Option<&[Stmt]>,
    ) -> Result<()> {
        let incoming = self.current;
        self.append(stmt);

        let try_body = self.cfg.new_block("try_body");
        self.cfg
            .add_edge(incoming, Some(try_body), EdgeKind::Fallthrough, "fallthrough");

        // At least one catch block, even for a bare TRY ... FINALLY.
        let catch_blocks: Vec<_> = if catches.is_empty() {
            vec![self.cfg.new_block("catch_default")]
        } else {
            (0..catches.len())
                .map(|i| self.cfg.new_block(format!("catch_{}", i)))
                .collect()
        };
        let finally_block = finally.map(|_| self.cfg.new_block("finally"));
        let exit = self.cfg.new_block("try_exit");
        let after = finally_block.unwrap_or(exit);

        self.tries.push(TryContext {
            catch_entry: catch_blocks[0],
            finally: finally_block,
            exit,
        });
        self.current = try_body;
        self.build_body(body)?;
        self.tries.pop();
        if !self.is_terminated(self.current) {
            self.cfg
                .add_edge(self.current, Some(after), EdgeKind::Fallthrough, "fallthrough");
        }

        for (i, block) in catch_blocks.iter().enumerate() {
            self.current = *block;
            if let Some(clause) = catches.get(i) {
                self.build_body(&clause.body)?;
            }
            if !self.is_terminated(self.current) {
                self.cfg
                    .add_edge(self.current, Some(after), EdgeKind::Fallthrough, "fallthrough");
            }
        }

        if let (Some(block), Some(body)) = (finally_block, finally) {
            self.current = block;
            self.build_body(body)?;
            if !self.is_terminated(self.current) {
                self.cfg
                    .add_edge(self.current, Some(exit), EdgeKind::Fallthrough, "fallthrough");
            }
        }

        self.current = exit;
        Ok(())
    }
}
