//! Phase 0: jump-target prescan.
//!
//! Collects every line number and label referenced by GOTO, GOSUB,
//! ON...GOTO, ON...GOSUB and single-line IF...THEN GOTO, recursing through
//! nested bodies. The builder consults the result to decide whether a line
//! needs a fresh block boundary. Definition bodies are skipped; each gets
//! its own prescan when its own CFG is built.

use fbc_ast::{JumpTarget, Program, Stmt, StmtKind};
use fbc_util::FxHashSet;

/// The set of lines and labels some jump points at.
#[derive(Debug, Default)]
pub(crate) struct JumpTargets {
    pub(crate) lines: FxHashSet<u32>,
    pub(crate) labels: FxHashSet<String>,
}

impl JumpTargets {
    fn note(&mut self, target: &JumpTarget) {
        match target {
            JumpTarget::Line(n) => {
                self.lines.insert(*n);
            }
            JumpTarget::Label(s) => {
                self.labels.insert(s.clone());
            }
        }
    }
}

pub(crate) fn prescan_program(program: &Program) -> JumpTargets {
    let mut targets = JumpTargets::default();
    for line in &program.lines {
        collect(&line.stmts, &mut targets);
    }
    targets
}

pub(crate) fn prescan_body(body: &[Stmt]) -> JumpTargets {
    let mut targets = JumpTargets::default();
    collect(body, &mut targets);
    targets
}

fn collect(stmts: &[Stmt], out: &mut JumpTargets) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Goto { target } | StmtKind::Gosub { target } => out.note(target),

            StmtKind::OnGoto { targets, .. } | StmtKind::OnGosub { targets, .. } => {
                for t in targets {
                    out.note(t);
                }
            }

            StmtKind::If {
                then_body,
                else_body,
                goto_target,
                ..
            } => {
                if let Some(t) = goto_target {
                    out.note(t);
                }
                collect(then_body, out);
                if let Some(e) = else_body {
                    collect(e, out);
                }
            }

            StmtKind::While { body, .. }
            | StmtKind::For { body, .. }
            | StmtKind::Repeat { body, .. }
            | StmtKind::DoLoop { body, .. } => collect(body, out),

            StmtKind::Select {
                arms, otherwise, ..
            } => {
                for arm in arms {
                    collect(&arm.body, out);
                }
                if let Some(o) = otherwise {
                    collect(o, out);
                }
            }

            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                collect(body, out);
                for c in catches {
                    collect(&c.body, out);
                }
                if let Some(f) = finally {
                    collect(f, out);
                }
            }

            // Definition bodies get their own prescan.
            StmtKind::Function(_) | StmtKind::Sub(_) | StmtKind::DefFn(_) => {}

            _ => {}
        }
    }
}
