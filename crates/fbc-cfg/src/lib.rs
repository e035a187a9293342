//! fbc-cfg - Control-Flow Graph Construction for FasterBASIC
//!
//! Converts a validated AST into a [`ProgramCfg`]: one [`Cfg`] for the main
//! program plus one per SUB / FUNCTION / DEF FN. Construction is single-pass
//! and recursive - every edge is wired the moment both its endpoints are
//! known, loop back-edges immediately after the body recursion returns, and
//! only genuinely forward references (GOTO to a line not yet seen) are parked
//! on a deferred list resolved at the end of the pass.
//!
//! Blocks and edges use integer ids into an owning arena rather than
//! references, so the inherently cyclic graph (loops, TRY retry, dynamic
//! RETURN) needs no interior pointers. The AST is never mutated and outlives
//! the CFG; blocks reference statements by [`fbc_ast::StmtId`].
//!
//! ## Phases
//!
//! 1. **Jump-target prescan** - collect every line number and label referenced
//!    by GOTO / GOSUB / ON...GOTO / ON...GOSUB so the builder knows where a
//!    block must be split.
//! 2. **Recursive build** - walk the statement sequence, dispatching control
//!    constructs to specialized builders that each return the block where the
//!    next statement continues.
//! 3. **Deferred-edge resolution** - patch forward references; unresolved
//!    targets are logged as warnings, never errors.

pub mod builder;
pub mod cfg;
pub mod context;
pub mod error;
pub mod report;

pub use builder::{build_program_cfg, build_program_cfg_with, BuilderConfig};
pub use cfg::{
    BasicBlock, BlockId, Cfg, Edge, EdgeKind, Param, ProgramCfg, ValueType,
};
pub use error::{CfgError, Result};

#[cfg(test)]
mod tests;
