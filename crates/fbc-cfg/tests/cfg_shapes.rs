//! CFG Shape Tests - End-to-End Block and Edge Structure
//!
//! These tests pin down the exact graph shapes the builder must produce for
//! canonical programs: a bare WHILE loop, a forward GOTO, and a GOSUB with
//! its return point. Blocks are maximal straight-line sequences, so adjacent
//! unnumbered lines coalesce; the assertions below are written against that
//! granularity.

use fbc_ast::build::program;
use fbc_ast::{AstBuilder, BinOp, Expr};
use fbc_cfg::{build_program_cfg, BlockId, Cfg, EdgeKind};

fn x_lt(n: i64) -> Expr {
    Expr::Binary {
        op: BinOp::Lt,
        lhs: Box::new(Expr::Var("x".to_string())),
        rhs: Box::new(Expr::Int(n)),
    }
}

fn assert_valid(cfg: &Cfg) {
    let problems = cfg.validate();
    assert!(
        problems.is_empty(),
        "invariant violations: {:?}\n{}",
        problems,
        cfg
    );
}

fn block_labeled(cfg: &Cfg, label: &str) -> BlockId {
    cfg.blocks
        .iter_enumerated()
        .find(|(_, b)| b.label == label)
        .map(|(id, _)| id)
        .unwrap_or_else(|| panic!("no block labeled `{}`:\n{}", label, cfg))
}

/// `WHILE x < 10: LET x = x + 1: WEND`
///
/// **Bug this finds:** back-edges wired to the loop exit instead of the
/// header, or missing entirely.
/// **Invariant verified:** header -> body [true], header -> exit [false],
/// body -> header back-edge; the exit is entered by the false edge only.
#[test]
fn e1_while_loop_shape() {
    let mut b = AstBuilder::new();
    let incr = b.let_stmt(
        10,
        "x",
        Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Var("x".to_string())),
            rhs: Box::new(Expr::Int(1)),
        },
    );
    let w = b.stmt(
        10,
        fbc_ast::StmtKind::While {
            cond: x_lt(10),
            body: vec![incr],
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![w])]))
        .unwrap()
        .main;

    let header = block_labeled(&cfg, "while_header");
    let body = block_labeled(&cfg, "while_body");
    let exit = block_labeled(&cfg, "while_exit");

    let true_edges = cfg.edges_between(header, body);
    assert_eq!(true_edges.len(), 1);
    assert_eq!(true_edges[0].kind, EdgeKind::ConditionalTrue);

    let false_edges = cfg.edges_between(header, exit);
    assert_eq!(false_edges.len(), 1);
    assert_eq!(false_edges[0].kind, EdgeKind::ConditionalFalse);

    let back_edges = cfg.edges_between(body, header);
    assert_eq!(back_edges.len(), 1);
    // A back-edge targets a block created before its source.
    assert!(header < body);

    // The loop exit's only predecessor is the header's false edge; the
    // back-edge enters the header, never the exit.
    assert_eq!(cfg.block(exit).predecessors, vec![header]);
    assert!(cfg.unresolved_jumps.is_empty());
    assert_valid(&cfg);
}

/// `10 GOTO 30 ; 20 LET a = 1 ; 30 PRINT a`
///
/// **Bug this finds:** forward references aborting construction, or dead
/// code corrupting the reachable graph.
/// **Invariant verified:** the GOTO block is terminated with a Jump edge to
/// line 30's block; line 20's block is unreachable; nothing is left
/// unresolved after Phase 2.
#[test]
fn e2_forward_goto() {
    let mut b = AstBuilder::new();
    let jump = b.goto_line(10, 30);
    let skipped = b.let_stmt(20, "a", Expr::Int(1));
    let target = b.print(30, vec![Expr::Var("a".to_string())]);
    let cfg = build_program_cfg(&program(vec![
        b.line(10, vec![jump]),
        b.line(20, vec![skipped]),
        b.line(30, vec![target]),
    ]))
    .unwrap()
    .main;

    // Line 10's block (the entry) is terminated by the GOTO.
    let goto_block = cfg.entry;
    assert!(cfg.block(goto_block).is_terminated);

    let line30 = cfg.line_map[&30];
    let jump_edges = cfg.edges_between(goto_block, line30);
    assert_eq!(jump_edges.len(), 1);
    assert_eq!(jump_edges[0].kind, EdgeKind::Jump);

    // Line 20 landed in a block no edge reaches.
    let line20_block = cfg
        .blocks
        .iter_enumerated()
        .find(|(_, blk)| blk.source_lines.contains(&20))
        .map(|(id, _)| id)
        .expect("line 20 statement not recorded");
    assert!(cfg.block(line20_block).is_unreachable);
    assert!(!cfg.block(line30).is_unreachable);

    // Phase 2 resolved everything.
    assert!(cfg.unresolved_jumps.is_empty());
    assert_valid(&cfg);
}

/// `10 GOSUB 100 ; 20 PRINT "a" ; 30 END ; 100 PRINT "sub" ; 110 RETURN`
///
/// **Bug this finds:** missing return-point registration (breaking the
/// backend's sparse RETURN dispatch) or RETURN edges with a bogus static
/// target.
/// **Invariant verified:** Call edge to the subroutine, Fallthrough to a
/// registered return point carrying line 20, and a dynamic Return edge.
#[test]
fn e3_gosub_return_point() {
    let mut b = AstBuilder::new();
    let call = b.gosub_line(10, 100);
    let after = b.print(20, vec![Expr::Str("a".to_string())]);
    let stop = b.end(30);
    let sub_print = b.print(100, vec![Expr::Str("sub".to_string())]);
    let ret = b.return_sub(110);
    let cfg = build_program_cfg(&program(vec![
        b.line(10, vec![call]),
        b.line(20, vec![after]),
        b.line(30, vec![stop]),
        b.line(100, vec![sub_print]),
        b.line(110, vec![ret]),
    ]))
    .unwrap()
    .main;

    let gosub_block = cfg.entry;
    let sub_block = cfg.line_map[&100];

    // Call edge to the subroutine body.
    let call_edges = cfg.edges_between(gosub_block, sub_block);
    assert_eq!(call_edges.len(), 1);
    assert_eq!(call_edges[0].kind, EdgeKind::Call);

    // Fallthrough to a fresh return point, registered for sparse dispatch.
    let return_point = block_labeled(&cfg, "gosub_return");
    assert!(cfg.gosub_return_blocks.contains(&return_point));
    let ft = cfg.edges_between(gosub_block, return_point);
    assert_eq!(ft.len(), 1);
    assert_eq!(ft[0].kind, EdgeKind::Fallthrough);

    // Execution resumes at line 20 inside the return point.
    assert!(cfg.block(return_point).source_lines.contains(&20));

    // RETURN produces the dynamic edge: kind Return, no static target.
    let dynamic_returns: Vec<_> = cfg
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Return && e.target.is_none())
        .collect();
    assert_eq!(dynamic_returns.len(), 1);
    assert_eq!(dynamic_returns[0].source, sub_block);

    assert!(cfg.unresolved_jumps.is_empty());
    assert_valid(&cfg);
}

/// Structural symmetry holds for every CFG of a mixed program.
///
/// **Bug this finds:** adjacency lists drifting out of sync with the edge
/// list in any construct builder.
#[test]
fn structural_symmetry_across_constructs() {
    let mut b = AstBuilder::new();
    let exit_do = b.stmt(60, fbc_ast::StmtKind::Exit(fbc_ast::ExitKind::Do));
    let guard = b.stmt(
        50,
        fbc_ast::StmtKind::If {
            cond: x_lt(3),
            then_body: vec![exit_do],
            else_body: None,
            goto_target: None,
        },
    );
    let do_loop = b.stmt(
        40,
        fbc_ast::StmtKind::DoLoop {
            pre: fbc_ast::DoCond::None,
            post: fbc_ast::DoCond::None,
            body: vec![guard],
        },
    );
    let jump = b.goto_line(70, 90);
    let skipped = b.print(80, vec![]);
    let target = b.end(90);
    let cfg = build_program_cfg(&program(vec![
        b.line(40, vec![do_loop]),
        b.line(70, vec![jump]),
        b.line(80, vec![skipped]),
        b.line(90, vec![target]),
    ]))
    .unwrap()
    .main;

    assert_valid(&cfg);
    // Exit block never grows successors.
    assert!(cfg.block(cfg.exit).successors.is_empty());
    // Reverse post-order visits every block exactly once.
    let rpo = cfg.reverse_postorder();
    assert_eq!(rpo.len(), cfg.block_count());
}
