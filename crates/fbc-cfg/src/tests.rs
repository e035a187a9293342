//! Unit tests for CFG construction.
//!
//! Each test builds a tiny program and checks the exact block/edge shape the
//! builder must produce, plus the structural invariants via `validate()`.

use fbc_ast::build::program;
use fbc_ast::{
    AstBuilder, BinOp, CaseArm, CaseTest, CatchClause, DoCond, Expr, ExitKind, FnDef, JumpTarget,
    ParamDecl, Stmt, StmtKind, TypeSuffix,
};

use crate::builder::{build_program_cfg, build_program_cfg_with, BuilderConfig};
use crate::cfg::{BlockId, Cfg, EdgeKind, ValueType};
use crate::error::CfgError;

fn cond() -> Expr {
    Expr::Binary {
        op: BinOp::Lt,
        lhs: Box::new(Expr::Var("x".to_string())),
        rhs: Box::new(Expr::Int(10)),
    }
}

fn block_by_label(cfg: &Cfg, label: &str) -> BlockId {
    cfg.blocks
        .iter_enumerated()
        .find(|(_, b)| b.label == label)
        .map(|(id, _)| id)
        .unwrap_or_else(|| panic!("no block labeled `{}` in:\n{}", label, cfg))
}

fn has_edge(cfg: &Cfg, src: BlockId, dst: BlockId, kind: EdgeKind, label: &str) -> bool {
    cfg.edges
        .iter()
        .any(|e| e.source == src && e.target == Some(dst) && e.kind == kind && e.label == label)
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

#[test]
fn while_loop_shape() {
    let mut b = AstBuilder::new();
    let body = vec![b.let_stmt(10, "x", Expr::Int(1))];
    let w = b.stmt(
        10,
        StmtKind::While {
            cond: cond(),
            body,
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![w])]))
        .unwrap()
        .main;

    let header = block_by_label(&cfg, "while_header");
    let body = block_by_label(&cfg, "while_body");
    let exit = block_by_label(&cfg, "while_exit");

    assert!(cfg.block(header).is_loop_header);
    assert!(cfg.block(exit).is_loop_exit);
    assert!(has_edge(&cfg, header, body, EdgeKind::ConditionalTrue, "true"));
    assert!(has_edge(&cfg, header, exit, EdgeKind::ConditionalFalse, "false"));
    assert!(has_edge(&cfg, body, header, EdgeKind::Jump, "back_edge"));
    // The back-edge targets a block created earlier than its source.
    assert!(header < body);
    // The loop exit is entered only by the false edge, never by the back-edge.
    assert_eq!(cfg.block(exit).predecessors, vec![header]);
    assert!(cfg.unresolved_jumps.is_empty());
    assert_valid(&cfg);
}

#[test]
fn if_else_shape_merges_both_arms() {
    let mut b = AstBuilder::new();
    let then_body = vec![b.let_stmt(20, "a", Expr::Int(1))];
    let else_body = vec![b.let_stmt(30, "a", Expr::Int(2))];
    let stmt = b.stmt(
        10,
        StmtKind::If {
            cond: cond(),
            then_body,
            else_body: Some(else_body),
            goto_target: None,
        },
    );
    let after = b.print(40, vec![Expr::Var("a".to_string())]);
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt, after])]))
        .unwrap()
        .main;

    let then_entry = block_by_label(&cfg, "if_then");
    let else_entry = block_by_label(&cfg, "if_else");
    let merge = block_by_label(&cfg, "if_merge");

    assert!(has_edge(&cfg, cfg.entry, then_entry, EdgeKind::ConditionalTrue, "true"));
    assert!(has_edge(&cfg, cfg.entry, else_entry, EdgeKind::ConditionalFalse, "false"));
    assert!(has_edge(&cfg, then_entry, merge, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, else_entry, merge, EdgeKind::Fallthrough, "fallthrough"));
    // The statement after the IF continues in the merge block.
    assert_eq!(cfg.block(merge).statements.len(), 1);
    assert_valid(&cfg);
}

#[test]
fn if_without_else_false_edge_reaches_merge() {
    let mut b = AstBuilder::new();
    let then_body = vec![b.let_stmt(20, "a", Expr::Int(1))];
    let stmt = b.stmt(
        10,
        StmtKind::If {
            cond: cond(),
            then_body,
            else_body: None,
            goto_target: None,
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let merge = block_by_label(&cfg, "if_merge");
    assert!(has_edge(&cfg, cfg.entry, merge, EdgeKind::ConditionalFalse, "false"));
    assert_valid(&cfg);
}

#[test]
fn if_with_both_arms_terminated_leaves_merge_unreachable() {
    let mut b = AstBuilder::new();
    let then_body = vec![b.end(20)];
    let else_body = vec![b.end(30)];
    let stmt = b.stmt(
        10,
        StmtKind::If {
            cond: cond(),
            then_body,
            else_body: Some(else_body),
            goto_target: None,
        },
    );
    let dead = b.print(40, vec![]);
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt, dead])]))
        .unwrap()
        .main;

    let merge = block_by_label(&cfg, "if_merge");
    assert!(cfg.block(merge).is_unreachable);
    // Dead statements are still recorded, in the unreachable merge block.
    assert_eq!(cfg.block(merge).statements.len(), 1);
    assert_valid(&cfg);
}

#[test]
fn single_line_if_goto_defers_and_falls_through() {
    let mut b = AstBuilder::new();
    let stmt = b.stmt(
        10,
        StmtKind::If {
            cond: cond(),
            then_body: vec![],
            else_body: None,
            goto_target: Some(JumpTarget::Line(30)),
        },
    );
    let mid = b.let_stmt(20, "a", Expr::Int(1));
    let tgt = b.print(30, vec![]);
    let cfg = build_program_cfg(&program(vec![
        b.line(10, vec![stmt]),
        b.line(20, vec![mid]),
        b.line(30, vec![tgt]),
    ]))
    .unwrap()
    .main;

    let target = cfg.line_map[&30];
    assert!(has_edge(&cfg, cfg.entry, target, EdgeKind::ConditionalTrue, "true"));
    let merge = block_by_label(&cfg, "if_merge");
    assert!(has_edge(&cfg, cfg.entry, merge, EdgeKind::ConditionalFalse, "false"));
    // The false path carries line 20 and falls into line 30.
    assert!(has_edge(&cfg, merge, target, EdgeKind::Fallthrough, "fallthrough"));
    assert!(cfg.unresolved_jumps.is_empty());
    assert_valid(&cfg);
}

#[test]
fn for_loop_shape() {
    let mut b = AstBuilder::new();
    let body = vec![b.print(20, vec![Expr::Var("i".to_string())])];
    let stmt = b.stmt(
        10,
        StmtKind::For {
            var: "i".to_string(),
            from: Expr::Int(1),
            to: Expr::Int(10),
            step: None,
            body,
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let init = block_by_label(&cfg, "for_init");
    let header = block_by_label(&cfg, "for_header");
    let body = block_by_label(&cfg, "for_body");
    let increment = block_by_label(&cfg, "for_increment");
    let exit = block_by_label(&cfg, "for_exit");

    assert!(has_edge(&cfg, cfg.entry, init, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, init, header, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, header, body, EdgeKind::ConditionalTrue, "true"));
    assert!(has_edge(&cfg, header, exit, EdgeKind::ConditionalFalse, "false"));
    assert!(has_edge(&cfg, body, increment, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, increment, header, EdgeKind::Jump, "back_edge"));
    assert!(cfg.block(header).is_loop_header);
    assert_valid(&cfg);
}

#[test]
fn repeat_until_shape() {
    let mut b = AstBuilder::new();
    let body = vec![b.let_stmt(20, "x", Expr::Int(1))];
    let stmt = b.stmt(10, StmtKind::Repeat { body, until: cond() });
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let body = block_by_label(&cfg, "repeat_body");
    let cond_block = block_by_label(&cfg, "repeat_cond");
    let exit = block_by_label(&cfg, "repeat_exit");

    assert!(has_edge(&cfg, cfg.entry, body, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, body, cond_block, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, cond_block, exit, EdgeKind::ConditionalTrue, "true"));
    assert!(has_edge(&cfg, cond_block, body, EdgeKind::ConditionalFalse, "false"));
    // Post-test loops loop back into the body: the body is the header.
    assert!(cfg.block(body).is_loop_header);
    assert_valid(&cfg);
}

#[test]
fn do_until_pretest_swaps_branch_labels() {
    let mut b = AstBuilder::new();
    let body = vec![b.let_stmt(20, "x", Expr::Int(1))];
    let stmt = b.stmt(
        10,
        StmtKind::DoLoop {
            pre: DoCond::Until(cond()),
            post: DoCond::None,
            body,
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let header = block_by_label(&cfg, "do_header");
    let body = block_by_label(&cfg, "do_body");
    let exit = block_by_label(&cfg, "do_exit");
    assert!(has_edge(&cfg, header, body, EdgeKind::ConditionalFalse, "false"));
    assert!(has_edge(&cfg, header, exit, EdgeKind::ConditionalTrue, "true"));
    assert_valid(&cfg);
}

#[test]
fn do_loop_while_posttest_shape() {
    let mut b = AstBuilder::new();
    let body = vec![b.let_stmt(20, "x", Expr::Int(1))];
    let stmt = b.stmt(
        10,
        StmtKind::DoLoop {
            pre: DoCond::None,
            post: DoCond::While(cond()),
            body,
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let body = block_by_label(&cfg, "do_body");
    let cond_block = block_by_label(&cfg, "do_cond");
    let exit = block_by_label(&cfg, "do_exit");
    assert!(has_edge(&cfg, cond_block, body, EdgeKind::ConditionalTrue, "true"));
    assert!(has_edge(&cfg, cond_block, exit, EdgeKind::ConditionalFalse, "false"));
    assert_valid(&cfg);
}

#[test]
fn infinite_do_exits_only_via_exit_do() {
    let mut b = AstBuilder::new();
    let exit_stmt = b.stmt(30, StmtKind::Exit(ExitKind::Do));
    let guard = b.stmt(
        20,
        StmtKind::If {
            cond: cond(),
            then_body: vec![exit_stmt],
            else_body: None,
            goto_target: None,
        },
    );
    let stmt = b.stmt(
        10,
        StmtKind::DoLoop {
            pre: DoCond::None,
            post: DoCond::None,
            body: vec![guard],
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let body = block_by_label(&cfg, "do_body");
    let exit = block_by_label(&cfg, "do_exit");
    // The only way into the loop exit is the EXIT DO jump.
    let exit_preds = &cfg.block(exit).predecessors;
    assert_eq!(exit_preds.len(), 1);
    assert!(cfg
        .edges_between(exit_preds[0], exit)
        .iter()
        .all(|e| e.kind == EdgeKind::Jump && e.label == "exit_do"));
    // And the loop closes on itself.
    assert!(cfg
        .edges
        .iter()
        .any(|e| e.target == Some(body) && e.kind == EdgeKind::Jump && e.label == "back_edge"));
    assert_valid(&cfg);
}

#[test]
fn do_with_both_conditions_is_malformed() {
    let mut b = AstBuilder::new();
    let stmt = b.stmt(
        10,
        StmtKind::DoLoop {
            pre: DoCond::While(cond()),
            post: DoCond::Until(cond()),
            body: vec![],
        },
    );
    let err = build_program_cfg(&program(vec![b.line(10, vec![stmt])])).unwrap_err();
    assert!(matches!(err, CfgError::MalformedAst(_)));
}

#[test]
fn select_case_chains_checks() {
    let mut b = AstBuilder::new();
    let arm0 = CaseArm {
        tests: vec![CaseTest::Equal(Expr::Int(1))],
        body: vec![b.print(20, vec![])],
    };
    let arm1 = CaseArm {
        tests: vec![CaseTest::Range(Expr::Int(2), Expr::Int(5))],
        body: vec![b.print(30, vec![])],
    };
    let otherwise = vec![b.print(40, vec![])];
    let stmt = b.stmt(
        10,
        StmtKind::Select {
            scrutinee: Expr::Var("x".to_string()),
            arms: vec![arm0, arm1],
            otherwise: Some(otherwise),
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let check0 = block_by_label(&cfg, "select_check_0");
    let check1 = block_by_label(&cfg, "select_check_1");
    let case0 = block_by_label(&cfg, "case_0");
    let case1 = block_by_label(&cfg, "case_1");
    let otherwise = block_by_label(&cfg, "select_otherwise");
    let exit = block_by_label(&cfg, "select_exit");

    assert!(has_edge(&cfg, check0, case0, EdgeKind::ConditionalTrue, "case_0"));
    assert!(has_edge(&cfg, check0, check1, EdgeKind::ConditionalFalse, "false"));
    assert!(has_edge(&cfg, check1, case1, EdgeKind::ConditionalTrue, "case_1"));
    assert!(has_edge(&cfg, check1, otherwise, EdgeKind::ConditionalFalse, "default"));
    assert!(has_edge(&cfg, case0, exit, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, case1, exit, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, otherwise, exit, EdgeKind::Fallthrough, "fallthrough"));
    assert_valid(&cfg);
}

#[test]
fn exit_select_jumps_to_select_exit() {
    let mut b = AstBuilder::new();
    let exit_stmt = b.stmt(20, StmtKind::Exit(ExitKind::Select));
    let arm = CaseArm {
        tests: vec![CaseTest::Equal(Expr::Int(1))],
        body: vec![exit_stmt],
    };
    let stmt = b.stmt(
        10,
        StmtKind::Select {
            scrutinee: Expr::Var("x".to_string()),
            arms: vec![arm],
            otherwise: None,
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let case0 = block_by_label(&cfg, "case_0");
    let exit = block_by_label(&cfg, "select_exit");
    assert!(has_edge(&cfg, case0, exit, EdgeKind::Jump, "exit_select"));
    assert!(cfg.block(case0).is_terminated);
    assert_valid(&cfg);
}

#[test]
fn try_catch_finally_shape() {
    let mut b = AstBuilder::new();
    let throw = b.stmt(20, StmtKind::Throw { code: Expr::Int(7) });
    let catch = CatchClause {
        error_codes: vec![7],
        body: vec![b.print(30, vec![])],
    };
    let finally = vec![b.print(40, vec![])];
    let stmt = b.stmt(
        10,
        StmtKind::Try {
            body: vec![throw],
            catches: vec![catch],
            finally: Some(finally),
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let try_body = block_by_label(&cfg, "try_body");
    let catch0 = block_by_label(&cfg, "catch_0");
    let finally = block_by_label(&cfg, "finally");
    let exit = block_by_label(&cfg, "try_exit");

    assert!(has_edge(&cfg, try_body, catch0, EdgeKind::Exception, "throw"));
    assert!(cfg.block(try_body).is_terminated);
    assert!(has_edge(&cfg, catch0, finally, EdgeKind::Fallthrough, "fallthrough"));
    assert!(has_edge(&cfg, finally, exit, EdgeKind::Fallthrough, "fallthrough"));
    assert_valid(&cfg);
}

#[test]
fn throw_outside_try_terminates_without_edge() {
    let mut b = AstBuilder::new();
    let stmt = b.stmt(10, StmtKind::Throw { code: Expr::Int(1) });
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;
    assert!(cfg.block(cfg.entry).is_terminated);
    assert!(!cfg.edges.iter().any(|e| e.kind == EdgeKind::Exception));
    assert_valid(&cfg);
}

#[test]
fn goto_to_undefined_line_stays_unresolved() {
    let mut b = AstBuilder::new();
    let stmt = b.goto_line(10, 999);
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;
    assert_eq!(cfg.unresolved_jumps.len(), 1);
    assert_eq!(cfg.unresolved_jumps[0].1, "999");
    // No Jump edge was emitted for the missing target.
    assert!(!cfg.edges.iter().any(|e| e.kind == EdgeKind::Jump));
    assert_valid(&cfg);
}

#[test]
fn on_goto_emits_case_edges_and_default() {
    let mut b = AstBuilder::new();
    let stmt = b.stmt(
        10,
        StmtKind::OnGoto {
            selector: Expr::Var("x".to_string()),
            targets: vec![JumpTarget::Line(100), JumpTarget::Line(200)],
        },
    );
    let t1 = b.print(100, vec![]);
    let t2 = b.print(200, vec![]);
    let cfg = build_program_cfg(&program(vec![
        b.line(10, vec![stmt]),
        b.line(100, vec![t1]),
        b.line(200, vec![t2]),
    ]))
    .unwrap()
    .main;

    let b100 = cfg.line_map[&100];
    let b200 = cfg.line_map[&200];
    assert!(has_edge(&cfg, cfg.entry, b100, EdgeKind::ConditionalTrue, "case_0"));
    assert!(has_edge(&cfg, cfg.entry, b200, EdgeKind::ConditionalTrue, "case_1"));
    let next = block_by_label(&cfg, "on_goto_next");
    assert!(has_edge(&cfg, cfg.entry, next, EdgeKind::ConditionalFalse, "default"));
    // ON...GOTO is not a terminator.
    assert!(!cfg.block(cfg.entry).is_terminated);
    assert_valid(&cfg);
}

#[test]
fn on_gosub_registers_shared_return_point() {
    let mut b = AstBuilder::new();
    let stmt = b.stmt(
        10,
        StmtKind::OnGosub {
            selector: Expr::Var("x".to_string()),
            targets: vec![JumpTarget::Line(100)],
        },
    );
    let stop = b.end(20);
    let sub = b.print(100, vec![]);
    let ret_stmt = b.return_sub(110);
    let cfg = build_program_cfg(&program(vec![
        b.line(10, vec![stmt]),
        b.line(20, vec![stop]),
        b.line(100, vec![sub, ret_stmt]),
    ]))
    .unwrap()
    .main;

    let ret = block_by_label(&cfg, "on_gosub_return");
    assert!(cfg.gosub_return_blocks.contains(&ret));
    assert!(has_edge(&cfg, cfg.entry, ret, EdgeKind::Fallthrough, "return_point"));
    let target = cfg.line_map[&100];
    assert_ne!(target, ret);
    assert!(has_edge(&cfg, cfg.entry, target, EdgeKind::ConditionalTrue, "call_0"));
    // RETURN at GOSUB level carries no static target.
    assert!(cfg
        .edges
        .iter()
        .any(|e| e.source == target && e.target.is_none() && e.kind == EdgeKind::Return));
    assert_valid(&cfg);
}

#[test]
fn on_call_labels_name_the_subs() {
    let mut b = AstBuilder::new();
    let stmt = b.stmt(
        10,
        StmtKind::OnCall {
            selector: Expr::Var("x".to_string()),
            subs: vec!["Foo".to_string(), "Bar".to_string()],
        },
    );
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;

    let cont = block_by_label(&cfg, "on_call_cont");
    assert!(has_edge(&cfg, cfg.entry, cont, EdgeKind::ConditionalTrue, "call_sub:Foo:case_0"));
    assert!(has_edge(&cfg, cfg.entry, cont, EdgeKind::ConditionalTrue, "call_sub:Bar:case_1"));
    assert!(has_edge(&cfg, cfg.entry, cont, EdgeKind::ConditionalFalse, "call_default"));
    // Duplicate successors are expected here: one per labeled edge.
    assert_eq!(cfg.block(cont).predecessors.len(), 3);
    assert_valid(&cfg);
}

#[test]
fn exit_for_outside_any_loop_emits_no_edge() {
    let mut b = AstBuilder::new();
    let stmt = b.stmt(10, StmtKind::Exit(ExitKind::For));
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![stmt])]))
        .unwrap()
        .main;
    assert!(cfg.block(cfg.entry).is_terminated);
    assert!(cfg.block(cfg.entry).successors.is_empty());
    assert_valid(&cfg);
}

#[test]
fn function_definitions_get_their_own_cfgs() {
    let mut b = AstBuilder::new();
    let ret = b.return_sub(110);
    let def = FnDef {
        name: "Area".to_string(),
        params: vec![
            ParamDecl {
                name: "w".to_string(),
                suffix: TypeSuffix::Int,
            },
            ParamDecl {
                name: "h".to_string(),
                suffix: TypeSuffix::Single,
            },
        ],
        ret_suffix: TypeSuffix::Double,
        body: vec![ret],
    };
    let def_stmt = b.stmt(100, StmtKind::Function(def));
    let main_print = b.print(10, vec![]);
    let pcfg = build_program_cfg(&program(vec![
        b.line(10, vec![main_print]),
        b.line(100, vec![def_stmt]),
    ]))
    .unwrap();

    let area = pcfg.function("Area").expect("Area CFG missing");
    assert_eq!(area.params.len(), 2);
    assert_eq!(area.params[0].ty, ValueType::Int);
    assert_eq!(area.params[1].ty, ValueType::Float);
    assert_eq!(area.return_type, ValueType::Double);
    // RETURN inside a function wires to the function's own exit.
    assert!(area
        .edges
        .iter()
        .any(|e| e.kind == EdgeKind::Return && e.target == Some(area.exit)));
    // Main never references the definition's statements.
    let main_stmts: usize = pcfg.main.blocks.iter().map(|b| b.statements.len()).sum();
    assert_eq!(main_stmts, 1);
    assert_valid(area);
    assert_valid(&pcfg.main);
}

#[test]
fn sub_returns_void() {
    let mut b = AstBuilder::new();
    let def = FnDef {
        name: "Greet".to_string(),
        params: vec![],
        ret_suffix: TypeSuffix::None,
        body: vec![b.print(110, vec![])],
    };
    let def_stmt = b.stmt(100, StmtKind::Sub(def));
    let pcfg = build_program_cfg(&program(vec![b.line(100, vec![def_stmt])])).unwrap();
    assert_eq!(pcfg.function("Greet").unwrap().return_type, ValueType::Void);
}

#[test]
fn nested_definitions_are_rejected() {
    let mut b = AstBuilder::new();
    let inner = FnDef {
        name: "Inner".to_string(),
        params: vec![],
        ret_suffix: TypeSuffix::None,
        body: vec![],
    };
    let inner_stmt = b.stmt(110, StmtKind::Sub(inner));
    let outer = FnDef {
        name: "Outer".to_string(),
        params: vec![],
        ret_suffix: TypeSuffix::None,
        body: vec![inner_stmt],
    };
    let outer_stmt = b.stmt(100, StmtKind::Sub(outer));
    let err = build_program_cfg(&program(vec![b.line(100, vec![outer_stmt])])).unwrap_err();
    match err {
        CfgError::NestedDefinition { outer, inner } => {
            assert_eq!(outer, "Outer");
            assert_eq!(inner, "Inner");
        }
        other => panic!("expected NestedDefinition, got {:?}", other),
    }
}

#[test]
fn nesting_depth_limit_is_enforced() {
    fn nest(b: &mut AstBuilder, depth: usize) -> Stmt {
        let inner = if depth == 0 {
            b.let_stmt(1, "x", Expr::Int(1))
        } else {
            nest(b, depth - 1)
        };
        b.stmt(
            1,
            StmtKind::While {
                cond: cond(),
                body: vec![inner],
            },
        )
    }
    let mut b = AstBuilder::new();
    let deep = nest(&mut b, 12);
    let prog = program(vec![b.plain_line(vec![deep])]);
    let err = build_program_cfg_with(
        &prog,
        &BuilderConfig {
            max_nesting_depth: 8,
        },
    )
    .unwrap_err();
    assert!(matches!(err, CfgError::MaxDepthExceeded { max: 8, .. }));
    // The same program is fine under the default limit.
    assert!(build_program_cfg(&prog).is_ok());
}

#[test]
fn reverse_postorder_starts_at_entry_and_covers_all_blocks() {
    let mut b = AstBuilder::new();
    let body = vec![b.let_stmt(20, "x", Expr::Int(1))];
    let w = b.stmt(10, StmtKind::While { cond: cond(), body });
    let tail = b.end(30);
    let cfg = build_program_cfg(&program(vec![b.line(10, vec![w, tail])]))
        .unwrap()
        .main;

    let rpo = cfg.reverse_postorder();
    assert_eq!(rpo[0], cfg.entry);
    assert_eq!(rpo.len(), cfg.block_count());
    let unique: std::collections::HashSet<_> = rpo.iter().collect();
    assert_eq!(unique.len(), rpo.len());
}

#[test]
fn labels_resolve_like_line_numbers() {
    let mut b = AstBuilder::new();
    let stmt = b.stmt(
        10,
        StmtKind::Goto {
            target: JumpTarget::Label("done".to_string()),
        },
    );
    let skipped = b.print(20, vec![]);
    let target_print = b.print(30, vec![]);
    let cfg = build_program_cfg(&program(vec![
        b.line(10, vec![stmt]),
        b.line(20, vec![skipped]),
        b.labeled_line("done", vec![target_print]),
    ]))
    .unwrap()
    .main;

    let target = cfg.label_map["done"];
    assert!(has_edge(&cfg, cfg.entry, target, EdgeKind::Jump, "goto"));
    assert!(cfg.unresolved_jumps.is_empty());
    assert_valid(&cfg);
}
