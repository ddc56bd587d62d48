use tally_ast::build::*;
use tally_ast::{BinaryOp, Expr, ExprKind, Program};
use tally_rdt::lower::lower_program;
use tally_rdt::pretty::render_root;
use tally_rdt::{NodeId, NodeKind, Rdt};
use tally_resolve::resolve;
use tally_typeck::{resolve_types, TypeEnv, TypeError, TypeSummary, DEFAULT_MAX_PASSES};

// ── Helpers ──────────────────────────────────────────────────────────────

fn check(program: Program, max_passes: usize) -> (Rdt, NodeId, Result<TypeSummary, TypeError>) {
    let lowered = lower_program(&program).expect("program should lower");
    let mut rdt = lowered.rdt;
    let res = resolve(&mut rdt, lowered.root).expect("program should resolve");
    let env = TypeEnv::new(&res.scopes, &res.scope_map);
    let result = resolve_types(&mut rdt, res.root, &env, max_passes);
    (rdt, res.root, result)
}

fn typed(program: Program) -> (Rdt, NodeId) {
    let (rdt, root, result) = check(program, DEFAULT_MAX_PASSES);
    if let Err(err) = result {
        panic!("expected program to type check, got: {:?}\n{}", err, render_root(&rdt, root));
    }
    (rdt, root)
}

fn type_err(program: Program) -> TypeError {
    let (rdt, root, result) = check(program, DEFAULT_MAX_PASSES);
    match result {
        Ok(_) => panic!("expected a type error, got success:\n{}", render_root(&rdt, root)),
        Err(err) => err,
    }
}

/// Display of the type on the first node under `root` matching `pred`.
fn ty_of(rdt: &Rdt, root: NodeId, pred: impl Fn(&NodeKind) -> bool) -> String {
    let id = rdt
        .descendants(root)
        .into_iter()
        .find(|id| pred(rdt.kind(*id)))
        .expect("no matching node");
    match rdt.ty(id) {
        Some(ty) => ty.to_string(),
        None => "<untyped>".to_string(),
    }
}

fn property_ty(rdt: &Rdt, root: NodeId, property: &str) -> String {
    ty_of(rdt, root, |k| {
        matches!(k, NodeKind::DerivedProperty { name, .. } | NodeKind::SimpleProperty { name, .. } if name == property)
    })
}

fn assignment_ty(rdt: &Rdt, root: NodeId, assignment: &str) -> String {
    ty_of(rdt, root, |k| matches!(k, NodeKind::Assignment { name, .. } if name == assignment))
}

fn doubled_program() -> Program {
    program(vec![definition(
        "Transaction",
        vec![
            property("amount", "number"),
            derived(
                "doubleAmount",
                lambda(
                    vec![param("rand", "number")],
                    add(mul(member(row(), "amount"), num(2.0)), ident("rand")),
                ),
            ),
        ],
    )])
}

fn ledger_program() -> Program {
    program(vec![
        definition(
            "Account",
            vec![
                property("id", "string"),
                derived(
                    "balance",
                    call(
                        member(
                            call(
                                member(table("Transaction"), "filter"),
                                vec![lambda(
                                    vec![untyped_param("t")],
                                    eq(member(ident("t"), "accountId"), member(row(), "id")),
                                )],
                            ),
                            "reduce",
                        ),
                        vec![
                            lambda(
                                vec![param("acc", "number"), param("row", "Transaction")],
                                add(ident("acc"), member(ident("row"), "amount")),
                            ),
                            num(0.0),
                        ],
                    ),
                ),
                derived(
                    "flagged",
                    call(
                        member(table("Transaction"), "include"),
                        vec![lambda(vec![untyped_param("t")], member(ident("t"), "flagged"))],
                    ),
                ),
            ],
        ),
        definition(
            "Transaction",
            vec![
                property("accountId", "string"),
                property("amount", "number"),
                property("flagged", "boolean"),
            ],
        ),
    ])
}

// ── Inference ────────────────────────────────────────────────────────────

#[test]
fn derived_function_property_is_typed() {
    let (rdt, root) = typed(doubled_program());
    insta::assert_snapshot!(property_ty(&rdt, root, "doubleAmount"), @"(rand: number) -> number");
    insta::assert_snapshot!(
        ty_of(&rdt, root, |k| matches!(k, NodeKind::Context { .. })),
        @"{ amount: number, doubleAmount: (rand: number) -> number }"
    );
    insta::assert_snapshot!(
        ty_of(&rdt, root, |k| matches!(k, NodeKind::Definition { .. })),
        @"{ amount: number, doubleAmount: (rand: number) -> number }"
    );
}

#[test]
fn every_node_is_typed_after_resolution() {
    let (rdt, root) = typed(doubled_program());
    for id in rdt.descendants(root) {
        let ty = rdt.ty(id);
        assert!(
            ty.is_some_and(|t| t.is_complete()),
            "expected a complete type on {} ({}), got: {:?}",
            id,
            rdt.kind(id).name(),
            ty
        );
    }
}

#[test]
fn second_run_settles_in_one_pass() {
    let lowered = lower_program(&ledger_program()).unwrap();
    let mut rdt = lowered.rdt;
    let res = resolve(&mut rdt, lowered.root).unwrap();
    let env = TypeEnv::new(&res.scopes, &res.scope_map);

    let first = resolve_types(&mut rdt, res.root, &env, DEFAULT_MAX_PASSES).unwrap();
    assert!(first.passes > 1, "expected several passes, got: {:?}", first);
    let snapshot = rdt.clone();

    let second = resolve_types(&mut rdt, res.root, &env, DEFAULT_MAX_PASSES).unwrap();
    assert_eq!(second.passes, 1);
    for id in rdt.descendants(res.root) {
        assert_eq!(rdt.ty(id), snapshot.ty(id), "type of {} changed", id);
    }
}

#[test]
fn aggregates_over_other_tables() {
    let (rdt, root) = typed(ledger_program());
    insta::assert_snapshot!(property_ty(&rdt, root, "balance"), @"number");
    insta::assert_snapshot!(property_ty(&rdt, root, "flagged"), @"boolean");
    insta::assert_snapshot!(
        ty_of(&rdt, root, |k| matches!(k, NodeKind::ArrayMarker { .. })),
        @"Transaction[]"
    );
}

#[test]
fn lambda_params_take_their_type_from_the_call() {
    let (rdt, root) = typed(ledger_program());
    let params: Vec<String> = rdt
        .descendants(root)
        .into_iter()
        .filter(|id| matches!(rdt.kind(*id), NodeKind::Param { name, annotation: None } if name == "t"))
        .map(|id| rdt.ty(id).map(ToString::to_string).unwrap_or_default())
        .collect();
    assert_eq!(params, vec!["Transaction", "Transaction"]);
}

#[test]
fn let_bindings_carry_value_and_body_types() {
    let (rdt, root) = typed(program(vec![assign(
        "f",
        lambda(
            vec![param("x", "number")],
            block(vec![
                let_("y", mul(ident("x"), num(2.0))),
                ret(binary(BinaryOp::Gt, ident("y"), num(3.0))),
            ]),
        ),
    )]));
    insta::assert_snapshot!(assignment_ty(&rdt, root, "f"), @"(x: number) -> boolean");
    insta::assert_snapshot!(
        ty_of(&rdt, root, |k| matches!(k, NodeKind::Let { .. })),
        @"let number in boolean"
    );
}

#[test]
fn calls_take_the_callee_return_type() {
    let (rdt, root) = typed(program(vec![
        assign("double", lambda(vec![param("x", "number")], mul(ident("x"), num(2.0)))),
        assign("four", call(ident("double"), vec![num(2.0)])),
    ]));
    insta::assert_snapshot!(assignment_ty(&rdt, root, "four"), @"number");
}

#[test]
fn rows_of_the_same_table_compare_equal() {
    let (rdt, root) = typed(program(vec![
        definition("Account", vec![property("id", "string")]),
        assign(
            "same",
            lambda(
                vec![param("a", "Account"), param("b", "Account")],
                eq(ident("a"), ident("b")),
            ),
        ),
    ]));
    insta::assert_snapshot!(assignment_ty(&rdt, root, "same"), @"(a: Account, b: Account) -> boolean");
}

// ── Errors ───────────────────────────────────────────────────────────────

#[test]
fn condition_must_be_boolean() {
    let err = type_err(program(vec![assign(
        "f",
        lambda(
            vec![param("x", "number")],
            if_else(ident("x"), num(1.0), Some(num(2.0))),
        ),
    )]));
    assert!(
        matches!(err, TypeError::ConditionNotBoolean { .. }),
        "expected ConditionNotBoolean, got: {:?}",
        err
    );
    assert_eq!(err.to_string(), "condition must be boolean, found number");
}

#[test]
fn branches_must_agree() {
    let err = type_err(program(vec![assign(
        "a",
        if_else(boolean(true), num(1.0), Some(string("no"))),
    )]));
    assert!(
        matches!(err, TypeError::BranchMismatch { .. }),
        "expected BranchMismatch, got: {:?}",
        err
    );
}

#[test]
fn arithmetic_needs_numbers() {
    let err = type_err(program(vec![assign("a", add(boolean(true), num(1.0)))]));
    assert!(
        matches!(&err, TypeError::InvalidOperand { expected: "number", .. }),
        "expected InvalidOperand, got: {:?}",
        err
    );
}

#[test]
fn equality_needs_matching_operands() {
    let err = type_err(program(vec![assign("a", eq(num(1.0), string("x")))]));
    assert!(
        matches!(err, TypeError::OperandMismatch { .. }),
        "expected OperandMismatch, got: {:?}",
        err
    );
}

#[test]
fn unknown_field_on_row() {
    let err = type_err(program(vec![definition(
        "Transaction",
        vec![
            property("amount", "number"),
            derived("bad", member(row(), "missing")),
        ],
    )]));
    assert!(
        matches!(&err, TypeError::UnknownField { field, .. } if field == "missing"),
        "expected UnknownField, got: {:?}",
        err
    );
}

#[test]
fn call_arity_is_checked() {
    let err = type_err(program(vec![
        assign("f", lambda(vec![param("x", "number")], ident("x"))),
        assign("g", call(ident("f"), vec![num(1.0), num(2.0)])),
    ]));
    assert!(
        matches!(err, TypeError::ArityMismatch { expected: 1, found: 2, .. }),
        "expected ArityMismatch, got: {:?}",
        err
    );
}

#[test]
fn call_arguments_are_checked() {
    let err = type_err(program(vec![
        assign("f", lambda(vec![param("x", "number")], ident("x"))),
        assign("g", call(ident("f"), vec![string("a")])),
    ]));
    assert!(
        matches!(err, TypeError::ArgumentMismatch { index: 0, .. }),
        "expected ArgumentMismatch, got: {:?}",
        err
    );
}

#[test]
fn only_functions_can_be_called() {
    let err = type_err(program(vec![
        assign("a", num(1.0)),
        assign("b", call(ident("a"), vec![num(2.0)])),
    ]));
    assert!(
        matches!(err, TypeError::NotAFunction { .. }),
        "expected NotAFunction, got: {:?}",
        err
    );
}

#[test]
fn row_context_outside_a_table() {
    let err = type_err(program(vec![assign("a", member(row(), "amount"))]));
    assert!(
        matches!(err, TypeError::ContextOutsideDefinition { .. }),
        "expected ContextOutsideDefinition, got: {:?}",
        err
    );
}

#[test]
fn column_annotation_must_name_a_table() {
    let err = type_err(program(vec![definition(
        "Account",
        vec![property("owner", "Person")],
    )]));
    assert!(
        matches!(&err, TypeError::UnknownType { name, .. } if name == "Person"),
        "expected UnknownType, got: {:?}",
        err
    );
}

#[test]
fn array_marker_needs_a_table() {
    let err = type_err(program(vec![assign(
        "a",
        Expr::new(ExprKind::Postfix {
            operand: Box::new(num(5.0)),
        }),
    )]));
    assert!(
        matches!(err, TypeError::NotATable { .. }),
        "expected NotATable, got: {:?}",
        err
    );
}

#[test]
fn unconstrained_param_is_unresolved() {
    let (rdt, _, result) = check(
        program(vec![assign("f", lambda(vec![untyped_param("x")], num(1.0)))]),
        DEFAULT_MAX_PASSES,
    );
    let err = result.expect_err("an untyped, unused lambda cannot be typed");
    let TypeError::Unresolved { node, kind, .. } = err else {
        panic!("expected Unresolved, got: {:?}", err);
    };
    assert_eq!(kind, "parameter");
    assert!(matches!(rdt.kind(node), NodeKind::Param { name, .. } if name == "x"));
}

#[test]
fn pass_limit_is_enforced() {
    let (_, _, result) = check(doubled_program(), 1);
    assert_eq!(result, Err(TypeError::NoFixedPoint { passes: 1 }));
}
