use tally_ast::build::*;
use tally_ast::{BinaryOp, Expr, Program};
use tally_pipeline::{recognize_pipelines, split_read_write, PipelineError, PipelineSummary};
use tally_rdt::eval::{Evaluator, Value};
use tally_rdt::lower::lower_program;
use tally_rdt::pretty::{render, render_root};
use tally_rdt::{NodeId, NodeKind, Rdt};
use tally_resolve::resolve;
use tally_typeck::{resolve_types, TypeEnv, DEFAULT_MAX_PASSES};

// ── Helpers ──────────────────────────────────────────────────────────────

fn typed(program: Program) -> (Rdt, NodeId) {
    let lowered = lower_program(&program).expect("program should lower");
    let mut rdt = lowered.rdt;
    let res = resolve(&mut rdt, lowered.root).expect("program should resolve");
    let env = TypeEnv::new(&res.scopes, &res.scope_map);
    if let Err(err) = resolve_types(&mut rdt, res.root, &env, DEFAULT_MAX_PASSES) {
        panic!("expected program to type check, got: {:?}", err);
    }
    (rdt, res.root)
}

fn recognized(program: Program) -> (Rdt, NodeId, PipelineSummary) {
    let (mut rdt, root) = typed(program);
    match recognize_pipelines(&mut rdt, root) {
        Ok(summary) => (rdt, root, summary),
        Err(err) => panic!("expected pipelines to be recognized, got: {:?}", err),
    }
}

fn pipeline_err(program: Program) -> PipelineError {
    let (mut rdt, root) = typed(program);
    match recognize_pipelines(&mut rdt, root) {
        Ok(_) => panic!("expected a pipeline error, got:\n{}", render_root(&rdt, root)),
        Err(err) => err,
    }
}

fn property_node(rdt: &Rdt, root: NodeId, name: &str) -> NodeId {
    rdt.descendants(root)
        .into_iter()
        .find(|id| matches!(rdt.kind(*id), NodeKind::DerivedProperty { name: n, .. } if n == name))
        .unwrap_or_else(|| panic!("no derived property `{}`", name))
}

fn derivation(rdt: &Rdt, root: NodeId, name: &str) -> NodeId {
    match rdt.kind(property_node(rdt, root, name)) {
        NodeKind::DerivedProperty { derivation, .. } => *derivation,
        _ => unreachable!(),
    }
}

struct Reducer {
    initial: NodeId,
    forward: NodeId,
    inverse: NodeId,
    view: NodeId,
}

fn reducer(rdt: &Rdt, id: NodeId) -> Reducer {
    match rdt.kind(id) {
        NodeKind::Reduce {
            initial,
            forward,
            inverse,
            view,
            ..
        } => Reducer {
            initial: *initial,
            forward: *forward,
            inverse: *inverse,
            view: *view,
        },
        other => panic!("expected a reduce, got: {}", other.name()),
    }
}

fn apply(rdt: &Rdt, function: NodeId, args: Vec<Value>) -> Value {
    Evaluator::new(rdt)
        .call(function, args)
        .unwrap_or_else(|err| panic!("evaluation failed: {}", err))
}

fn transaction_table() -> tally_ast::Statement {
    definition(
        "Transaction",
        vec![
            property("accountId", "string"),
            property("amount", "number"),
            property("flagged", "boolean"),
        ],
    )
}

fn transaction(amount: f64, flagged: bool) -> Value {
    Value::object([
        ("accountId", Value::String("a".into())),
        ("amount", Value::Number(amount)),
        ("flagged", Value::Boolean(flagged)),
    ])
}

/// `Account` with one derived property and the `Transaction` table.
fn with_account(name: &str, expr: Expr) -> Program {
    program(vec![
        definition("Account", vec![property("id", "string"), derived(name, expr)]),
        transaction_table(),
    ])
}

fn reduce_call(source: Expr, acc_ty: &str, body: Expr, initial: Expr) -> Expr {
    call(
        member(source, "reduce"),
        vec![
            lambda(vec![param("acc", acc_ty), param("row", "Transaction")], body),
            initial,
        ],
    )
}

fn balance_expr() -> Expr {
    let owned = call(
        member(table("Transaction"), "filter"),
        vec![lambda(
            vec![untyped_param("t")],
            eq(member(ident("t"), "accountId"), member(row(), "id")),
        )],
    );
    reduce_call(
        owned,
        "number",
        add(ident("acc"), member(ident("row"), "amount")),
        num(0.0),
    )
}

// ── Recognition ──────────────────────────────────────────────────────────

#[test]
fn filter_then_reduce_becomes_a_reduce_over_a_pipeline() {
    let (rdt, root, summary) = recognized(with_account("balance", balance_expr()));
    assert_eq!(
        summary,
        PipelineSummary {
            datasets: 1,
            filters: 1,
            reduces: 1
        }
    );
    insta::assert_snapshot!(
        render(&rdt, derivation(&rdt, root, "balance")),
        @"reduce { source: $dataset(Transaction).filter((t) => t.accountId == $row.id), initial: 0, forward: forward(accCur: number, newRow: Transaction) => accCur + newRow.amount, inverse: inverse(accNext: number, oldRow: Transaction) => accNext - oldRow.amount, view: view(accCur: number) => accCur }"
    );
}

#[test]
fn filters_accumulate_in_source_order() {
    let expr = call(
        member(
            call(
                member(table("Transaction"), "filter"),
                vec![lambda(
                    vec![untyped_param("t")],
                    binary(BinaryOp::Gt, member(ident("t"), "amount"), num(100.0)),
                )],
            ),
            "filter",
        ),
        vec![lambda(vec![untyped_param("t")], member(ident("t"), "flagged"))],
    );
    let (rdt, root, summary) = recognized(with_account("large", expr));
    assert_eq!(summary.filters, 2);
    let pipeline = derivation(&rdt, root, "large");
    let NodeKind::Pipeline { stages, .. } = rdt.kind(pipeline) else {
        panic!("expected a pipeline, got: {}", rdt.kind(pipeline).name());
    };
    assert_eq!(stages.len(), 2);
    insta::assert_snapshot!(
        render(&rdt, pipeline),
        @"$dataset(Transaction).filter((t) => t.amount > 100).filter((t) => t.flagged)"
    );
    assert_eq!(
        rdt.ty(pipeline).map(ToString::to_string).as_deref(),
        Some("Transaction[]")
    );
}

#[test]
fn dataset_links_to_its_table() {
    let (rdt, root, _) = recognized(with_account("all", table("Transaction")));
    let dataset = derivation(&rdt, root, "all");
    let NodeKind::Dataset { name, definition } = rdt.kind(dataset) else {
        panic!("expected a dataset, got: {}", rdt.kind(dataset).name());
    };
    assert_eq!(name, "Transaction");
    assert!(matches!(rdt.kind(*definition), NodeKind::Definition { name, .. } if name == "Transaction"));
}

// ── Numeric reducers ─────────────────────────────────────────────────────

#[test]
fn sum_round_trips_through_inverse() {
    let (rdt, root, _) = recognized(with_account("balance", balance_expr()));
    let sum = reducer(&rdt, derivation(&rdt, root, "balance"));

    let mut acc = Evaluator::new(&rdt).eval(sum.initial).unwrap();
    for amount in [3.0, 4.0, 5.0] {
        acc = apply(&rdt, sum.forward, vec![acc, transaction(amount, false)]);
    }
    assert_eq!(acc, Value::Number(12.0));

    for start in [0.0, -7.5, 1e6] {
        let row = transaction(42.0, true);
        let next = apply(&rdt, sum.forward, vec![Value::Number(start), row.clone()]);
        assert_eq!(apply(&rdt, sum.inverse, vec![next, row]), Value::Number(start));
    }
    assert_eq!(apply(&rdt, sum.view, vec![Value::Number(9.0)]), Value::Number(9.0));
}

#[test]
fn accumulator_on_the_right_of_a_subtraction() {
    // (acc, row) => row.amount - acc
    let expr = reduce_call(
        table("Transaction"),
        "number",
        sub(member(ident("row"), "amount"), ident("acc")),
        num(0.0),
    );
    let (rdt, root, _) = recognized(with_account("alternating", expr));
    let fold = reducer(&rdt, derivation(&rdt, root, "alternating"));
    insta::assert_snapshot!(
        render(&rdt, fold.inverse),
        @"inverse(accNext: number, oldRow: Transaction) => oldRow.amount - accNext"
    );
    let row = transaction(10.0, false);
    let next = apply(&rdt, fold.forward, vec![Value::Number(3.0), row.clone()]);
    assert_eq!(next, Value::Number(7.0));
    assert_eq!(apply(&rdt, fold.inverse, vec![next, row]), Value::Number(3.0));
}

// ── Boolean reducers ─────────────────────────────────────────────────────

#[test]
fn disjunction_is_maintained_as_a_counter() {
    let expr = reduce_call(
        table("Transaction"),
        "boolean",
        or(ident("acc"), member(ident("row"), "flagged")),
        boolean(false),
    );
    let (rdt, root, _) = recognized(with_account("anyFlagged", expr));
    let any = derivation(&rdt, root, "anyFlagged");
    assert_eq!(rdt.ty(any).map(ToString::to_string).as_deref(), Some("boolean"));
    let any = reducer(&rdt, any);

    let rows = [
        transaction(1.0, false),
        transaction(2.0, true),
        transaction(3.0, false),
    ];
    let mut counter = Evaluator::new(&rdt).eval(any.initial).unwrap();
    for row in &rows {
        counter = apply(&rdt, any.forward, vec![counter, row.clone()]);
    }
    assert_eq!(apply(&rdt, any.view, vec![counter.clone()]), Value::Boolean(true));

    let counter = apply(&rdt, any.inverse, vec![counter, rows[1].clone()]);
    assert_eq!(apply(&rdt, any.view, vec![counter]), Value::Boolean(false));
}

#[test]
fn include_desugars_to_a_disjunction() {
    let expr = call(
        member(table("Transaction"), "include"),
        vec![lambda(vec![untyped_param("t")], member(ident("t"), "flagged"))],
    );
    let (rdt, root, summary) = recognized(with_account("hasFlagged", expr));
    assert_eq!(summary.reduces, 1);
    insta::assert_snapshot!(
        render(&rdt, derivation(&rdt, root, "hasFlagged")),
        @"reduce { source: $dataset(Transaction), initial: if false then 1 else 0, forward: forward(accCur: number, newRow: Transaction) => accCur + (if newRow.flagged then 1 else 0), inverse: inverse(accNext: number, oldRow: Transaction) => accNext - (if oldRow.flagged then 1 else 0), view: view(accCur: number) => accCur != 0 }"
    );
}

#[test]
fn initial_true_counts_for_a_disjunction() {
    let expr = reduce_call(
        table("Transaction"),
        "boolean",
        or(ident("acc"), member(ident("row"), "flagged")),
        boolean(true),
    );
    let (rdt, root, _) = recognized(with_account("always", expr));
    let fold = reducer(&rdt, derivation(&rdt, root, "always"));
    let counter = Evaluator::new(&rdt).eval(fold.initial).unwrap();
    assert_eq!(counter, Value::Number(1.0));
    assert_eq!(apply(&rdt, fold.view, vec![counter]), Value::Boolean(true));
}

// ── Errors ───────────────────────────────────────────────────────────────

fn reducer_err(acc_ty: &str, body: Expr, initial: Expr) -> PipelineError {
    pipeline_err(with_account(
        "total",
        reduce_call(table("Transaction"), acc_ty, body, initial),
    ))
}

#[test]
fn unused_accumulator_is_rejected() {
    let err = reducer_err("number", member(ident("row"), "amount"), num(0.0));
    assert!(
        matches!(err, PipelineError::AccumulatorUnused { .. }),
        "expected AccumulatorUnused, got: {:?}",
        err
    );
    assert!(err.to_string().contains("information reducing"));
}

#[test]
fn reused_accumulator_is_rejected() {
    let err = reducer_err(
        "number",
        add(add(ident("acc"), ident("acc")), member(ident("row"), "amount")),
        num(0.0),
    );
    assert_eq!(
        err.to_string(),
        "reducer uses its accumulator 2 times; it must be used exactly once"
    );
}

#[test]
fn conditional_around_accumulator_is_rejected() {
    let err = reducer_err(
        "number",
        if_else(member(ident("row"), "flagged"), ident("acc"), Some(num(0.0))),
        num(0.0),
    );
    assert!(
        matches!(&err, PipelineError::NonInvertibleOperator { found, .. } if found == "a conditional"),
        "expected NonInvertibleOperator, got: {:?}",
        err
    );
}

#[test]
fn mixed_boolean_chain_is_rejected() {
    let err = reducer_err(
        "boolean",
        or(
            and(ident("acc"), member(ident("row"), "flagged")),
            binary(BinaryOp::Gt, member(ident("row"), "amount"), num(0.0)),
        ),
        boolean(false),
    );
    assert!(
        matches!(err, PipelineError::MixedBooleanChain { .. }),
        "expected MixedBooleanChain, got: {:?}",
        err
    );
}

#[test]
fn boolean_reducer_needs_an_operator() {
    let err = reducer_err("boolean", ident("acc"), boolean(false));
    assert!(
        matches!(err, PipelineError::BooleanWithoutOperator { .. }),
        "expected BooleanWithoutOperator, got: {:?}",
        err
    );
}

#[test]
fn string_reducer_is_unsupported() {
    let err = reducer_err("string", ident("acc"), string(""));
    assert!(
        matches!(err, PipelineError::UnsupportedReturnType { .. }),
        "expected UnsupportedReturnType, got: {:?}",
        err
    );
}

#[test]
fn filter_needs_a_lambda() {
    let err = pipeline_err(program(vec![
        definition(
            "Account",
            vec![
                property("id", "string"),
                method(
                    "isLarge",
                    vec![param("t", "Transaction")],
                    binary(BinaryOp::Gt, member(ident("t"), "amount"), num(100.0)),
                ),
                derived(
                    "large",
                    call(member(table("Transaction"), "filter"), vec![ident("isLarge")]),
                ),
            ],
        ),
        transaction_table(),
    ]));
    assert!(
        matches!(err, PipelineError::ArgumentShape { position: 0, .. }),
        "expected ArgumentShape, got: {:?}",
        err
    );
}

#[test]
fn uncalled_pipeline_member_is_rejected() {
    let err = pipeline_err(with_account("pending", member(table("Transaction"), "filter")));
    assert!(
        matches!(err, PipelineError::DanglingIntent { .. }),
        "expected DanglingIntent, got: {:?}",
        err
    );
    assert_eq!(err.to_string(), "`filter` must be called");
}

// ── Read/write split ─────────────────────────────────────────────────────

fn double_amount() -> Program {
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

#[test]
fn runtime_arguments_stay_on_the_read_side() {
    let (mut rdt, root) = typed(double_amount());
    recognize_pipelines(&mut rdt, root).unwrap();
    let summary = split_read_write(&mut rdt, root).unwrap();
    assert_eq!(summary.writes, 1);
    insta::assert_snapshot!(
        render_root(&rdt, root),
        @"Transaction { amount: number, doubleAmount = { write doubleAmount_int_0 = $row.amount * 2; read (rand: number) => doubleAmount_int_0 + rand } }"
    );

    let property = property_node(&rdt, root, "doubleAmount");
    let result = Evaluator::new(&rdt)
        .with_context("row", Value::object([("amount", Value::Number(5.0))]))
        .call(property, vec![Value::Number(1.0)])
        .unwrap();
    assert_eq!(result, Value::Number(11.0));
}

#[test]
fn aggregates_are_stored_at_write_time() {
    let (mut rdt, root) = typed(with_account("balance", balance_expr()));
    recognize_pipelines(&mut rdt, root).unwrap();
    split_read_write(&mut rdt, root).unwrap();

    let NodeKind::ReadWrite { read, writes } = rdt.kind(derivation(&rdt, root, "balance")) else {
        panic!("expected a read/write split");
    };
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "balance_int_0");
    assert!(matches!(rdt.kind(writes[0].1), NodeKind::Reduce { .. }));
    assert!(
        matches!(rdt.kind(*read), NodeKind::Reference { target, .. } if *target == writes[0].1)
    );
}

#[test]
fn named_functions_split_like_lambdas() {
    let (mut rdt, root) = typed(program(vec![definition(
        "Transaction",
        vec![
            property("amount", "number"),
            method(
                "scaled",
                vec![param("factor", "number")],
                mul(member(row(), "amount"), ident("factor")),
            ),
        ],
    )]));
    let summary = split_read_write(&mut rdt, root).unwrap();
    assert_eq!(summary.writes, 1);
    insta::assert_snapshot!(
        render(&rdt, property_node(&rdt, root, "scaled")),
        @"scaled = { write scaled_int_0 = $row.amount; read scaled(factor: number) => scaled_int_0 * factor }"
    );
}

/// Every write, checked for references to `let` bindings that live on the
/// read side.
fn writes_naming_a_let(rdt: &Rdt, property: NodeId) -> Vec<String> {
    let NodeKind::DerivedProperty { derivation, .. } = rdt.kind(property) else {
        panic!("expected a derived property");
    };
    let NodeKind::ReadWrite { writes, .. } = rdt.kind(*derivation) else {
        panic!("expected a read/write split");
    };
    writes
        .iter()
        .filter(|(_, value)| {
            rdt.descendants(*value).into_iter().any(|id| {
                matches!(rdt.kind(id), NodeKind::Reference { target, .. }
                    if matches!(rdt.kind(*target), NodeKind::Let { .. }))
            })
        })
        .map(|(name, _)| name.clone())
        .collect()
}

#[test]
fn let_bound_to_an_argument_stays_on_the_read_side() {
    let (mut rdt, root) = typed(program(vec![definition(
        "Transaction",
        vec![
            property("amount", "number"),
            derived(
                "f",
                lambda(
                    vec![param("rand", "number")],
                    block(vec![
                        let_("x", mul(ident("rand"), num(2.0))),
                        ret(add(ident("x"), ident("amount"))),
                    ]),
                ),
            ),
        ],
    )]));
    split_read_write(&mut rdt, root).unwrap();

    let property = property_node(&rdt, root, "f");
    let leaked = writes_naming_a_let(&rdt, property);
    assert!(leaked.is_empty(), "expected no write to name `x`, got: {:?}", leaked);
    let result = Evaluator::new(&rdt)
        .with_context("row", Value::object([("amount", Value::Number(4.0))]))
        .call(property, vec![Value::Number(3.0)])
        .unwrap();
    assert_eq!(result, Value::Number(10.0));
}

#[test]
fn let_bound_at_write_time_keeps_its_name_on_the_read_side() {
    let (mut rdt, root) = typed(program(vec![definition(
        "Transaction",
        vec![
            property("amount", "number"),
            derived(
                "f",
                lambda(
                    vec![param("rand", "number")],
                    block(vec![
                        let_("x", mul(member(row(), "amount"), num(2.0))),
                        ret(add(add(ident("x"), member(row(), "amount")), ident("rand"))),
                    ]),
                ),
            ),
        ],
    )]));
    let summary = split_read_write(&mut rdt, root).unwrap();
    assert_eq!(summary.writes, 2);

    let property = property_node(&rdt, root, "f");
    let leaked = writes_naming_a_let(&rdt, property);
    assert!(leaked.is_empty(), "expected no write to name `x`, got: {:?}", leaked);
    let result = Evaluator::new(&rdt)
        .with_context("row", Value::object([("amount", Value::Number(4.0))]))
        .call(property, vec![Value::Number(3.0)])
        .unwrap();
    assert_eq!(result, Value::Number(15.0));
}
