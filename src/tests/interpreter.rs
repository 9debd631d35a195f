use std::rc::Rc;

use pretty_assertions::assert_eq;

use super::{eval_test, eval_test_err, run_program};
use crate::ast::{AssignTarget, BinaryOp, CmdFull, Expression, FuncDecl, SimpleCmd, Statement};
use crate::errors::RuntimeErrorKind;
use crate::runtime::{self, RuntimeSettings};
use crate::{Executor, Object};

fn ident(name: &str) -> Expression {
    Expression::ident(name)
}

fn int(i: i64) -> Expression {
    Expression::int(i)
}

fn bin(op: BinaryOp, l: Expression, r: Expression) -> Expression {
    Expression::binary(op, l, r)
}

fn call(name: &str, args: Vec<Expression>) -> Expression {
    Expression::call(ident(name), args)
}

fn set_attr(target: &str, name: &str, value: Expression) -> Statement {
    Statement::Assign {
        target: AssignTarget::Attribute(ident(target), name.to_string()),
        value,
        global: false,
        constant: false,
    }
}

fn ret(expr: Expression) -> Statement {
    Statement::Return(Some(expr))
}

/// fact(n) = n <= 1 ? 1 : n * fact(n - 1)
fn factorial_decl() -> Statement {
    Statement::func(FuncDecl::new(
        "fact",
        &["n"],
        vec![
            Statement::If {
                cond: bin(BinaryOp::Le, ident("n"), int(1)),
                then: vec![ret(int(1))],
                otherwise: vec![],
            },
            ret(bin(
                BinaryOp::Mul,
                ident("n"),
                call("fact", vec![bin(BinaryOp::Sub, ident("n"), int(1))]),
            )),
        ],
    ))
}

/// class Point: x/y fields, `__add__`, `__eq__`, `__str__` and `sum()`.
fn point_class() -> Statement {
    let field = |obj: &str, name: &str| Expression::attr(ident(obj), name);
    Statement::class(
        "Point",
        vec![
            Statement::assign("dims", int(2)),
            Statement::func(FuncDecl::new(
                "__init__",
                &["self", "x", "y"],
                vec![set_attr("self", "x", ident("x")), set_attr("self", "y", ident("y"))],
            )),
            Statement::func(FuncDecl::new(
                "sum",
                &["self"],
                vec![ret(bin(BinaryOp::Add, field("self", "x"), field("self", "y")))],
            )),
            Statement::func(FuncDecl::new(
                "__add__",
                &["self", "other"],
                vec![ret(call(
                    "Point",
                    vec![
                        bin(BinaryOp::Add, field("self", "x"), field("other", "x")),
                        bin(BinaryOp::Add, field("self", "y"), field("other", "y")),
                    ],
                ))],
            )),
            Statement::func(FuncDecl::new(
                "__eq__",
                &["self", "other"],
                vec![ret(bin(
                    BinaryOp::And,
                    bin(BinaryOp::Eq, field("self", "x"), field("other", "x")),
                    bin(BinaryOp::Eq, field("self", "y"), field("other", "y")),
                ))],
            )),
            Statement::func(FuncDecl::new(
                "__str__",
                &["self"],
                vec![ret(bin(
                    BinaryOp::Add,
                    Expression::string("Point"),
                    call("str", vec![Expression::Tuple(vec![field("self", "x"), field("self", "y")])]),
                ))],
            )),
        ],
    )
}

// ============================================================================
// expressions
// ============================================================================

#[test]
fn test_and_short_circuits() {
    let risky = call("hash", vec![Expression::null()]);
    let result = eval_test(bin(BinaryOp::And, Expression::bool(false), risky.clone()));
    assert!(matches!(result.as_ref(), Object::Bool(false)));
    let result = eval_test(bin(BinaryOp::Or, Expression::bool(true), risky.clone()));
    assert!(matches!(result.as_ref(), Object::Bool(true)));

    let err = eval_test_err(bin(BinaryOp::And, Expression::bool(true), risky));
    assert!(matches!(err.kind, RuntimeErrorKind::NullAccess(_)));
}

#[test]
fn test_binary_errors_carry_context() {
    let err = eval_test_err(bin(BinaryOp::Div, int(4), int(0)));
    assert!(matches!(err.kind, RuntimeErrorKind::ZeroDivision));
    assert_eq!(err.context.as_deref(), Some("4 / 0"));
    assert_eq!(err.code(), crate::RuntimeError::ERROR_CODE_ZERO_DIVISION);
}

#[test]
fn test_undefined_identifier() {
    let err = eval_test_err(ident("missing"));
    assert!(matches!(err.kind, RuntimeErrorKind::SymbolNotFound(ref n) if n == "missing"));
}

#[test]
fn test_containers_and_indexing() {
    let result = run_program(vec![
        Statement::assign(
            "m",
            Expression::Map(vec![(Expression::string("a"), int(1)), (int(2), Expression::string("two"))]),
        ),
        Statement::Assign {
            target: AssignTarget::Index(ident("m"), Expression::string("b")),
            value: int(3),
            global: false,
            constant: false,
        },
        Statement::Del(ident("m"), Expression::string("a")),
        Statement::Expr(Expression::Tuple(vec![
            call("len", vec![ident("m")]),
            Expression::index(ident("m"), Expression::real(2.0)),
            Expression::index(ident("m"), Expression::string("b")),
        ])),
    ])
    .unwrap();
    assert_eq!(result.print(), r#"(2, "two", 3)"#);

    let err = run_program(vec![
        Statement::assign("m", Expression::Map(vec![])),
        Statement::Expr(Expression::index(ident("m"), Expression::string("nope"))),
    ])
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::KeyNotFound(_)));
}

#[test]
fn test_builtin_functions() {
    assert_eq!(eval_test(call("len", vec![Expression::string("four")])).as_int(), Some(4));
    assert_eq!(eval_test(call("str", vec![Expression::real(1.5)])).as_str(), Some("1.5"));
    assert_eq!(
        eval_test(call("hash", vec![int(1)])).as_int(),
        eval_test(call("hash", vec![Expression::real(1.0)])).as_int()
    );
    let same_type = eval_test(bin(BinaryOp::Eq, call("type", vec![int(1)]), ident("int")));
    assert!(matches!(same_type.as_ref(), Object::Bool(true)));
    let other_type = eval_test(bin(BinaryOp::Eq, call("type", vec![int(1)]), ident("real")));
    assert!(matches!(other_type.as_ref(), Object::Bool(false)));
    assert_eq!(eval_test(call("int", vec![Expression::string("42")])).as_int(), Some(42));
    assert!(eval_test(call("print", vec![Expression::string("from test")])).is_null());

    let err = eval_test_err(call("len", vec![]));
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::ArgumentMismatch { expected: 1, received: 0, .. }
    ));
    let err = eval_test_err(call("len", vec![int(3)]));
    assert!(matches!(err.kind, RuntimeErrorKind::IncompatibleType(_)));
}

#[test]
fn test_command_substitution_trims_newlines() {
    let cmd = CmdFull::new(SimpleCmd::from_words(&["printf", "hi\n\n"]).into());
    let result = eval_test(Expression::cmd_subst(cmd));
    assert_eq!(result.as_str(), Some("hi"));
}

// ============================================================================
// statements
// ============================================================================

#[test]
fn test_recursive_function() {
    let result = run_program(vec![factorial_decl(), Statement::Expr(call("fact", vec![int(10)]))]).unwrap();
    assert_eq!(result.as_int(), Some(3_628_800));
}

#[test]
fn test_recursion_limit() {
    runtime::install(RuntimeSettings {
        max_recursion: 40,
        ..RuntimeSettings::default()
    });
    let forever = Statement::func(FuncDecl::new(
        "down",
        &["n"],
        vec![ret(call("down", vec![bin(BinaryOp::Add, ident("n"), int(1))]))],
    ));
    let err = run_program(vec![forever, Statement::Expr(call("down", vec![int(0)]))]).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::RecursionDepth(40)));
    assert_eq!(runtime::call_depth(), 0);

    // the counter unwound, so calls work again
    let result = run_program(vec![factorial_decl(), Statement::Expr(call("fact", vec![int(5)]))]).unwrap();
    assert_eq!(result.as_int(), Some(120));
    runtime::install(RuntimeSettings::default());
}

#[test]
fn test_default_recursion_limit_fits_the_stack() {
    // a small thread stack, with the settings every new thread starts from
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let forever = Statement::func(FuncDecl::new(
                "down",
                &["n"],
                vec![ret(call("down", vec![bin(BinaryOp::Add, ident("n"), int(1))]))],
            ));
            let err = run_program(vec![forever, Statement::Expr(call("down", vec![int(0)]))]).unwrap_err();
            (matches!(err.kind, RuntimeErrorKind::RecursionDepth(runtime::DEFAULT_MAX_RECURSION)), runtime::call_depth())
        })
        .unwrap();
    let (hit_limit, depth_after) = handle.join().unwrap();
    assert!(hit_limit);
    assert_eq!(depth_after, 0);
}

#[test]
fn test_argument_count_is_checked() {
    let err = run_program(vec![factorial_decl(), Statement::Expr(call("fact", vec![int(1), int(2)]))])
        .unwrap_err();
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::ArgumentMismatch { ref name, expected: 1, received: 2 } if name == "fact"
    ));
}

#[test]
fn test_loops() {
    // total = 0; for i in [1, 2, 3, 4, 5, 6] { if i == 5 { break }; if i % 2 == 0 { continue }; total = total + i }
    let result = run_program(vec![
        Statement::assign("total", int(0)),
        Statement::For {
            var: "i".into(),
            iterable: Expression::Array((1..=6).map(int).collect()),
            body: vec![
                Statement::If {
                    cond: bin(BinaryOp::Eq, ident("i"), int(5)),
                    then: vec![Statement::Break],
                    otherwise: vec![],
                },
                Statement::If {
                    cond: bin(BinaryOp::Eq, bin(BinaryOp::Mod, ident("i"), int(2)), int(0)),
                    then: vec![Statement::Continue],
                    otherwise: vec![],
                },
                Statement::assign("total", bin(BinaryOp::Add, ident("total"), ident("i"))),
            ],
        },
        Statement::assign("n", int(0)),
        Statement::While {
            cond: bin(BinaryOp::Lt, ident("n"), int(10)),
            body: vec![Statement::assign("n", bin(BinaryOp::Add, ident("n"), int(3)))],
        },
        Statement::Expr(Expression::Tuple(vec![ident("total"), ident("n")])),
    ])
    .unwrap();
    assert_eq!(result.print(), "(4, 12)");
}

#[test]
fn test_loop_variable_is_scoped_to_the_body() {
    let err = run_program(vec![
        Statement::For {
            var: "item".into(),
            iterable: Expression::string("ab"),
            body: vec![],
        },
        Statement::Expr(ident("item")),
    ])
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::SymbolNotFound(_)));
}

#[test]
fn test_return_and_break_outside_their_context() {
    let err = run_program(vec![ret(int(1))]).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::EarlyReturn));
    let err = run_program(vec![Statement::Break]).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::EarlyBreak("break")));
    let body_break = Statement::func(FuncDecl::new("f", &[], vec![Statement::Continue]));
    let err = run_program(vec![body_break, Statement::Expr(call("f", vec![]))]).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::EarlyBreak("continue")));
}

#[test]
fn test_function_scopes() {
    let program = vec![
        Statement::func(FuncDecl::new(
            "setup",
            &[],
            vec![
                Statement::assign("local_only", int(1)),
                Statement::global("shared", int(2)),
            ],
        )),
        Statement::Expr(call("setup", vec![])),
        Statement::Expr(ident("shared")),
    ];
    assert_eq!(run_program(program).unwrap().as_int(), Some(2));

    let program = vec![
        Statement::func(FuncDecl::new("setup", &[], vec![Statement::assign("local_only", int(1))])),
        Statement::Expr(call("setup", vec![])),
        Statement::Expr(ident("local_only")),
    ];
    let err = run_program(program).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::SymbolNotFound(_)));

    // assignment inside a function updates the enclosing binding
    let program = vec![
        Statement::assign("counter", int(0)),
        Statement::func(FuncDecl::new(
            "bump",
            &[],
            vec![Statement::assign("counter", bin(BinaryOp::Add, ident("counter"), int(1)))],
        )),
        Statement::Expr(call("bump", vec![])),
        Statement::Expr(call("bump", vec![])),
        Statement::Expr(ident("counter")),
    ];
    assert_eq!(run_program(program).unwrap().as_int(), Some(2));
}

#[test]
fn test_constants() {
    let err = run_program(vec![
        Statement::constant("LIMIT", int(3)),
        Statement::assign("LIMIT", int(4)),
    ])
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ConstReassign(ref n) if n == "LIMIT"));

    let err = run_program(vec![
        Statement::constant("LIMIT", int(3)),
        Statement::constant("LIMIT", int(4)),
    ])
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ConstReassign(_)));

    let err = run_program(vec![
        Statement::Assign {
            target: AssignTarget::Name("G".into()),
            value: int(1),
            global: true,
            constant: true,
        },
        Statement::global("G", int(2)),
    ])
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ConstReassign(_)));
}

// ============================================================================
// classes
// ============================================================================

#[test]
fn test_class_construction_and_methods() {
    let result = run_program(vec![
        point_class(),
        Statement::assign("p", call("Point", vec![int(1), int(2)])),
        Statement::Expr(Expression::Tuple(vec![
            Expression::attr(ident("p"), "x"),
            Expression::call(Expression::attr(ident("p"), "sum"), vec![]),
            Expression::attr(ident("p"), "dims"),
            Expression::attr(ident("Point"), "dims"),
        ])),
    ])
    .unwrap();
    assert_eq!(result.print(), "(1, 3, 2, 2)");
}

#[test]
fn test_class_operator_dispatch() {
    let result = run_program(vec![
        point_class(),
        Statement::assign(
            "p",
            bin(
                BinaryOp::Add,
                call("Point", vec![int(1), int(2)]),
                call("Point", vec![int(10), int(20)]),
            ),
        ),
        Statement::Expr(Expression::Tuple(vec![
            call("str", vec![ident("p")]),
            bin(BinaryOp::Eq, ident("p"), call("Point", vec![int(11), int(22)])),
            bin(BinaryOp::Ne, ident("p"), call("Point", vec![int(11), int(22)])),
            bin(BinaryOp::Eq, call("type", vec![ident("p")]), ident("Point")),
        ])),
    ])
    .unwrap();
    assert_eq!(result.print(), r#"("Point(11, 22)", true, false, true)"#);
}

/// class Range: steps `cur` up to `stop` through `__has_next__`/`__next__`.
fn range_class() -> Statement {
    let field = |name: &str| Expression::attr(ident("self"), name);
    Statement::class(
        "Range",
        vec![
            Statement::func(FuncDecl::new(
                "__init__",
                &["self", "start", "stop"],
                vec![set_attr("self", "cur", ident("start")), set_attr("self", "stop", ident("stop"))],
            )),
            Statement::func(FuncDecl::new(
                "__has_next__",
                &["self"],
                vec![ret(bin(BinaryOp::Lt, field("cur"), field("stop")))],
            )),
            Statement::func(FuncDecl::new(
                "__next__",
                &["self"],
                vec![
                    Statement::assign("v", field("cur")),
                    set_attr("self", "cur", bin(BinaryOp::Add, field("cur"), int(1))),
                    ret(ident("v")),
                ],
            )),
        ],
    )
}

#[test]
fn test_user_iterator_protocol() {
    let bag = Statement::class(
        "Bag",
        vec![
            Statement::func(FuncDecl::new("__init__", &["self", "n"], vec![set_attr("self", "n", ident("n"))])),
            Statement::func(FuncDecl::new(
                "__iter__",
                &["self"],
                vec![ret(call("Range", vec![int(0), Expression::attr(ident("self"), "n")]))],
            )),
        ],
    );
    let result = run_program(vec![
        range_class(),
        bag,
        Statement::assign("total", int(0)),
        Statement::For {
            var: "i".into(),
            iterable: call("Range", vec![int(2), int(5)]),
            body: vec![Statement::assign("total", bin(BinaryOp::Add, ident("total"), ident("i")))],
        },
        // stepped lazily, so an effectively endless range can be left early
        Statement::assign("seen", int(0)),
        Statement::For {
            var: "i".into(),
            iterable: call("Range", vec![int(0), int(1_000_000_000_000)]),
            body: vec![
                Statement::If {
                    cond: bin(BinaryOp::Eq, ident("i"), int(3)),
                    then: vec![Statement::Break],
                    otherwise: vec![],
                },
                Statement::assign("seen", bin(BinaryOp::Add, ident("seen"), int(1))),
            ],
        },
        Statement::Expr(Expression::Tuple(vec![
            ident("total"),
            ident("seen"),
            call("array", vec![call("Bag", vec![int(3)])]),
            call("array", vec![call("Range", vec![int(5), int(5)])]),
        ])),
    ])
    .unwrap();
    assert_eq!(result.print(), "(9, 3, [0, 1, 2], [])");
}

#[test]
fn test_iter_must_yield_an_iterable() {
    let odd = Statement::class(
        "Odd",
        vec![Statement::func(FuncDecl::new("__iter__", &["self"], vec![ret(ident("self"))]))],
    );
    let err = run_program(vec![
        odd,
        Statement::For {
            var: "i".into(),
            iterable: call("Odd", vec![]),
            body: vec![],
        },
    ])
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::IncompatibleType(_)), "{err}");
}

#[test]
fn test_method_stored_on_its_instance_is_freed() {
    let p = || ident("p");
    let result = run_program(vec![
        point_class(),
        Statement::assign("p", call("Point", vec![int(1), int(2)])),
        set_attr("p", "cb", Expression::attr(p(), "sum")),
        Statement::Expr(Expression::Tuple(vec![
            p(),
            Expression::call(Expression::attr(p(), "cb"), vec![]),
            Expression::call(Expression::attr(call("Point", vec![int(4), int(5)]), "sum"), vec![]),
        ])),
    ])
    .unwrap();
    let Object::Tuple(items) = result.as_ref() else {
        panic!("expected a tuple, got {result:?}");
    };
    assert_eq!(items[1].as_int(), Some(3));
    assert_eq!(items[2].as_int(), Some(9));

    let point = Rc::downgrade(&items[0]);
    drop(result);
    assert!(point.upgrade().is_none());
}

#[test]
fn test_class_missing_dunder_and_attribute() {
    let base = || vec![point_class(), Statement::assign("p", call("Point", vec![int(1), int(2)]))];

    let mut program = base();
    program.push(Statement::Expr(bin(BinaryOp::Sub, ident("p"), ident("p"))));
    let err = run_program(program).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::IncompatibleType(_)));

    let mut program = base();
    program.push(Statement::Expr(Expression::attr(ident("p"), "z")));
    let err = run_program(program).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::AttributeNotFound(ref c, ref a) if c == "Point" && a == "z"));

    // no __bool__: instances are truthy
    let mut program = base();
    program.push(Statement::Expr(Expression::unary(crate::ast::UnaryOp::Not, ident("p"))));
    assert!(matches!(run_program(program).unwrap().as_ref(), Object::Bool(false)));

    // __init__ takes two arguments besides self
    let err = run_program(vec![point_class(), Statement::Expr(call("Point", vec![int(1)]))]).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ArgumentMismatch { expected: 3, received: 2, .. }));
}

#[test]
fn test_class_without_init_rejects_arguments() {
    let err = run_program(vec![
        Statement::class("Empty", vec![]),
        Statement::Expr(call("Empty", vec![int(1)])),
    ])
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ArgumentMismatch { expected: 0, received: 1, .. }));

    let result = run_program(vec![
        Statement::class("Empty", vec![]),
        Statement::Expr(call("str", vec![call("Empty", vec![])])),
    ])
    .unwrap();
    assert_eq!(result.as_str(), Some("<Empty object>"));
}

#[test]
fn test_instances_are_freed_with_the_executor() {
    let weak = {
        let exec = Executor::new();
        let program = vec![point_class(), Statement::Expr(call("Point", vec![int(3), int(4)]))];
        let point = exec.run(&program).unwrap();
        Rc::downgrade(&point)
    };
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_executor_reports_command_status() {
    let exec = Executor::new();
    let program = vec![Statement::Cmd(CmdFull::new(SimpleCmd::from_words(&["sh", "-c", "exit 4"]).into()))];
    exec.run(&program).unwrap();
    assert_eq!(exec.lookup(crate::cmd::STATUS_VAR).unwrap().as_int(), Some(4));
}
