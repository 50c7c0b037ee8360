//! Property-based tests for QASM3 parse/emit round-trips.
//!
//! Emitted text must re-parse to a structurally identical AST, and emission
//! must be a fixed point: emit(parse(emit(p))) == emit(p).

use leqo_qasm3::ast::{
    Annotation, ClassicalType, Expression, Program, RegisterExpr, Statement, StatementKind,
};
use leqo_qasm3::{emit, parse};
use proptest::prelude::*;

/// Identifier strategy: short lowercase names that are never keywords.
fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,5}".prop_map(|s| format!("v_{s}"))
}

fn arb_register_expr() -> impl Strategy<Value = RegisterExpr> {
    let primary = prop_oneof![
        arb_name().prop_map(RegisterExpr::Ident),
        (arb_name(), 0_i64..8).prop_map(|(name, i)| RegisterExpr::index(name, i)),
        (arb_name(), prop::collection::vec(0_i64..8, 1..4))
            .prop_map(|(name, indices)| RegisterExpr::set(name, indices)),
        (arb_name(), 0_i64..4, 4_i64..8).prop_map(|(name, start, end)| RegisterExpr::Range {
            register: name,
            start: Expression::Int(start),
            end: Expression::Int(end),
        }),
    ];
    prop::collection::vec(primary, 1..4).prop_map(|mut parts| {
        let mut expr = parts.remove(0);
        for part in parts {
            expr = RegisterExpr::concat(expr, part);
        }
        expr
    })
}

fn arb_statement() -> impl Strategy<Value = Statement> {
    prop_oneof![
        (arb_name(), prop::option::of(1_u32..8))
            .prop_map(|(name, size)| Statement::bare(StatementKind::QubitDecl { name, size })),
        (arb_name(), 1_u32..8).prop_map(|(name, size)| {
            Statement::bare(StatementKind::ClassicalDecl {
                ty: ClassicalType::Bit { size: Some(size) },
                name,
                init: None,
            })
        }),
        (arb_name(), arb_register_expr())
            .prop_map(|(name, value)| Statement::bare(StatementKind::Alias { name, value })),
        (arb_name(), arb_register_expr()).prop_map(|(name, operand)| {
            Statement::bare(StatementKind::GateCall {
                name,
                params: vec![],
                qubits: vec![operand],
            })
        }),
        (arb_name(), arb_register_expr()).prop_map(|(name, qubits)| {
            Statement::bare(StatementKind::ClassicalDecl {
                ty: ClassicalType::Bit { size: Some(2) },
                name,
                init: Some(Expression::Measure(Box::new(qubits))),
            })
        }),
    ]
}

fn arb_program() -> impl Strategy<Value = Program> {
    prop::collection::vec(arb_statement(), 0..12)
        .prop_map(|statements| Program::with_version("3.1", statements))
}

proptest! {
    #[test]
    fn roundtrip_structure(program in arb_program()) {
        let text = emit(&program);
        let reparsed = parse(&text).expect("emitted text must parse");
        prop_assert_eq!(&program, &reparsed);
    }

    #[test]
    fn emission_is_fixed_point(program in arb_program()) {
        let once = emit(&program);
        let twice = emit(&parse(&once).expect("emitted text must parse"));
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn annotated_statements_roundtrip() {
    let program = Program::snippet(vec![
        Statement::annotated(
            vec![Annotation::new("leqo.input", "0")],
            StatementKind::QubitDecl {
                name: "q".into(),
                size: Some(3),
            },
        ),
        Statement::bare(StatementKind::GateCall {
            name: "h".into(),
            params: vec![],
            qubits: vec![RegisterExpr::index("q", 0)],
        }),
        Statement::annotated(
            vec![Annotation::new("leqo.output", "0")],
            StatementKind::Alias {
                name: "out".into(),
                value: RegisterExpr::ident("q"),
            },
        ),
    ]);

    let reparsed = parse(&emit(&program)).unwrap();
    assert_eq!(program, reparsed);
}
