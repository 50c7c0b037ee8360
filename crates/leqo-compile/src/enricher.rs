//! Snippet acquisition (S1).
//!
//! Nodes without a user-supplied implementation get their snippet from an
//! [`Enricher`]. The pipeline calls `lookup` exactly once per unresolved
//! node; the built-in enricher serves the closed node kinds whose snippets
//! are mechanical (qubits, literals, gates, measurements, passthroughs).
//! Catalogue-backed kinds (`operator`, `encoder`) are expected to be served
//! by an external implementation wrapping this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;

use leqo_graph::{Literal, NodeKind};
use leqo_qasm3::ast::{
    Annotation, ClassicalType, Expression, Program, RegisterExpr, Statement, StatementKind,
    ANNOTATION_INPUT, ANNOTATION_OUTPUT,
};

use crate::error::{CompileError, CompileResult};
use crate::pre::size_casting::RequestedType;

/// Everything an enricher may consider when resolving a node.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    /// The flat node id.
    pub id: String,
    /// The node kind and payload.
    pub kind: NodeKind,
    /// The value type arriving on each connected input port.
    pub requested_inputs: BTreeMap<u32, RequestedType>,
}

/// Strategy that resolves node descriptors to OpenQASM snippets.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Return the snippet for a node, or `None` if this enricher cannot
    /// serve it. Called at most once per unresolved node.
    async fn lookup(&self, descriptor: &NodeDescriptor) -> CompileResult<Option<String>>;
}

/// Enricher generating snippets for the mechanical node kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEnricher;

#[async_trait]
impl Enricher for BuiltinEnricher {
    async fn lookup(&self, descriptor: &NodeDescriptor) -> CompileResult<Option<String>> {
        builtin_snippet(descriptor).map(|program| program.map(|p| leqo_qasm3::emit(&p)))
    }
}

/// Generate the snippet AST for a node kind the builtin enricher covers.
pub fn builtin_snippet(descriptor: &NodeDescriptor) -> CompileResult<Option<Program>> {
    let program = match &descriptor.kind {
        NodeKind::Qubit { size } | NodeKind::Ancilla { size } => Some(register_source(*size)),
        NodeKind::ClassicalLiteral { literal } => Some(literal_source(literal)),
        NodeKind::Gate { gate } => gate_source(descriptor, gate, None)?,
        NodeKind::GateWithParam { gate, parameter } => {
            gate_source(descriptor, gate, Some(*parameter))?
        }
        NodeKind::Measurement { indices } => Some(measurement_source(descriptor, indices)?),
        NodeKind::Passthrough => Some(passthrough_program(&descriptor.requested_inputs)),
        NodeKind::Operator { .. }
        | NodeKind::Encoder { .. }
        | NodeKind::Custom { .. }
        | NodeKind::Repeat { .. }
        | NodeKind::IfThenElse { .. } => None,
    };
    Ok(program)
}

/// `qubit[n] q;` plus the output contract.
fn register_source(size: u32) -> Program {
    Program::snippet(vec![
        Statement::bare(StatementKind::QubitDecl {
            name: "q".into(),
            size: Some(size),
        }),
        Statement::annotated(
            vec![Annotation::new(ANNOTATION_OUTPUT, "0")],
            StatementKind::Alias {
                name: "out".into(),
                value: RegisterExpr::ident("q"),
            },
        ),
    ])
}

/// A classical constant declaration plus the output contract.
fn literal_source(literal: &Literal) -> Program {
    let (ty, init) = match literal {
        Literal::Bit { value } => (
            ClassicalType::Bit { size: None },
            Expression::Int(i64::from(*value)),
        ),
        Literal::Bool { value } => (ClassicalType::Bool, Expression::Bool(*value)),
        Literal::Int { bit_size, value } => (
            ClassicalType::Int {
                size: Some(*bit_size),
            },
            Expression::Int(*value),
        ),
        Literal::Float { bit_size, value } => (
            ClassicalType::Float {
                size: Some(*bit_size),
            },
            Expression::Float(*value),
        ),
    };
    Program::snippet(vec![
        Statement::bare(StatementKind::ClassicalDecl {
            ty,
            name: "literal".into(),
            init: Some(init),
        }),
        Statement::annotated(
            vec![Annotation::new(ANNOTATION_OUTPUT, "0")],
            StatementKind::Alias {
                name: "out".into(),
                value: RegisterExpr::ident("literal"),
            },
        ),
    ])
}

/// Canonical name, qubit arity and parameter count of the standard gates
/// the builtin enricher knows. Frontend aliases map to stdgates names.
fn gate_signature(name: &str) -> Option<(&str, u32, u32)> {
    let signature = match name {
        "id" | "x" | "y" | "z" | "h" | "s" | "sdg" | "t" | "tdg" | "sx" | "sxdg" => (name, 1, 0),
        "rx" | "ry" | "rz" | "p" => (name, 1, 1),
        "cx" | "cy" | "cz" | "ch" | "swap" | "iswap" => (name, 2, 0),
        "crx" | "cry" | "crz" | "cp" | "rxx" | "ryy" | "rzz" => (name, 2, 1),
        "cnot" => ("cx", 2, 0),
        "ccx" | "toffoli" => ("ccx", 3, 0),
        "cswap" => ("cswap", 3, 0),
        _ => return None,
    };
    Some(signature)
}

/// Inputs, a broadcast gate call, and matching outputs.
fn gate_source(
    descriptor: &NodeDescriptor,
    gate: &str,
    parameter: Option<f64>,
) -> CompileResult<Option<Program>> {
    let Some((emitted_name, qubit_count, param_count)) = gate_signature(gate) else {
        return Ok(None);
    };
    if (param_count == 1) != parameter.is_some() {
        return Err(CompileError::MalformedRequest(format!(
            "gate '{gate}' on node '{}' expects {param_count} parameter(s)",
            descriptor.id
        )));
    }

    // All quantum inputs must agree on one width; unconnected ports
    // default to single qubits.
    let mut size = None;
    for port in 0..qubit_count {
        match descriptor.requested_inputs.get(&port) {
            Some(RequestedType::Qubits { size: edge_size }) => {
                if size.is_some_and(|s| s != *edge_size) {
                    return Err(CompileError::PortTypeMismatch {
                        node: descriptor.id.clone(),
                        port,
                        message: "gate inputs must be of equal size".into(),
                    });
                }
                size = Some(*edge_size);
            }
            Some(RequestedType::Classical { ty }) => {
                return Err(CompileError::PortTypeMismatch {
                    node: descriptor.id.clone(),
                    port,
                    message: format!("gate input carries {}", ty.keyword()),
                });
            }
            None => {}
        }
    }
    let size = size.unwrap_or(1);

    let mut statements = Vec::new();
    for port in 0..qubit_count {
        statements.push(Statement::annotated(
            vec![Annotation::new(ANNOTATION_INPUT, port.to_string())],
            StatementKind::QubitDecl {
                name: format!("q{port}"),
                size: Some(size),
            },
        ));
    }
    statements.push(Statement::bare(StatementKind::GateCall {
        name: emitted_name.to_string(),
        params: parameter.map(Expression::Float).into_iter().collect(),
        qubits: (0..qubit_count)
            .map(|port| RegisterExpr::ident(format!("q{port}")))
            .collect(),
    }));
    for port in 0..qubit_count {
        statements.push(Statement::annotated(
            vec![Annotation::new(ANNOTATION_OUTPUT, port.to_string())],
            StatementKind::Alias {
                name: format!("out{port}"),
                value: RegisterExpr::ident(format!("q{port}")),
            },
        ));
    }
    Ok(Some(Program::snippet(statements)))
}

/// Measure selected indices into a bit register; expose bits and qubits.
fn measurement_source(descriptor: &NodeDescriptor, indices: &[u32]) -> CompileResult<Program> {
    if indices.is_empty() {
        return Err(CompileError::MalformedRequest(format!(
            "measurement node '{}' selects no indices",
            descriptor.id
        )));
    }
    let max_index = *indices.iter().max().expect("indices is non-empty");
    let size = match descriptor.requested_inputs.get(&0) {
        Some(RequestedType::Qubits { size }) => *size,
        _ => max_index + 1,
    };
    if max_index >= size {
        return Err(CompileError::MalformedRequest(format!(
            "measurement node '{}' selects index {max_index} of a width-{size} input",
            descriptor.id
        )));
    }

    let whole_register = indices.len() as u32 == size
        && indices.iter().enumerate().all(|(i, &index)| i as u32 == index);
    let measured = if whole_register {
        RegisterExpr::ident("q")
    } else {
        RegisterExpr::set("q", indices.iter().map(|&i| i64::from(i)))
    };

    Ok(Program::snippet(vec![
        Statement::annotated(
            vec![Annotation::new(ANNOTATION_INPUT, "0")],
            StatementKind::QubitDecl {
                name: "q".into(),
                size: Some(size),
            },
        ),
        Statement::bare(StatementKind::ClassicalDecl {
            ty: ClassicalType::Bit {
                size: Some(indices.len() as u32),
            },
            name: "result".into(),
            init: Some(Expression::Measure(Box::new(measured))),
        }),
        Statement::annotated(
            vec![Annotation::new(ANNOTATION_OUTPUT, "0")],
            StatementKind::Alias {
                name: "out".into(),
                value: RegisterExpr::ident("result"),
            },
        ),
        Statement::annotated(
            vec![Annotation::new(ANNOTATION_OUTPUT, "1")],
            StatementKind::Alias {
                name: "remaining".into(),
                value: RegisterExpr::ident("q"),
            },
        ),
    ]))
}

/// A passthrough implementation: every input is re-exposed as the output
/// with the same index.
pub fn passthrough_program(requested: &BTreeMap<u32, RequestedType>) -> Program {
    let mut statements = Vec::new();
    for (&index, value) in requested {
        let declaration_name = format!("pass_decl_{index}");
        let declaration = match value {
            RequestedType::Qubits { size } => StatementKind::QubitDecl {
                name: declaration_name.clone(),
                size: Some(*size),
            },
            RequestedType::Classical { ty } => StatementKind::ClassicalDecl {
                ty: *ty,
                name: declaration_name.clone(),
                init: None,
            },
        };
        statements.push(Statement::annotated(
            vec![Annotation::new(ANNOTATION_INPUT, index.to_string())],
            declaration,
        ));
        statements.push(Statement::annotated(
            vec![Annotation::new(ANNOTATION_OUTPUT, index.to_string())],
            StatementKind::Alias {
                name: format!("pass_out_{index}"),
                value: RegisterExpr::ident(declaration_name),
            },
        ));
    }
    Program::snippet(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: NodeKind, inputs: &[(u32, RequestedType)]) -> NodeDescriptor {
        NodeDescriptor {
            id: "n1".into(),
            kind,
            requested_inputs: inputs.iter().cloned().collect(),
        }
    }

    #[tokio::test]
    async fn test_qubit_snippet() {
        let text = BuiltinEnricher
            .lookup(&descriptor(NodeKind::Qubit { size: 2 }, &[]))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("qubit[2] q;"));
        assert!(text.contains("@leqo.output 0\nlet out = q;"));
    }

    #[tokio::test]
    async fn test_gate_snippet_broadcasts() {
        let text = BuiltinEnricher
            .lookup(&descriptor(
                NodeKind::Gate { gate: "cx".into() },
                &[
                    (0, RequestedType::Qubits { size: 2 }),
                    (1, RequestedType::Qubits { size: 2 }),
                ],
            ))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("@leqo.input 0\nqubit[2] q0;"));
        assert!(text.contains("@leqo.input 1\nqubit[2] q1;"));
        assert!(text.contains("cx q0, q1;"));
        assert!(text.contains("@leqo.output 1\nlet out1 = q1;"));
    }

    #[tokio::test]
    async fn test_gate_alias_resolved() {
        let text = BuiltinEnricher
            .lookup(&descriptor(
                NodeKind::Gate {
                    gate: "cnot".into(),
                },
                &[],
            ))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("cx q0, q1;"));
    }

    #[tokio::test]
    async fn test_mismatched_gate_inputs_rejected() {
        let err = BuiltinEnricher
            .lookup(&descriptor(
                NodeKind::Gate { gate: "cx".into() },
                &[
                    (0, RequestedType::Qubits { size: 2 }),
                    (1, RequestedType::Qubits { size: 3 }),
                ],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::PortTypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_parameterized_gate() {
        let text = BuiltinEnricher
            .lookup(&descriptor(
                NodeKind::GateWithParam {
                    gate: "rx".into(),
                    parameter: 0.5,
                },
                &[(0, RequestedType::Qubits { size: 1 })],
            ))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("rx(0.5) q0;"));
    }

    #[tokio::test]
    async fn test_measurement_whole_register() {
        let text = BuiltinEnricher
            .lookup(&descriptor(
                NodeKind::Measurement {
                    indices: vec![0, 1, 2],
                },
                &[(0, RequestedType::Qubits { size: 3 })],
            ))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("bit[3] result = measure q;"));
        assert!(text.contains("@leqo.output 0\nlet out = result;"));
        assert!(text.contains("@leqo.output 1\nlet remaining = q;"));
    }

    #[tokio::test]
    async fn test_measurement_selected_indices() {
        let text = BuiltinEnricher
            .lookup(&descriptor(
                NodeKind::Measurement { indices: vec![2] },
                &[(0, RequestedType::Qubits { size: 3 })],
            ))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("bit[1] result = measure q[{2}];"));
    }

    #[tokio::test]
    async fn test_operator_unserved() {
        let result = BuiltinEnricher
            .lookup(&descriptor(
                NodeKind::Operator {
                    operator: "add".into(),
                },
                &[],
            ))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_passthrough_contract() {
        let requested = BTreeMap::from([
            (0, RequestedType::Qubits { size: 2 }),
            (
                1,
                RequestedType::Classical {
                    ty: ClassicalType::Int { size: Some(32) },
                },
            ),
        ]);
        let text = leqo_qasm3::emit(&passthrough_program(&requested));
        assert!(text.contains("@leqo.input 0\nqubit[2] pass_decl_0;"));
        assert!(text.contains("@leqo.output 0\nlet pass_out_0 = pass_decl_0;"));
        assert!(text.contains("@leqo.input 1\nint[32] pass_decl_1;"));
        assert!(text.contains("@leqo.output 1\nlet pass_out_1 = pass_decl_1;"));
    }
}
