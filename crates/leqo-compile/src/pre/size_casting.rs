//! Size casting: reconciling edge widths with declared input widths.
//!
//! An input declaration wider than the value arriving on its edge is split
//! into a bound head plus freshly allocated |0⟩ padding, stitched back
//! together under the original name with a concatenation alias. The merger
//! later assigns the padding its own slots in the global register. Narrower
//! declarations are a hard error, as is widening a port flagged exact.

use std::collections::BTreeMap;

use leqo_qasm3::ast::{ClassicalType, Expression, RegisterExpr, Statement, StatementKind};
use rustc_hash::FxHashSet;

use crate::error::{CompileError, CompileResult};
use crate::pre::{effective_width, PortValue, PreparedNode};

/// The value arriving on an input port, as produced by the upstream node.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestedType {
    Qubits { size: u32 },
    Classical { ty: ClassicalType },
}

impl RequestedType {
    /// Derive the requested type from an upstream output binding.
    pub fn of_output(value: &PortValue) -> Self {
        match value {
            PortValue::Qubits { ids, .. } => RequestedType::Qubits {
                size: ids.len() as u32,
            },
            PortValue::Classical { ty, .. } => RequestedType::Classical { ty: *ty },
        }
    }
}

/// Reconcile every connected input port of a prepared node.
pub fn size_cast(
    prepared: &mut PreparedNode,
    requested: &BTreeMap<u32, RequestedType>,
    exact_ports: &FxHashSet<u32>,
) -> CompileResult<()> {
    for (&port, incoming) in requested {
        let Some(binding) = prepared.io.inputs.get(&port) else {
            return Err(CompileError::AnnotationError {
                node: prepared.id.clone(),
                kind: crate::error::AnnotationErrorKind::MissingIndex,
                message: format!("an edge targets input {port}, but no @leqo.input {port} exists"),
            });
        };

        match (binding.clone(), incoming) {
            (PortValue::Qubits { name, ids }, RequestedType::Qubits { size: edge_size }) => {
                let declared = ids.len() as u32;
                if *edge_size == declared {
                    continue;
                }
                if *edge_size > declared {
                    return Err(CompileError::SizeMismatch {
                        node: prepared.id.clone(),
                        port,
                        declared,
                        connected: *edge_size,
                    });
                }
                if exact_ports.contains(&port) {
                    return Err(CompileError::SizeMismatch {
                        node: prepared.id.clone(),
                        port,
                        declared,
                        connected: *edge_size,
                    });
                }
                widen_input(prepared, port, &name, *edge_size);
            }

            (PortValue::Classical { ty, .. }, RequestedType::Classical { ty: edge_ty }) => {
                if !ty.same_kind(edge_ty) {
                    return Err(CompileError::PortTypeMismatch {
                        node: prepared.id.clone(),
                        port,
                        message: format!(
                            "input declares {}, edge carries {}",
                            ty.keyword(),
                            edge_ty.keyword()
                        ),
                    });
                }
                if effective_width(&ty) != effective_width(edge_ty) {
                    return Err(CompileError::SizeMismatch {
                        node: prepared.id.clone(),
                        port,
                        declared: effective_width(&ty),
                        connected: effective_width(edge_ty),
                    });
                }
            }

            (PortValue::Qubits { .. }, RequestedType::Classical { ty }) => {
                return Err(CompileError::PortTypeMismatch {
                    node: prepared.id.clone(),
                    port,
                    message: format!("input declares qubits, edge carries {}", ty.keyword()),
                });
            }

            (PortValue::Classical { ty, .. }, RequestedType::Qubits { .. }) => {
                return Err(CompileError::PortTypeMismatch {
                    node: prepared.id.clone(),
                    port,
                    message: format!("input declares {}, edge carries qubits", ty.keyword()),
                });
            }
        }
    }
    Ok(())
}

/// Split the declaration behind input `port` into bound head + clean padding.
fn widen_input(prepared: &mut PreparedNode, port: u32, name: &str, edge_size: u32) {
    let mut seen = collect_identifiers(&prepared.program.statements);
    let head_name = fresh_name(&mut seen, &format!("{name}_cast"));
    let pad_name = fresh_name(&mut seen, &format!("{name}_pad"));

    let position = prepared.program.statements.iter().position(|statement| {
        matches!(&statement.kind, StatementKind::QubitDecl { name: n, .. } if n == name)
    });
    let Some(position) = position else {
        return;
    };

    let declared = match &prepared.program.statements[position].kind {
        StatementKind::QubitDecl { size, .. } => size.unwrap_or(1),
        _ => return,
    };
    let annotations = prepared.program.statements[position].annotations.clone();

    let replacement = vec![
        Statement::annotated(
            annotations,
            StatementKind::QubitDecl {
                name: head_name.clone(),
                size: Some(edge_size),
            },
        ),
        Statement::bare(StatementKind::QubitDecl {
            name: pad_name.clone(),
            size: Some(declared - edge_size),
        }),
        Statement::bare(StatementKind::Alias {
            name: name.to_string(),
            value: RegisterExpr::concat(
                RegisterExpr::ident(head_name.clone()),
                RegisterExpr::ident(pad_name.clone()),
            ),
        }),
    ];
    prepared
        .program
        .statements
        .splice(position..=position, replacement);

    prepared
        .qubits
        .split_register(name, edge_size as usize, &head_name, &pad_name);
    let pad_ids = prepared
        .qubits
        .ids_of(&pad_name)
        .map(<[u32]>::to_vec)
        .unwrap_or_default();
    prepared.qubits.clean.extend(pad_ids);

    let head_ids = prepared
        .qubits
        .ids_of(&head_name)
        .map(<[u32]>::to_vec)
        .unwrap_or_default();
    prepared.io.inputs.insert(
        port,
        PortValue::Qubits {
            name: head_name,
            ids: head_ids,
        },
    );
}

/// Collect every identifier occurring in the statements.
fn collect_identifiers(statements: &[Statement]) -> FxHashSet<String> {
    let mut seen = FxHashSet::default();
    for statement in statements {
        collect_statement(&statement.kind, &mut seen);
    }
    seen
}

fn collect_statement(kind: &StatementKind, seen: &mut FxHashSet<String>) {
    match kind {
        StatementKind::QubitDecl { name, .. } => {
            seen.insert(name.clone());
        }
        StatementKind::ClassicalDecl { name, init, .. } => {
            seen.insert(name.clone());
            if let Some(init) = init {
                collect_expression(init, seen);
            }
        }
        StatementKind::ConstDecl { name, init, .. } => {
            seen.insert(name.clone());
            collect_expression(init, seen);
        }
        StatementKind::Alias { name, value } => {
            seen.insert(name.clone());
            collect_register(value, seen);
        }
        StatementKind::Assignment { target, value, .. } => {
            seen.insert(target.clone());
            collect_expression(value, seen);
        }
        StatementKind::GateCall { name, qubits, .. } => {
            seen.insert(name.clone());
            for qubit in qubits {
                collect_register(qubit, seen);
            }
        }
        StatementKind::GateDef {
            name,
            params,
            qubits,
            body,
        } => {
            seen.insert(name.clone());
            seen.extend(params.iter().cloned());
            seen.extend(qubits.iter().cloned());
            for statement in body {
                collect_statement(&statement.kind, seen);
            }
        }
        StatementKind::Measure { qubits, target } => {
            collect_register(qubits, seen);
            if let Some(target) = target {
                collect_register(target, seen);
            }
        }
        StatementKind::Reset { qubits } => collect_register(qubits, seen),
        StatementKind::Barrier { qubits } => {
            for qubit in qubits {
                collect_register(qubit, seen);
            }
        }
        StatementKind::If {
            then_body,
            else_body,
            ..
        } => {
            for statement in then_body.iter().chain(else_body.iter()) {
                collect_statement(&statement.kind, seen);
            }
        }
        StatementKind::Include(_) | StatementKind::Comment(_) => {}
    }
}

fn collect_register(reg: &RegisterExpr, seen: &mut FxHashSet<String>) {
    for name in reg.registers() {
        seen.insert(name.to_string());
    }
}

fn collect_expression(expr: &Expression, seen: &mut FxHashSet<String>) {
    if let Expression::Measure(reg) = expr {
        collect_register(reg, seen);
    }
}

/// Generate an unused identifier based on `base`.
fn fresh_name(seen: &mut FxHashSet<String>, base: &str) -> String {
    if seen.insert(base.to_string()) {
        return base.to_string();
    }
    let mut counter = 0;
    loop {
        let candidate = format!("{base}_{counter}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pre::preprocess;
    use leqo_qasm3::{emit, parse};

    fn prepared(source: &str) -> PreparedNode {
        preprocess("n1", parse(source).unwrap()).unwrap()
    }

    #[test]
    fn test_equal_sizes_untouched() {
        let mut node = prepared("@leqo.input 0\nqubit[2] q;\nh q[0];");
        let before = emit(&node.program);
        let requested = BTreeMap::from([(0, RequestedType::Qubits { size: 2 })]);
        size_cast(&mut node, &requested, &FxHashSet::default()).unwrap();
        assert_eq!(emit(&node.program), before);
    }

    #[test]
    fn test_widening_splits_declaration() {
        let mut node = prepared("@leqo.input 0\nqubit[4] q;\nh q[0];");
        let requested = BTreeMap::from([(0, RequestedType::Qubits { size: 2 })]);
        size_cast(&mut node, &requested, &FxHashSet::default()).unwrap();

        let text = emit(&node.program);
        let prefix = &node.prefix;
        assert!(text.contains(&format!("@leqo.input 0\nqubit[2] {prefix}_q_cast;")));
        assert!(text.contains(&format!("qubit[2] {prefix}_q_pad;")));
        assert!(text.contains(&format!(
            "let {prefix}_q = {prefix}_q_cast ++ {prefix}_q_pad;"
        )));

        // head keeps the first ids, padding the rest, all marked clean
        assert_eq!(
            node.io.inputs[&0],
            PortValue::Qubits {
                name: format!("{prefix}_q_cast"),
                ids: vec![0, 1]
            }
        );
        assert_eq!(node.qubits.clean, vec![2, 3]);
    }

    #[test]
    fn test_shrinking_rejected() {
        let mut node = prepared("@leqo.input 0\nqubit[2] q;");
        let requested = BTreeMap::from([(0, RequestedType::Qubits { size: 3 })]);
        let err = size_cast(&mut node, &requested, &FxHashSet::default()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::SizeMismatch {
                declared: 2,
                connected: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_exact_port_rejects_widening() {
        let mut node = prepared("@leqo.input 0\nqubit[4] q;");
        let requested = BTreeMap::from([(0, RequestedType::Qubits { size: 2 })]);
        let exact = FxHashSet::from_iter([0]);
        let err = size_cast(&mut node, &requested, &exact).unwrap_err();
        assert!(matches!(err, CompileError::SizeMismatch { .. }));
    }

    #[test]
    fn test_classical_kind_mismatch() {
        let mut node = prepared("@leqo.input 0\nint[32] n;");
        let requested = BTreeMap::from([(
            0,
            RequestedType::Classical {
                ty: ClassicalType::Float { size: Some(32) },
            },
        )]);
        let err = size_cast(&mut node, &requested, &FxHashSet::default()).unwrap_err();
        assert!(matches!(err, CompileError::PortTypeMismatch { .. }));
    }

    #[test]
    fn test_quantum_classical_mix() {
        let mut node = prepared("@leqo.input 0\nqubit[2] q;");
        let requested = BTreeMap::from([(
            0,
            RequestedType::Classical {
                ty: ClassicalType::Bit { size: Some(2) },
            },
        )]);
        let err = size_cast(&mut node, &requested, &FxHashSet::default()).unwrap_err();
        assert!(matches!(err, CompileError::PortTypeMismatch { .. }));
    }

    #[test]
    fn test_unbound_edge_target() {
        let mut node = prepared("qubit[2] q;");
        let requested = BTreeMap::from([(0, RequestedType::Qubits { size: 2 })]);
        let err = size_cast(&mut node, &requested, &FxHashSet::default()).unwrap_err();
        assert!(matches!(err, CompileError::AnnotationError { .. }));
    }
}
