//! Identifier renaming.
//!
//! All identifiers declared in a snippet are rewritten to carry a
//! node-unique prefix so that no two prepared nodes share a declared name
//! after merging. Built-in identifiers (standard gates, constants) are never
//! declared by snippets and therefore never renamed.

use std::hash::{Hash, Hasher};

use leqo_qasm3::ast::{Program, Statement, StatementKind};
use rustc_hash::{FxHashMap, FxHasher};

/// Stable node prefix: a deterministic hash of the node id.
///
/// The same function also derives identifiers for unrolled nodes, so the
/// whole naming scheme is reproducible across runs and processes.
pub fn stable_prefix(node_id: &str) -> String {
    let mut hasher = FxHasher::default();
    node_id.hash(&mut hasher);
    format!("leqo_{:016x}", hasher.finish())
}

/// Rename all declared identifiers with the node prefix.
///
/// Returns the applied rename map (old name → new name).
pub fn rename_program(program: &mut Program, prefix: &str) -> FxHashMap<String, String> {
    let mut renames = FxHashMap::default();
    for statement in &program.statements {
        if let Some(name) = declared_name(&statement.kind) {
            renames.insert(name.to_string(), format!("{prefix}_{name}"));
        }
    }

    rename_statements(&mut program.statements, &renames);
    renames
}

/// The identifier a top-level statement declares, if any.
fn declared_name(kind: &StatementKind) -> Option<&str> {
    match kind {
        StatementKind::QubitDecl { name, .. }
        | StatementKind::ClassicalDecl { name, .. }
        | StatementKind::ConstDecl { name, .. }
        | StatementKind::Alias { name, .. }
        | StatementKind::GateDef { name, .. } => Some(name),
        _ => None,
    }
}

fn rename_statements(statements: &mut [Statement], renames: &FxHashMap<String, String>) {
    for statement in statements {
        rename_statement(&mut statement.kind, renames);
    }
}

fn rename_statement(kind: &mut StatementKind, renames: &FxHashMap<String, String>) {
    let rename = |name: &str| renames.get(name).cloned();

    match kind {
        StatementKind::QubitDecl { name, .. } => apply(name, renames),

        StatementKind::ClassicalDecl { name, init, .. } => {
            apply(name, renames);
            if let Some(init) = init {
                init.rename_identifiers(&rename);
            }
        }

        StatementKind::ConstDecl { name, init, .. } => {
            apply(name, renames);
            init.rename_identifiers(&rename);
        }

        StatementKind::Alias { name, value } => {
            apply(name, renames);
            value.rename_registers(&rename);
        }

        StatementKind::Assignment {
            target,
            index,
            value,
        } => {
            apply(target, renames);
            if let Some(index) = index {
                index.rename_identifiers(&rename);
            }
            value.rename_identifiers(&rename);
        }

        StatementKind::GateCall {
            name,
            params,
            qubits,
        } => {
            // Only locally defined gates are in the map; stdgates stay.
            apply(name, renames);
            for param in params {
                param.rename_identifiers(&rename);
            }
            for qubit in qubits {
                qubit.rename_registers(&rename);
            }
        }

        StatementKind::GateDef {
            name,
            params,
            qubits,
            body,
        } => {
            apply(name, renames);
            // Gate parameters and qubit arguments shadow globals inside
            // the body.
            let mut scoped = renames.clone();
            for local in params.iter().chain(qubits.iter()) {
                scoped.remove(local);
            }
            rename_statements(body, &scoped);
        }

        StatementKind::Measure { qubits, target } => {
            qubits.rename_registers(&rename);
            if let Some(target) = target {
                target.rename_registers(&rename);
            }
        }

        StatementKind::Reset { qubits } => qubits.rename_registers(&rename),

        StatementKind::Barrier { qubits } => {
            for qubit in qubits {
                qubit.rename_registers(&rename);
            }
        }

        StatementKind::If {
            condition,
            then_body,
            else_body,
        } => {
            condition.rename_identifiers(&rename);
            rename_statements(then_body, renames);
            rename_statements(else_body, renames);
        }

        StatementKind::Include(_) | StatementKind::Comment(_) => {}
    }
}

fn apply(name: &mut String, renames: &FxHashMap<String, String>) {
    if let Some(new) = renames.get(name.as_str()) {
        *name = new.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leqo_qasm3::{emit, parse};

    #[test]
    fn test_prefix_is_stable() {
        assert_eq!(stable_prefix("node1"), stable_prefix("node1"));
        assert_ne!(stable_prefix("node1"), stable_prefix("node2"));
    }

    #[test]
    fn test_declared_identifiers_renamed() {
        let mut program = parse("qubit[2] q;\nh q[0];\ncx q[0], q[1];").unwrap();
        rename_program(&mut program, "leqo_ff");
        let text = emit(&program);
        assert!(text.contains("qubit[2] leqo_ff_q;"));
        assert!(text.contains("h leqo_ff_q[0];"));
        // standard gates are untouched
        assert!(text.contains("cx leqo_ff_q[0]"));
    }

    #[test]
    fn test_builtins_not_renamed() {
        let mut program = parse("qubit q;\nrx(pi / 2) q;").unwrap();
        rename_program(&mut program, "leqo_ff");
        let text = emit(&program);
        assert!(text.contains("rx(pi / 2) leqo_ff_q;"));
    }

    #[test]
    fn test_gate_def_locals_shadow() {
        let mut program = parse("qubit a;\ngate twist a { h a; }\ntwist a;").unwrap();
        rename_program(&mut program, "leqo_ff");
        let text = emit(&program);
        // the body references the gate argument, not the global qubit
        assert!(text.contains("gate leqo_ff_twist a {\n    h a;\n}"));
        assert!(text.contains("leqo_ff_twist leqo_ff_a;"));
    }

    #[test]
    fn test_alias_and_measure_renamed() {
        let mut program =
            parse("qubit[2] q;\nbit[2] c;\nlet r = q[0:1];\nc = measure q;").unwrap();
        rename_program(&mut program, "leqo_ff");
        let text = emit(&program);
        assert!(text.contains("let leqo_ff_r = leqo_ff_q[0:1];"));
        assert!(text.contains("leqo_ff_c = measure leqo_ff_q;"));
    }
}
