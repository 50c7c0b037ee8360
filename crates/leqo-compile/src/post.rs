//! Postprocessing (S6).
//!
//! Hoists unique `include` directives to the front, folds gate definitions
//! with identical bodies, and verifies the emitted text re-parses. A
//! re-parse failure is a pipeline defect, not bad user input.

use leqo_qasm3::ast::{Program, Statement, StatementKind};
use rustc_hash::FxHashMap;
use tracing::error;

use crate::error::{CompileError, CompileResult};

/// Run all postprocessing steps and serialize the program.
pub fn postprocess(mut program: Program) -> CompileResult<(Program, String)> {
    hoist_includes(&mut program);
    fold_gate_definitions(&mut program);

    let text = leqo_qasm3::emit(&program);
    if let Err(err) = leqo_qasm3::parse(&text) {
        error!("merged program does not re-parse: {err}");
        return Err(CompileError::PostprocessError {
            message: format!("merged program does not re-parse: {err}"),
        });
    }
    Ok((program, text))
}

/// Move unique includes to the front, dropping duplicates.
fn hoist_includes(program: &mut Program) {
    let mut seen: Vec<String> = Vec::new();
    program.statements.retain(|statement| {
        if let StatementKind::Include(path) = &statement.kind {
            if !seen.contains(path) {
                seen.push(path.clone());
            }
            false
        } else {
            true
        }
    });

    for path in seen.into_iter().rev() {
        program
            .statements
            .insert(0, Statement::bare(StatementKind::Include(path)));
    }
}

/// Fold gate definitions with identical parameters, arguments and bodies.
///
/// The first definition survives; call sites of dropped names are rewritten
/// to the surviving name.
fn fold_gate_definitions(program: &mut Program) {
    let mut survivors: FxHashMap<String, String> = FxHashMap::default();
    let mut renames: FxHashMap<String, String> = FxHashMap::default();

    program.statements.retain(|statement| {
        let StatementKind::GateDef {
            name,
            params,
            qubits,
            body,
        } = &statement.kind
        else {
            return true;
        };
        let key = serde_json::to_string(&(params, qubits, body))
            .expect("gate definition serializes");
        match survivors.get(&key) {
            Some(kept) => {
                renames.insert(name.clone(), kept.clone());
                false
            }
            None => {
                survivors.insert(key, name.clone());
                true
            }
        }
    });

    if renames.is_empty() {
        return;
    }
    rename_calls(&mut program.statements, &renames);
}

fn rename_calls(statements: &mut [Statement], renames: &FxHashMap<String, String>) {
    for statement in statements {
        match &mut statement.kind {
            StatementKind::GateCall { name, .. } => {
                if let Some(kept) = renames.get(name) {
                    *name = kept.clone();
                }
            }
            StatementKind::If {
                then_body,
                else_body,
                ..
            } => {
                rename_calls(then_body, renames);
                rename_calls(else_body, renames);
            }
            StatementKind::GateDef { body, .. } => rename_calls(body, renames),
            _ => {}
        }
    }
}
