//! Merging (S5): splice prepared snippets into one program.
//!
//! Every qubit declaration becomes a `let` alias into the single global
//! register at its allocated slots; classical input declarations become
//! aliases to their upstream outputs; node bodies are spliced in
//! topological order between `/* Start node … */` frames.

pub mod connections;

use leqo_qasm3::ast::{Program, RegisterExpr, Statement, StatementKind};
use rustc_hash::FxHashMap;
use tracing::debug;

use leqo_graph::ProgramGraph;

use crate::optimize::Allocation;
use crate::pre::{LocalQubitId, PreparedNode};
use connections::classical_connections;

/// Name of the single global quantum register.
pub const GLOBAL_REG: &str = "leqo_reg";

/// The OpenQASM version of emitted programs.
pub const OPENQASM_VERSION: &str = "3.1";

/// The standard-gates include every merged program carries.
pub const STDGATES_INCLUDE: &str = "stdgates.inc";

/// Merge all prepared nodes into a single program.
pub fn merge_graph(
    graph: &ProgramGraph<PreparedNode>,
    order: &[String],
    allocation: &Allocation,
) -> Program {
    let classical = classical_connections(graph);

    let mut statements = vec![
        Statement::bare(StatementKind::Include(STDGATES_INCLUDE.to_string())),
        Statement::bare(StatementKind::QubitDecl {
            name: GLOBAL_REG.to_string(),
            size: Some(allocation.register_size),
        }),
    ];

    for id in order {
        let node = graph.node(id).expect("ordered node exists");
        statements.push(Statement::bare(StatementKind::Comment(format!(
            "Start node {id}"
        ))));
        statements.extend(rewrite_node_statements(
            node,
            allocation.slots_of(id),
            GLOBAL_REG,
            classical.get(id),
        ));
        statements.push(Statement::bare(StatementKind::Comment(format!(
            "End node {id}"
        ))));
    }

    debug!(nodes = order.len(), "merged program graph");
    Program::with_version(OPENQASM_VERSION, statements)
}

/// Rewrite one node's statements against the global register.
///
/// Qubit declarations turn into aliases at their slots, classical input
/// declarations into aliases onto the upstream output, and alias statements
/// (the `@leqo.output`/`@leqo.reusable` contract surface included) get their
/// right-hand sides rebuilt as direct register slices. Everything else is
/// copied as-is. Recurses into branching statements, since fused
/// if-then-else nodes keep rewritable statements inside their arms.
pub fn rewrite_node_statements(
    node: &PreparedNode,
    slots: &[u32],
    reg_name: &str,
    classical: Option<&FxHashMap<String, String>>,
) -> Vec<Statement> {
    let mut alias_ids: FxHashMap<String, Vec<LocalQubitId>> = FxHashMap::default();
    node.program
        .statements
        .iter()
        .map(|statement| {
            rewrite_statement(statement, node, slots, reg_name, classical, &mut alias_ids)
        })
        .collect()
}

fn rewrite_statement(
    statement: &Statement,
    node: &PreparedNode,
    slots: &[u32],
    reg_name: &str,
    classical: Option<&FxHashMap<String, String>>,
    alias_ids: &mut FxHashMap<String, Vec<LocalQubitId>>,
) -> Statement {
    match &statement.kind {
        StatementKind::QubitDecl { name, size } => {
            let Some(ids) = node.qubits.ids_of(name) else {
                return statement.clone();
            };
            let value = if size.is_none() {
                RegisterExpr::index(reg_name, i64::from(slots[ids[0] as usize]))
            } else {
                RegisterExpr::set(
                    reg_name,
                    ids.iter().map(|&id| i64::from(slots[id as usize])),
                )
            };
            Statement::annotated(
                statement.annotations.clone(),
                StatementKind::Alias {
                    name: name.clone(),
                    value,
                },
            )
        }

        StatementKind::ClassicalDecl { name, .. } => {
            let Some(source) = classical.and_then(|map| map.get(name)) else {
                return statement.clone();
            };
            Statement::annotated(
                statement.annotations.clone(),
                StatementKind::Alias {
                    name: name.clone(),
                    value: RegisterExpr::ident(source.clone()),
                },
            )
        }

        StatementKind::Alias { name, value } => {
            // Classical aliases have no slots; they are copied unchanged.
            let Some(ids) = resolve_qubit_ids(value, node, alias_ids) else {
                return statement.clone();
            };
            alias_ids.insert(name.clone(), ids.clone());
            Statement::annotated(
                statement.annotations.clone(),
                StatementKind::Alias {
                    name: name.clone(),
                    value: RegisterExpr::set(
                        reg_name,
                        ids.iter().map(|&id| i64::from(slots[id as usize])),
                    ),
                },
            )
        }

        StatementKind::If {
            condition,
            then_body,
            else_body,
        } => Statement::annotated(
            statement.annotations.clone(),
            StatementKind::If {
                condition: condition.clone(),
                then_body: then_body
                    .iter()
                    .map(|inner| {
                        rewrite_statement(inner, node, slots, reg_name, classical, alias_ids)
                    })
                    .collect(),
                else_body: else_body
                    .iter()
                    .map(|inner| {
                        rewrite_statement(inner, node, slots, reg_name, classical, alias_ids)
                    })
                    .collect(),
            },
        ),

        _ => statement.clone(),
    }
}

/// Resolve an alias right-hand side to the node-local qubit ids it denotes,
/// through qubit declarations and earlier aliases. `None` for classical or
/// non-constant expressions.
fn resolve_qubit_ids(
    expr: &RegisterExpr,
    node: &PreparedNode,
    alias_ids: &FxHashMap<String, Vec<LocalQubitId>>,
) -> Option<Vec<LocalQubitId>> {
    let lookup = |name: &str| {
        node.qubits
            .ids_of(name)
            .map(<[LocalQubitId]>::to_vec)
            .or_else(|| alias_ids.get(name).cloned())
    };

    match expr {
        RegisterExpr::Ident(name) => lookup(name),
        RegisterExpr::Index { register, index } => {
            let ids = lookup(register)?;
            let index = usize::try_from(index.as_i64()?).ok()?;
            Some(vec![*ids.get(index)?])
        }
        RegisterExpr::Range {
            register,
            start,
            end,
        } => {
            let ids = lookup(register)?;
            let start = usize::try_from(start.as_i64()?).ok()?;
            let end = usize::try_from(end.as_i64()?).ok()?;
            Some(ids.get(start..=end)?.to_vec())
        }
        RegisterExpr::Set { register, indices } => {
            let ids = lookup(register)?;
            indices
                .iter()
                .map(|index| {
                    let index = usize::try_from(index.as_i64()?).ok()?;
                    ids.get(index).copied()
                })
                .collect()
        }
        RegisterExpr::Concat(lhs, rhs) => {
            let mut ids = resolve_qubit_ids(lhs, node, alias_ids)?;
            ids.extend(resolve_qubit_ids(rhs, node, alias_ids)?);
            Some(ids)
        }
    }
}
