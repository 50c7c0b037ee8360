//! If-then-else fusion.
//!
//! Each branch subgraph is bounded by `if`/`endif` passthrough nodes and
//! compiled independently (preprocessing plus a branch-local allocation that
//! pins the `if` node's qubits to the first slots, so both branches agree on
//! the interface layout). The fused implementation re-declares the interface
//! qubits, adds shared ancillae for whatever the wider branch needs, and
//! wraps the rewritten branch bodies in one branching statement. It then
//! re-enters the flat pipeline as an ordinary node.

use leqo_qasm3::ast::{
    Expression, Program, RegisterExpr, Statement, StatementKind, ANNOTATION_DIRTY,
    ANNOTATION_INPUT, ANNOTATION_OUTPUT, ANNOTATION_REUSABLE,
};
use tracing::debug;

use leqo_graph::{EdgeDocument, NestedBlock, NodeDocument, NodeKind, ProgramGraph};

use crate::error::{CompileError, CompileResult};
use crate::merge::connections::classical_connections;
use crate::merge::rewrite_node_statements;
use crate::optimize::Allocation;
use crate::pre::{PortValue, PreparedNode};

/// A branch subgraph after preparation and allocation.
pub struct BranchArtifacts {
    pub graph: ProgramGraph<PreparedNode>,
    pub order: Vec<String>,
    pub allocation: Allocation,
}

/// Build the node/edge documents of one branch: the block contents plus
/// `if`/`endif` border passthroughs carrying the given implementation.
pub fn branch_documents(
    ite_id: &str,
    block: &NestedBlock,
    pass_source: &str,
    if_id: &str,
    endif_id: &str,
) -> (Vec<NodeDocument>, Vec<EdgeDocument>) {
    let mut nodes = vec![
        NodeDocument::new(
            if_id,
            NodeKind::Custom {
                implementation: pass_source.to_string(),
            },
        ),
        NodeDocument::new(
            endif_id,
            NodeKind::Custom {
                implementation: pass_source.to_string(),
            },
        ),
    ];
    nodes.extend(block.nodes.iter().cloned());

    let edges = block
        .edges
        .iter()
        .cloned()
        .map(|mut edge| {
            if edge.source.0 == ite_id {
                edge.source.0 = if_id.to_string();
            }
            if edge.target.0 == ite_id {
                edge.target.0 = endif_id.to_string();
            }
            edge
        })
        .collect();

    (nodes, edges)
}

/// Fuse two compiled branches into one implementation snippet.
pub fn fuse(
    ite_id: &str,
    if_id: &str,
    endif_id: &str,
    then_branch: &BranchArtifacts,
    else_branch: &BranchArtifacts,
    condition: Expression,
    region_prefix: &str,
) -> CompileResult<Program> {
    // Classical values cannot leave the branching statement's scope.
    for branch in [then_branch, else_branch] {
        for connection in branch.graph.incoming(endif_id) {
            let source = branch
                .graph
                .node(&connection.source.0)
                .expect("edge endpoints exist");
            if matches!(
                source.io.outputs.get(&connection.source.1),
                Some(PortValue::Classical { .. })
            ) {
                return Err(CompileError::PortTypeMismatch {
                    node: ite_id.to_string(),
                    port: connection.target.1,
                    message: "classical output from if-then-else is not supported".into(),
                });
            }
        }
    }

    // Both branches must present the outputs on identical slots.
    if then_branch.allocation.slots_of(endif_id) != else_branch.allocation.slots_of(endif_id) {
        return Err(CompileError::AllocationInfeasible {
            message: format!(
                "then and else branches of '{ite_id}' disagree on the output qubit layout"
            ),
        });
    }

    let if_node = then_branch
        .graph
        .node(if_id)
        .expect("branch graphs contain the if node");
    let endif_node = then_branch
        .graph
        .node(endif_id)
        .expect("branch graphs contain the endif node");

    let interface_qubits = if_node.qubits.total();
    let region_size = then_branch
        .allocation
        .register_size
        .max(else_branch.allocation.register_size);
    let reg_name = format!("{region_prefix}_if_reg");
    let ancillae_name = format!("{region_prefix}_ancillae");

    let mut statements: Vec<Statement> = Vec::new();

    // Interface declarations: the if node's statements, output contract
    // stripped (its inputs become the fused node's inputs).
    for statement in &if_node.program.statements {
        let mut statement = statement.clone();
        strip_annotations(
            std::slice::from_mut(&mut statement),
            &[ANNOTATION_OUTPUT, ANNOTATION_REUSABLE, ANNOTATION_DIRTY],
        );
        statements.push(statement);
    }

    // Shared ancilla pool for whatever the wider branch needs.
    let extra = region_size.saturating_sub(interface_qubits);
    if extra > 0 {
        statements.push(Statement::bare(StatementKind::QubitDecl {
            name: ancillae_name.clone(),
            size: Some(extra),
        }));
    }

    // The region register: interface declarations then ancillae.
    let mut parts: Vec<RegisterExpr> = if_node
        .qubits
        .registers()
        .iter()
        .map(|register| RegisterExpr::ident(register.name.clone()))
        .collect();
    if extra > 0 {
        parts.push(RegisterExpr::ident(ancillae_name));
    }
    if let Some(mut region) = parts.pop() {
        while let Some(part) = parts.pop() {
            region = RegisterExpr::concat(part, region);
        }
        statements.push(Statement::bare(StatementKind::Alias {
            name: reg_name.clone(),
            value: region,
        }));
    }

    statements.push(Statement::bare(StatementKind::If {
        condition,
        then_body: branch_body(then_branch, if_id, endif_id, &reg_name),
        else_body: branch_body(else_branch, if_id, endif_id, &reg_name),
    }));

    // The endif statements surface the outputs; inputs are interior wiring.
    let mut endif_statements = rewrite_node_statements(
        endif_node,
        then_branch.allocation.slots_of(endif_id),
        &reg_name,
        None,
    );
    strip_annotations(
        &mut endif_statements,
        &[ANNOTATION_INPUT, ANNOTATION_REUSABLE, ANNOTATION_DIRTY],
    );
    statements.extend(endif_statements);

    debug!(node = %ite_id, region_size, "fused if-then-else branches");
    Ok(Program::snippet(statements))
}

/// The statements of one branch arm: every inner node rewritten against the
/// region register, contract annotations stripped.
fn branch_body(
    branch: &BranchArtifacts,
    if_id: &str,
    endif_id: &str,
    reg_name: &str,
) -> Vec<Statement> {
    let classical = classical_connections(&branch.graph);
    let mut body = Vec::new();
    for id in &branch.order {
        if id == if_id || id == endif_id {
            continue;
        }
        let node = branch.graph.node(id).expect("ordered node exists");
        let mut statements = rewrite_node_statements(
            node,
            branch.allocation.slots_of(id),
            reg_name,
            classical.get(id),
        );
        strip_annotations(
            &mut statements,
            &[
                ANNOTATION_INPUT,
                ANNOTATION_OUTPUT,
                ANNOTATION_REUSABLE,
                ANNOTATION_DIRTY,
            ],
        );
        body.append(&mut statements);
    }
    body
}

/// Remove the given annotation keywords, recursing into nested bodies.
fn strip_annotations(statements: &mut [Statement], keywords: &[&str]) {
    for statement in statements {
        statement
            .annotations
            .retain(|annotation| !keywords.contains(&annotation.keyword.as_str()));
        match &mut statement.kind {
            StatementKind::If {
                then_body,
                else_body,
                ..
            } => {
                strip_annotations(then_body, keywords);
                strip_annotations(else_body, keywords);
            }
            StatementKind::GateDef { body, .. } => strip_annotations(body, keywords),
            _ => {}
        }
    }
}
