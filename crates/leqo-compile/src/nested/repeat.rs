//! Repeat unrolling.
//!
//! A `repeat(k)` node becomes `k` copies of its inner subgraph. Each
//! iteration is bracketed by passthrough entry/exit nodes carrying the
//! loop-carried values; classical inputs that never return to the repeat's
//! output side are broadcast from their outer source into every iteration.
//! Derived identifiers come from the same stable hash the renamer uses, so
//! unrolling is reproducible.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::debug;

use leqo_graph::{EdgeDocument, NodeDocument, NodeKind};

use crate::error::{CompileError, CompileResult};
use crate::pre::renaming::stable_prefix;

/// Expand one repeat node. Consumes the full outer edge list and returns
/// the replacement nodes plus the rewritten edge list.
pub fn expand(
    node: NodeDocument,
    outer_edges: Vec<EdgeDocument>,
    unroll_bound: u32,
) -> CompileResult<(Vec<NodeDocument>, Vec<EdgeDocument>)> {
    let NodeKind::Repeat { iterations, block } = node.kind else {
        return Err(CompileError::MalformedRequest(format!(
            "node '{}' is not a repeat node",
            node.id
        )));
    };
    if iterations == 0 {
        return Err(CompileError::MalformedRequest(format!(
            "repeat node '{}' declares zero iterations",
            node.id
        )));
    }
    if iterations > unroll_bound {
        return Err(CompileError::UnrollBoundExceeded {
            node: node.id,
            iterations,
            bound: unroll_bound,
        });
    }

    let repeat_id = node.id;
    let prefix = stable_prefix(&repeat_id);

    // Input ports: fed from outside or consumed inside the block.
    let mut in_ports: BTreeSet<u32> = outer_edges
        .iter()
        .filter(|edge| edge.target.0 == repeat_id)
        .map(|edge| edge.target.1)
        .collect();
    in_ports.extend(
        block
            .edges
            .iter()
            .filter(|edge| edge.source.0 == repeat_id)
            .map(|edge| edge.source.1),
    );

    // Output ports: produced by the block. Every output must be matched by
    // an input at the same index (the loop-carried pair).
    let out_ports: BTreeSet<u32> = block
        .edges
        .iter()
        .filter(|edge| edge.target.0 == repeat_id)
        .map(|edge| edge.target.1)
        .collect();
    for &port in &out_ports {
        if !in_ports.contains(&port) {
            return Err(CompileError::PortTypeMismatch {
                node: repeat_id.clone(),
                port,
                message: "repeat output port has no matching input port".into(),
            });
        }
    }

    // Dense indices for the loop-carried ports; the rest broadcast.
    let loop_carried: Vec<u32> = out_ports.iter().copied().collect();
    let lc_index: FxHashMap<u32, u32> = loop_carried
        .iter()
        .enumerate()
        .map(|(dense, &port)| (port, dense as u32))
        .collect();

    // The outer feed of every input port, used for iteration 0 and for
    // broadcast wiring.
    let outer_feed: FxHashMap<u32, (String, u32)> = outer_edges
        .iter()
        .filter(|edge| edge.target.0 == repeat_id)
        .map(|edge| (edge.target.1, edge.source.clone()))
        .collect();

    let entry_id = |i: u32| format!("{prefix}_repeat_{i}_entry");
    let exit_id = |i: u32| format!("{prefix}_repeat_{i}_exit");
    let inner_id = |i: u32, old: &str| format!("{prefix}_repeat_{i}_{old}");

    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    for i in 0..iterations {
        nodes.push(NodeDocument::new(entry_id(i), NodeKind::Passthrough));

        for inner in &block.nodes {
            let mut copy = inner.clone();
            let old_id = copy.id.clone();
            copy.id = inner_id(i, &old_id);
            rewrite_self_references(&mut copy, &old_id);
            nodes.push(copy);
        }

        nodes.push(NodeDocument::new(exit_id(i), NodeKind::Passthrough));

        // Body edges of this iteration.
        for edge in &block.edges {
            let source = if edge.source.0 == repeat_id {
                let port = edge.source.1;
                match lc_index.get(&port) {
                    Some(&dense) => (entry_id(i), dense),
                    None => {
                        // Broadcast straight from the outer source.
                        let Some(feed) = outer_feed.get(&port) else {
                            return Err(CompileError::PortFanInViolation {
                                node: repeat_id.clone(),
                                port,
                                message: "repeat input port has no incoming edge".into(),
                            });
                        };
                        feed.clone()
                    }
                }
            } else {
                (inner_id(i, &edge.source.0), edge.source.1)
            };
            let target = if edge.target.0 == repeat_id {
                (exit_id(i), lc_index[&edge.target.1])
            } else {
                (inner_id(i, &edge.target.0), edge.target.1)
            };
            edges.push(EdgeDocument {
                source,
                target,
                identifier: edge.identifier.clone(),
            });
        }

        // Thread the loop-carried values from the previous exit.
        if i > 0 {
            for &port in &loop_carried {
                let dense = lc_index[&port];
                edges.push(EdgeDocument::new(
                    (exit_id(i - 1), dense),
                    (entry_id(i), dense),
                ));
            }
        }
    }

    // Rewrite the outer edges around the expanded region.
    let last_exit = exit_id(iterations - 1);
    let mut rewritten = Vec::with_capacity(outer_edges.len());
    for mut edge in outer_edges {
        if edge.target.0 == repeat_id {
            let port = edge.target.1;
            match lc_index.get(&port) {
                Some(&dense) => {
                    edge.target = (entry_id(0), dense);
                    rewritten.push(edge);
                }
                // Broadcast feeds were wired directly to the consumers.
                None => continue,
            }
        } else if edge.source.0 == repeat_id {
            let port = edge.source.1;
            let Some(&dense) = lc_index.get(&port) else {
                return Err(CompileError::PortTypeMismatch {
                    node: repeat_id.clone(),
                    port,
                    message: "edge leaves a repeat port the block never produces".into(),
                });
            };
            edge.source = (last_exit.clone(), dense);
            rewritten.push(edge);
        } else {
            rewritten.push(edge);
        }
    }
    rewritten.extend(edges);

    debug!(
        repeat = %repeat_id,
        iterations,
        nodes = nodes.len(),
        "unrolled repeat node"
    );
    Ok((nodes, rewritten))
}

/// Rewrite references to a node's own id inside its nested blocks after the
/// node was given a fresh iteration id.
fn rewrite_self_references(node: &mut NodeDocument, old_id: &str) {
    let new_id = node.id.clone();
    let fix = |edges: &mut Vec<EdgeDocument>| {
        for edge in edges {
            if edge.source.0 == old_id {
                edge.source.0 = new_id.clone();
            }
            if edge.target.0 == old_id {
                edge.target.0 = new_id.clone();
            }
        }
    };
    match &mut node.kind {
        NodeKind::Repeat { block, .. } => fix(&mut block.edges),
        NodeKind::IfThenElse {
            then_block,
            else_block,
            ..
        } => {
            fix(&mut then_block.edges);
            fix(&mut else_block.edges);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leqo_graph::NestedBlock;

    fn repeat_doc(iterations: u32) -> NodeDocument {
        NodeDocument::new(
            "loop",
            NodeKind::Repeat {
                iterations,
                block: NestedBlock {
                    nodes: vec![NodeDocument::new("g", NodeKind::Gate { gate: "h".into() })],
                    edges: vec![
                        EdgeDocument::new(("loop", 0), ("g", 0)),
                        EdgeDocument::new(("g", 0), ("loop", 0)),
                    ],
                },
            },
        )
    }

    fn outer_edges() -> Vec<EdgeDocument> {
        vec![
            EdgeDocument::new(("q0", 0), ("loop", 0)),
            EdgeDocument::new(("loop", 0), ("m", 0)),
        ]
    }

    #[test]
    fn test_three_iterations_materialized() {
        let (nodes, edges) = expand(repeat_doc(3), outer_edges(), 16).unwrap();

        // 3 × (entry + gate + exit)
        assert_eq!(nodes.len(), 9);
        let passthroughs = nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Passthrough))
            .count();
        assert_eq!(passthroughs, 6);

        // the outer producer now feeds iteration 0's entry
        let prefix = stable_prefix("loop");
        assert!(edges.iter().any(|e| {
            e.source == ("q0".to_string(), 0)
                && e.target == (format!("{prefix}_repeat_0_entry"), 0)
        }));
        // the final exit feeds the downstream consumer
        assert!(edges.iter().any(|e| {
            e.source == (format!("{prefix}_repeat_2_exit"), 0) && e.target == ("m".to_string(), 0)
        }));
        // iterations chain exit → entry
        assert!(edges.iter().any(|e| {
            e.source == (format!("{prefix}_repeat_0_exit"), 0)
                && e.target == (format!("{prefix}_repeat_1_entry"), 0)
        }));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(matches!(
            expand(repeat_doc(0), outer_edges(), 16),
            Err(CompileError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_unroll_bound_enforced() {
        assert!(matches!(
            expand(repeat_doc(64), outer_edges(), 16),
            Err(CompileError::UnrollBoundExceeded {
                iterations: 64,
                bound: 16,
                ..
            })
        ));
    }

    #[test]
    fn test_broadcast_input_wired_per_iteration() {
        let node = NodeDocument::new(
            "loop",
            NodeKind::Repeat {
                iterations: 2,
                block: NestedBlock {
                    nodes: vec![NodeDocument::new(
                        "rot",
                        NodeKind::GateWithParam {
                            gate: "rx".into(),
                            parameter: 0.5,
                        },
                    )],
                    edges: vec![
                        EdgeDocument::new(("loop", 0), ("rot", 0)),
                        EdgeDocument::new(("rot", 0), ("loop", 0)),
                        // port 1 never returns: broadcast
                        EdgeDocument::new(("loop", 1), ("rot", 1)),
                    ],
                },
            },
        );
        let outer = vec![
            EdgeDocument::new(("q0", 0), ("loop", 0)),
            EdgeDocument::new(("angle", 0), ("loop", 1)),
        ];
        let (_, edges) = expand(node, outer, 16).unwrap();

        let prefix = stable_prefix("loop");
        for i in 0..2 {
            assert!(edges.iter().any(|e| {
                e.source == ("angle".to_string(), 0)
                    && e.target == (format!("{prefix}_repeat_{i}_rot"), 1)
            }));
        }
        // the broadcast edge into the repeat itself is gone
        assert!(!edges.iter().any(|e| e.target.0 == "loop"));
    }
}
