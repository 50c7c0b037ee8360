//! Nested expansion (S2).
//!
//! Repeat nodes are structurally unrolled into per-iteration copies of
//! their inner subgraph, threaded through passthrough entry/exit nodes.
//! If-then-else nodes are kept in the flat graph and fused at preparation
//! time: each branch compiles independently into a region fragment and the
//! fragments are wrapped in one branching statement.

pub mod if_then_else;
pub mod repeat;

use leqo_graph::{EdgeDocument, NodeDocument, NodeKind};

use crate::error::CompileResult;

/// Expand every repeat node (recursively) until the graph is structurally
/// flat. If-then-else nodes survive flattening; they expand during
/// preparation.
pub fn flatten(
    mut nodes: Vec<NodeDocument>,
    mut edges: Vec<EdgeDocument>,
    unroll_bound: u32,
) -> CompileResult<(Vec<NodeDocument>, Vec<EdgeDocument>)> {
    while let Some(position) = nodes
        .iter()
        .position(|node| matches!(node.kind, NodeKind::Repeat { .. }))
    {
        let node = nodes.remove(position);
        let (mut new_nodes, new_edges) = repeat::expand(node, std::mem::take(&mut edges), unroll_bound)?;
        nodes.append(&mut new_nodes);
        edges = new_edges;
    }
    Ok((nodes, edges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leqo_graph::NestedBlock;

    #[test]
    fn test_flatten_without_nesting_is_identity() {
        let nodes = vec![
            NodeDocument::new("q0", NodeKind::Qubit { size: 1 }),
            NodeDocument::new("h0", NodeKind::Gate { gate: "h".into() }),
        ];
        let edges = vec![EdgeDocument::new(("q0", 0), ("h0", 0))];
        let (nodes, edges) = flatten(nodes.clone(), edges.clone(), 16).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_nested_repeat_fully_expanded() {
        // outer repeat(2) { inner repeat(2) { h } }
        let inner = NodeDocument::new(
            "inner",
            NodeKind::Repeat {
                iterations: 2,
                block: NestedBlock {
                    nodes: vec![NodeDocument::new("h", NodeKind::Gate { gate: "h".into() })],
                    edges: vec![
                        EdgeDocument::new(("inner", 0), ("h", 0)),
                        EdgeDocument::new(("h", 0), ("inner", 0)),
                    ],
                },
            },
        );
        let outer = NodeDocument::new(
            "outer",
            NodeKind::Repeat {
                iterations: 2,
                block: NestedBlock {
                    nodes: vec![inner],
                    edges: vec![
                        EdgeDocument::new(("outer", 0), ("inner", 0)),
                        EdgeDocument::new(("inner", 0), ("outer", 0)),
                    ],
                },
            },
        );
        let nodes = vec![NodeDocument::new("q0", NodeKind::Qubit { size: 1 }), outer];
        let edges = vec![EdgeDocument::new(("q0", 0), ("outer", 0))];

        let (nodes, _) = flatten(nodes, edges, 16).unwrap();
        assert!(nodes
            .iter()
            .all(|node| !matches!(node.kind, NodeKind::Repeat { .. })));
        // 2 outer iterations × (entry + exit + 2 inner iterations × (entry + exit + h))
        let h_count = nodes
            .iter()
            .filter(|node| matches!(&node.kind, NodeKind::Gate { gate } if gate == "h"))
            .count();
        assert_eq!(h_count, 4);
    }
}
