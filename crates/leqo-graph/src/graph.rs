//! Program-graph container.
//!
//! Wraps a `petgraph` digraph with id-keyed side tables, the same shape the
//! rest of the pipeline expects: nodes carry an arbitrary payload, edges
//! carry port connections, and the topological order is deterministic
//! (Kahn's algorithm with a lexicographic tie-break on node id).

use std::collections::BinaryHeap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::FxHashMap;

use crate::error::{GraphError, GraphResult};

/// A port-to-port connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Source node id and output port.
    pub source: (String, u32),
    /// Target node id and input port.
    pub target: (String, u32),
    /// Optional value name for condition references.
    pub identifier: Option<String>,
}

impl Connection {
    /// Create a connection without an identifier.
    pub fn new(source: (impl Into<String>, u32), target: (impl Into<String>, u32)) -> Self {
        Self {
            source: (source.0.into(), source.1),
            target: (target.0.into(), target.1),
            identifier: None,
        }
    }
}

/// Directed program graph with payloads of type `N` keyed by node id.
pub struct ProgramGraph<N> {
    graph: DiGraph<String, Connection>,
    indices: FxHashMap<String, NodeIndex>,
    data: FxHashMap<String, N>,
}

impl<N> Default for ProgramGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> ProgramGraph<N> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::default(),
            indices: FxHashMap::default(),
            data: FxHashMap::default(),
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether a node id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.indices.contains_key(id)
    }

    /// Add a node with its payload.
    pub fn add_node(&mut self, id: impl Into<String>, payload: N) -> GraphResult<()> {
        let id = id.into();
        if self.indices.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        let index = self.graph.add_node(id.clone());
        self.indices.insert(id.clone(), index);
        self.data.insert(id, payload);
        Ok(())
    }

    /// Add an edge; both endpoints must exist.
    pub fn add_edge(&mut self, connection: Connection) -> GraphResult<()> {
        let source = *self
            .indices
            .get(&connection.source.0)
            .ok_or_else(|| GraphError::UnknownNode(connection.source.0.clone()))?;
        let target = *self
            .indices
            .get(&connection.target.0)
            .ok_or_else(|| GraphError::UnknownNode(connection.target.0.clone()))?;
        self.graph.add_edge(source, target, connection);
        Ok(())
    }

    /// Payload of a node.
    pub fn node(&self, id: &str) -> Option<&N> {
        self.data.get(id)
    }

    /// Mutable payload of a node.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut N> {
        self.data.get_mut(id)
    }

    /// Iterate over node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    /// All edges entering a node, in insertion order.
    pub fn incoming(&self, id: &str) -> Vec<&Connection> {
        self.edges_directed(id, Direction::Incoming)
    }

    /// All edges leaving a node, in insertion order.
    pub fn outgoing(&self, id: &str) -> Vec<&Connection> {
        self.edges_directed(id, Direction::Outgoing)
    }

    fn edges_directed(&self, id: &str, direction: Direction) -> Vec<&Connection> {
        let Some(&index) = self.indices.get(id) else {
            return vec![];
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, direction)
            .map(|e| (e.id(), e.weight()))
            .collect();
        // petgraph iterates most-recent first; restore insertion order.
        edges.sort_by_key(|(edge_id, _)| *edge_id);
        edges.into_iter().map(|(_, w)| w).collect()
    }

    /// The unique edge into a given input port, if any.
    pub fn edge_into_port(&self, id: &str, port: u32) -> Option<&Connection> {
        self.incoming(id)
            .into_iter()
            .find(|c| c.target.1 == port)
    }

    /// Validate that every input port has exactly one incoming edge.
    pub fn check_port_fan_in(&self) -> GraphResult<()> {
        for id in self.node_ids() {
            let mut counts: FxHashMap<u32, usize> = FxHashMap::default();
            for connection in self.incoming(id) {
                *counts.entry(connection.target.1).or_default() += 1;
            }
            let mut ports: Vec<_> = counts.into_iter().collect();
            ports.sort_unstable();
            for (port, count) in ports {
                if count != 1 {
                    return Err(GraphError::PortFanIn {
                        node: id.to_string(),
                        port,
                        count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Deterministic topological order of node ids.
    ///
    /// Kahn's algorithm; among ready nodes the lexicographically smallest id
    /// is emitted first, so the order depends only on the graph shape.
    pub fn topological_order(&self) -> GraphResult<Vec<String>> {
        let mut in_degree: FxHashMap<NodeIndex, usize> = FxHashMap::default();
        for index in self.graph.node_indices() {
            in_degree.insert(
                index,
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count(),
            );
        }

        // Min-heap on the node id.
        let mut ready: BinaryHeap<std::cmp::Reverse<(String, NodeIndex)>> = self
            .graph
            .node_indices()
            .filter(|index| in_degree[index] == 0)
            .map(|index| std::cmp::Reverse((self.graph[index].clone(), index)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(std::cmp::Reverse((id, index))) = ready.pop() {
            order.push(id);
            for succ in self.graph.neighbors_directed(index, Direction::Outgoing) {
                let degree = in_degree.get_mut(&succ).expect("node has a degree entry");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(std::cmp::Reverse((self.graph[succ].clone(), succ)));
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(GraphError::Cyclic(self.graph.node_count() - order.len()));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> ProgramGraph<u32> {
        let mut graph = ProgramGraph::new();
        graph.add_node("a", 0).unwrap();
        graph.add_node("d", 3).unwrap();
        graph.add_node("c", 2).unwrap();
        graph.add_node("b", 1).unwrap();
        graph.add_edge(Connection::new(("a", 0), ("b", 0))).unwrap();
        graph.add_edge(Connection::new(("a", 1), ("c", 0))).unwrap();
        graph.add_edge(Connection::new(("b", 0), ("d", 0))).unwrap();
        graph.add_edge(Connection::new(("c", 0), ("d", 1))).unwrap();
        graph
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph: ProgramGraph<()> = ProgramGraph::new();
        graph.add_node("x", ()).unwrap();
        assert!(matches!(
            graph.add_node("x", ()),
            Err(GraphError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_edge_to_unknown_node_rejected() {
        let mut graph: ProgramGraph<()> = ProgramGraph::new();
        graph.add_node("x", ()).unwrap();
        assert!(matches!(
            graph.add_edge(Connection::new(("x", 0), ("ghost", 0))),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_topological_order_deterministic() {
        let graph = diamond();
        // b and c are both ready after a; the tie breaks lexicographically.
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph: ProgramGraph<()> = ProgramGraph::new();
        graph.add_node("a", ()).unwrap();
        graph.add_node("b", ()).unwrap();
        graph.add_edge(Connection::new(("a", 0), ("b", 0))).unwrap();
        graph.add_edge(Connection::new(("b", 0), ("a", 0))).unwrap();
        assert!(matches!(
            graph.topological_order(),
            Err(GraphError::Cyclic(2))
        ));
    }

    #[test]
    fn test_port_fan_in_violation() {
        let mut graph: ProgramGraph<()> = ProgramGraph::new();
        graph.add_node("a", ()).unwrap();
        graph.add_node("b", ()).unwrap();
        graph.add_node("c", ()).unwrap();
        graph.add_edge(Connection::new(("a", 0), ("c", 0))).unwrap();
        graph.add_edge(Connection::new(("b", 0), ("c", 0))).unwrap();
        assert!(matches!(
            graph.check_port_fan_in(),
            Err(GraphError::PortFanIn { port: 0, count: 2, .. })
        ));
    }

    #[test]
    fn test_edge_into_port() {
        let graph = diamond();
        let edge = graph.edge_into_port("d", 1).unwrap();
        assert_eq!(edge.source, ("c".to_string(), 0));
        assert!(graph.edge_into_port("d", 7).is_none());
    }
}
