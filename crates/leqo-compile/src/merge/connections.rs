//! Classical connection resolution.
//!
//! Quantum edges are resolved through the global register; classical edges
//! connect by name: the target's input declaration is replaced by an alias
//! to the source's output alias, which stays in scope because snippets are
//! spliced into one program.

use rustc_hash::FxHashMap;

use leqo_graph::ProgramGraph;

use crate::pre::{PortValue, PreparedNode};

/// Per-node map from classical input declaration name to the upstream
/// output name it aliases.
pub type ClassicalConnections = FxHashMap<String, FxHashMap<String, String>>;

/// Resolve every classical edge of the graph.
pub fn classical_connections(graph: &ProgramGraph<PreparedNode>) -> ClassicalConnections {
    let mut connections: ClassicalConnections = FxHashMap::default();

    for id in graph.node_ids() {
        let Some(target) = graph.node(id) else {
            continue;
        };
        for connection in graph.incoming(id) {
            let Some(source) = graph.node(&connection.source.0) else {
                continue;
            };
            let output = source.io.outputs.get(&connection.source.1);
            let input = target.io.inputs.get(&connection.target.1);

            if let (
                Some(PortValue::Classical {
                    name: output_name, ..
                }),
                Some(PortValue::Classical {
                    name: input_name, ..
                }),
            ) = (output, input)
            {
                connections
                    .entry(id.to_string())
                    .or_default()
                    .insert(input_name.clone(), output_name.clone());
            }
        }
    }

    connections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pre::preprocess;
    use leqo_graph::Connection;

    #[test]
    fn test_classical_edge_resolved_by_name() {
        let mut graph = ProgramGraph::new();
        let literal = preprocess(
            "lit",
            leqo_qasm3::parse("int[32] value = 5;\n@leqo.output 0\nlet out = value;").unwrap(),
        )
        .unwrap();
        let consumer = preprocess(
            "op",
            leqo_qasm3::parse("@leqo.input 0\nint[32] n;").unwrap(),
        )
        .unwrap();
        let consumer_input = match &consumer.io.inputs[&0] {
            PortValue::Classical { name, .. } => name.clone(),
            other => panic!("expected classical input, got {other:?}"),
        };
        let literal_output = match &literal.io.outputs[&0] {
            PortValue::Classical { name, .. } => name.clone(),
            other => panic!("expected classical output, got {other:?}"),
        };

        graph.add_node("lit", literal).unwrap();
        graph.add_node("op", consumer).unwrap();
        graph
            .add_edge(Connection::new(("lit", 0), ("op", 0)))
            .unwrap();

        let connections = classical_connections(&graph);
        assert_eq!(connections["op"][&consumer_input], literal_output);
    }
}
