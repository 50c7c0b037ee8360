//! Error types for the graph crate.

use thiserror::Error;

/// Errors that can occur while building or traversing a program graph.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// A node id was declared twice.
    #[error("Duplicate node id '{0}'")]
    DuplicateNode(String),

    /// An edge references a node that does not exist.
    #[error("Unknown node '{0}' referenced by an edge")]
    UnknownNode(String),

    /// An input port has more than one incoming edge.
    #[error("Port {port} of node '{node}' has {count} incoming edges, expected exactly 1")]
    PortFanIn {
        node: String,
        port: u32,
        count: usize,
    },

    /// The graph contains a cycle.
    #[error("Program graph contains a cycle through {0} node(s)")]
    Cyclic(usize),
}

/// Errors that can occur while decoding a compile request document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    /// A node used a type tag outside the closed set.
    #[error("Unknown node kind '{kind}'")]
    UnknownNodeKind { kind: String },

    /// The document is not a valid compile request.
    #[error("Malformed compile request: {0}")]
    Malformed(String),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
