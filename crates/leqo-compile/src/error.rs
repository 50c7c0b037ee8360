//! Error types for the compilation pipeline.

use leqo_graph::{GraphError, RequestError};
use leqo_qasm3::ParseError;
use thiserror::Error;

/// The ways an annotation can be misused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationErrorKind {
    /// `@leqo.input`/`@leqo.output` without a valid index.
    MissingIndex,
    /// The same index appears on two statements.
    DuplicateIndex,
    /// Indices do not form a contiguous `0..k` range.
    NonContiguousIndex,
    /// The annotation sits on a statement kind it is not allowed on.
    WrongHost,
    /// The same annotation appears twice on one statement.
    MultipleOnStatement,
    /// A qubit belongs to more than one output.
    OutputOverlap,
    /// A reusable alias shares qubits with an output.
    ReusableOverlapsOutput,
}

impl std::fmt::Display for AnnotationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AnnotationErrorKind::MissingIndex => "missing index",
            AnnotationErrorKind::DuplicateIndex => "duplicate index",
            AnnotationErrorKind::NonContiguousIndex => "non-contiguous index",
            AnnotationErrorKind::WrongHost => "wrong host statement",
            AnnotationErrorKind::MultipleOnStatement => "multiple annotations on statement",
            AnnotationErrorKind::OutputOverlap => "output overlap",
            AnnotationErrorKind::ReusableOverlapsOutput => "reusable overlaps output",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during compilation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// The program graph contains a cycle.
    #[error("Program graph contains a cycle through {remaining} node(s)")]
    CyclicGraph { remaining: usize },

    /// An edge references a node that does not exist.
    #[error("Unknown node '{node}' referenced by an edge")]
    UnknownNode { node: String },

    /// Connected ports carry different value types.
    #[error("Port type mismatch at node '{node}' port {port}: {message}")]
    PortTypeMismatch {
        node: String,
        port: u32,
        message: String,
    },

    /// Port linearity violated: wrong fan-in, or quantum fan-out.
    #[error("Port linearity violated at node '{node}' port {port}: {message}")]
    PortFanInViolation {
        node: String,
        port: u32,
        message: String,
    },

    /// A node used a type tag outside the closed set.
    #[error("Unknown node kind '{kind}'")]
    UnknownNodeKind { kind: String },

    /// No implementation could be obtained for a node.
    #[error("No implementation available for node '{node}'")]
    MissingSnippet { node: String },

    /// A node snippet is not valid OpenQASM 3.
    #[error("Failed to parse snippet of node '{node}': {source}")]
    SnippetParseError {
        node: String,
        #[source]
        source: ParseError,
    },

    /// A `@leqo.*` annotation violates the annotation rules.
    #[error("Annotation error in node '{node}' ({kind}): {message}")]
    AnnotationError {
        node: String,
        kind: AnnotationErrorKind,
        message: String,
    },

    /// Connected ports carry different sizes and widening is not possible.
    #[error("Size mismatch at node '{node}' port {port}: declared {declared}, connected {connected}")]
    SizeMismatch {
        node: String,
        port: u32,
        declared: u32,
        connected: u32,
    },

    /// A repeat node exceeds the configured unroll ceiling.
    #[error("Repeat node '{node}' requests {iterations} iterations, exceeding the bound of {bound}")]
    UnrollBoundExceeded {
        node: String,
        iterations: u32,
        bound: u32,
    },

    /// The slot allocator could not satisfy the pinning constraints.
    #[error("Qubit allocation infeasible: {message}")]
    AllocationInfeasible { message: String },

    /// The merged program failed the postprocessing self-check.
    #[error("Postprocessing failed on the merged program: {message}")]
    PostprocessError { message: String },

    /// The request was cancelled cooperatively.
    #[error("Compilation was cancelled")]
    Cancelled,

    /// The request exceeded its deadline.
    #[error("Compilation timed out")]
    Timeout,

    /// The request document itself is malformed.
    #[error("Malformed compile request: {0}")]
    MalformedRequest(String),
}

impl CompileError {
    /// The offending node, when known.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            CompileError::UnknownNode { node }
            | CompileError::PortTypeMismatch { node, .. }
            | CompileError::PortFanInViolation { node, .. }
            | CompileError::MissingSnippet { node }
            | CompileError::SnippetParseError { node, .. }
            | CompileError::AnnotationError { node, .. }
            | CompileError::SizeMismatch { node, .. }
            | CompileError::UnrollBoundExceeded { node, .. } => Some(node),
            _ => None,
        }
    }
}

impl From<GraphError> for CompileError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::DuplicateNode(node) => {
                CompileError::MalformedRequest(format!("duplicate node id '{node}'"))
            }
            GraphError::UnknownNode(node) => CompileError::UnknownNode { node },
            GraphError::PortFanIn { node, port, count } => CompileError::PortFanInViolation {
                node,
                port,
                message: format!("{count} incoming edges, expected exactly 1"),
            },
            GraphError::Cyclic(remaining) => CompileError::CyclicGraph { remaining },
            _ => CompileError::MalformedRequest(err.to_string()),
        }
    }
}

impl From<RequestError> for CompileError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::UnknownNodeKind { kind } => CompileError::UnknownNodeKind { kind },
            RequestError::Malformed(message) => CompileError::MalformedRequest(message),
            _ => CompileError::MalformedRequest(err.to_string()),
        }
    }
}

/// Result type for pipeline operations.
pub type CompileResult<T> = Result<T, CompileError>;
