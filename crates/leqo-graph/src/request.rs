//! Compile request documents.
//!
//! The structures here mirror the editor's wire format: a list of typed
//! nodes, a list of port-to-port edges and a few options. Node payloads are
//! a tagged union on the `type` field.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// A complete compile request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    /// Free-form request metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// The nodes of the program graph, in submission order.
    pub nodes: Vec<NodeDocument>,
    /// The edges connecting node ports.
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
    /// Compilation options.
    #[serde(default)]
    pub options: RequestOptions,
}

impl CompileRequest {
    /// Decode a request from JSON.
    ///
    /// A `type` tag outside the closed node-kind set is reported as
    /// [`RequestError::UnknownNodeKind`] rather than a generic decode error.
    pub fn from_json(text: &str) -> Result<Self, RequestError> {
        serde_json::from_str(text).map_err(|err| {
            let message = err.to_string();
            match extract_unknown_variant(&message) {
                Some(kind) => RequestError::UnknownNodeKind { kind },
                None => RequestError::Malformed(message),
            }
        })
    }
}

/// Pull the variant name out of serde's "unknown variant `x`" message.
fn extract_unknown_variant(message: &str) -> Option<String> {
    let rest = message.strip_prefix("unknown variant `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

/// Free-form metadata attached to a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
}

/// Request-level compilation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Run the ancilla-reuse optimizer. Defaults to true.
    #[serde(default = "default_true")]
    pub optimize: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { optimize: true }
    }
}

fn default_true() -> bool {
    true
}

/// A node of the submitted program graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    /// Stable node identifier, non-empty.
    pub id: String,
    /// Display label, unused by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Input ports that reject widening.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exact_inputs: Vec<u32>,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl NodeDocument {
    /// Create a node with the given id and payload.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            exact_inputs: vec![],
            kind,
        }
    }
}

/// The closed set of node kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeKind {
    /// Fresh qubit allocation in |0⟩.
    Qubit {
        #[serde(default = "default_size")]
        size: u32,
    },

    /// Scratch qubits, eligible for reuse.
    Ancilla {
        #[serde(default = "default_size")]
        size: u32,
    },

    /// Classical constant.
    ClassicalLiteral {
        #[serde(flatten)]
        literal: Literal,
    },

    /// Standard-library gate application.
    Gate { gate: String },

    /// Gate with a single angle/parameter.
    GateWithParam { gate: String, parameter: f64 },

    /// Measurement of selected qubit indices.
    Measurement { indices: Vec<u32> },

    /// Classical arithmetic/bitwise operator; snippet comes from the catalogue.
    Operator { operator: String },

    /// Classical-to-quantum encoder; snippet comes from the catalogue.
    Encoder {
        encoding: String,
        #[serde(default)]
        bounds: u32,
    },

    /// User-supplied OpenQASM implementation.
    Custom { implementation: String },

    /// Bounded loop over an inner subgraph.
    Repeat { iterations: u32, block: NestedBlock },

    /// Conditional execution of one of two inner subgraphs.
    IfThenElse {
        condition: String,
        then_block: NestedBlock,
        else_block: NestedBlock,
    },

    /// Forwards its inputs unchanged; materializes loop plumbing.
    Passthrough,
}

impl NodeKind {
    /// The wire tag of this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Qubit { .. } => "qubit",
            NodeKind::Ancilla { .. } => "ancilla",
            NodeKind::ClassicalLiteral { .. } => "classical-literal",
            NodeKind::Gate { .. } => "gate",
            NodeKind::GateWithParam { .. } => "gate-with-param",
            NodeKind::Measurement { .. } => "measurement",
            NodeKind::Operator { .. } => "operator",
            NodeKind::Encoder { .. } => "encoder",
            NodeKind::Custom { .. } => "custom",
            NodeKind::Repeat { .. } => "repeat",
            NodeKind::IfThenElse { .. } => "if-then-else",
            NodeKind::Passthrough => "passthrough",
        }
    }

    /// Whether this kind is expanded away before preprocessing.
    pub fn is_nested(&self) -> bool {
        matches!(self, NodeKind::Repeat { .. } | NodeKind::IfThenElse { .. })
    }
}

/// Classical literal payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "literalType", rename_all = "camelCase")]
pub enum Literal {
    /// A single bit, 0 or 1.
    Bit { value: u8 },
    /// A boolean.
    Bool { value: bool },
    /// A sized integer.
    Int {
        #[serde(default = "default_bit_size")]
        bit_size: u32,
        value: i64,
    },
    /// A sized float.
    Float {
        #[serde(default = "default_bit_size")]
        bit_size: u32,
        value: f64,
    },
}

/// A subgraph nested inside a control-flow node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedBlock {
    pub nodes: Vec<NodeDocument>,
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
}

/// An edge between two node ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDocument {
    /// Source `(node_id, output_port)`.
    pub source: (String, u32),
    /// Target `(node_id, input_port)`.
    pub target: (String, u32),
    /// Optional value name, referenced by if-then-else conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl EdgeDocument {
    /// Create an edge without an identifier.
    pub fn new(
        source: (impl Into<String>, u32),
        target: (impl Into<String>, u32),
    ) -> Self {
        Self {
            source: (source.0.into(), source.1),
            target: (target.0.into(), target.1),
            identifier: None,
        }
    }
}

fn default_size() -> u32 {
    1
}

fn default_bit_size() -> u32 {
    32
}
