//! Program-graph model for the leqo compile core.
//!
//! Two layers live here:
//!
//! - the **wire documents** ([`CompileRequest`], [`NodeDocument`],
//!   [`EdgeDocument`]) — the structured request the editor submits, a tagged
//!   union of node kinds with kind-specific payloads;
//! - the **graph container** ([`ProgramGraph`]) — a petgraph-backed digraph
//!   keyed by node id, with port-carrying edges and a deterministic
//!   topological order.
//!
//! The pipeline crates put their own payloads into [`ProgramGraph`]; this
//! crate knows nothing about snippets or OpenQASM.

mod error;
mod graph;
mod request;

pub use error::{GraphError, GraphResult, RequestError};
pub use graph::{Connection, ProgramGraph};
pub use request::{
    CompileRequest, EdgeDocument, Literal, Metadata, NestedBlock, NodeDocument, NodeKind,
    RequestOptions,
};
