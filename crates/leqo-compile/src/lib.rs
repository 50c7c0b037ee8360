//! Graph-to-OpenQASM compilation pipeline.
//!
//! This crate turns a program graph submitted by the low-code editor into
//! one self-contained OpenQASM 3.1 program. The pipeline runs in fixed
//! stages over per-request state:
//!
//! ```text
//! CompileRequest
//!       │
//!       ▼
//! ┌──────────────┐
//! │   Pipeline   │ ◄── Enricher (snippet lookups), CancelFlag
//! └──────────────┘
//!       │
//!       ├── ingest & nested expansion   (validate, unroll repeats)
//!       ├── snippet acquisition         (enricher, once per node)
//!       ├── preprocessing               (rename, inline, IO-parse, cast)
//!       ├── ancilla-reuse optimization  (live intervals, slot colouring)
//!       ├── merging                     (one global register, spliced AST)
//!       └── postprocessing              (includes, gate folding, emit)
//!       │
//!       ▼
//! CompileOutput (OpenQASM 3.1 text + diagnostics)
//! ```
//!
//! # Example
//!
//! ```rust
//! use leqo_compile::{BuiltinEnricher, Pipeline};
//! use leqo_graph::CompileRequest;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let request = CompileRequest::from_json(r#"{
//!     "nodes": [
//!         {"id": "q0", "type": "qubit", "size": 1},
//!         {"id": "h0", "type": "gate", "gate": "h"}
//!     ],
//!     "edges": [{"source": ["q0", 0], "target": ["h0", 0]}]
//! }"#).unwrap();
//!
//! let enricher = BuiltinEnricher;
//! let output = Pipeline::new(&enricher).compile(&request).await.unwrap();
//! assert!(output.program.contains("qubit[1] leqo_reg;"));
//! # });
//! ```
//!
//! A request compiles sequentially on one task; the only suspension points
//! are enricher lookups. Cancellation is cooperative through [`CancelFlag`],
//! observed between stages and after each lookup.

pub mod diagnostics;
pub mod enricher;
pub mod error;
pub mod merge;
pub mod nested;
pub mod optimize;
pub mod post;
pub mod pre;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, instrument};

use leqo_graph::{CompileRequest, Connection, EdgeDocument, NodeDocument, NodeKind, ProgramGraph};

pub use diagnostics::{Diagnostic, Severity};
pub use enricher::{BuiltinEnricher, Enricher, NodeDescriptor};
pub use error::{AnnotationErrorKind, CompileError, CompileResult};

use enricher::passthrough_program;
use nested::if_then_else::{self, BranchArtifacts};
use optimize::allocate_graph;
use pre::renaming::stable_prefix;
use pre::size_casting::{size_cast, RequestedType};
use pre::{PortValue, PreparedNode};

/// A successful compilation: the merged program and per-node warnings.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The merged OpenQASM 3.1 program.
    pub program: String,
    /// Non-fatal diagnostics collected along the way.
    pub diagnostics: Vec<Diagnostic>,
}

/// Cooperative cancellation flag shared between the pipeline and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a fresh, un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the pipeline observes it at its next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn checkpoint(&self) -> CompileResult<()> {
        if self.is_cancelled() {
            return Err(CompileError::Cancelled);
        }
        Ok(())
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ceiling on `repeat` iteration counts.
    pub max_unroll_iterations: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_unroll_iterations: 1024,
        }
    }
}

/// The compilation pipeline. Holds no per-request state; one instance can
/// serve many sequential requests.
pub struct Pipeline<'a> {
    enricher: &'a dyn Enricher,
    config: PipelineConfig,
    cancel: CancelFlag,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline over the given enricher.
    pub fn new(enricher: &'a dyn Enricher) -> Self {
        Self {
            enricher,
            config: PipelineConfig::default(),
            cancel: CancelFlag::new(),
        }
    }

    /// Override the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The flag callers can use to cancel an in-flight compile.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Compile a request into one merged program.
    #[instrument(skip_all, fields(nodes = request.nodes.len(), edges = request.edges.len()))]
    pub async fn compile(&self, request: &CompileRequest) -> CompileResult<CompileOutput> {
        info!("starting compilation");
        self.cancel.checkpoint()?;

        let optimize = request.options.optimize;
        let (graph, order) = self
            .prepare_all(request.nodes.clone(), request.edges.clone(), optimize)
            .await?;

        self.cancel.checkpoint()?;
        let allocation = allocate_graph(&graph, &order, optimize, &FxHashMap::default())?;

        self.cancel.checkpoint()?;
        let program = merge::merge_graph(&graph, &order, &allocation);

        self.cancel.checkpoint()?;
        let (_, text) = post::postprocess(program)?;

        let mut diagnostics = Vec::new();
        for id in &order {
            let node = graph.node(id).expect("ordered node exists");
            diagnostics.extend(node.warnings.iter().cloned());
            if !optimize && !node.qubits.reusable.is_empty() {
                diagnostics.push(Diagnostic::info(
                    id.clone(),
                    "reusable aliases have no effect with optimization disabled",
                ));
            }
        }

        info!(
            register_size = allocation.register_size,
            warnings = diagnostics.len(),
            "compilation finished"
        );
        Ok(CompileOutput {
            program: text,
            diagnostics,
        })
    }

    /// Compile with a deadline; on expiry the request is cancelled and
    /// reported as [`CompileError::Timeout`].
    pub async fn compile_with_timeout(
        &self,
        request: &CompileRequest,
        deadline: Duration,
    ) -> CompileResult<CompileOutput> {
        match tokio::time::timeout(deadline, self.compile(request)).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel.cancel();
                Err(CompileError::Timeout)
            }
        }
    }

    /// Ingest, expand and prepare a set of documents into a graph of
    /// prepared nodes plus its deterministic topological order.
    async fn prepare_all(
        &self,
        documents: Vec<NodeDocument>,
        edges: Vec<EdgeDocument>,
        optimize: bool,
    ) -> CompileResult<(ProgramGraph<PreparedNode>, Vec<String>)> {
        let (documents, edges) =
            nested::flatten(documents, edges, self.config.max_unroll_iterations)?;

        // Structural validation on a payload-free shell.
        let mut shell: ProgramGraph<()> = ProgramGraph::new();
        for document in &documents {
            if document.id.is_empty() {
                return Err(CompileError::MalformedRequest(
                    "node with empty id".to_string(),
                ));
            }
            shell.add_node(&document.id, ())?;
        }
        for edge in &edges {
            shell.add_edge(edge_connection(edge))?;
        }
        shell.check_port_fan_in()?;
        let order = shell.topological_order()?;

        let documents_by_id: FxHashMap<String, NodeDocument> = documents
            .iter()
            .map(|document| (document.id.clone(), document.clone()))
            .collect();

        // Prepare in topological order so upstream bindings are available.
        let mut prepared_by_id: FxHashMap<String, PreparedNode> = FxHashMap::default();
        for id in &order {
            self.cancel.checkpoint()?;
            let document = &documents_by_id[id];

            let mut requested: BTreeMap<u32, RequestedType> = BTreeMap::new();
            let mut identifiers: FxHashMap<String, u32> = FxHashMap::default();
            for connection in shell.incoming(id) {
                let source = prepared_by_id
                    .get(&connection.source.0)
                    .expect("topological order prepares sources first");
                let Some(output) = source.io.outputs.get(&connection.source.1) else {
                    return Err(CompileError::AnnotationError {
                        node: connection.source.0.clone(),
                        kind: AnnotationErrorKind::MissingIndex,
                        message: format!(
                            "an edge leaves output {}, but no @leqo.output {} exists",
                            connection.source.1, connection.source.1
                        ),
                    });
                };
                requested.insert(connection.target.1, RequestedType::of_output(output));
                if let Some(identifier) = &connection.identifier {
                    identifiers.insert(identifier.clone(), connection.target.1);
                }
            }

            let program = self
                .obtain_program(document, &requested, &identifiers, optimize)
                .await?;
            self.cancel.checkpoint()?;

            let mut prepared = pre::preprocess(id, program)?;
            let exact: FxHashSet<u32> = document.exact_inputs.iter().copied().collect();
            size_cast(&mut prepared, &requested, &exact)?;

            for &port in prepared.io.inputs.keys() {
                if !requested.contains_key(&port) {
                    prepared.warnings.push(Diagnostic::warning(
                        id.clone(),
                        format!("input port {port} is not connected"),
                    ));
                }
            }

            prepared_by_id.insert(id.clone(), prepared);
        }

        // Quantum values are linear: an output feeds at most one sink.
        for id in &order {
            let node = &prepared_by_id[id];
            let mut sinks: FxHashMap<u32, usize> = FxHashMap::default();
            for connection in shell.outgoing(id) {
                if matches!(
                    node.io.outputs.get(&connection.source.1),
                    Some(PortValue::Qubits { .. })
                ) {
                    *sinks.entry(connection.source.1).or_default() += 1;
                }
            }
            let mut ports: Vec<_> = sinks.into_iter().collect();
            ports.sort_unstable();
            for (port, count) in ports {
                if count > 1 {
                    return Err(CompileError::PortFanInViolation {
                        node: id.clone(),
                        port,
                        message: format!("quantum output feeds {count} sinks"),
                    });
                }
            }
        }

        let mut graph: ProgramGraph<PreparedNode> = ProgramGraph::new();
        for document in &documents {
            let prepared = prepared_by_id
                .remove(&document.id)
                .expect("every document was prepared");
            graph.add_node(&document.id, prepared)?;
        }
        for edge in &edges {
            graph.add_edge(edge_connection(edge))?;
        }

        debug!(nodes = order.len(), "prepared flat graph");
        Ok((graph, order))
    }

    /// Obtain the snippet AST for one node.
    async fn obtain_program(
        &self,
        document: &NodeDocument,
        requested: &BTreeMap<u32, RequestedType>,
        identifiers: &FxHashMap<String, u32>,
        optimize: bool,
    ) -> CompileResult<leqo_qasm3::ast::Program> {
        match &document.kind {
            NodeKind::Custom { implementation } => {
                leqo_qasm3::parse(implementation).map_err(|source| {
                    CompileError::SnippetParseError {
                        node: document.id.clone(),
                        source,
                    }
                })
            }

            NodeKind::IfThenElse {
                condition,
                then_block,
                else_block,
            } => {
                self.fuse_if_then_else(
                    &document.id,
                    condition,
                    then_block,
                    else_block,
                    requested,
                    identifiers,
                    optimize,
                )
                .await
            }

            NodeKind::Repeat { .. } => Err(CompileError::MalformedRequest(format!(
                "repeat node '{}' survived flattening",
                document.id
            ))),

            kind => {
                let descriptor = NodeDescriptor {
                    id: document.id.clone(),
                    kind: kind.clone(),
                    requested_inputs: requested.clone(),
                };
                match self.enricher.lookup(&descriptor).await? {
                    Some(text) => leqo_qasm3::parse(&text).map_err(|source| {
                        CompileError::SnippetParseError {
                            node: document.id.clone(),
                            source,
                        }
                    }),
                    None => Err(CompileError::MissingSnippet {
                        node: document.id.clone(),
                    }),
                }
            }
        }
    }

    /// Compile both branches of an if-then-else and fuse them into one
    /// implementation snippet.
    #[allow(clippy::too_many_arguments)]
    fn fuse_if_then_else<'b>(
        &'b self,
        ite_id: &'b str,
        condition: &'b str,
        then_block: &'b leqo_graph::NestedBlock,
        else_block: &'b leqo_graph::NestedBlock,
        requested: &'b BTreeMap<u32, RequestedType>,
        identifiers: &'b FxHashMap<String, u32>,
        optimize: bool,
    ) -> Pin<Box<dyn Future<Output = CompileResult<leqo_qasm3::ast::Program>> + Send + 'b>> {
        Box::pin(async move {
            let prefix = stable_prefix(ite_id);
            let if_id = format!("{prefix}_if");
            let endif_id = format!("{prefix}_endif");
            let pass_source = leqo_qasm3::emit(&passthrough_program(requested));

            let mut branches = Vec::with_capacity(2);
            for block in [then_block, else_block] {
                let (nodes, edges) =
                    if_then_else::branch_documents(ite_id, block, &pass_source, &if_id, &endif_id);
                let (graph, order) = self.prepare_all(nodes, edges, optimize).await?;

                // Pin the interface qubits to the first slots, declaration
                // order, so both branches agree on the layout.
                let interface = graph
                    .node(&if_id)
                    .expect("branch contains the if node")
                    .qubits
                    .total();
                let pins: FxHashMap<(String, u32), u32> = (0..interface)
                    .map(|local| ((if_id.clone(), local), local))
                    .collect();
                let allocation = allocate_graph(&graph, &order, optimize, &pins)?;

                branches.push(BranchArtifacts {
                    graph,
                    order,
                    allocation,
                });
            }
            let else_branch = branches.pop().expect("two branches were compiled");
            let then_branch = branches.pop().expect("two branches were compiled");

            let mut condition_expr = leqo_qasm3::parse_expression(condition).map_err(|source| {
                CompileError::SnippetParseError {
                    node: ite_id.to_string(),
                    source,
                }
            })?;
            let if_node = then_branch
                .graph
                .node(&if_id)
                .expect("branch contains the if node");
            condition_expr.rename_identifiers(&|name| {
                let port = identifiers.get(name)?;
                match if_node.io.inputs.get(port) {
                    Some(PortValue::Qubits { name, .. })
                    | Some(PortValue::Classical { name, .. }) => Some(name.clone()),
                    None => None,
                }
            });

            if_then_else::fuse(
                ite_id,
                &if_id,
                &endif_id,
                &then_branch,
                &else_branch,
                condition_expr,
                &prefix,
            )
        })
    }
}

fn edge_connection(edge: &EdgeDocument) -> Connection {
    Connection {
        source: edge.source.clone(),
        target: edge.target.clone(),
        identifier: edge.identifier.clone(),
    }
}

/// Compile a request with the builtin enricher and default configuration.
pub async fn compile_request(request: &CompileRequest) -> CompileResult<CompileOutput> {
    let enricher = BuiltinEnricher;
    Pipeline::new(&enricher).compile(request).await
}
