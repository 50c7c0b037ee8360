//! Ancilla-reuse optimization (S4).
//!
//! Per-node qubit ids are unified along quantum edges into logical qubits
//! (union-find), every logical qubit gets a live interval on the
//! deterministic topological timeline, and the allocator colours the
//! resulting interval graph into the smallest global register.
//!
//! Death rules: a logical qubit marked `@leqo.reusable` dies right after the
//! marking node's rank; everything else is conservatively observable until
//! program end. With optimization disabled every interval covers the whole
//! program, which degenerates into one unique slot per logical qubit.

pub mod allocator;

use petgraph::unionfind::UnionFind;
use rustc_hash::FxHashMap;
use tracing::debug;

use leqo_graph::ProgramGraph;

use crate::error::{CompileError, CompileResult};
use crate::pre::{LocalQubitId, PortValue, PreparedNode};
use allocator::{allocate, Interval};

/// Dense handles for every qubit declared anywhere in the graph, plus the
/// union-find classes joining them along edges.
pub struct LogicalQubits {
    offsets: FxHashMap<String, usize>,
    /// Handle → dense class index (first-seen order).
    class_of_handle: Vec<usize>,
    pub class_count: usize,
}

impl LogicalQubits {
    /// The handle of a node-local qubit id.
    pub fn handle(&self, node: &str, local: LocalQubitId) -> Option<usize> {
        self.offsets.get(node).map(|base| base + local as usize)
    }

    /// The class of a node-local qubit id.
    pub fn class(&self, node: &str, local: LocalQubitId) -> Option<usize> {
        self.handle(node, local)
            .map(|handle| self.class_of_handle[handle])
    }
}

/// Unify qubits along the quantum edges of the graph.
pub fn unify_qubits(
    graph: &ProgramGraph<PreparedNode>,
    order: &[String],
) -> CompileResult<LogicalQubits> {
    let mut offsets = FxHashMap::default();
    let mut total = 0usize;
    for id in order {
        let node = graph.node(id).expect("ordered node exists");
        offsets.insert(id.clone(), total);
        total += node.qubits.total() as usize;
    }

    let mut classes: UnionFind<usize> = UnionFind::new(total);
    for id in order {
        for connection in graph.incoming(id) {
            let source = graph
                .node(&connection.source.0)
                .expect("edge endpoints exist");
            let target = graph.node(id).expect("ordered node exists");

            let output = source.io.outputs.get(&connection.source.1);
            let input = target.io.inputs.get(&connection.target.1);
            let (Some(PortValue::Qubits { ids: out_ids, .. }), Some(PortValue::Qubits { ids: in_ids, .. })) =
                (output, input)
            else {
                continue;
            };

            // Size casting has already reconciled the widths.
            if out_ids.len() != in_ids.len() {
                return Err(CompileError::SizeMismatch {
                    node: id.clone(),
                    port: connection.target.1,
                    declared: in_ids.len() as u32,
                    connected: out_ids.len() as u32,
                });
            }
            let source_base = offsets[&connection.source.0];
            let target_base = offsets[id];
            for (out_id, in_id) in out_ids.iter().zip(in_ids.iter()) {
                classes.union(source_base + *out_id as usize, target_base + *in_id as usize);
            }
        }
    }

    // Dense class numbering in handle order keeps everything reproducible.
    let mut class_index: FxHashMap<usize, usize> = FxHashMap::default();
    let mut class_of_handle = Vec::with_capacity(total);
    for handle in 0..total {
        let root = classes.find(handle);
        let next = class_index.len();
        let class = *class_index.entry(root).or_insert(next);
        class_of_handle.push(class);
    }

    Ok(LogicalQubits {
        offsets,
        class_of_handle,
        class_count: class_index.len(),
    })
}

/// Compute the live interval of every logical-qubit class.
fn live_intervals(
    graph: &ProgramGraph<PreparedNode>,
    order: &[String],
    logical: &LogicalQubits,
) -> Vec<Interval> {
    let mut births = vec![usize::MAX; logical.class_count];
    let mut deaths: Vec<Option<usize>> = vec![None; logical.class_count];

    for (rank, id) in order.iter().enumerate() {
        let node = graph.node(id).expect("ordered node exists");
        for register in node.qubits.registers() {
            for &local in &register.ids {
                let class = logical.class(id, local).expect("declared qubit has a class");
                births[class] = births[class].min(rank);
            }
        }
        // A reusable marking retires the class right after this node.
        for &local in &node.qubits.reusable {
            let class = logical.class(id, local).expect("reusable qubit has a class");
            let death = rank + 1;
            deaths[class] = Some(deaths[class].map_or(death, |d| d.max(death)));
        }
    }

    births
        .into_iter()
        .zip(deaths)
        .map(|(birth, death)| Interval { birth, death })
        .collect()
}

/// The global slot assignment for every node-local qubit.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub register_size: u32,
    node_slots: FxHashMap<String, Vec<u32>>,
}

impl Allocation {
    /// Slots of a node, indexed by local qubit id.
    pub fn slots_of(&self, node: &str) -> &[u32] {
        self.node_slots
            .get(node)
            .map_or(&[], |slots| slots.as_slice())
    }
}

/// Allocate the global register for a prepared graph.
///
/// `pins` force specific node-local qubits onto specific slots (used by
/// if-then-else regions to keep both branches on one interface layout).
pub fn allocate_graph(
    graph: &ProgramGraph<PreparedNode>,
    order: &[String],
    optimize: bool,
    pins: &FxHashMap<(String, LocalQubitId), u32>,
) -> CompileResult<Allocation> {
    let logical = unify_qubits(graph, order)?;

    let intervals = if optimize {
        live_intervals(graph, order, &logical)
    } else {
        vec![Interval::unbounded(0); logical.class_count]
    };

    let mut class_pins: FxHashMap<usize, u32> = FxHashMap::default();
    for ((node, local), &slot) in pins {
        let Some(class) = logical.class(node, *local) else {
            continue;
        };
        if let Some(&existing) = class_pins.get(&class) {
            if existing != slot {
                return Err(CompileError::AllocationInfeasible {
                    message: format!(
                        "logical qubit pinned to both slot {existing} and slot {slot}"
                    ),
                });
            }
        }
        class_pins.insert(class, slot);
    }

    let assignment = allocate(&intervals, &class_pins)
        .map_err(|message| CompileError::AllocationInfeasible { message })?;

    let mut node_slots = FxHashMap::default();
    for id in order {
        let node = graph.node(id).expect("ordered node exists");
        let slots = (0..node.qubits.total())
            .map(|local| {
                let class = logical.class(id, local).expect("declared qubit has a class");
                assignment.slots[class]
            })
            .collect();
        node_slots.insert(id.clone(), slots);
    }

    debug!(
        register_size = assignment.register_size,
        classes = logical.class_count,
        optimize,
        "allocated global register"
    );

    Ok(Allocation {
        register_size: assignment.register_size,
        node_slots,
    })
}
