//! # Circuit graph
//!
//! A combinational circuit is a directed graph of [`Gate`]s where an edge
//! carries a signal from a producer to a consumer. Nodes live in a petgraph
//! `StableDiGraph` arena addressed by dense [`NodeIndex`]es, with an
//! insertion-ordered id index on top, so cloning a circuit is a plain deep
//! copy and reachability queries stay cheap.
//!
//! Structural invariants checked by [`CircuitGraph::is_valid`]:
//!
//! 1. the graph is acyclic;
//! 2. NOT, BUF and OUTPUT gates have exactly one predecessor;
//! 3. AND/OR/XOR/NAND/NOR/XNOR gates have at least two predecessors;
//! 4. every OUTPUT is reachable from at least one INPUT.
//!
//! ## Example
//!
//! ```rust
//! use circuit_evo::{CircuitGraph, Gate, GateKind};
//!
//! let mut c = CircuitGraph::new();
//! c.add_gate(Gate::input("A")).unwrap();
//! c.add_gate(Gate::input("B")).unwrap();
//! c.add_gate(Gate::new("G1", GateKind::Or)).unwrap();
//! c.add_gate(Gate::output("OUT")).unwrap();
//! c.connect("A", "G1").unwrap();
//! c.connect("B", "G1").unwrap();
//! c.connect("G1", "OUT").unwrap();
//! assert!(c.is_valid());
//!
//! // Removing G1 would strand OUT, so the removal is rolled back.
//! assert!(!c.remove_gate("G1").unwrap());
//! assert!(c.contains("G1"));
//! ```

use crate::error::CircuitError;
use crate::gate::{Gate, GateKind};
use blake3::Hasher;
use indexmap::IndexMap;
use petgraph::algo::{has_path_connecting, is_cyclic_directed, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, NodeIndexable};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hex-encoded BLAKE3 digest of a circuit's canonical description.
pub type CircuitHash = String;

/// A combinational circuit as a DAG of gates.
#[derive(Debug, Clone, Default)]
pub struct CircuitGraph {
    graph: StableDiGraph<Gate, ()>,
    index: IndexMap<String, NodeIndex>,
}

/// Serializable description of a circuit (gates in insertion order, edges as id pairs).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitDescription {
    pub gates: Vec<GateEntry>,
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl CircuitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a gate. Fails if the id is already taken.
    pub fn add_gate(&mut self, gate: Gate) -> Result<(), CircuitError> {
        if self.index.contains_key(&gate.id) {
            return Err(CircuitError::DuplicateGateId(gate.id));
        }
        self.push_gate(gate);
        Ok(())
    }

    /// Adds the edge `from -> to`.
    ///
    /// Cycles are not checked here; they surface in [`is_valid`](Self::is_valid)
    /// and evaluation. Use [`connect_acyclic`](Self::connect_acyclic) for a
    /// checked insert. Connecting an existing edge is a no-op.
    pub fn connect(&mut self, from_id: &str, to_id: &str) -> Result<(), CircuitError> {
        let from = self.require(from_id)?;
        let to = self.require(to_id)?;
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    /// Adds `from -> to` unless `to` already reaches `from`.
    pub fn connect_acyclic(&mut self, from_id: &str, to_id: &str) -> Result<(), CircuitError> {
        let from = self.require(from_id)?;
        let to = self.require(to_id)?;
        if has_path_connecting(&self.graph, to, from, None) {
            return Err(CircuitError::WouldCreateCycle {
                from: from_id.to_string(),
                to: to_id.to_string(),
            });
        }
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    /// Removes the edge `from -> to`; `UnknownEdge` if there is none.
    pub fn disconnect(&mut self, from_id: &str, to_id: &str) -> Result<(), CircuitError> {
        let from = self.require(from_id)?;
        let to = self.require(to_id)?;
        let edge = self
            .graph
            .find_edge(from, to)
            .ok_or_else(|| CircuitError::UnknownEdge {
                from: from_id.to_string(),
                to: to_id.to_string(),
            })?;
        self.graph.remove_edge(edge);
        Ok(())
    }

    /// Removes a gate and its incident edges, transactionally.
    ///
    /// Returns `Ok(false)` and leaves the circuit untouched when the result
    /// would not pass [`is_valid`](Self::is_valid).
    pub fn remove_gate(&mut self, gate_id: &str) -> Result<bool, CircuitError> {
        let ix = self.require(gate_id)?;
        let snapshot = self.clone();
        self.graph.remove_node(ix);
        self.index.shift_remove(gate_id);
        if !self.is_valid() {
            debug!(gate = gate_id, "removal breaks circuit invariants, rolled back");
            *self = snapshot;
            return Ok(false);
        }
        Ok(true)
    }

    /// Checks the four structural invariants.
    pub fn is_valid(&self) -> bool {
        if is_cyclic_directed(&self.graph) {
            return false;
        }
        for ix in self.index.values() {
            let kind = self.graph[*ix].kind;
            let fan_in = self.in_degree_of(*ix);
            if kind.is_unary() && fan_in != 1 {
                return false;
            }
            if kind.is_binary() && fan_in < 2 {
                return false;
            }
        }
        self.outputs_reachable()
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    fn outputs_reachable(&self) -> bool {
        let mut dfs = Dfs::empty(&self.graph);
        dfs.stack.extend(self.indices_of(GateKind::Input));
        let mut reached = vec![false; self.graph.node_bound()];
        while let Some(ix) = dfs.next(&self.graph) {
            reached[ix.index()] = true;
        }
        self.indices_of(GateKind::Output)
            .all(|ix| reached[ix.index()])
    }

    /// Any valid producer-before-consumer order of the gates.
    pub fn topological_order(&self) -> Result<Vec<NodeIndex>, CircuitError> {
        toposort(&self.graph, None).map_err(|cycle| {
            CircuitError::Cycle(self.graph[cycle.node_id()].id.clone())
        })
    }

    /// True when `to` is reachable from `from` (a gate always reaches itself).
    pub fn has_path(&self, from_id: &str, to_id: &str) -> Result<bool, CircuitError> {
        let from = self.require(from_id)?;
        let to = self.require(to_id)?;
        Ok(has_path_connecting(&self.graph, from, to, None))
    }

    /// The gate with this id, if any.
    pub fn gate(&self, gate_id: &str) -> Option<&Gate> {
        self.index.get(gate_id).map(|ix| &self.graph[*ix])
    }

    /// Whether a gate with this id exists.
    pub fn contains(&self, gate_id: &str) -> bool {
        self.index.contains_key(gate_id)
    }

    /// Number of gates.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Gates in insertion order.
    pub fn gates(&self) -> impl Iterator<Item = &Gate> + '_ {
        self.index.values().map(move |ix| &self.graph[*ix])
    }

    /// Number of non-boundary gates.
    pub fn logic_gate_count(&self) -> usize {
        self.gates().filter(|g| !g.kind.is_boundary()).count()
    }

    /// Edges grouped by producer in insertion order, each group in edge insertion order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::with_capacity(self.graph.edge_count());
        for (id, ix) in &self.index {
            for succ in self.succs_of(*ix) {
                out.push((id.as_str(), self.graph[succ].id.as_str()));
            }
        }
        out
    }

    /// Ids feeding `gate_id`, in edge insertion order.
    pub fn predecessors(&self, gate_id: &str) -> Result<Vec<&str>, CircuitError> {
        let ix = self.require(gate_id)?;
        Ok(self
            .preds_of(ix)
            .into_iter()
            .map(|p| self.graph[p].id.as_str())
            .collect())
    }

    /// Ids fed by `gate_id`, in edge insertion order.
    pub fn successors(&self, gate_id: &str) -> Result<Vec<&str>, CircuitError> {
        let ix = self.require(gate_id)?;
        Ok(self
            .succs_of(ix)
            .into_iter()
            .map(|s| self.graph[s].id.as_str())
            .collect())
    }

    /// Number of predecessors of `gate_id`.
    pub fn in_degree(&self, gate_id: &str) -> Result<usize, CircuitError> {
        self.require(gate_id).map(|ix| self.in_degree_of(ix))
    }

    /// Number of successors of `gate_id`.
    pub fn out_degree(&self, gate_id: &str) -> Result<usize, CircuitError> {
        self.require(gate_id).map(|ix| self.out_degree_of(ix))
    }

    /// An id not yet used in this circuit, derived from the gate kind.
    pub fn fresh_id(&self, kind: GateKind) -> String {
        let prefix = kind.as_str().to_ascii_lowercase();
        let mut n = 0usize;
        loop {
            let id = format!("{prefix}_{n}");
            if !self.index.contains_key(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Gates and edges in insertion order, ready for serde.
    pub fn to_description(&self) -> CircuitDescription {
        CircuitDescription {
            gates: self
                .gates()
                .map(|g| GateEntry {
                    id: g.id.clone(),
                    kind: g.kind.as_str().to_string(),
                })
                .collect(),
            edges: self
                .edges()
                .into_iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        }
    }

    /// Builds a circuit from a description. Edges are added with [`connect`](Self::connect).
    pub fn from_description(desc: &CircuitDescription) -> Result<Self, CircuitError> {
        let mut circuit = CircuitGraph::new();
        for entry in &desc.gates {
            let kind: GateKind = entry.kind.parse()?;
            circuit.add_gate(Gate::new(entry.id.clone(), kind))?;
        }
        for (from, to) in &desc.edges {
            circuit.connect(from, to)?;
        }
        Ok(circuit)
    }

    /// Structural identity: same gates, kinds and edges in the same order
    /// hash the same.
    pub fn fingerprint(&self) -> CircuitHash {
        let mut hasher = Hasher::new();
        for gate in self.gates() {
            hasher.update(gate.id.as_bytes());
            hasher.update(b":");
            hasher.update(gate.kind.as_str().as_bytes());
            hasher.update(b"\n");
        }
        for (from, to) in self.edges() {
            hasher.update(from.as_bytes());
            hasher.update(b"->");
            hasher.update(to.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize().as_bytes())
    }

    pub(crate) fn inner(&self) -> &StableDiGraph<Gate, ()> {
        &self.graph
    }

    pub(crate) fn node_index(&self, gate_id: &str) -> Option<NodeIndex> {
        self.index.get(gate_id).copied()
    }

    /// Predecessors in edge insertion order.
    pub(crate) fn preds_of(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        // petgraph walks a node's edge list newest first.
        let mut preds: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(ix, Direction::Incoming)
            .collect();
        preds.reverse();
        preds
    }

    pub(crate) fn succs_of(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let mut succs: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(ix, Direction::Outgoing)
            .collect();
        succs.reverse();
        succs
    }

    pub(crate) fn in_degree_of(&self, ix: NodeIndex) -> usize {
        self.graph
            .neighbors_directed(ix, Direction::Incoming)
            .count()
    }

    pub(crate) fn out_degree_of(&self, ix: NodeIndex) -> usize {
        self.graph
            .neighbors_directed(ix, Direction::Outgoing)
            .count()
    }

    /// Node indices of one kind, in insertion order.
    pub(crate) fn indices_of(&self, kind: GateKind) -> impl Iterator<Item = NodeIndex> + '_ {
        self.index
            .values()
            .copied()
            .filter(move |ix| self.graph[*ix].kind == kind)
    }

    /// Node indices in insertion order.
    pub(crate) fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.index.values().copied()
    }

    fn require(&self, gate_id: &str) -> Result<NodeIndex, CircuitError> {
        self.node_index(gate_id)
            .ok_or_else(|| CircuitError::UnknownGate(gate_id.to_string()))
    }

    fn push_gate(&mut self, gate: Gate) -> NodeIndex {
        let id = gate.id.clone();
        let ix = self.graph.add_node(gate);
        self.index.insert(id, ix);
        ix
    }
}

impl PartialEq for CircuitGraph {
    fn eq(&self, other: &Self) -> bool {
        self.to_description() == other.to_description()
    }
}

impl Eq for CircuitGraph {}

/// The minimal seed: INPUT `A`, INPUT `B`, a two-input `G1` of the given
/// kind, OUTPUT `OUT`, wired `A -> G1`, `B -> G1`, `G1 -> OUT`.
pub fn seed_circuit(kind: GateKind) -> CircuitGraph {
    let mut c = CircuitGraph::new();
    let a = c.push_gate(Gate::input("A"));
    let b = c.push_gate(Gate::input("B"));
    let g = c.push_gate(Gate::new("G1", kind));
    let out = c.push_gate(Gate::output("OUT"));
    c.graph.add_edge(a, g, ());
    c.graph.add_edge(b, g, ());
    c.graph.add_edge(g, out, ());
    c
}
