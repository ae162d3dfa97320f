//! Error taxonomy shared by the circuit, evaluator and exporter.

use crate::gate::GateKind;
use thiserror::Error;

/// Errors raised by circuit construction, evaluation and export.
///
/// Structural errors (`UnknownGate`, `DuplicateGateId`, `UnknownEdge`) are
/// caller mistakes and are returned immediately. Evaluation errors abort the
/// evaluation of one input assignment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CircuitError {
    /// Reference to a gate id that is not in the graph
    #[error("unknown gate: {0}")]
    UnknownGate(String),
    /// A gate with this id already exists
    #[error("duplicate gate id: {0}")]
    DuplicateGateId(String),
    /// Disconnecting an edge that does not exist
    #[error("no edge from {from} to {to}")]
    UnknownEdge { from: String, to: String },
    /// Checked connect refused an edge that closes a cycle
    #[error("edge {from} -> {to} would create a cycle")]
    WouldCreateCycle { from: String, to: String },
    /// The graph is not a DAG; the id is a gate on a cycle
    #[error("circuit contains a cycle through {0}")]
    Cycle(String),
    /// An INPUT gate has no bound value
    #[error("no value bound for input {0}")]
    MissingInput(String),
    #[error("gate {gate} expects {expected} input(s), got {got}")]
    ArityMismatch {
        gate: String,
        expected: usize,
        got: usize,
    },
    /// XOR/XNOR cover with other than two inputs
    #[error("{kind} gate {gate} with {got} inputs has no native cover")]
    UnsupportedArity {
        gate: String,
        kind: GateKind,
        got: usize,
    },
    #[error("unknown gate type: {0}")]
    UnknownGateType(String),
    /// `compute` called on a boundary kind
    #[error("{0} gates have no compute semantics")]
    NoComputeSemantics(GateKind),
    #[error("invalid fault kind: {0}")]
    InvalidFaultKind(String),
    /// Exhaustive enumeration over too many inputs
    #[error("truth table over {got} inputs exceeds the limit of {limit}")]
    TooManyInputs { got: usize, limit: usize },
}
