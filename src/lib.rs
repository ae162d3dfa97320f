//! # circuit_evo
//!
//! **Combinational circuits as mutable DAGs, checked against an external
//! equivalence verifier and evolved toward a target function.**
//!
//! ## Quick Start
//!
//! ```rust
//! use circuit_evo::{seed_circuit, GateKind, FaultyCircuit, Fault, InputAssignment};
//!
//! let circuit = seed_circuit(GateKind::And);
//! assert!(circuit.is_valid());
//!
//! let inputs = InputAssignment::from([("A".to_string(), true), ("B".to_string(), true)]);
//! assert_eq!(circuit.evaluate(&inputs).unwrap()["OUT"], true);
//!
//! let mut faulty = FaultyCircuit::new(&circuit);
//! faulty.inject("G1", Fault::Invert).unwrap();
//! assert_eq!(faulty.evaluate(&inputs).unwrap()["OUT"], false);
//!
//! let text = circuit_evo::blif::export(&circuit, "and2").unwrap();
//! assert!(text.contains(".names A B G1\n11 1\n"));
//! ```
//!
//! ## Key Concepts
//!
//! - **Gate**: a named node with a fixed boolean function, or an INPUT/OUTPUT boundary
//! - **CircuitGraph**: a DAG of gates; edges carry signals producer to consumer
//! - **Fault**: a side-table overlay (inversion, stuck-at) applied at evaluation time
//! - **BLIF**: the serialized form the external verifier reads
//! - **Oracle**: an external `cec` run deciding functional equivalence
//! - **Evolution**: mutate, score against the oracle, keep the top half

pub mod blif;
pub mod circuit;
pub mod error;
pub mod eval;
pub mod evolve;
pub mod gate;
pub mod oracle;

pub use circuit::{seed_circuit, CircuitDescription, CircuitGraph, CircuitHash, GateEntry};
pub use error::CircuitError;
pub use eval::{
    evaluate, fault_sweep, truth_table, Fault, FaultMap, FaultReport, FaultyCircuit,
    InputAssignment, OutputValues, TruthRow,
};
pub use evolve::{EvolutionConfig, EvolutionEngine, EvolutionResult, ScoredCircuit};
pub use gate::{Gate, GateKind, COMBINATIONAL};
pub use oracle::{check_equivalent, EquivalenceOracle, Verdict};
