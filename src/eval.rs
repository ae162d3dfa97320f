//! # Evaluation
//!
//! Dataflow evaluation of a [`CircuitGraph`] in topological order, with an
//! optional fault overlay. Faults live in a side table ([`FaultMap`]) that is
//! applied to each gate's value right after it is computed and before any
//! successor reads it. The circuit itself is never touched, so one circuit
//! can be evaluated under many fault scenarios.
//!
//! ```rust
//! use circuit_evo::{seed_circuit, FaultyCircuit, GateKind, InputAssignment};
//!
//! let circuit = seed_circuit(GateKind::And);
//! let inputs: InputAssignment = [("A".to_string(), true), ("B".to_string(), true)].into();
//! assert_eq!(circuit.evaluate(&inputs).unwrap()["OUT"], true);
//!
//! let mut faulty = FaultyCircuit::new(&circuit);
//! faulty.add_fault("G1", "bitflip", None).unwrap();
//! assert_eq!(faulty.evaluate(&inputs).unwrap()["OUT"], false);
//! ```

use crate::circuit::CircuitGraph;
use crate::error::CircuitError;
use crate::gate::{Gate, GateKind};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::NodeIndexable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Values bound to INPUT gates, by gate id.
pub type InputAssignment = BTreeMap<String, bool>;
/// Values computed at OUTPUT gates, by gate id.
pub type OutputValues = BTreeMap<String, bool>;
/// At most one fault per gate id.
pub type FaultMap = BTreeMap<String, Fault>;

/// Largest input count [`truth_table`] will enumerate.
pub const MAX_TABLE_INPUTS: usize = 16;

/// Runtime-only overlay on a gate's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// Negates the computed value (bit flip)
    Invert,
    /// Forces the value regardless of the gate's inputs
    StuckAt(bool),
}

impl Fault {
    /// Every single fault the sweep tries on a gate.
    pub const ALL: [Fault; 3] = [Fault::Invert, Fault::StuckAt(false), Fault::StuckAt(true)];

    /// Parses a fault from its kind name.
    ///
    /// `bitflip`/`invert` take no value; `stuck`/`stuck_at` need one.
    pub fn parse(kind: &str, value: Option<bool>) -> Result<Self, CircuitError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "bitflip" | "invert" => Ok(Fault::Invert),
            "stuck" | "stuck_at" | "stuck-at" => value
                .map(Fault::StuckAt)
                .ok_or_else(|| CircuitError::InvalidFaultKind(format!("{kind} without a value"))),
            _ => Err(CircuitError::InvalidFaultKind(kind.to_string())),
        }
    }

    pub fn apply(self, computed: bool) -> bool {
        match self {
            Fault::Invert => !computed,
            Fault::StuckAt(v) => v,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Invert => f.write_str("invert"),
            Fault::StuckAt(v) => write!(f, "stuck-at-{}", u8::from(*v)),
        }
    }
}

/// Evaluates `circuit` under `inputs`, applying `faults`, and returns the
/// values at OUTPUT gates.
pub fn evaluate(
    circuit: &CircuitGraph,
    inputs: &InputAssignment,
    faults: &FaultMap,
) -> Result<OutputValues, CircuitError> {
    let order = circuit.topological_order()?;
    evaluate_in_order(circuit, &order, inputs, faults)
}

impl CircuitGraph {
    /// Fault-free evaluation.
    pub fn evaluate(&self, inputs: &InputAssignment) -> Result<OutputValues, CircuitError> {
        evaluate(self, inputs, &FaultMap::new())
    }
}

fn evaluate_in_order(
    circuit: &CircuitGraph,
    order: &[NodeIndex],
    inputs: &InputAssignment,
    faults: &FaultMap,
) -> Result<OutputValues, CircuitError> {
    let graph = circuit.inner();
    let mut values: Vec<Option<bool>> = vec![None; graph.node_bound()];

    for &ix in order {
        let gate = &graph[ix];
        let preds = circuit.preds_of(ix);
        let computed = match gate.kind {
            GateKind::Input => *inputs
                .get(&gate.id)
                .ok_or_else(|| CircuitError::MissingInput(gate.id.clone()))?,
            GateKind::Output => {
                if preds.len() != 1 {
                    return Err(CircuitError::ArityMismatch {
                        gate: gate.id.clone(),
                        expected: 1,
                        got: preds.len(),
                    });
                }
                value_at(graph, &values, preds[0])?
            }
            kind => {
                let expected = kind.arity().unwrap_or(0);
                if preds.len() < expected {
                    return Err(CircuitError::ArityMismatch {
                        gate: gate.id.clone(),
                        expected,
                        got: preds.len(),
                    });
                }
                let args = preds
                    .iter()
                    .map(|p| value_at(graph, &values, *p))
                    .collect::<Result<Vec<_>, _>>()?;
                kind.compute(&args)?
            }
        };
        let value = match faults.get(&gate.id) {
            Some(fault) => fault.apply(computed),
            None => computed,
        };
        values[ix.index()] = Some(value);
    }

    Ok(circuit
        .indices_of(GateKind::Output)
        .filter_map(|ix| values[ix.index()].map(|v| (graph[ix].id.clone(), v)))
        .collect())
}

fn value_at(
    graph: &StableDiGraph<Gate, ()>,
    values: &[Option<bool>],
    ix: NodeIndex,
) -> Result<bool, CircuitError> {
    // An unset predecessor means the order was not producer-before-consumer.
    values[ix.index()].ok_or_else(|| CircuitError::Cycle(graph[ix].id.clone()))
}

/// A circuit borrowed together with a fault overlay.
#[derive(Debug, Clone)]
pub struct FaultyCircuit<'a> {
    circuit: &'a CircuitGraph,
    faults: FaultMap,
}

impl<'a> FaultyCircuit<'a> {
    pub fn new(circuit: &'a CircuitGraph) -> Self {
        FaultyCircuit {
            circuit,
            faults: FaultMap::new(),
        }
    }

    pub fn circuit(&self) -> &'a CircuitGraph {
        self.circuit
    }

    pub fn faults(&self) -> &FaultMap {
        &self.faults
    }

    /// Registers a fault by kind name (`bitflip`, `stuck`), replacing any
    /// fault already on the gate.
    pub fn add_fault(
        &mut self,
        gate_id: &str,
        kind: &str,
        value: Option<bool>,
    ) -> Result<(), CircuitError> {
        self.require(gate_id)?;
        let fault = Fault::parse(kind, value)?;
        self.faults.insert(gate_id.to_string(), fault);
        Ok(())
    }

    /// Registers a fault, returning the one it replaced.
    pub fn inject(&mut self, gate_id: &str, fault: Fault) -> Result<Option<Fault>, CircuitError> {
        self.require(gate_id)?;
        Ok(self.faults.insert(gate_id.to_string(), fault))
    }

    pub fn remove_fault(&mut self, gate_id: &str) -> Result<Option<Fault>, CircuitError> {
        self.require(gate_id)?;
        Ok(self.faults.remove(gate_id))
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    pub fn evaluate(&self, inputs: &InputAssignment) -> Result<OutputValues, CircuitError> {
        evaluate(self.circuit, inputs, &self.faults)
    }

    fn require(&self, gate_id: &str) -> Result<(), CircuitError> {
        if self.circuit.contains(gate_id) {
            Ok(())
        } else {
            Err(CircuitError::UnknownGate(gate_id.to_string()))
        }
    }
}

/// One row of an exhaustive evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruthRow {
    pub inputs: InputAssignment,
    pub outputs: OutputValues,
}

/// Evaluates every assignment of the INPUT gates.
///
/// Inputs are taken in insertion order; in row `i` the `k`-th of `n` inputs
/// holds bit `n - 1 - k` of `i`, so the first input is the most significant.
pub fn truth_table(
    circuit: &CircuitGraph,
    faults: &FaultMap,
) -> Result<Vec<TruthRow>, CircuitError> {
    let graph = circuit.inner();
    let names: Vec<&str> = circuit
        .indices_of(GateKind::Input)
        .map(|ix| graph[ix].id.as_str())
        .collect();
    let n = names.len();
    if n > MAX_TABLE_INPUTS {
        return Err(CircuitError::TooManyInputs {
            got: n,
            limit: MAX_TABLE_INPUTS,
        });
    }
    let order = circuit.topological_order()?;
    (0..1usize << n)
        .map(|row| {
            let inputs: InputAssignment = names
                .iter()
                .enumerate()
                .map(|(k, name)| (name.to_string(), (row >> (n - 1 - k)) & 1 == 1))
                .collect();
            let outputs = evaluate_in_order(circuit, &order, &inputs, faults)?;
            Ok(TruthRow { inputs, outputs })
        })
        .collect()
}

/// How visible one single fault is at the circuit outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultReport {
    pub gate: String,
    pub fault: Fault,
    /// Rows of the truth table whose outputs differ from the fault-free run
    pub observable_rows: usize,
    pub total_rows: usize,
}

impl FaultReport {
    pub fn is_detectable(&self) -> bool {
        self.observable_rows > 0
    }
}

/// Injects every single fault on every gate and compares against the clean
/// truth table.
pub fn fault_sweep(circuit: &CircuitGraph) -> Result<Vec<FaultReport>, CircuitError> {
    let clean = truth_table(circuit, &FaultMap::new())?;
    let mut reports = Vec::new();
    for gate in circuit.gates() {
        for fault in Fault::ALL {
            let faults = FaultMap::from([(gate.id.clone(), fault)]);
            let faulty = truth_table(circuit, &faults)?;
            let observable_rows = clean
                .iter()
                .zip(&faulty)
                .filter(|(c, f)| c.outputs != f.outputs)
                .count();
            reports.push(FaultReport {
                gate: gate.id.clone(),
                fault,
                observable_rows,
                total_rows: clean.len(),
            });
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::seed_circuit;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    fn assign(pairs: &[(&str, bool)]) -> InputAssignment {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn full_adder() -> CircuitGraph {
        let mut c = CircuitGraph::new();
        for id in ["A", "B", "C"] {
            c.add_gate(Gate::input(id)).unwrap();
        }
        c.add_gate(Gate::new("X1", GateKind::Xor)).unwrap();
        c.add_gate(Gate::new("S", GateKind::Xor)).unwrap();
        c.add_gate(Gate::new("A1", GateKind::And)).unwrap();
        c.add_gate(Gate::new("A2", GateKind::And)).unwrap();
        c.add_gate(Gate::new("CO", GateKind::Or)).unwrap();
        c.add_gate(Gate::output("SUM")).unwrap();
        c.add_gate(Gate::output("COUT")).unwrap();
        for (from, to) in [
            ("A", "X1"),
            ("B", "X1"),
            ("X1", "S"),
            ("C", "S"),
            ("A", "A1"),
            ("B", "A1"),
            ("X1", "A2"),
            ("C", "A2"),
            ("A1", "CO"),
            ("A2", "CO"),
            ("S", "SUM"),
            ("CO", "COUT"),
        ] {
            c.connect(from, to).unwrap();
        }
        c
    }

    /// Kahn's algorithm over insertion order, optionally popping ties from the back.
    fn kahn_order(c: &CircuitGraph, last_first: bool) -> Vec<NodeIndex> {
        let mut indeg: BTreeMap<NodeIndex, usize> =
            c.node_indices().map(|ix| (ix, c.in_degree_of(ix))).collect();
        let mut ready: VecDeque<NodeIndex> =
            c.node_indices().filter(|ix| indeg[ix] == 0).collect();
        let mut order = Vec::new();
        loop {
            let next = if last_first {
                ready.pop_back()
            } else {
                ready.pop_front()
            };
            let Some(ix) = next else { break };
            order.push(ix);
            for s in c.succs_of(ix) {
                let d = indeg.get_mut(&s).unwrap();
                *d -= 1;
                if *d == 0 {
                    ready.push_back(s);
                }
            }
        }
        order
    }

    #[test]
    fn and_scenario() {
        let c = seed_circuit(GateKind::And);
        let out = c.evaluate(&assign(&[("A", true), ("B", false)])).unwrap();
        assert_eq!(out, assign(&[("OUT", false)]));
        let out = c.evaluate(&assign(&[("A", true), ("B", true)])).unwrap();
        assert_eq!(out, assign(&[("OUT", true)]));
    }

    #[test]
    fn evaluates_after_a_removal_leaves_a_hole() {
        let mut c = seed_circuit(GateKind::And);
        c.add_gate(Gate::new("N", GateKind::Not)).unwrap();
        c.connect("G1", "N").unwrap();
        assert!(c.remove_gate("N").unwrap());
        c.add_gate(Gate::new("X", GateKind::Xor)).unwrap();
        c.connect("A", "X").unwrap();
        c.connect("B", "X").unwrap();
        c.add_gate(Gate::output("OUT2")).unwrap();
        c.connect("X", "OUT2").unwrap();
        assert!(c.is_valid());
        let out = c.evaluate(&assign(&[("A", true), ("B", false)])).unwrap();
        assert_eq!(out, assign(&[("OUT", false), ("OUT2", true)]));
    }

    #[test]
    fn invert_fault_scenario() {
        let c = seed_circuit(GateKind::And);
        let mut faulty = FaultyCircuit::new(&c);
        faulty.inject("G1", Fault::Invert).unwrap();
        let out = faulty.evaluate(&assign(&[("A", true), ("B", true)])).unwrap();
        assert_eq!(out, assign(&[("OUT", false)]));
        // The circuit itself is unchanged.
        let clean = c.evaluate(&assign(&[("A", true), ("B", true)])).unwrap();
        assert_eq!(clean, assign(&[("OUT", true)]));
    }

    #[test]
    fn fault_on_input_propagates() {
        let c = seed_circuit(GateKind::Or);
        let faults = FaultMap::from([("A".to_string(), Fault::StuckAt(true))]);
        let out = evaluate(&c, &assign(&[("A", false), ("B", false)]), &faults).unwrap();
        assert_eq!(out["OUT"], true);
    }

    #[test]
    fn missing_input() {
        let c = seed_circuit(GateKind::And);
        assert_eq!(
            c.evaluate(&assign(&[("A", true)])),
            Err(CircuitError::MissingInput("B".into()))
        );
    }

    #[test]
    fn output_arity_mismatch() {
        let mut c = seed_circuit(GateKind::And);
        c.connect("A", "OUT").unwrap();
        assert_eq!(
            c.evaluate(&assign(&[("A", true), ("B", true)])),
            Err(CircuitError::ArityMismatch {
                gate: "OUT".into(),
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn starved_gate_is_arity_mismatch() {
        let mut c = seed_circuit(GateKind::Xor);
        c.disconnect("B", "G1").unwrap();
        assert!(matches!(
            c.evaluate(&assign(&[("A", true), ("B", true)])),
            Err(CircuitError::ArityMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn cyclic_circuit_cannot_be_evaluated() {
        let mut c = seed_circuit(GateKind::And);
        c.connect("OUT", "G1").unwrap();
        assert!(matches!(
            c.evaluate(&assign(&[("A", true), ("B", true)])),
            Err(CircuitError::Cycle(_))
        ));
    }

    #[test]
    fn fault_registry() {
        let c = seed_circuit(GateKind::And);
        let mut faulty = FaultyCircuit::new(&c);
        assert_eq!(
            faulty.add_fault("nope", "bitflip", None),
            Err(CircuitError::UnknownGate("nope".into()))
        );
        assert!(matches!(
            faulty.add_fault("G1", "glitch", None),
            Err(CircuitError::InvalidFaultKind(_))
        ));
        assert!(matches!(
            faulty.add_fault("G1", "stuck", None),
            Err(CircuitError::InvalidFaultKind(_))
        ));
        faulty.add_fault("G1", "stuck", Some(true)).unwrap();
        faulty.add_fault("G1", "bitflip", None).unwrap();
        assert_eq!(faulty.faults().len(), 1);
        assert_eq!(faulty.faults()["G1"], Fault::Invert);
        assert_eq!(faulty.remove_fault("G1"), Ok(Some(Fault::Invert)));
        assert_eq!(faulty.remove_fault("G1"), Ok(None));
        faulty.add_fault("A", "stuck_at", Some(false)).unwrap();
        faulty.clear_faults();
        assert!(faulty.faults().is_empty());
    }

    #[test]
    fn full_adder_truth_table() {
        let c = full_adder();
        let table = truth_table(&c, &FaultMap::new()).unwrap();
        assert_eq!(table.len(), 8);
        for row in &table {
            let (a, b, cin) = (row.inputs["A"], row.inputs["B"], row.inputs["C"]);
            assert_eq!(row.outputs["SUM"], a ^ b ^ cin);
            assert_eq!(row.outputs["COUT"], (a && b) || (cin && (a ^ b)));
        }
        // First input is the most significant bit.
        assert_eq!(table[4].inputs, assign(&[("A", true), ("B", false), ("C", false)]));
    }

    #[test]
    fn sweep_finds_masked_fault() {
        // OUT = A OR (A AND B): the AND is redundant, stuck-at-0 on it is invisible.
        let mut c = CircuitGraph::new();
        c.add_gate(Gate::input("A")).unwrap();
        c.add_gate(Gate::input("B")).unwrap();
        c.add_gate(Gate::new("AB", GateKind::And)).unwrap();
        c.add_gate(Gate::new("O", GateKind::Or)).unwrap();
        c.add_gate(Gate::output("OUT")).unwrap();
        c.connect("A", "AB").unwrap();
        c.connect("B", "AB").unwrap();
        c.connect("A", "O").unwrap();
        c.connect("AB", "O").unwrap();
        c.connect("O", "OUT").unwrap();

        let reports = fault_sweep(&c).unwrap();
        assert_eq!(reports.len(), c.len() * Fault::ALL.len());
        let find = |gate: &str, fault: Fault| {
            reports
                .iter()
                .find(|r| r.gate == gate && r.fault == fault)
                .unwrap()
                .clone()
        };
        assert!(!find("AB", Fault::StuckAt(false)).is_detectable());
        assert_eq!(find("OUT", Fault::Invert).observable_rows, 4);
        assert_eq!(find("O", Fault::StuckAt(true)).observable_rows, 2);
    }

    #[test]
    fn truth_table_input_limit() {
        let mut c = CircuitGraph::new();
        for i in 0..=MAX_TABLE_INPUTS {
            c.add_gate(Gate::input(format!("i{i}"))).unwrap();
        }
        assert!(matches!(
            truth_table(&c, &FaultMap::new()),
            Err(CircuitError::TooManyInputs { .. })
        ));
    }

    #[test]
    fn fault_labels() {
        assert_eq!(Fault::Invert.to_string(), "invert");
        assert_eq!(Fault::StuckAt(true).to_string(), "stuck-at-1");
        assert_eq!(Fault::parse("BITFLIP", None), Ok(Fault::Invert));
    }

    fn fault_strategy() -> impl Strategy<Value = Fault> {
        prop_oneof![Just(Fault::Invert), any::<bool>().prop_map(Fault::StuckAt)]
    }

    const ADDER_GATES: [&str; 10] = ["A", "B", "C", "X1", "S", "A1", "A2", "CO", "SUM", "COUT"];

    proptest! {
        #[test]
        fn evaluation_is_pure(
            a in any::<bool>(),
            b in any::<bool>(),
            cin in any::<bool>(),
            faulted in proptest::collection::btree_map(
                0..ADDER_GATES.len(),
                fault_strategy(),
                0..4,
            ),
        ) {
            let c = full_adder();
            let inputs = assign(&[("A", a), ("B", b), ("C", cin)]);
            let faults: FaultMap = faulted
                .into_iter()
                .map(|(i, f)| (ADDER_GATES[i].to_string(), f))
                .collect();
            let first = evaluate(&c, &inputs, &faults).unwrap();
            let second = evaluate(&c, &inputs, &faults).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn order_independence(a in any::<bool>(), b in any::<bool>(), cin in any::<bool>()) {
            let c = full_adder();
            let inputs = assign(&[("A", a), ("B", b), ("C", cin)]);
            let faults = FaultMap::new();
            let reference = evaluate(&c, &inputs, &faults).unwrap();
            for last_first in [false, true] {
                let order = kahn_order(&c, last_first);
                prop_assert_eq!(order.len(), c.len());
                let got = evaluate_in_order(&c, &order, &inputs, &faults).unwrap();
                prop_assert_eq!(&got, &reference);
            }
        }

        #[test]
        fn stuck_at_forces_gate_value(a in any::<bool>(), b in any::<bool>(), v in any::<bool>()) {
            for kind in crate::gate::COMBINATIONAL.into_iter().filter(|k| k.is_binary()) {
                let c = seed_circuit(kind);
                let faults = FaultMap::from([("G1".to_string(), Fault::StuckAt(v))]);
                let out = evaluate(&c, &assign(&[("A", a), ("B", b)]), &faults).unwrap();
                prop_assert_eq!(out["OUT"], v);
            }
        }

        #[test]
        fn invert_negates_gate_value(a in any::<bool>(), b in any::<bool>()) {
            for kind in crate::gate::COMBINATIONAL.into_iter().filter(|k| k.is_binary()) {
                let c = seed_circuit(kind);
                let inputs = assign(&[("A", a), ("B", b)]);
                let clean = c.evaluate(&inputs).unwrap();
                let faults = FaultMap::from([("G1".to_string(), Fault::Invert)]);
                let flipped = evaluate(&c, &inputs, &faults).unwrap();
                prop_assert_eq!(flipped["OUT"], !clean["OUT"]);
            }
        }
    }
}
