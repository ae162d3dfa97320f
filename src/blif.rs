//! # BLIF export
//!
//! Canonical text serialization of a circuit in the Berkeley Logic
//! Interchange Format. The output is the only channel through which the
//! external equivalence checker sees a circuit, so it is byte-reproducible
//! for a given circuit: `.inputs` and `.outputs` follow insertion order and
//! cover blocks follow [`CircuitGraph::topological_order`].
//!
//! ```text
//! .model circuit
//! .inputs A B
//! .outputs OUT
//! .names A B G1
//! 11 1
//! .names G1 OUT
//! 1 1
//! .end
//! ```

use crate::circuit::CircuitGraph;
use crate::error::CircuitError;
use crate::gate::GateKind;
use anyhow::{Context, Result};
use petgraph::stable_graph::NodeIndex;
use std::fs;
use std::path::Path;

/// Serializes `circuit` as a BLIF model named `model_name`.
///
/// `.inputs` lists every gate without predecessors and `.outputs` every gate
/// without successors. INPUT gates emit no cover.
pub fn export(circuit: &CircuitGraph, model_name: &str) -> Result<String, CircuitError> {
    let graph = circuit.inner();
    let mut out = String::new();
    out.push_str(&format!(".model {model_name}\n"));

    let inputs: Vec<&str> = circuit
        .node_indices()
        .filter(|ix| circuit.in_degree_of(*ix) == 0)
        .map(|ix| graph[ix].id.as_str())
        .collect();
    let outputs: Vec<&str> = circuit
        .node_indices()
        .filter(|ix| circuit.out_degree_of(*ix) == 0)
        .map(|ix| graph[ix].id.as_str())
        .collect();
    out.push_str(&format!(".inputs {}\n", inputs.join(" ")));
    out.push_str(&format!(".outputs {}\n", outputs.join(" ")));

    for ix in circuit.topological_order()? {
        if graph[ix].kind == GateKind::Input {
            continue;
        }
        write_cover(circuit, ix, &mut out)?;
    }

    out.push_str(".end\n");
    Ok(out)
}

/// Exports and writes to `path`.
pub fn write(circuit: &CircuitGraph, model_name: &str, path: &Path) -> Result<()> {
    let text = export(circuit, model_name)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn write_cover(
    circuit: &CircuitGraph,
    ix: NodeIndex,
    out: &mut String,
) -> Result<(), CircuitError> {
    let graph = circuit.inner();
    let gate = &graph[ix];
    let preds: Vec<&str> = circuit
        .preds_of(ix)
        .into_iter()
        .map(|p| graph[p].id.as_str())
        .collect();
    let node = gate.id.as_str();

    match gate.kind {
        GateKind::Output | GateKind::Buf => {
            let pred = single_pred(node, &preds)?;
            out.push_str(&format!(".names {pred} {node}\n1 1\n"));
        }
        GateKind::Not => {
            let pred = single_pred(node, &preds)?;
            out.push_str(&format!(".names {pred} {node}\n0 1\n"));
        }
        GateKind::And | GateKind::Nand => {
            let on = if gate.kind == GateKind::And { '1' } else { '0' };
            names_line(&preds, node, out);
            out.push_str(&format!("{} {on}\n", "1".repeat(preds.len())));
        }
        GateKind::Or | GateKind::Nor => {
            let on = if gate.kind == GateKind::Or { '1' } else { '0' };
            names_line(&preds, node, out);
            for i in 0..preds.len() {
                let row: String = (0..preds.len())
                    .map(|j| if i == j { '1' } else { '-' })
                    .collect();
                out.push_str(&format!("{row} {on}\n"));
            }
        }
        GateKind::Xor | GateKind::Xnor => {
            if preds.len() != 2 {
                return Err(CircuitError::UnsupportedArity {
                    gate: node.to_string(),
                    kind: gate.kind,
                    got: preds.len(),
                });
            }
            names_line(&preds, node, out);
            if gate.kind == GateKind::Xor {
                out.push_str("10 1\n01 1\n");
            } else {
                out.push_str("00 1\n11 1\n");
            }
        }
        GateKind::Input => {}
    }
    Ok(())
}

fn names_line(preds: &[&str], node: &str, out: &mut String) {
    out.push_str(&format!(".names {} {node}\n", preds.join(" ")));
}

fn single_pred<'a>(node: &str, preds: &[&'a str]) -> Result<&'a str, CircuitError> {
    match preds {
        [pred] => Ok(pred),
        _ => Err(CircuitError::ArityMismatch {
            gate: node.to_string(),
            expected: 1,
            got: preds.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::seed_circuit;
    use crate::gate::Gate;

    fn block<'a>(text: &'a str, header: &str) -> Vec<&'a str> {
        let lines: Vec<&str> = text.lines().collect();
        let start = lines
            .iter()
            .position(|l| *l == header)
            .unwrap_or_else(|| panic!("missing {header} in\n{text}"));
        lines[start + 1..]
            .iter()
            .take_while(|l| !l.starts_with('.'))
            .copied()
            .collect()
    }

    #[test]
    fn and_scenario_blocks() {
        let text = export(&seed_circuit(GateKind::And), "circuit").unwrap();
        assert!(text.starts_with(".model circuit\n.inputs A B\n.outputs OUT\n"));
        assert_eq!(block(&text, ".names A B G1"), vec!["11 1"]);
        assert_eq!(block(&text, ".names G1 OUT"), vec!["1 1"]);
        assert!(text.ends_with(".end\n"));
    }

    #[test]
    fn full_seed_layout() {
        let text = export(&seed_circuit(GateKind::And), "tmp").unwrap();
        assert_eq!(
            text,
            ".model tmp\n.inputs A B\n.outputs OUT\n.names A B G1\n11 1\n.names G1 OUT\n1 1\n.end\n"
        );
    }

    #[test]
    fn covers_per_kind() {
        let expect = [
            (GateKind::Or, vec!["1- 1", "-1 1"]),
            (GateKind::Nand, vec!["11 0"]),
            (GateKind::Nor, vec!["1- 0", "-1 0"]),
            (GateKind::Xor, vec!["10 1", "01 1"]),
            (GateKind::Xnor, vec!["00 1", "11 1"]),
        ];
        for (kind, rows) in expect {
            let text = export(&seed_circuit(kind), "m").unwrap();
            assert_eq!(block(&text, ".names A B G1"), rows, "{kind}");
        }
    }

    #[test]
    fn unary_covers() {
        let mut c = CircuitGraph::new();
        c.add_gate(Gate::input("A")).unwrap();
        c.add_gate(Gate::new("N", GateKind::Not)).unwrap();
        c.add_gate(Gate::new("W", GateKind::Buf)).unwrap();
        c.add_gate(Gate::output("OUT")).unwrap();
        c.connect("A", "N").unwrap();
        c.connect("N", "W").unwrap();
        c.connect("W", "OUT").unwrap();
        let text = export(&c, "m").unwrap();
        assert_eq!(block(&text, ".names A N"), vec!["0 1"]);
        assert_eq!(block(&text, ".names N W"), vec!["1 1"]);
    }

    #[test]
    fn wide_or_uses_one_hot_rows() {
        let mut c = CircuitGraph::new();
        for id in ["a", "b", "c"] {
            c.add_gate(Gate::input(id)).unwrap();
        }
        c.add_gate(Gate::new("o", GateKind::Or)).unwrap();
        c.add_gate(Gate::output("y")).unwrap();
        for id in ["a", "b", "c"] {
            c.connect(id, "o").unwrap();
        }
        c.connect("o", "y").unwrap();
        let text = export(&c, "m").unwrap();
        assert_eq!(block(&text, ".names a b c o"), vec!["1-- 1", "-1- 1", "--1 1"]);
    }

    #[test]
    fn xor_needs_two_inputs() {
        let mut c = seed_circuit(GateKind::Xor);
        c.add_gate(Gate::input("C")).unwrap();
        c.connect("C", "G1").unwrap();
        assert_eq!(
            export(&c, "m"),
            Err(CircuitError::UnsupportedArity {
                gate: "G1".into(),
                kind: GateKind::Xor,
                got: 3
            })
        );
    }

    #[test]
    fn output_arity_checked() {
        let mut c = seed_circuit(GateKind::And);
        c.connect("A", "OUT").unwrap();
        assert!(matches!(
            export(&c, "m"),
            Err(CircuitError::ArityMismatch { expected: 1, got: 2, .. })
        ));
    }

    #[test]
    fn dangling_gates_become_ports() {
        let mut c = seed_circuit(GateKind::And);
        c.add_gate(Gate::new("N", GateKind::Not)).unwrap();
        c.connect("G1", "N").unwrap();
        let text = export(&c, "m").unwrap();
        assert!(text.contains(".outputs OUT N\n"));
    }

    #[test]
    fn export_is_reproducible() {
        let c = seed_circuit(GateKind::Nor);
        let copy = c.clone();
        assert_eq!(export(&c, "m").unwrap(), export(&copy, "m").unwrap());
    }

    #[test]
    fn write_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("and.blif");
        write(&seed_circuit(GateKind::And), "and", &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(".model and\n"));
    }
}
