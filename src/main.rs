use anyhow::{anyhow, bail, Context, Result};
use circuit_evo::blif;
use circuit_evo::evolve::{evolve, EvolutionConfig};
use circuit_evo::{
    fault_sweep, truth_table, CircuitDescription, CircuitGraph, EquivalenceOracle, Fault,
    FaultMap, FaultyCircuit, GateKind, InputAssignment, TruthRow,
};
use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "circuit-evo",
    version,
    about = "Circuit DAGs, fault injection, BLIF export and equivalence-guided evolution"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a circuit for one input assignment
    Eval {
        #[arg(long)]
        circuit: PathBuf,
        /// INPUT binding, e.g. A=1
        #[arg(long = "input", value_name = "ID=0|1")]
        inputs: Vec<String>,
        /// Fault overlay, e.g. G1=invert or G1=stuck:0
        #[arg(long = "fault", value_name = "ID=KIND[:VALUE]")]
        faults: Vec<String>,
    },
    /// Print the full truth table
    Table {
        #[arg(long)]
        circuit: PathBuf,
        #[arg(long = "fault", value_name = "ID=KIND[:VALUE]")]
        faults: Vec<String>,
    },
    /// Try every single fault on every gate and report which are observable
    Faults {
        #[arg(long)]
        circuit: PathBuf,
    },
    /// Write the circuit as BLIF
    Export {
        #[arg(long)]
        circuit: PathBuf,
        #[arg(long, default_value = "circuit")]
        model: String,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Ask the external verifier whether two BLIF files are equivalent
    Check {
        #[arg(long)]
        a: PathBuf,
        #[arg(long)]
        b: PathBuf,
        #[arg(long, default_value = "abc")]
        verifier: PathBuf,
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Evolve a circuit equivalent to a target BLIF file
    Evolve {
        #[arg(long)]
        target: PathBuf,
        /// JSON config; flags below override its fields
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        generations: Option<usize>,
        #[arg(long)]
        population: Option<usize>,
        #[arg(long)]
        max_gates: Option<usize>,
        #[arg(long)]
        seed_gate: Option<GateKind>,
        #[arg(long)]
        verifier: Option<PathBuf>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long, default_value_t = false)]
        parallel: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Eval {
            circuit,
            inputs,
            faults,
        } => {
            let circuit = load_circuit(&circuit)?;
            let mut faulty = FaultyCircuit::new(&circuit);
            for (gate, fault) in parse_faults(&faults)? {
                faulty.inject(&gate, fault)?;
            }
            let mut assignment = InputAssignment::new();
            for binding in &inputs {
                let (id, value) = split_binding(binding)?;
                assignment.insert(id.to_string(), parse_bit(value)?);
            }
            let outputs = faulty.evaluate(&assignment)?;
            let line: Vec<String> = outputs
                .iter()
                .map(|(id, v)| format!("{id}={}", u8::from(*v)))
                .collect();
            println!("{}", line.join(" "));
        }
        Commands::Table { circuit, faults } => {
            let circuit = load_circuit(&circuit)?;
            let faults: FaultMap = parse_faults(&faults)?.into_iter().collect();
            for gate in faults.keys() {
                if !circuit.contains(gate) {
                    bail!("unknown gate in fault: {gate}");
                }
            }
            let rows = truth_table(&circuit, &faults)?;
            for line in table_lines(&circuit, &rows) {
                println!("{line}");
            }
        }
        Commands::Faults { circuit } => {
            let circuit = load_circuit(&circuit)?;
            let reports = fault_sweep(&circuit)?;
            let detectable = reports.iter().filter(|r| r.is_detectable()).count();
            for r in &reports {
                println!(
                    "gate={} fault={} observable={}/{}",
                    r.gate, r.fault, r.observable_rows, r.total_rows
                );
            }
            println!("faults={} detectable={}", reports.len(), detectable);
        }
        Commands::Export {
            circuit,
            model,
            out,
        } => {
            let circuit = load_circuit(&circuit)?;
            match out {
                Some(path) => {
                    blif::write(&circuit, &model, &path)?;
                    println!("blif written to {}", path.display());
                }
                None => print!("{}", blif::export(&circuit, &model)?),
            }
        }
        Commands::Check {
            a,
            b,
            verifier,
            timeout_ms,
        } => {
            let oracle = EquivalenceOracle::new(verifier, Duration::from_millis(timeout_ms));
            let verdict = oracle.check(&a, &b);
            println!("equivalent={} verdict={:?}", verdict.is_equivalent(), verdict);
        }
        Commands::Evolve {
            target,
            config,
            seed,
            generations,
            population,
            max_gates,
            seed_gate,
            verifier,
            timeout_ms,
            parallel,
            out,
        } => {
            let mut cfg = match config {
                Some(path) => EvolutionConfig::from_json_file(&path)?,
                None => EvolutionConfig::default(),
            };
            if let Some(v) = seed {
                cfg.seed = v;
            }
            if let Some(v) = generations {
                cfg.generations = v;
            }
            if let Some(v) = population {
                cfg.population = v;
            }
            if let Some(v) = max_gates {
                cfg.max_gates = v;
            }
            if let Some(v) = seed_gate {
                cfg.seed_gate = v;
            }
            if let Some(v) = verifier {
                cfg.verifier = v;
            }
            if let Some(v) = timeout_ms {
                cfg.verifier_timeout_ms = v;
            }
            if parallel {
                cfg.parallel = true;
            }
            if out.is_some() {
                cfg.out_dir = out;
            }

            let result = evolve(cfg, &target)?;
            println!(
                "evolve done generations={} best_fitness={} gates={} hash={}",
                result.curve.len(),
                result.best.fitness,
                result.best.circuit.logic_gate_count(),
                result.best.circuit.fingerprint()
            );
            if let Some(dir) = &result.config.out_dir {
                println!("artefacts in {}", dir.display());
            }
        }
    }
    Ok(())
}

fn load_circuit(path: &Path) -> Result<CircuitGraph> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let desc: CircuitDescription =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let circuit = CircuitGraph::from_description(&desc)?;
    if !circuit.is_valid() {
        tracing::warn!(path = %path.display(), "circuit violates structural invariants");
    }
    Ok(circuit)
}

fn split_binding(binding: &str) -> Result<(&str, &str)> {
    binding
        .split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| anyhow!("expected ID=VALUE, got {binding:?}"))
}

fn parse_bit(value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => bail!("expected 0 or 1, got {other:?}"),
    }
}

fn parse_faults(bindings: &[String]) -> Result<Vec<(String, Fault)>> {
    bindings
        .iter()
        .map(|binding| -> Result<(String, Fault)> {
            let (gate, kind) = split_binding(binding)?;
            let (kind, value) = match kind.split_once(':') {
                Some((k, v)) => (k, Some(parse_bit(v)?)),
                None => (kind, None),
            };
            Ok((gate.to_string(), Fault::parse(kind, value)?))
        })
        .collect()
}

/// Header `A B | OUT` followed by one row per assignment, columns in gate
/// insertion order (first input is the most significant bit).
fn table_lines(circuit: &CircuitGraph, rows: &[TruthRow]) -> Vec<String> {
    let ids = |kind: GateKind| -> Vec<&str> {
        circuit
            .gates()
            .filter(|g| g.kind == kind)
            .map(|g| g.id.as_str())
            .collect()
    };
    let inputs = ids(GateKind::Input);
    let outputs = ids(GateKind::Output);
    let bits = |ids: &[&str], values: &InputAssignment| -> String {
        ids.iter()
            .map(|id| match values.get(*id) {
                Some(true) => "1",
                Some(false) => "0",
                None => "-",
            })
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut lines = vec![format!("{} | {}", inputs.join(" "), outputs.join(" "))];
    for row in rows {
        lines.push(format!(
            "{} | {}",
            bits(&inputs, &row.inputs),
            bits(&outputs, &row.outputs)
        ));
    }
    lines
}
