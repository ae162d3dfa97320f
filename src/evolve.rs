//! # Evolution engine
//!
//! Searches circuit space for an individual the external verifier judges
//! equivalent to a target BLIF file. Fitness is binary and comes only from
//! the [`EquivalenceOracle`]; the engine never evaluates circuits itself.
//!
//! Each generation:
//!
//! 1. **Score**: export every individual to a scratch `.blif` and ask the oracle
//! 2. **Select**: stable sort by fitness, keep the top `⌈P/2⌉`
//! 3. **Reproduce**: survivors plus one mutated copy each, cut back to `P`
//!
//! All randomness flows from one ChaCha20 stream seeded from
//! [`EvolutionConfig::seed`], so a run is reproducible given the same oracle
//! answers.
//!
//! ```no_run
//! use circuit_evo::evolve::{EvolutionConfig, EvolutionEngine};
//!
//! let config = EvolutionConfig {
//!     generations: 10,
//!     population: 8,
//!     ..EvolutionConfig::default()
//! };
//! let engine = EvolutionEngine::new(config, "target.blif")?;
//! let result = engine.evolve()?;
//! println!("best fitness {}", result.best.fitness);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::blif;
use crate::circuit::{seed_circuit, CircuitGraph, CircuitHash};
use crate::error::CircuitError;
use crate::gate::{Gate, GateKind, COMBINATIONAL};
use crate::oracle::EquivalenceOracle;
use anyhow::{bail, Context, Result};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for an evolution run.
///
/// Missing fields in a JSON config take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// ChaCha20 seed for mutation choices
    pub seed: u64,
    /// Generation budget `G`
    pub generations: usize,
    /// Population size `P`
    pub population: usize,
    /// Cap on non-boundary gates; `add_gate` mutation is skipped at the cap
    pub max_gates: usize,
    /// Two-input gate kind of the seed circuit
    pub seed_gate: GateKind,
    /// BLIF model name for scored individuals
    pub model_name: String,
    /// Path to the external equivalence checker
    pub verifier: PathBuf,
    pub verifier_timeout_ms: u64,
    /// Score individuals on the rayon pool
    pub parallel: bool,
    /// Directory for `training_curve.ndjson` and `best.blif`
    pub out_dir: Option<PathBuf>,
    /// Where scored individuals are written for the verifier; the system
    /// temp directory when unset
    pub scratch_dir: Option<PathBuf>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            seed: 0,
            generations: 50,
            population: 20,
            max_gates: 20,
            seed_gate: GateKind::And,
            model_name: "tmp".to_string(),
            verifier: PathBuf::from("abc"),
            verifier_timeout_ms: 5000,
            parallel: false,
            out_dir: None,
            scratch_dir: None,
        }
    }
}

impl EvolutionConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: EvolutionConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.population < 2 {
            bail!("population must be at least 2, got {}", self.population);
        }
        if self.generations == 0 {
            bail!("generations must be at least 1");
        }
        if self.seed_gate.arity() != Some(2) {
            bail!("seed gate must be a two-input kind, got {}", self.seed_gate);
        }
        Ok(())
    }

    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_millis(self.verifier_timeout_ms)
    }
}

/// The four structural edits, drawn uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    AddGate,
    RemoveGate,
    Connect,
    Disconnect,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        MutationKind::AddGate,
        MutationKind::RemoveGate,
        MutationKind::Connect,
        MutationKind::Disconnect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::AddGate => "add_gate",
            MutationKind::RemoveGate => "remove_gate",
            MutationKind::Connect => "connect",
            MutationKind::Disconnect => "disconnect",
        }
    }
}

/// Returns a mutated copy of `circuit`; the parent is never touched.
///
/// A mutation that fails part-way keeps whatever edits it already made.
/// Every edge it adds is guarded by a reachability check, so an acyclic
/// parent always yields an acyclic child.
pub fn mutate<R: Rng + ?Sized>(
    circuit: &CircuitGraph,
    rng: &mut R,
    max_gates: usize,
) -> CircuitGraph {
    let mut child = circuit.clone();
    let kind = MutationKind::ALL[rng.gen_range(0..MutationKind::ALL.len())];
    if let Err(e) = apply_mutation(&mut child, kind, rng, max_gates) {
        debug!(mutation = kind.as_str(), error = %e, "mutation abandoned");
    }
    child
}

fn apply_mutation<R: Rng + ?Sized>(
    child: &mut CircuitGraph,
    kind: MutationKind,
    rng: &mut R,
    max_gates: usize,
) -> Result<(), CircuitError> {
    match kind {
        MutationKind::AddGate => {
            if child.logic_gate_count() >= max_gates {
                return Ok(());
            }
            let sources: Vec<String> = child
                .gates()
                .filter(|g| child.out_degree(&g.id).unwrap_or(0) > 0)
                .map(|g| g.id.clone())
                .collect();
            let sinks: Vec<String> = child
                .gates()
                .filter(|g| child.in_degree(&g.id).unwrap_or(0) > 0)
                .map(|g| g.id.clone())
                .collect();

            let gate_kind = COMBINATIONAL[rng.gen_range(0..COMBINATIONAL.len())];
            let id = child.fresh_id(gate_kind);
            child.add_gate(Gate::new(id.clone(), gate_kind))?;

            if !sources.is_empty() {
                let from = &sources[rng.gen_range(0..sources.len())];
                try_connect(child, from, &id)?;
            }
            if !sinks.is_empty() {
                let to = &sinks[rng.gen_range(0..sinks.len())];
                try_connect(child, &id, to)?;
            }
        }
        MutationKind::RemoveGate => {
            if child.len() <= 3 {
                return Ok(());
            }
            let ids = gate_ids(child);
            let id = &ids[rng.gen_range(0..ids.len())];
            let boundary = child.gate(id).map_or(true, |g| g.kind.is_boundary());
            if !boundary && !child.remove_gate(id)? {
                debug!(gate = %id, "removal rolled back");
            }
        }
        MutationKind::Connect => {
            let ids = gate_ids(child);
            if ids.len() < 2 {
                return Ok(());
            }
            let i = rng.gen_range(0..ids.len());
            let mut j = rng.gen_range(0..ids.len() - 1);
            if j >= i {
                j += 1;
            }
            try_connect(child, &ids[i], &ids[j])?;
        }
        MutationKind::Disconnect => {
            let edges: Vec<(String, String)> = child
                .edges()
                .into_iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect();
            if edges.is_empty() {
                return Ok(());
            }
            let (from, to) = &edges[rng.gen_range(0..edges.len())];
            child.disconnect(from, to)?;
        }
    }
    Ok(())
}

fn gate_ids(circuit: &CircuitGraph) -> Vec<String> {
    circuit.gates().map(|g| g.id.clone()).collect()
}

/// Adds `from -> to` unless `to` already reaches `from`.
fn try_connect(circuit: &mut CircuitGraph, from: &str, to: &str) -> Result<bool, CircuitError> {
    match circuit.connect_acyclic(from, to) {
        Ok(()) => Ok(true),
        Err(CircuitError::WouldCreateCycle { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// An individual together with its oracle verdict.
#[derive(Debug, Clone)]
pub struct ScoredCircuit {
    pub circuit: CircuitGraph,
    pub fitness: u32,
}

/// One line of `training_curve.ndjson`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLine {
    pub generation: usize,
    pub seed: u64,
    pub best_fitness: u32,
    pub equivalent: usize,
    pub population: usize,
    pub mean_fitness_per10k: u32,
    pub best_hash: CircuitHash,
    pub best_gates: usize,
}

#[derive(Debug, Clone)]
pub struct EvolutionResult {
    /// Best of the final generation's scored set
    pub best: ScoredCircuit,
    pub curve: Vec<GenerationLine>,
    pub config: EvolutionConfig,
}

/// Stable descending sort by fitness, truncated to `⌈len/2⌉`.
pub fn select(mut scored: Vec<ScoredCircuit>) -> Vec<ScoredCircuit> {
    let keep = (scored.len() + 1) / 2;
    scored.sort_by(|a, b| b.fitness.cmp(&a.fitness));
    scored.truncate(keep);
    scored
}

/// Survivors followed by one mutated copy of each, in rank order, cut to
/// `population`.
///
/// With `⌈P/2⌉` survivors the last offspring is dropped when `P` is odd.
pub fn reproduce<R: Rng + ?Sized>(
    survivors: &[ScoredCircuit],
    population: usize,
    rng: &mut R,
    max_gates: usize,
) -> Vec<CircuitGraph> {
    let mut next: Vec<CircuitGraph> = survivors.iter().map(|s| s.circuit.clone()).collect();
    for survivor in survivors {
        next.push(mutate(&survivor.circuit, rng, max_gates));
    }
    next.truncate(population);
    next
}

/// Drives the generational loop against one target file.
#[derive(Debug, Clone)]
pub struct EvolutionEngine {
    config: EvolutionConfig,
    target: PathBuf,
    oracle: EquivalenceOracle,
}

impl EvolutionEngine {
    pub fn new(config: EvolutionConfig, target: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let oracle = EquivalenceOracle::new(&config.verifier, config.verifier_timeout());
        Ok(EvolutionEngine {
            config,
            target: target.into(),
            oracle,
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// `P` copies of the seed circuit.
    pub fn initialize_population(&self) -> Vec<CircuitGraph> {
        vec![seed_circuit(self.config.seed_gate); self.config.population]
    }

    /// 1 if the oracle judges `circuit` equivalent to the target, else 0.
    ///
    /// Export and IO errors score 0. The scratch file is removed on every path.
    pub fn compute_fitness(&self, circuit: &CircuitGraph) -> u32 {
        match self.equivalent_to_target(circuit) {
            Ok(true) => 1,
            Ok(false) => 0,
            Err(e) => {
                debug!(error = %e, "scoring failed");
                0
            }
        }
    }

    fn equivalent_to_target(&self, circuit: &CircuitGraph) -> Result<bool> {
        let text = blif::export(circuit, &self.config.model_name)?;
        let mut builder = tempfile::Builder::new();
        builder.prefix("circuit-evo-").suffix(".blif");
        // Dropping the handle deletes the file, whatever the oracle said.
        let mut file = match &self.config.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(self.oracle.check(file.path(), &self.target).is_equivalent())
    }

    /// Scores a population, preserving its order.
    pub fn score(&self, population: Vec<CircuitGraph>) -> Vec<ScoredCircuit> {
        let scored = |circuit: CircuitGraph| {
            let fitness = self.compute_fitness(&circuit);
            ScoredCircuit { circuit, fitness }
        };
        if self.config.parallel {
            population.into_par_iter().map(scored).collect()
        } else {
            population.into_iter().map(scored).collect()
        }
    }

    pub fn evolve(&self) -> Result<EvolutionResult> {
        let config = &self.config;
        if !self.target.exists() {
            warn!(
                path = %self.target.display(),
                "target file missing, every individual will score 0"
            );
        }

        let mut curve_file = match &config.out_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
                Some(BufWriter::new(File::create(dir.join("training_curve.ndjson"))?))
            }
            None => None,
        };

        let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
        let mut population = self.initialize_population();
        let mut curve = Vec::with_capacity(config.generations);
        let mut best: Option<ScoredCircuit> = None;

        for generation in 0..config.generations {
            let scored = self.score(population);
            let line = generation_line(generation, config.seed, &scored);
            info!(
                generation,
                best_fitness = line.best_fitness,
                equivalent = line.equivalent,
                population = line.population,
                "generation scored"
            );
            if let Some(w) = curve_file.as_mut() {
                serde_json::to_writer(&mut *w, &line)?;
                writeln!(w)?;
            }
            curve.push(line);

            let survivors = select(scored);
            best = survivors.first().cloned();
            population = reproduce(&survivors, config.population, &mut rng, config.max_gates);
        }

        if let Some(w) = curve_file.as_mut() {
            w.flush()?;
        }
        let Some(best) = best else {
            bail!("evolution produced no individuals");
        };

        if let Some(dir) = &config.out_dir {
            let path = dir.join("best.blif");
            if let Err(e) = blif::write(&best.circuit, &config.model_name, &path) {
                warn!(error = %e, "best individual could not be exported");
            }
        }

        Ok(EvolutionResult {
            best,
            curve,
            config: config.clone(),
        })
    }
}

/// Runs a full search for `target` with `config`.
pub fn evolve(config: EvolutionConfig, target: &Path) -> Result<EvolutionResult> {
    EvolutionEngine::new(config, target)?.evolve()
}

fn generation_line(generation: usize, seed: u64, scored: &[ScoredCircuit]) -> GenerationLine {
    let equivalent = scored.iter().filter(|s| s.fitness > 0).count();
    let best = scored
        .iter()
        .fold(None::<&ScoredCircuit>, |acc, s| match acc {
            Some(b) if b.fitness >= s.fitness => Some(b),
            _ => Some(s),
        });
    let mean_fitness_per10k = if scored.is_empty() {
        0
    } else {
        (equivalent as u64 * 10_000 / scored.len() as u64) as u32
    };
    GenerationLine {
        generation,
        seed,
        best_fitness: best.map_or(0, |b| b.fitness),
        equivalent,
        population: scored.len(),
        mean_fitness_per10k,
        best_hash: best.map(|b| b.circuit.fingerprint()).unwrap_or_default(),
        best_gates: best.map_or(0, |b| b.circuit.logic_gate_count()),
    }
}
