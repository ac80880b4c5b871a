use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError, System};

use crate::checkpoint::{self, CheckpointPayload, WindowCheckpoint};
use crate::config::{CriteriaConfig, RunConfig};
use crate::criteria::{Criteria, Mode};
use crate::determinism::window_seed;
use crate::ln_prob::LnProbability;
use crate::manifest::{self, RunManifest};
use crate::metrics::{CoverageMetrics, MetricSample, MetricsRecorder};
use crate::report;
use crate::sampler::{Outcome, Sampler};
use crate::trial::{TrialSet, TrialStats};
use crate::window::{ExchangeStats, Window, WindowManager, Worker};

/// Summary returned to callers after a run completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// Acceptance rates per trial name, over every window.
    pub acceptance_rates: BTreeMap<String, f64>,
    /// Mean configuration-exchange acceptance per neighbouring pair.
    pub exchange_acceptance: Vec<f64>,
    /// Coverage metrics captured during the run.
    pub coverage: CoverageMetrics,
    /// Spliced log macrostate probability, under flat-histogram.
    pub ln_macro_prob: Option<LnProbability>,
    /// Final window layout.
    pub windows: Vec<Window>,
    /// Whether every window reached its completion criterion.
    pub complete: bool,
    /// Attempts resolved per window.
    pub attempts: u64,
    /// Rounds performed, including any before a resume.
    pub rounds: u64,
    /// Energy of each window's final system.
    pub final_energies: Vec<f64>,
    /// SHA-256 of every window's final system.
    pub final_state_hash: String,
    /// Metrics CSV written during the run.
    pub metrics_path: Option<PathBuf>,
    /// Per-bin report, under flat-histogram.
    pub report_path: Option<PathBuf>,
    /// Manifest path, if emitted.
    pub manifest_path: Option<PathBuf>,
    /// Checkpoint files produced during the run.
    pub checkpoints: Vec<PathBuf>,
    /// Metrics samples collected (useful for tests/diagnostics).
    pub samples: Vec<MetricSample>,
}

/// Execution strategy picked from the criteria.
#[derive(Debug)]
pub enum Engine<S: System> {
    /// One Metropolis chain.
    Single {
        /// Serial or prefetch chain.
        worker: Worker<S>,
        /// Completed rounds.
        round: u64,
    },
    /// Flat-histogram windows.
    Windows(WindowManager<S>),
}

impl<S: System> Engine<S> {
    /// Builds the engine for `config` around a fresh system.
    pub fn new(
        config: &RunConfig,
        seed: u64,
        system: S,
        trials: TrialSet<S::Move>,
    ) -> Result<Self, McError> {
        config.validate()?;
        let criteria = Criteria::from_config(config)?;
        if matches!(criteria.mode(), Mode::Metropolis) {
            let sampler = Sampler::new(system, criteria, trials, window_seed(seed, 0))?;
            return Ok(Engine::Single {
                worker: Worker::new(sampler, config.prefetch.as_ref())?,
                round: 0,
            });
        }
        let mut manager = WindowManager::new(
            system,
            criteria,
            trials,
            &config.windows,
            config.prefetch.as_ref(),
            seed,
        )?;
        manager.initialize()?;
        Ok(Engine::Windows(manager))
    }

    /// Rebuilds the engine from checkpointed chains.
    pub fn restore(
        config: &RunConfig,
        seed: u64,
        round: u64,
        samplers: Vec<Sampler<S>>,
        exchange: Vec<ExchangeStats>,
    ) -> Result<Self, McError> {
        match &config.criteria {
            CriteriaConfig::Metropolis => {
                let sampler = samplers.into_iter().next().ok_or_else(|| {
                    McError::Serde(ErrorInfo::new("empty-checkpoint", "no chain to restore"))
                })?;
                Ok(Engine::Single {
                    worker: Worker::new(sampler, config.prefetch.as_ref())?,
                    round,
                })
            }
            CriteriaConfig::FlatHistogram { .. } => {
                Ok(Engine::Windows(WindowManager::from_samplers(
                    samplers,
                    &config.windows,
                    config.prefetch.as_ref(),
                    seed,
                    round,
                    exchange,
                )?))
            }
        }
    }

    /// Completed rounds.
    pub fn round(&self) -> u64 {
        match self {
            Engine::Single { round, .. } => *round,
            Engine::Windows(manager) => manager.round(),
        }
    }

    /// Attempts resolved per window.
    pub fn attempts(&self) -> u64 {
        match self {
            Engine::Single { worker, .. } => worker.attempts(),
            Engine::Windows(manager) => manager.attempts(),
        }
    }

    /// Whether every window is complete. Never for Metropolis.
    pub fn is_complete(&self) -> bool {
        match self {
            Engine::Single { worker, .. } => worker.sampler().criteria.is_complete(),
            Engine::Windows(manager) => manager.is_complete(),
        }
    }

    /// Canonical chains in window order.
    pub fn samplers(&self) -> Vec<&Sampler<S>> {
        match self {
            Engine::Single { worker, .. } => vec![worker.sampler()],
            Engine::Windows(manager) => manager.workers().iter().map(Worker::sampler).collect(),
        }
    }

    /// Current window layout; a Metropolis chain reports one empty window.
    pub fn windows(&self) -> Vec<Window> {
        match self {
            Engine::Single { .. } => vec![Window {
                index: 0,
                total: 1,
                soft_min: 0,
                soft_max: 0,
            }],
            Engine::Windows(manager) => manager.windows(),
        }
    }

    /// One round of at most `attempts` attempts per window.
    pub fn round_of(&mut self, attempts: u64) -> Result<Vec<Vec<Outcome>>, McError> {
        match self {
            Engine::Single { worker, round } => {
                let outcomes = worker.attempt(attempts)?;
                *round += 1;
                Ok(vec![outcomes])
            }
            Engine::Windows(manager) => manager.run_round(attempts),
        }
    }

    /// Mean exchange acceptance per neighbouring pair.
    pub fn exchange_acceptance(&self) -> Vec<f64> {
        match self {
            Engine::Single { .. } => Vec::new(),
            Engine::Windows(manager) => manager
                .exchange_stats()
                .iter()
                .map(|stats| stats.mean_acceptance())
                .collect(),
        }
    }

    /// Global estimate over the whole histogram, under flat-histogram.
    pub fn splice(&mut self) -> Result<Option<LnProbability>, McError> {
        match self {
            Engine::Single { .. } => Ok(None),
            Engine::Windows(manager) => manager.splice().map(|ln_prob| Some(ln_prob.clone())),
        }
    }
}

/// Runs a simulation from scratch with the provided configuration and seed.
pub fn run<S>(
    config: &RunConfig,
    seed: u64,
    system: S,
    trials: TrialSet<S::Move>,
) -> Result<RunSummary, McError>
where
    S: System + Serialize + DeserializeOwned,
    S::Move: Serialize + DeserializeOwned,
{
    let engine = Engine::new(config, seed, system, trials)?;
    info!(
        "starting run: {} window(s), budget {} attempts",
        engine.samplers().len(),
        config.attempts
    );
    run_engine(config, seed, engine)
}

/// Resumes a run from a checkpoint file.
pub fn resume<S>(path: &Path) -> Result<RunSummary, McError>
where
    S: System + Serialize + DeserializeOwned,
    S::Move: Serialize + DeserializeOwned,
{
    let payload = CheckpointPayload::<S>::load(path)?;
    payload.config.validate()?;
    let config = payload.config.clone();
    let seed = payload.master_seed;
    let round = payload.round;
    let exchange = payload.exchange.clone();
    let engine = Engine::restore(&config, seed, round, payload.into_samplers(), exchange)?;
    info!(
        "resuming from {} at round {round}, {} attempts",
        path.display(),
        engine.attempts()
    );
    run_engine(&config, seed, engine)
}

fn run_engine<S>(
    config: &RunConfig,
    seed: u64,
    mut engine: Engine<S>,
) -> Result<RunSummary, McError>
where
    S: System + Serialize + DeserializeOwned,
    S::Move: Serialize + DeserializeOwned,
{
    let mut recorder = MetricsRecorder::new();
    let mut checkpoints = Vec::new();
    let run_directory = config.output.run_directory.as_deref();

    while !engine.is_complete() && engine.attempts() < config.attempts {
        let attempts = config
            .windows
            .exchange_interval
            .min(config.attempts - engine.attempts());
        let outcomes = engine.round_of(attempts)?;
        record_metrics(&engine, &outcomes, &mut recorder);

        let round = engine.round();
        if config.checkpoint.interval > 0 && round % config.checkpoint.interval == 0 {
            if let Some(path) = write_checkpoint(config, seed, &engine, run_directory)? {
                checkpoints.push(path);
                checkpoint::enforce_retention(&mut checkpoints, config.checkpoint.max_to_keep)?;
            }
        }
    }

    let complete = engine.is_complete();
    if !complete && engine.samplers()[0].criteria.bias().is_some() {
        warn!(
            "attempt budget {} exhausted before every window completed",
            config.attempts
        );
    }
    let ln_macro_prob = engine.splice()?;
    let samplers = engine.samplers();
    let systems: Vec<&S> = samplers.iter().map(|sampler| &sampler.system).collect();
    let final_state_hash = manifest::hash_json(&systems)?;
    let final_energies = systems.iter().map(|system| system.current_energy()).collect();

    let metrics_path = if let Some(run_dir) = run_directory {
        let path = run_dir.join(&config.output.metrics_file);
        recorder
            .write_csv(&path)
            .map_err(|err| McError::io("metrics-write", err, &path))?;
        Some(path)
    } else {
        None
    };

    let report_path = match (run_directory, &ln_macro_prob) {
        (Some(run_dir), Some(ln_prob)) => {
            let criteria: Vec<&Criteria> = samplers.iter().map(|s| &s.criteria).collect();
            let rows = report::build_report(&criteria, ln_prob)?;
            let path = run_dir.join(&config.output.report_file);
            report::write_csv(&rows, &path)
                .map_err(|err| McError::io("report-write", err, &path))?;
            Some(path)
        }
        _ => None,
    };

    let windows = engine.windows();
    let manifest_path = if let Some(run_dir) = run_directory {
        let manifest_path = run_dir.join(&config.output.manifest_file);
        let relative = |path: &PathBuf| path.strip_prefix(run_dir).ok().map(Path::to_path_buf);
        let manifest = RunManifest {
            config: config.clone(),
            provenance: manifest::provenance(config),
            windows: windows.clone(),
            complete,
            attempts: engine.attempts(),
            final_state_hash: final_state_hash.clone(),
            metrics_file: metrics_path.as_ref().and_then(relative),
            report_file: report_path.as_ref().and_then(relative),
            checkpoints: checkpoints.iter().filter_map(relative).collect(),
        };
        manifest.write(&manifest_path)?;
        Some(manifest_path)
    } else {
        None
    };

    Ok(RunSummary {
        acceptance_rates: aggregate_acceptance(&samplers),
        exchange_acceptance: engine.exchange_acceptance(),
        coverage: recorder.coverage(),
        ln_macro_prob,
        windows,
        complete,
        attempts: engine.attempts(),
        rounds: engine.round(),
        final_energies,
        final_state_hash,
        metrics_path,
        report_path,
        manifest_path,
        checkpoints,
        samples: recorder.samples().to_vec(),
    })
}

fn record_metrics<S: System>(
    engine: &Engine<S>,
    outcomes: &[Vec<Outcome>],
    recorder: &mut MetricsRecorder,
) {
    let round = engine.round();
    for (window, (sampler, outcomes)) in engine.samplers().into_iter().zip(outcomes).enumerate() {
        recorder.push_sample(MetricSample {
            round,
            window,
            attempts: sampler.attempts(),
            energy: sampler.system.current_energy(),
            bin: sampler.criteria.current_bin(),
            accepted_moves: outcomes.iter().filter(|outcome| outcome.accepted).count(),
            proposed_moves: outcomes.len(),
            iterations: sampler
                .criteria
                .bias()
                .map_or(0, |bias| bias.num_iterations()),
            complete: sampler.criteria.is_complete(),
        });
    }
}

fn write_checkpoint<S>(
    config: &RunConfig,
    seed: u64,
    engine: &Engine<S>,
    run_directory: Option<&Path>,
) -> Result<Option<PathBuf>, McError>
where
    S: System + Serialize + DeserializeOwned,
    S::Move: Serialize + DeserializeOwned,
{
    let Some(run_dir) = run_directory else {
        return Ok(None);
    };
    let checkpoint_dir = run_dir.join(&config.output.checkpoint_dir);
    let path = checkpoint::checkpoint_path(&checkpoint_dir, engine.attempts());
    let exchange = match engine {
        Engine::Single { .. } => Vec::new(),
        Engine::Windows(manager) => manager.exchange_stats().to_vec(),
    };
    let payload = CheckpointPayload {
        round: engine.round(),
        config: config.clone(),
        master_seed: seed,
        exchange,
        windows: engine
            .windows()
            .into_iter()
            .zip(engine.samplers())
            .map(|(window, sampler)| WindowCheckpoint::capture(window, sampler))
            .collect(),
    };
    payload.store(&path)?;
    info!("checkpoint written to {}", path.display());
    Ok(Some(path))
}

fn aggregate_acceptance<S: System>(samplers: &[&Sampler<S>]) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, TrialStats> = BTreeMap::new();
    for sampler in samplers {
        for trial in sampler.trials.iter() {
            let entry = totals.entry(trial.name.clone()).or_default();
            entry.attempted += trial.stats.attempted;
            entry.accepted += trial.stats.accepted;
        }
    }
    totals
        .into_iter()
        .map(|(name, stats)| (name, stats.acceptance_rate()))
        .collect()
}
