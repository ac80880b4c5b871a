use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use fhmc_core::{provenance, ErrorInfo, McError, System};

use crate::config::RunConfig;
use crate::criteria::Criteria;
use crate::sampler::Sampler;
use crate::trial::TrialSet;
use crate::window::{ExchangeStats, Window};

/// Envelope kind of run checkpoints.
pub const CHECKPOINT_KIND: &str = "run-checkpoint";
/// Envelope version of run checkpoints.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable state of one window's canonical chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize, S::Move: Serialize",
    deserialize = "S: DeserializeOwned, S::Move: DeserializeOwned"
))]
pub struct WindowCheckpoint<S: System> {
    /// Window layout at the time of checkpointing.
    pub window: Window,
    /// Stream seed.
    pub seed: u64,
    /// Attempts resolved.
    pub attempts: u64,
    /// System configuration.
    pub system: S,
    /// Criteria with macrostate, soft bounds and bias state.
    pub criteria: Criteria,
    /// Trials with their statistics.
    pub trials: TrialSet<S::Move>,
}

impl<S: System> WindowCheckpoint<S> {
    /// Snapshot of `sampler` sampling `window`.
    pub fn capture(window: Window, sampler: &Sampler<S>) -> Self {
        Self {
            window,
            seed: sampler.seed(),
            attempts: sampler.attempts(),
            system: sampler.system.clone(),
            criteria: sampler.criteria.clone(),
            trials: sampler.trials.clone(),
        }
    }

    /// Chain continuing exactly where the snapshot was taken.
    pub fn into_sampler(self) -> Sampler<S> {
        Sampler::restore(
            self.system,
            self.criteria,
            self.trials,
            self.seed,
            self.attempts,
        )
    }
}

/// Aggregated checkpoint payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize, S::Move: Serialize",
    deserialize = "S: DeserializeOwned, S::Move: DeserializeOwned"
))]
pub struct CheckpointPayload<S: System> {
    /// Completed rounds.
    pub round: u64,
    /// Configuration snapshot associated with the run.
    pub config: RunConfig,
    /// Master seed used to derive window substreams.
    pub master_seed: u64,
    /// Exchange counters per neighbouring pair.
    #[serde(default)]
    pub exchange: Vec<ExchangeStats>,
    /// Window states, in window order.
    pub windows: Vec<WindowCheckpoint<S>>,
}

impl<S> CheckpointPayload<S>
where
    S: System + Serialize + DeserializeOwned,
    S::Move: Serialize + DeserializeOwned,
{
    /// Restores the payload from disk, rejecting unknown kinds and versions.
    pub fn load(path: &Path) -> Result<Self, McError> {
        let contents =
            fs::read_to_string(path).map_err(|err| McError::io("checkpoint-read", err, path))?;
        let payload: Self = provenance::from_json(&contents, CHECKPOINT_KIND, CHECKPOINT_VERSION)
            .map_err(|err| McError::Serde(err.info().clone().with_context("path", path.display())))?;
        if payload.windows.is_empty() {
            return Err(McError::Serde(
                ErrorInfo::new("empty-checkpoint", "checkpoint contained no windows")
                    .with_context("path", path.display()),
            ));
        }
        Ok(payload)
    }

    /// Writes the payload to disk.
    pub fn store(&self, path: &Path) -> Result<(), McError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| McError::io("checkpoint-mkdir", err, parent))?;
        }
        let json = provenance::to_json(CHECKPOINT_KIND, CHECKPOINT_VERSION, self)?;
        fs::write(path, json).map_err(|err| McError::io("checkpoint-write", err, path))
    }

    /// Canonical chains in window order.
    pub fn into_samplers(self) -> Vec<Sampler<S>> {
        self.windows
            .into_iter()
            .map(WindowCheckpoint::into_sampler)
            .collect()
    }
}

/// Deterministic checkpoint file name keyed by attempts per window.
pub fn checkpoint_path(root: &Path, attempts: u64) -> PathBuf {
    root.join(format!("ckpt_{attempts:010}.json"))
}

/// Deletes the oldest checkpoints beyond `max_to_keep`.
pub fn enforce_retention(paths: &mut Vec<PathBuf>, max_to_keep: usize) -> Result<(), McError> {
    while paths.len() > max_to_keep {
        let path = paths.remove(0);
        fs::remove_file(&path).map_err(|err| McError::io("checkpoint-remove", err, &path))?;
    }
    Ok(())
}
