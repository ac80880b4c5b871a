use std::fs;
use std::path::{Path, PathBuf};

use fhmc_core::{ErrorInfo, McError};
use serde::{Deserialize, Serialize};

use crate::macrostate::{Histogram, MacrostateKind};

/// YAML-configurable parameters governing a flat-histogram run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Inverse temperature.
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Attempt budget per window.
    #[serde(default = "default_attempts")]
    pub attempts: u64,
    /// Acceptance criteria.
    #[serde(default)]
    pub criteria: CriteriaConfig,
    /// Macrostate windowing.
    #[serde(default)]
    pub windows: WindowConfig,
    /// Speculative parallel execution inside each window. Serial when absent.
    #[serde(default)]
    pub prefetch: Option<PrefetchConfig>,
    /// Checkpointing behaviour.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Output directory configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_beta() -> f64 {
    1.0
}

fn default_attempts() -> u64 {
    100_000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            beta: default_beta(),
            attempts: default_attempts(),
            criteria: CriteriaConfig::default(),
            windows: WindowConfig::default(),
            prefetch: None,
            checkpoint: CheckpointConfig::default(),
            seed_policy: SeedPolicy::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, McError> {
        let config: RunConfig = serde_yaml::from_str(yaml)
            .map_err(|err| McError::Config(ErrorInfo::new("config-parse", err.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a YAML file.
    pub fn load(path: &Path) -> Result<Self, McError> {
        let contents =
            fs::read_to_string(path).map_err(|err| McError::io("config-read", err, path))?;
        Self::from_yaml_str(&contents).map_err(|err| match err {
            McError::Config(info) => {
                McError::Config(info.with_context("path", path.display()))
            }
            other => other,
        })
    }

    /// Rejects malformed configurations before any state is built.
    pub fn validate(&self) -> Result<(), McError> {
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(invalid("beta", "beta must be positive and finite", self.beta));
        }
        if self.attempts == 0 {
            return Err(invalid("attempts", "attempt budget must be positive", self.attempts));
        }
        let windows = &self.windows;
        if windows.num == 0 {
            return Err(invalid("windows-num", "at least one window is required", windows.num));
        }
        if !(windows.exponent.is_finite() && windows.exponent > 0.0) {
            return Err(invalid(
                "windows-exponent",
                "window exponent must be positive",
                windows.exponent,
            ));
        }
        if windows.exchange_interval == 0 {
            return Err(invalid(
                "exchange-interval",
                "exchange interval must be positive",
                windows.exchange_interval,
            ));
        }
        if let Some(prefetch) = &self.prefetch {
            if prefetch.threads == 0 {
                return Err(invalid("prefetch-threads", "prefetch needs a thread", 0));
            }
            if prefetch.steps_per_check == 0 {
                return Err(invalid(
                    "prefetch-check",
                    "steps_per_check must be positive",
                    0,
                ));
            }
        }
        match &self.criteria {
            CriteriaConfig::Metropolis => {
                if windows.num != 1 {
                    return Err(McError::Config(
                        ErrorInfo::new("windows-metropolis", "windows need a flat-histogram criteria")
                            .with_context("num", windows.num),
                    ));
                }
            }
            CriteriaConfig::FlatHistogram { macrostate, bias } => {
                macrostate.histogram()?;
                bias.validate()?;
            }
        }
        Ok(())
    }
}

fn invalid(code: &str, message: &str, value: impl ToString) -> McError {
    McError::Config(ErrorInfo::new(code, message).with_context("value", value))
}

/// Acceptance criteria selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CriteriaConfig {
    /// Plain Metropolis acceptance.
    #[default]
    Metropolis,
    /// Flat-histogram acceptance over a binned macrostate.
    FlatHistogram {
        /// Order parameter histogram.
        macrostate: MacrostateConfig,
        /// Bias estimator.
        bias: BiasConfig,
    },
}

/// Macrostate histogram definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacrostateConfig {
    /// Order parameter.
    #[serde(default = "default_macrostate_kind")]
    pub kind: MacrostateKind,
    /// Bin width.
    #[serde(default = "default_width")]
    pub width: f64,
    /// Centre of the first bin.
    #[serde(default)]
    pub min: f64,
    /// Centre of the last bin.
    pub max: f64,
}

fn default_macrostate_kind() -> MacrostateKind {
    MacrostateKind::NumParticles
}

fn default_width() -> f64 {
    1.0
}

impl MacrostateConfig {
    /// Builds the histogram, checking `num >= 2`.
    pub fn histogram(&self) -> Result<Histogram, McError> {
        Histogram::new(self.width, self.min, self.max)
    }
}

/// Bias estimator selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BiasConfig {
    /// Wang-Landau.
    WangLandau(WangLandauConfig),
    /// Transition-Matrix.
    TransitionMatrix(TransitionMatrixConfig),
    /// Wang-Landau until converged, Transition-Matrix afterwards.
    Wltm(WltmConfig),
}

impl BiasConfig {
    /// Checks estimator parameters.
    pub fn validate(&self) -> Result<(), McError> {
        match self {
            BiasConfig::WangLandau(wl) => wl.validate(),
            BiasConfig::TransitionMatrix(tm) => tm.validate(),
            BiasConfig::Wltm(wltm) => {
                wltm.wang_landau.validate()?;
                wltm.transition_matrix.validate()?;
                if wltm.collect_flatness >= wltm.wang_landau.min_flatness {
                    return Err(McError::Config(
                        ErrorInfo::new(
                            "wltm-collect",
                            "collect_flatness must be below min_flatness",
                        )
                        .with_context("collect_flatness", wltm.collect_flatness)
                        .with_context("min_flatness", wltm.wang_landau.min_flatness),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Wang-Landau parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WangLandauConfig {
    /// Flatness events after which the estimate is complete.
    #[serde(default = "default_min_flatness")]
    pub min_flatness: usize,
    /// Initial additive increment of `ln_macro_prob`.
    #[serde(default = "default_increment")]
    pub increment: f64,
    /// Flat when `min(visited) > flatness_threshold * mean(visited)`.
    #[serde(default = "default_flatness_threshold")]
    pub flatness_threshold: f64,
    /// Factor applied to the increment at every flatness event.
    #[serde(default = "default_reduce_ln_probability")]
    pub reduce_ln_probability: f64,
    /// Minimum visits of every bin before flatness is tested.
    #[serde(default = "default_min_visit_per_macro")]
    pub min_visit_per_macro: u64,
}

fn default_min_flatness() -> usize {
    20
}

fn default_increment() -> f64 {
    1.0
}

fn default_flatness_threshold() -> f64 {
    0.8
}

fn default_reduce_ln_probability() -> f64 {
    0.5
}

fn default_min_visit_per_macro() -> u64 {
    1000
}

impl Default for WangLandauConfig {
    fn default() -> Self {
        Self {
            min_flatness: default_min_flatness(),
            increment: default_increment(),
            flatness_threshold: default_flatness_threshold(),
            reduce_ln_probability: default_reduce_ln_probability(),
            min_visit_per_macro: default_min_visit_per_macro(),
        }
    }
}

impl WangLandauConfig {
    fn validate(&self) -> Result<(), McError> {
        if !(self.increment.is_finite() && self.increment > 0.0) {
            return Err(invalid("wl-increment", "increment must be positive", self.increment));
        }
        if !(self.flatness_threshold > 0.0 && self.flatness_threshold <= 1.0) {
            return Err(invalid(
                "wl-threshold",
                "flatness threshold must lie in (0, 1]",
                self.flatness_threshold,
            ));
        }
        if !(self.reduce_ln_probability > 0.0 && self.reduce_ln_probability < 1.0) {
            return Err(invalid(
                "wl-reduce",
                "reduction factor must lie in (0, 1)",
                self.reduce_ln_probability,
            ));
        }
        if self.min_flatness == 0 {
            return Err(invalid("wl-min-flatness", "min_flatness must be positive", 0));
        }
        Ok(())
    }
}

/// Transition-Matrix parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMatrixConfig {
    /// Sweeps after which the estimate is complete.
    #[serde(default = "default_min_sweeps")]
    pub min_sweeps: usize,
    /// Visits of every bin in the soft range that count as one sweep.
    #[serde(default = "default_min_visits")]
    pub min_visits: u64,
    /// Updates between two detailed-balance solves.
    #[serde(default = "default_updates_per_solve")]
    pub updates_per_solve: u64,
}

fn default_min_sweeps() -> usize {
    20
}

fn default_min_visits() -> u64 {
    100
}

fn default_updates_per_solve() -> u64 {
    1000
}

impl Default for TransitionMatrixConfig {
    fn default() -> Self {
        Self {
            min_sweeps: default_min_sweeps(),
            min_visits: default_min_visits(),
            updates_per_solve: default_updates_per_solve(),
        }
    }
}

impl TransitionMatrixConfig {
    fn validate(&self) -> Result<(), McError> {
        if self.min_sweeps == 0 || self.min_visits == 0 || self.updates_per_solve == 0 {
            return Err(McError::Config(
                ErrorInfo::new("tm-parameters", "transition-matrix parameters must be positive")
                    .with_context("min_sweeps", self.min_sweeps)
                    .with_context("min_visits", self.min_visits)
                    .with_context("updates_per_solve", self.updates_per_solve),
            ));
        }
        Ok(())
    }
}

/// Wang-Landau to Transition-Matrix hybrid parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WltmConfig {
    /// Flatness count from which the collection matrix accumulates.
    #[serde(default = "default_collect_flatness")]
    pub collect_flatness: usize,
    /// Wang-Landau stage; its `min_flatness` ends the stage.
    #[serde(default)]
    pub wang_landau: WangLandauConfig,
    /// Transition-Matrix stage.
    #[serde(default)]
    pub transition_matrix: TransitionMatrixConfig,
}

fn default_collect_flatness() -> usize {
    12
}

impl Default for WltmConfig {
    fn default() -> Self {
        Self {
            collect_flatness: default_collect_flatness(),
            wang_landau: WangLandauConfig::default(),
            transition_matrix: TransitionMatrixConfig::default(),
        }
    }
}

/// Window layout and inter-window communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Number of windows.
    #[serde(default = "default_num_windows")]
    pub num: usize,
    /// Exponent of the boundary spacing; above 1 narrows high windows.
    #[serde(default = "default_exponent")]
    pub exponent: f64,
    /// Bins shared by neighbouring windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Attempts each window performs between exchange passes.
    #[serde(default = "default_exchange_interval")]
    pub exchange_interval: u64,
    /// Attempts between two splices (0 disables splicing during the run).
    #[serde(default = "default_splice_interval")]
    pub splice_interval: u64,
    /// Attempt budget used to walk each window into its range.
    #[serde(default = "default_seek_attempts")]
    pub seek_attempts: u64,
    /// Move shared boundaries toward slower windows after each splice.
    #[serde(default)]
    pub adjust_bounds: bool,
    /// Smallest window, in bins, that bound adjustment may leave behind.
    #[serde(default = "default_min_window_size")]
    pub min_window_size: usize,
}

fn default_num_windows() -> usize {
    1
}

fn default_exponent() -> f64 {
    1.0
}

fn default_overlap() -> usize {
    1
}

fn default_exchange_interval() -> u64 {
    1000
}

fn default_splice_interval() -> u64 {
    10_000
}

fn default_seek_attempts() -> u64 {
    100_000
}

fn default_min_window_size() -> usize {
    5
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            num: default_num_windows(),
            exponent: default_exponent(),
            overlap: default_overlap(),
            exchange_interval: default_exchange_interval(),
            splice_interval: default_splice_interval(),
            seek_attempts: default_seek_attempts(),
            adjust_bounds: false,
            min_window_size: default_min_window_size(),
        }
    }
}

/// Speculative parallel trial evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Replicas, one per thread.
    #[serde(default = "default_prefetch_threads")]
    pub threads: usize,
    /// Cycles between replica self-checks.
    #[serde(default = "default_steps_per_check")]
    pub steps_per_check: u64,
    /// Use one trial kind for every replica of a cycle.
    #[serde(default)]
    pub load_balance: bool,
}

fn default_prefetch_threads() -> usize {
    2
}

fn default_steps_per_check() -> u64 {
    100
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            threads: default_prefetch_threads(),
            steps_per_check: default_steps_per_check(),
            load_balance: false,
        }
    }
}

/// Checkpointing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Rounds between checkpoint writes (0 disables checkpoints).
    #[serde(default)]
    pub interval: u64,
    /// Maximum number of checkpoints to retain.
    #[serde(default = "default_checkpoint_retention")]
    pub max_to_keep: usize,
}

fn default_checkpoint_retention() -> usize {
    4
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 0,
            max_to_keep: default_checkpoint_retention(),
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded in manifests.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

/// Output directory layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artefacts. Nothing is written when absent.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Metrics filename relative to `run_directory`.
    #[serde(default = "default_metrics_filename")]
    pub metrics_file: PathBuf,
    /// Manifest filename relative to `run_directory`.
    #[serde(default = "default_manifest_filename")]
    pub manifest_file: PathBuf,
    /// Per-bin criteria report relative to `run_directory`.
    #[serde(default = "default_report_filename")]
    pub report_file: PathBuf,
    /// Subdirectory used for checkpoint files.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

fn default_metrics_filename() -> PathBuf {
    PathBuf::from("metrics.csv")
}

fn default_manifest_filename() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_report_filename() -> PathBuf {
    PathBuf::from("ln_prob.csv")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: None,
            metrics_file: default_metrics_filename(),
            manifest_file: default_manifest_filename(),
            report_file: default_report_filename(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}
