#![deny(missing_docs)]
#![doc = include_str!("../docs/engine-api.md")]

//! Flat-histogram Monte Carlo acceptance engine with windowed and
//! speculative parallel execution.

/// Flat-histogram bias estimators.
pub mod bias;
/// Checkpoint serialization helpers and payload structures.
pub mod checkpoint;
/// Transition collection matrix and its detailed-balance solve.
pub mod collection;
/// YAML configuration schema and defaults.
pub mod config;
/// Acceptance criteria state machine.
pub mod criteria;
/// Deterministic seed derivation helpers.
pub mod determinism;
pub mod ensemble;
/// Sampling engine and public `run`/`resume` entry points.
pub mod kernel;
/// Log probability over macrostate bins.
pub mod ln_prob;
/// Binned order parameter with soft bounds.
pub mod macrostate;
/// Run manifest serialization helpers.
pub mod manifest;
/// Metrics collection and coverage summaries.
pub mod metrics;
pub mod prefetch;
pub mod report;
/// Serial Markov chain.
pub mod sampler;
pub mod splice;
/// Weighted trials and the speculate/finalize/replay protocol.
pub mod trial;
pub mod window;

pub use bias::{Bias, TransitionMatrix, WangLandau, Wltm};
pub use collection::CollectionMatrix;
pub use config::{
    BiasConfig, CheckpointConfig, CriteriaConfig, MacrostateConfig, OutputConfig,
    PrefetchConfig, RunConfig, SeedPolicy, TransitionMatrixConfig, WangLandauConfig,
    WindowConfig, WltmConfig,
};
pub use criteria::{Acceptance, Criteria, Decision};
pub use ensemble::{Ensemble, GrandCanonical};
pub use kernel::{resume, run, Engine, RunSummary};
pub use ln_prob::LnProbability;
pub use macrostate::{Histogram, Macrostate, MacrostateKind};
pub use metrics::{CoverageMetrics, MetricSample};
pub use prefetch::{Phase, Prefetch};
pub use sampler::{Outcome, Sampler};
pub use trial::{Trial, TrialSet, TrialStats};
pub use window::{Window, WindowManager, Worker};
