use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError, RngHandle, System};

use crate::criteria::{Criteria, Decision};

/// Tolerance on the energy a replayed trial must reproduce.
pub const REPLAY_TOLERANCE: f64 = 1e-8;

/// Attempt and acceptance counters of one trial kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStats {
    /// Attempts.
    pub attempted: u64,
    /// Accepted attempts.
    pub accepted: u64,
}

impl TrialStats {
    /// Fraction of accepted attempts.
    pub fn acceptance_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }
}

/// Weighted move kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial<M> {
    /// Name used in reports.
    pub name: String,
    /// Relative selection weight.
    pub weight: f64,
    /// System move.
    pub mv: M,
    /// Counters.
    #[serde(default)]
    pub stats: TrialStats,
}

impl<M> Trial<M> {
    /// Trial with zeroed counters.
    pub fn new(name: impl Into<String>, weight: f64, mv: M) -> Self {
        Self {
            name: name.into(),
            weight,
            mv,
            stats: TrialStats::default(),
        }
    }
}

/// Trials sharing one criteria, chosen with probability proportional to weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSet<M> {
    trials: Vec<Trial<M>>,
}

impl<M> TrialSet<M> {
    /// Validates weights and wraps `trials`.
    pub fn new(trials: Vec<Trial<M>>) -> Result<Self, McError> {
        if trials.is_empty() {
            return Err(McError::config("trials-empty", "at least one trial is required"));
        }
        if let Some(bad) = trials
            .iter()
            .find(|trial| !(trial.weight.is_finite() && trial.weight > 0.0))
        {
            return Err(McError::Config(
                ErrorInfo::new("trial-weight", "trial weights must be positive")
                    .with_context("trial", &bad.name)
                    .with_context("weight", bad.weight),
            ));
        }
        Ok(Self { trials })
    }

    /// Number of trials.
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    /// Always false for a validated set.
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Trial at `index`.
    pub fn get(&self, index: usize) -> &Trial<M> {
        &self.trials[index]
    }

    /// All trials.
    pub fn iter(&self) -> impl Iterator<Item = &Trial<M>> {
        self.trials.iter()
    }

    /// Weighted random index.
    pub fn choose(&self, rng: &mut RngHandle) -> usize {
        if self.trials.len() == 1 {
            return 0;
        }
        let total: f64 = self.trials.iter().map(|trial| trial.weight).sum();
        let mut target = rng.uniform() * total;
        for (index, trial) in self.trials.iter().enumerate() {
            if target < trial.weight {
                return index;
            }
            target -= trial.weight;
        }
        self.trials.len() - 1
    }

    /// Counts one attempt of trial `index`.
    pub fn record(&mut self, index: usize, accepted: bool) {
        let stats = &mut self.trials[index].stats;
        stats.attempted += 1;
        if accepted {
            stats.accepted += 1;
        }
    }

    /// Counters of every trial, in order.
    pub fn stats(&self) -> Vec<TrialStats> {
        self.trials.iter().map(|trial| trial.stats).collect()
    }

    /// Overwrites every trial's counters.
    pub fn set_stats(&mut self, stats: &[TrialStats]) -> Result<(), McError> {
        if stats.len() != self.trials.len() {
            return Err(McError::Consistency(
                ErrorInfo::new("trial-stats", "trial statistics do not match the trial set")
                    .with_context("expected", self.trials.len())
                    .with_context("found", stats.len()),
            ));
        }
        for (trial, stat) in self.trials.iter_mut().zip(stats) {
            trial.stats = *stat;
        }
        Ok(())
    }

    /// Acceptance rate per trial name.
    pub fn acceptance_rates(&self) -> BTreeMap<String, f64> {
        self.trials
            .iter()
            .map(|trial| (trial.name.clone(), trial.stats.acceptance_rate()))
            .collect()
    }
}

/// Proposes trial `index` and decides it without committing anything.
///
/// A rejected proposal is reverted at once; an accepted one is left pending
/// on `system` until [`finalize`] or a discard.
pub fn speculate<S: System>(
    system: &mut S,
    criteria: &mut Criteria,
    trials: &TrialSet<S::Move>,
    index: usize,
    rng: &mut RngHandle,
) -> Result<Decision, McError> {
    criteria.before_trial(system)?;
    let proposal = system.propose(&trials.get(index).mv, rng)?;
    let acceptance = criteria.acceptance(&proposal);
    let decision = criteria.decide(&acceptance, system, rng.uniform());
    if !decision.accepted {
        system.revert();
    }
    Ok(decision)
}

/// Applies `decision` for trial `index`: commits a pending accepted proposal,
/// updates the criteria and trial statistics, then runs `after_trial`.
pub fn finalize<S: System>(
    system: &mut S,
    criteria: &mut Criteria,
    trials: &mut TrialSet<S::Move>,
    index: usize,
    decision: &Decision,
) -> Result<(), McError> {
    if decision.accepted {
        system.commit();
    }
    criteria.commit(decision)?;
    trials.record(index, decision.accepted);
    criteria.after_trial();
    Ok(())
}

/// Re-applies an accepted trial decided elsewhere.
///
/// `rng` must be a fresh copy of the stream the deciding replica used so the
/// same perturbation is proposed.
pub fn replay<S: System>(
    system: &mut S,
    criteria: &mut Criteria,
    trials: &mut TrialSet<S::Move>,
    index: usize,
    decision: &Decision,
    rng: &mut RngHandle,
) -> Result<(), McError> {
    if decision.accepted {
        system.propose(&trials.get(index).mv, rng)?;
        let energy = system.current_energy();
        if (energy - decision.energy_new).abs() > REPLAY_TOLERANCE {
            system.revert();
            return Err(McError::Consistency(
                ErrorInfo::new("replay-energy", "replayed trial reached a different energy")
                    .with_context("trial", index)
                    .with_context("expected", decision.energy_new)
                    .with_context("found", energy)
                    .with_context("macrostate_old", decision.macrostate_old)
                    .with_context("macrostate_new", decision.macrostate_new),
            ));
        }
    }
    finalize(system, criteria, trials, index, decision)
}
