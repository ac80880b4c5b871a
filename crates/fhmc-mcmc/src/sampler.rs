use serde::{Deserialize, Serialize};

use fhmc_core::{McError, RngHandle, System};

use crate::criteria::Criteria;
use crate::determinism::{trial_rng, trial_seed};
use crate::trial::{finalize, speculate, TrialSet};

/// Resolved attempt, in logical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Attempt number within the window stream.
    pub attempt: u64,
    /// Trial index.
    pub trial: usize,
    /// Whether it was accepted.
    pub accepted: bool,
}

/// Serial Markov chain: one system, its criteria and trials.
#[derive(Debug, Clone)]
pub struct Sampler<S: System> {
    /// Simulated system.
    pub system: S,
    /// Acceptance criteria.
    pub criteria: Criteria,
    /// Trial kinds.
    pub trials: TrialSet<S::Move>,
    seed: u64,
    attempts: u64,
}

impl<S: System> Sampler<S> {
    /// Attaches `system` to `criteria` and starts a fresh stream.
    pub fn new(
        system: S,
        mut criteria: Criteria,
        trials: TrialSet<S::Move>,
        seed: u64,
    ) -> Result<Self, McError> {
        criteria.initialize(&system)?;
        Ok(Self {
            system,
            criteria,
            trials,
            seed,
            attempts: 0,
        })
    }

    /// Rebuilds a sampler from checkpointed parts without re-initializing.
    pub fn restore(
        system: S,
        criteria: Criteria,
        trials: TrialSet<S::Move>,
        seed: u64,
        attempts: u64,
    ) -> Self {
        Self {
            system,
            criteria,
            trials,
            seed,
            attempts,
        }
    }

    /// Stream seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Attempts resolved so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub(crate) fn advance(&mut self, resolved: u64) {
        self.attempts += resolved;
    }

    /// One attempt on the stream of attempt number `attempts()`.
    pub fn attempt_one(&mut self) -> Result<Outcome, McError> {
        let attempt = self.attempts;
        let (index, mut rng) = trial_rng(self.seed, attempt, &self.trials, None);
        let decision = speculate(
            &mut self.system,
            &mut self.criteria,
            &self.trials,
            index,
            &mut rng,
        )?;
        finalize(
            &mut self.system,
            &mut self.criteria,
            &mut self.trials,
            index,
            &decision,
        )?;
        self.attempts += 1;
        Ok(Outcome {
            attempt,
            trial: index,
            accepted: decision.accepted,
        })
    }

    /// `num` attempts.
    pub fn attempt(&mut self, num: u64) -> Result<Vec<Outcome>, McError> {
        (0..num).map(|_| self.attempt_one()).collect()
    }

    /// Attempts until the criteria completes or `budget` total attempts are spent.
    pub fn run_until_complete(&mut self, budget: u64) -> Result<bool, McError> {
        while !self.criteria.is_complete() && self.attempts < budget {
            self.attempt_one()?;
        }
        Ok(self.criteria.is_complete())
    }

    /// Walks the system into `[target_min, target_max]` with a temporary
    /// seek criteria, then syncs the permanent criteria. Returns whether
    /// the target was reached within `max_attempts`.
    pub fn seek(
        &mut self,
        target_min: usize,
        target_max: usize,
        max_attempts: u64,
        seed: u64,
    ) -> Result<bool, McError> {
        let mut seek = self.criteria.seek(target_min, target_max)?;
        let in_target = |criteria: &Criteria| {
            criteria
                .current_bin()
                .map_or(false, |bin| bin >= target_min && bin <= target_max)
        };
        let mut attempt = 0;
        while !in_target(&seek) && attempt < max_attempts {
            let mut rng = RngHandle::from_seed(trial_seed(seed, attempt));
            let index = self.trials.choose(&mut rng);
            let decision = speculate(&mut self.system, &mut seek, &self.trials, index, &mut rng)?;
            if decision.accepted {
                self.system.commit();
            }
            seek.commit(&decision)?;
            seek.after_trial();
            attempt += 1;
        }
        self.criteria.sync(&self.system)?;
        Ok(in_target(&seek))
    }
}
