use log::{debug, trace};
use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError};

use crate::collection::{CollectionMatrix, STAY};
use crate::config::TransitionMatrixConfig;
use crate::ln_prob::LnProbability;

/// Detailed-balance estimate of `ln_macro_prob` from a collection matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMatrix {
    ln_prob: LnProbability,
    collection: CollectionMatrix,
    visits: Vec<u64>,
    min_visits: u64,
    min_sweeps: usize,
    num_sweeps: usize,
    updates_per_solve: u64,
    updates_since_solve: u64,
}

impl TransitionMatrix {
    /// Fresh estimate over `num_bins` bins.
    pub fn new(config: &TransitionMatrixConfig, num_bins: usize) -> Self {
        Self {
            ln_prob: LnProbability::uniform(num_bins),
            collection: CollectionMatrix::new(num_bins),
            visits: vec![0; num_bins],
            min_visits: config.min_visits,
            min_sweeps: config.min_sweeps,
            num_sweeps: 0,
            updates_per_solve: config.updates_per_solve,
            updates_since_solve: 0,
        }
    }

    /// `ln_p[old] - ln_p[new]`.
    pub fn ln_bias(&self, new: usize, old: usize) -> f64 {
        self.ln_prob.value(old) - self.ln_prob.value(new)
    }

    /// Accumulates the attempted transition with weight `min(1, exp(ln_metropolis_prob))`
    /// and its complement as a stay, whether or not the trial was accepted.
    pub fn update(
        &mut self,
        old: usize,
        new: usize,
        ln_metropolis_prob: f64,
        accepted: bool,
    ) -> Result<(), McError> {
        self.collect(old, new, ln_metropolis_prob)?;
        if accepted {
            self.visits[new] += 1;
        }
        self.updates_since_solve += 1;
        Ok(())
    }

    fn collect(&mut self, old: usize, new: usize, ln_metropolis_prob: f64) -> Result<(), McError> {
        let jump = new as i64 - old as i64;
        if jump.abs() > 1 {
            return Err(McError::Config(
                ErrorInfo::new(
                    "tm-jump",
                    "transition-matrix moves may change the macrostate by at most one bin",
                )
                .with_context("old", old)
                .with_context("new", new),
            ));
        }
        if jump == 0 {
            self.collection.increment(old, STAY, 1.0);
            return Ok(());
        }
        let probability = if ln_metropolis_prob >= 0.0 {
            1.0
        } else {
            ln_metropolis_prob.exp()
        };
        self.collection
            .increment(old, (jump + 1) as usize, probability);
        self.collection.increment(old, STAY, 1.0 - probability);
        Ok(())
    }

    /// Periodic solve and sweep bookkeeping over `[soft_min, soft_max]`.
    pub fn infrequent_update(&mut self, soft_min: usize, soft_max: usize) {
        if self.updates_since_solve >= self.updates_per_solve {
            self.collection.solve(&mut self.ln_prob);
            self.updates_since_solve = 0;
            trace!("transition-matrix solved after {} updates", self.updates_per_solve);
        }
        if soft_min > soft_max {
            return;
        }
        let min = self.visits[soft_min..=soft_max]
            .iter()
            .copied()
            .min()
            .unwrap_or(0);
        if min >= self.min_visits {
            self.num_sweeps += 1;
            self.visits.iter_mut().for_each(|v| *v = 0);
            debug!("transition-matrix sweep {} of {}", self.num_sweeps, self.min_sweeps);
        }
    }

    /// Solves immediately, regardless of the update counter.
    pub fn solve(&mut self) {
        self.collection.solve(&mut self.ln_prob);
        self.updates_since_solve = 0;
    }

    /// Current estimate.
    pub fn ln_prob(&self) -> &LnProbability {
        &self.ln_prob
    }

    /// Replaces the estimate.
    pub fn set_ln_prob(&mut self, ln_prob: LnProbability) {
        self.ln_prob = ln_prob;
    }

    /// Accumulated transition statistics.
    pub fn collection(&self) -> &CollectionMatrix {
        &self.collection
    }

    /// Accepted entries per bin since the last sweep.
    pub fn visits(&self) -> &[u64] {
        &self.visits
    }

    /// Completed sweeps.
    pub fn num_sweeps(&self) -> usize {
        self.num_sweeps
    }

    /// True once `num_sweeps >= min_sweeps`.
    pub fn is_complete(&self) -> bool {
        self.num_sweeps >= self.min_sweeps
    }
}
