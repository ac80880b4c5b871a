use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::WangLandauConfig;
use crate::ln_prob::LnProbability;

/// Additive, self-annealing estimate of `ln_macro_prob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WangLandau {
    ln_prob: LnProbability,
    visited: Vec<u64>,
    increment: f64,
    flatness_threshold: f64,
    reduce_ln_probability: f64,
    min_flatness: usize,
    min_visit_per_macro: u64,
    num_flatness: usize,
}

impl WangLandau {
    /// Fresh estimate over `num_bins` bins.
    pub fn new(config: &WangLandauConfig, num_bins: usize) -> Self {
        Self {
            ln_prob: LnProbability::uniform(num_bins),
            visited: vec![0; num_bins],
            increment: config.increment,
            flatness_threshold: config.flatness_threshold,
            reduce_ln_probability: config.reduce_ln_probability,
            min_flatness: config.min_flatness,
            min_visit_per_macro: config.min_visit_per_macro,
            num_flatness: 0,
        }
    }

    /// `ln_p[old] - ln_p[new]`.
    pub fn ln_bias(&self, new: usize, old: usize) -> f64 {
        self.ln_prob.value(old) - self.ln_prob.value(new)
    }

    /// Adds the current increment to the bin the walker ends up in.
    pub fn update(&mut self, old: usize, new: usize, accepted: bool) {
        if self.is_complete() {
            return;
        }
        let bin = if accepted { new } else { old };
        self.ln_prob.add(bin, self.increment);
        self.visited[bin] += 1;
    }

    /// Tests flatness over `[soft_min, soft_max]`. Returns true on a flatness event.
    pub fn infrequent_update(&mut self, soft_min: usize, soft_max: usize) -> bool {
        if self.is_complete() || soft_min > soft_max {
            return false;
        }
        let range = &self.visited[soft_min..=soft_max];
        let min = range.iter().copied().min().unwrap_or(0);
        if min < self.min_visit_per_macro {
            return false;
        }
        let mean = range.iter().sum::<u64>() as f64 / range.len() as f64;
        if (min as f64) <= self.flatness_threshold * mean {
            return false;
        }
        self.visited.iter_mut().for_each(|v| *v = 0);
        self.increment *= self.reduce_ln_probability;
        self.num_flatness += 1;
        self.ln_prob.normalize();
        debug!(
            "wang-landau flat: num_flatness={} increment={:.3e}",
            self.num_flatness, self.increment
        );
        true
    }

    /// Current estimate.
    pub fn ln_prob(&self) -> &LnProbability {
        &self.ln_prob
    }

    /// Replaces the estimate.
    pub fn set_ln_prob(&mut self, ln_prob: LnProbability) {
        self.ln_prob = ln_prob;
    }

    /// Visits since the last flatness event.
    pub fn visited(&self) -> &[u64] {
        &self.visited
    }

    /// Current additive increment.
    pub fn increment(&self) -> f64 {
        self.increment
    }

    /// Number of flatness events so far.
    pub fn num_flatness(&self) -> usize {
        self.num_flatness
    }

    /// Flatness events required for completion.
    pub fn min_flatness(&self) -> usize {
        self.min_flatness
    }

    /// True once `num_flatness >= min_flatness`.
    pub fn is_complete(&self) -> bool {
        self.num_flatness >= self.min_flatness
    }
}
