use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError};

use crate::ln_prob::LnProbability;

/// Column of a transition toward the next lower bin.
pub const DOWN: usize = 0;
/// Column of a transition that stays in the same bin.
pub const STAY: usize = 1;
/// Column of a transition toward the next higher bin.
pub const UP: usize = 2;

/// Acceptance-weighted transition accumulators, one `[down, stay, up]` row
/// per macrostate bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMatrix {
    rows: Vec<[f64; 3]>,
}

impl CollectionMatrix {
    /// Empty matrix for `num_bins` bins.
    pub fn new(num_bins: usize) -> Self {
        Self {
            rows: vec![[0.0; 3]; num_bins],
        }
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.rows.len()
    }

    /// Raw accumulators of one bin.
    pub fn row(&self, bin: usize) -> [f64; 3] {
        self.rows[bin]
    }

    /// Adds `weight` to column `direction` of row `bin`.
    pub fn increment(&mut self, bin: usize, direction: usize, weight: f64) {
        self.rows[bin][direction] += weight;
    }

    /// Row-normalized transition probability, zero for a row without data.
    pub fn transition_probability(&self, bin: usize, direction: usize) -> f64 {
        let row = self.rows[bin];
        let total: f64 = row.iter().sum();
        if total <= 0.0 {
            0.0
        } else {
            row[direction] / total
        }
    }

    /// Element-wise sum with another matrix of the same size.
    pub fn add(&mut self, other: &CollectionMatrix) -> Result<(), McError> {
        if other.num_bins() != self.num_bins() {
            return Err(McError::Consistency(
                ErrorInfo::new("collection-size", "collection matrices differ in size")
                    .with_context("left", self.num_bins())
                    .with_context("right", other.num_bins()),
            ));
        }
        for (mine, theirs) in self.rows.iter_mut().zip(&other.rows) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
        Ok(())
    }

    /// Solves detailed balance outward from bin 0 into `ln_prob`.
    ///
    /// `ln_prob[b+1] = ln_prob[b] + ln(P_up(b) / P_down(b+1))`. Where either
    /// probability is zero the previous difference between the two bins is
    /// kept. The result is normalized.
    pub fn solve(&self, ln_prob: &mut LnProbability) {
        let previous = ln_prob.clone();
        for bin in 0..self.num_bins().saturating_sub(1) {
            let up = self.transition_probability(bin, UP);
            let down = self.transition_probability(bin + 1, DOWN);
            let step = if up > 0.0 && down > 0.0 {
                (up / down).ln()
            } else {
                previous.value(bin + 1) - previous.value(bin)
            };
            ln_prob.set(bin + 1, ln_prob.value(bin) + step);
        }
        ln_prob.normalize();
    }
}
