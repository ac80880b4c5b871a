use serde::{Deserialize, Serialize};

/// Natural log of the macrostate probability distribution, one value per bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LnProbability {
    values: Vec<f64>,
}

impl LnProbability {
    /// Flat (all zero) estimate over `num_bins` bins.
    pub fn uniform(num_bins: usize) -> Self {
        Self {
            values: vec![0.0; num_bins],
        }
    }

    /// Wraps explicit per-bin values.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no bins.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a single bin.
    pub fn value(&self, bin: usize) -> f64 {
        self.values[bin]
    }

    /// All values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Overwrites a single bin.
    pub fn set(&mut self, bin: usize, value: f64) {
        self.values[bin] = value;
    }

    /// Adds `delta` to a single bin.
    pub fn add(&mut self, bin: usize, delta: f64) {
        self.values[bin] += delta;
    }

    /// `sum(exp(values))` over `[min, max]`.
    pub fn sum_probability(&self, min: usize, max: usize) -> f64 {
        self.values[min..=max].iter().map(|v| v.exp()).sum()
    }

    /// Interior local minima. A bin is a minimum when no bin within
    /// `num_smooth` of it on either side is lower; the first and last bins
    /// never count.
    pub fn minima(&self, num_smooth: usize) -> Vec<usize> {
        let len = self.values.len();
        (1..len.saturating_sub(1))
            .filter(|&bin| {
                let lower = bin.saturating_sub(num_smooth);
                let upper = (bin + num_smooth).min(len - 1);
                self.values[lower..=upper]
                    .iter()
                    .all(|&other| other >= self.values[bin])
            })
            .collect()
    }

    /// Shifts every bin so that `sum(exp(values)) == 1`.
    pub fn normalize(&mut self) {
        let max = self
            .values
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return;
        }
        let sum: f64 = self.values.iter().map(|v| (v - max).exp()).sum();
        let shift = max + sum.ln();
        for value in &mut self.values {
            *value -= shift;
        }
    }
}
