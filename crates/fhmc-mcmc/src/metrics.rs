use std::fs::File;
use std::io::Write;
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Per-round, per-window metrics stored for CSV export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    /// Round after which the sample was recorded.
    pub round: u64,
    /// Window index.
    pub window: usize,
    /// Attempts resolved by the window.
    pub attempts: u64,
    /// Energy of the window's system.
    pub energy: f64,
    /// Macrostate bin of the walker, under flat-histogram.
    pub bin: Option<usize>,
    /// Accepted attempts within the round.
    pub accepted_moves: usize,
    /// Attempts within the round.
    pub proposed_moves: usize,
    /// Flatness events or sweeps of the window's bias.
    pub iterations: usize,
    /// Whether the window's bias is complete.
    pub complete: bool,
}

/// Aggregate coverage metrics summarising the exploration quality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageMetrics {
    /// Distinct macrostate bins seen at sample time.
    pub unique_bins: usize,
    /// Lowest bin seen.
    pub min_bin: Option<usize>,
    /// Highest bin seen.
    pub max_bin: Option<usize>,
    /// Mean energy over the recorded samples.
    pub mean_energy: f64,
    /// Variance of the recorded energy values.
    pub energy_variance: f64,
    /// Accepted fraction over every recorded round.
    pub acceptance: f64,
}

impl CoverageMetrics {
    /// Returns an empty coverage descriptor.
    pub fn empty() -> Self {
        Self {
            unique_bins: 0,
            min_bin: None,
            max_bin: None,
            mean_energy: 0.0,
            energy_variance: 0.0,
            acceptance: 0.0,
        }
    }
}

/// Collects per-round metrics and computes aggregate coverage proxies.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    samples: Vec<MetricSample>,
    bins: IndexSet<usize>,
}

impl MetricsRecorder {
    /// Creates a new recorder instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a metrics sample.
    pub fn push_sample(&mut self, sample: MetricSample) {
        if let Some(bin) = sample.bin {
            self.bins.insert(bin);
        }
        self.samples.push(sample);
    }

    /// Returns an immutable view over the recorded samples.
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Computes coverage metrics from the recorded data.
    pub fn coverage(&self) -> CoverageMetrics {
        if self.samples.is_empty() {
            return CoverageMetrics::empty();
        }
        let energies: Vec<f64> = self.samples.iter().map(|sample| sample.energy).collect();
        let mean_energy = energies.iter().sum::<f64>() / energies.len() as f64;
        let variance = if energies.len() > 1 {
            let mean_sq = energies.iter().map(|&e| e * e).sum::<f64>() / energies.len() as f64;
            (mean_sq - mean_energy * mean_energy).max(0.0)
        } else {
            0.0
        };
        let proposed: usize = self.samples.iter().map(|s| s.proposed_moves).sum();
        let accepted: usize = self.samples.iter().map(|s| s.accepted_moves).sum();
        CoverageMetrics {
            unique_bins: self.bins.len(),
            min_bin: self.bins.iter().min().copied(),
            max_bin: self.bins.iter().max().copied(),
            mean_energy,
            energy_variance: variance,
            acceptance: if proposed == 0 {
                0.0
            } else {
                accepted as f64 / proposed as f64
            },
        }
    }

    /// Writes the recorded metrics to a CSV file.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        writeln!(
            file,
            "round,window,attempts,energy,bin,accepted,proposed,iterations,complete"
        )?;
        for sample in &self.samples {
            writeln!(
                file,
                "{},{},{},{:.6},{},{},{},{},{}",
                sample.round,
                sample.window,
                sample.attempts,
                sample.energy,
                sample.bin.map(|bin| bin.to_string()).unwrap_or_default(),
                sample.accepted_moves,
                sample.proposed_moves,
                sample.iterations,
                sample.complete
            )?;
        }
        Ok(())
    }
}
