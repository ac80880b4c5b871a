//! Per-bin summary of a flat-histogram run.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError};

use crate::collection::{DOWN, STAY, UP};
use crate::criteria::Criteria;
use crate::ln_prob::LnProbability;

/// One histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinReport {
    /// Bin index.
    pub bin: usize,
    /// Macrostate value at the bin centre.
    pub center: f64,
    /// Log macrostate probability.
    pub ln_prob: f64,
    /// Visits summed over every window.
    pub visited: u64,
    /// Down, stay and up transition probabilities of the summed collection
    /// matrix, when one exists.
    pub transitions: Option<[f64; 3]>,
}

/// Builds the per-bin table from the window criteria and the global estimate.
pub fn build_report(
    windows: &[&Criteria],
    ln_prob: &LnProbability,
) -> Result<Vec<BinReport>, McError> {
    let macrostate = windows
        .first()
        .and_then(|criteria| criteria.macrostate())
        .ok_or_else(|| {
            McError::config("report-metropolis", "reports need a flat-histogram criteria")
        })?;
    let num_bins = macrostate.num_bins();
    if ln_prob.len() != num_bins {
        return Err(McError::Consistency(
            ErrorInfo::new("report-bins", "estimate and histogram disagree on the bin count")
                .with_context("estimate", ln_prob.len())
                .with_context("histogram", num_bins),
        ));
    }
    let mut visited = vec![0u64; num_bins];
    let mut rows = vec![[0.0f64; 3]; num_bins];
    let mut has_collection = false;
    for bias in windows.iter().filter_map(|criteria| criteria.bias()) {
        for (total, count) in visited.iter_mut().zip(bias.visited()) {
            *total += count;
        }
        if let Some(collection) = bias.collection() {
            has_collection = true;
            for (bin, row) in rows.iter_mut().enumerate() {
                let add = collection.row(bin);
                for direction in [DOWN, STAY, UP] {
                    row[direction] += add[direction];
                }
            }
        }
    }
    Ok((0..num_bins)
        .map(|bin| BinReport {
            bin,
            center: macrostate.center_of_bin(bin),
            ln_prob: ln_prob.value(bin),
            visited: visited[bin],
            transitions: has_collection.then(|| {
                let total: f64 = rows[bin].iter().sum();
                if total > 0.0 {
                    rows[bin].map(|count| count / total)
                } else {
                    [0.0; 3]
                }
            }),
        })
        .collect())
}

/// Writes the per-bin table as CSV.
pub fn write_csv<P: AsRef<Path>>(rows: &[BinReport], path: P) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "bin,center,ln_prob,visited,p_down,p_stay,p_up")?;
    for row in rows {
        let [down, stay, up] = row.transitions.unwrap_or([f64::NAN; 3]);
        writeln!(
            file,
            "{},{},{:.10},{},{:.6},{:.6},{:.6}",
            row.bin, row.center, row.ln_prob, row.visited, down, stay, up
        )?;
    }
    Ok(())
}
