//! Stitching per-window bias estimates into one estimate over the full range.

use log::{debug, warn};

use fhmc_core::{ErrorInfo, McError};

use crate::bias::Bias;
use crate::collection::CollectionMatrix;
use crate::ln_prob::LnProbability;

/// One window's contribution to a splice.
#[derive(Debug, Clone, Copy)]
pub struct Piece<'a> {
    /// Window bias.
    pub bias: &'a Bias,
    /// Lowest bin the window samples.
    pub soft_min: usize,
    /// Highest bin the window samples.
    pub soft_max: usize,
}

/// Global estimate from every window, ordered by range.
///
/// Transition-Matrix pieces (including hybrids past their switch) are summed
/// and solved afresh; anything else is aligned Wang-Landau style.
pub fn splice(pieces: &[Piece<'_>]) -> Result<LnProbability, McError> {
    let first = pieces
        .first()
        .ok_or_else(|| McError::config("splice-empty", "nothing to splice"))?;
    let num_bins = first.bias.num_bins();
    if let Some(bad) = pieces.iter().find(|piece| piece.bias.num_bins() != num_bins) {
        return Err(McError::Consistency(
            ErrorInfo::new("splice-bins", "windows disagree on the histogram size")
                .with_context("expected", num_bins)
                .with_context("found", bad.bias.num_bins()),
        ));
    }
    let collections: Option<Vec<&CollectionMatrix>> =
        pieces.iter().map(|piece| piece.bias.collection()).collect();
    match collections {
        Some(collections) => splice_transition_matrix(&collections),
        None => Ok(splice_wang_landau(pieces)),
    }
}

/// Element-wise sum of the collection matrices solved into a uniform start.
///
/// Depends only on the summed counts, so splicing twice gives the same result.
pub fn splice_transition_matrix(
    collections: &[&CollectionMatrix],
) -> Result<LnProbability, McError> {
    let first = collections
        .first()
        .ok_or_else(|| McError::config("splice-empty", "nothing to splice"))?;
    let mut total = CollectionMatrix::new(first.num_bins());
    for collection in collections {
        total.add(collection)?;
    }
    let mut ln_prob = LnProbability::uniform(total.num_bins());
    total.solve(&mut ln_prob);
    debug!("spliced {} collection matrices", collections.len());
    Ok(ln_prob)
}

/// Bin-wise copy from the owning window, shifting each window by the mean
/// difference to the estimate built so far over the overlap strip.
///
/// Overlap bins up to the strip midpoint belong to the lower window.
pub fn splice_wang_landau(pieces: &[Piece<'_>]) -> LnProbability {
    let num_bins = pieces.first().map_or(0, |piece| piece.bias.num_bins());
    let mut spliced = LnProbability::uniform(num_bins);
    let mut previous_max: Option<usize> = None;
    for (index, piece) in pieces.iter().enumerate() {
        let ln_prob = piece.bias.ln_macro_prob();
        let (lo, hi) = (piece.soft_min, piece.soft_max.min(num_bins.saturating_sub(1)));
        let Some(prev_max) = previous_max else {
            for bin in lo..=hi {
                spliced.set(bin, ln_prob.value(bin));
            }
            previous_max = Some(hi);
            continue;
        };
        let strip = lo..=prev_max.min(hi);
        let shift = if strip.is_empty() {
            warn!("window {index} shares no bins with window {}; splicing unaligned", index - 1);
            0.0
        } else {
            let count = strip.clone().count() as f64;
            strip
                .clone()
                .map(|bin| spliced.value(bin) - ln_prob.value(bin))
                .sum::<f64>()
                / count
        };
        let midpoint = if strip.is_empty() {
            prev_max
        } else {
            (lo + prev_max.min(hi)) / 2
        };
        for bin in lo..=hi {
            if bin <= prev_max && bin <= midpoint {
                continue;
            }
            spliced.set(bin, ln_prob.value(bin) + shift);
        }
        previous_max = Some(prev_max.max(hi));
    }
    spliced.normalize();
    spliced
}
