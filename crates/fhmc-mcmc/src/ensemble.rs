//! Thermodynamics from a converged macrostate distribution.
//!
//! An [`Ensemble`] keeps the sampled `ln_macro_prob` untouched and derives a
//! reweighted copy for a shifted conjugate variable (`beta * mu` when the
//! macrostate is the particle number). Phase averages split the distribution
//! at its interior minimum, if it has one.

use log::debug;
use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError};

use crate::config::{CriteriaConfig, RunConfig};
use crate::criteria::Criteria;
use crate::ln_prob::LnProbability;
use crate::macrostate::Histogram;

/// Half-width of the neighbourhood a phase-boundary minimum must dominate.
pub const DEFAULT_NUM_SMOOTH: usize = 10;

/// Reweightable macrostate distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    histogram: Histogram,
    ln_prob_original: LnProbability,
    ln_prob: LnProbability,
    delta_conjugate: f64,
    num_smooth: usize,
}

impl Ensemble {
    /// Wraps `ln_prob` sampled over `histogram`.
    pub fn new(histogram: Histogram, ln_prob: LnProbability) -> Result<Self, McError> {
        if histogram.num_bins() != ln_prob.len() {
            return Err(McError::Config(
                ErrorInfo::new("ensemble-bins", "histogram and ln_prob disagree on the bin count")
                    .with_context("histogram", histogram.num_bins())
                    .with_context("ln_prob", ln_prob.len()),
            ));
        }
        Ok(Self {
            histogram,
            ln_prob: ln_prob.clone(),
            ln_prob_original: ln_prob,
            delta_conjugate: 0.0,
            num_smooth: DEFAULT_NUM_SMOOTH,
        })
    }

    /// Current estimate of a flat-histogram criteria.
    pub fn from_criteria(criteria: &Criteria) -> Result<Self, McError> {
        match (criteria.macrostate(), criteria.ln_macro_prob()) {
            (Some(macrostate), Some(ln_prob)) => {
                Self::new(macrostate.histogram().clone(), ln_prob.clone())
            }
            _ => Err(McError::config(
                "ensemble-metropolis",
                "a Metropolis criteria has no macrostate distribution",
            )),
        }
    }

    /// Spliced estimate of a run, binned as `config` describes.
    pub fn from_run(config: &RunConfig, ln_prob: &LnProbability) -> Result<Self, McError> {
        match &config.criteria {
            CriteriaConfig::FlatHistogram { macrostate, .. } => {
                Self::new(macrostate.histogram()?, ln_prob.clone())
            }
            CriteriaConfig::Metropolis => Err(McError::config(
                "ensemble-metropolis",
                "a Metropolis run has no macrostate distribution",
            )),
        }
    }

    /// Sets how many neighbours on each side a phase-boundary minimum must
    /// not exceed.
    pub fn with_num_smooth(mut self, num_smooth: usize) -> Self {
        self.num_smooth = num_smooth;
        self
    }

    /// Macrostate binning.
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Distribution as sampled.
    pub fn ln_prob_original(&self) -> &LnProbability {
        &self.ln_prob_original
    }

    /// Distribution after the last reweight.
    pub fn ln_prob(&self) -> &LnProbability {
        &self.ln_prob
    }

    /// Conjugate shift of the last reweight.
    pub fn delta_conjugate(&self) -> f64 {
        self.delta_conjugate
    }

    /// Reweights the sampled distribution by `exp(delta_conjugate * m)` for
    /// every bin centre `m`, then normalizes.
    pub fn reweight(&mut self, delta_conjugate: f64) -> &LnProbability {
        self.delta_conjugate = delta_conjugate;
        self.ln_prob = self.ln_prob_original.clone();
        for bin in 0..self.ln_prob.len() {
            self.ln_prob
                .add(bin, self.histogram.center_of_bin(bin) * delta_conjugate);
        }
        self.ln_prob.normalize();
        &self.ln_prob
    }

    /// Inclusive bin range of `phase`: 0 is below the interior minimum and
    /// 1 above it. Without a minimum every phase spans the whole histogram.
    pub fn phase_boundary(&self, phase: usize) -> Result<(usize, usize), McError> {
        let last = self.ln_prob.len() - 1;
        let minima = self.ln_prob.minima(self.num_smooth);
        match (minima.as_slice(), phase) {
            ([], _) => Ok((0, last)),
            ([boundary], 0) => Ok((0, *boundary)),
            ([boundary], 1) => Ok((*boundary, last)),
            ([_], _) => Err(McError::Config(
                ErrorInfo::new("ensemble-phase", "only phases 0 and 1 are defined")
                    .with_context("phase", phase),
            )),
            (many, _) => Err(McError::Consistency(
                ErrorInfo::new("ensemble-minima", "more than one interior minimum")
                    .with_context("minima", format!("{many:?}"))
                    .with_context("num_smooth", self.num_smooth)
                    .with_hint("raise num_smooth or reweight closer to coexistence"),
            )),
        }
    }

    /// True when the distribution has an interior minimum.
    pub fn is_phase_boundary(&self) -> Result<bool, McError> {
        let (min, max) = self.phase_boundary(0)?;
        Ok(!(min == 0 && max == self.ln_prob.len() - 1))
    }

    /// Probability-weighted average of per-bin `values` over `phase`.
    pub fn average(&self, values: &[f64], phase: usize) -> Result<f64, McError> {
        if values.len() != self.ln_prob.len() {
            return Err(McError::Config(
                ErrorInfo::new("ensemble-bins", "per-bin values disagree on the bin count")
                    .with_context("values", values.len())
                    .with_context("ln_prob", self.ln_prob.len()),
            ));
        }
        let (min, max) = self.phase_boundary(phase)?;
        let weighted: f64 = (min..=max)
            .map(|bin| values[bin] * self.ln_prob.value(bin).exp())
            .sum();
        Ok(weighted / self.ln_prob.sum_probability(min, max))
    }

    /// Average macrostate over `phase`.
    pub fn average_macrostate(&self, phase: usize) -> Result<f64, McError> {
        let centers: Vec<f64> = (0..self.histogram.num_bins())
            .map(|bin| self.histogram.center_of_bin(bin))
            .collect();
        self.average(&centers, phase)
    }
}

/// Grand-canonical view: the macrostate is the particle number and the
/// conjugate is `beta * mu`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrandCanonical {
    ensemble: Ensemble,
    beta_mu: f64,
}

impl GrandCanonical {
    /// `ensemble` sampled at `beta_mu`. Bin 0 must hold zero particles.
    pub fn new(ensemble: Ensemble, beta_mu: f64) -> Result<Self, McError> {
        let empty = ensemble.histogram().center_of_bin(0);
        if empty.abs() > 1e-12 {
            return Err(McError::Config(
                ErrorInfo::new("ensemble-empty-bin", "first macrostate must be zero particles")
                    .with_context("first_center", empty),
            ));
        }
        Ok(Self { ensemble, beta_mu })
    }

    /// Chemical potential times beta the distribution was sampled at.
    pub fn original_beta_mu(&self) -> f64 {
        self.beta_mu
    }

    /// Chemical potential times beta of the current reweight.
    pub fn beta_mu(&self) -> f64 {
        self.beta_mu + self.ensemble.delta_conjugate()
    }

    /// Reweights to an absolute `beta_mu`.
    pub fn reweight_to(&mut self, beta_mu: f64) -> &LnProbability {
        debug!("reweighting from beta_mu {} to {}", self.beta_mu, beta_mu);
        self.ensemble.reweight(beta_mu - self.beta_mu)
    }

    /// `beta * P * V` of `phase`, from the probability of the empty state.
    pub fn beta_pv(&self, phase: usize) -> Result<f64, McError> {
        let (min, max) = self.ensemble.phase_boundary(phase)?;
        let ln_prob = self.ensemble.ln_prob();
        Ok(-ln_prob.value(0) + ln_prob.sum_probability(min, max).ln())
    }

    /// Underlying ensemble.
    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }
}
