//! Flat-histogram bias estimators.

mod transition_matrix;
mod wang_landau;
mod wltm;

pub use transition_matrix::TransitionMatrix;
pub use wang_landau::WangLandau;
pub use wltm::Wltm;

use serde::{Deserialize, Serialize};

use fhmc_core::{provenance, McError};

use crate::collection::CollectionMatrix;
use crate::config::BiasConfig;
use crate::ln_prob::LnProbability;

/// Serialization tag of [`Bias`] byte streams.
pub const BIAS_VERSION: u32 = 1;

/// Closed set of bias estimators owned by a flat-histogram criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bias {
    /// Wang-Landau.
    WangLandau(WangLandau),
    /// Transition-Matrix.
    TransitionMatrix(TransitionMatrix),
    /// Wang-Landau then Transition-Matrix.
    Wltm(Wltm),
}

impl Bias {
    /// Fresh estimator over `num_bins` bins.
    pub fn from_config(config: &BiasConfig, num_bins: usize) -> Result<Self, McError> {
        config.validate()?;
        Ok(match config {
            BiasConfig::WangLandau(wl) => Bias::WangLandau(WangLandau::new(wl, num_bins)),
            BiasConfig::TransitionMatrix(tm) => {
                Bias::TransitionMatrix(TransitionMatrix::new(tm, num_bins))
            }
            BiasConfig::Wltm(wltm) => Bias::Wltm(Wltm::new(wltm, num_bins)),
        })
    }

    /// Log correction added to the raw Metropolis probability for `old -> new`.
    pub fn ln_bias(&self, new: usize, old: usize) -> f64 {
        match self {
            Bias::WangLandau(wl) => wl.ln_bias(new, old),
            Bias::TransitionMatrix(tm) => tm.ln_bias(new, old),
            Bias::Wltm(wltm) => wltm.ln_bias(new, old),
        }
    }

    /// Records an attempt. Forced rejections arrive as `old -> old`.
    pub fn update(
        &mut self,
        old: usize,
        new: usize,
        ln_metropolis_prob: f64,
        accepted: bool,
    ) -> Result<(), McError> {
        match self {
            Bias::WangLandau(wl) => {
                wl.update(old, new, accepted);
                Ok(())
            }
            Bias::TransitionMatrix(tm) => tm.update(old, new, ln_metropolis_prob, accepted),
            Bias::Wltm(wltm) => wltm.update(old, new, ln_metropolis_prob, accepted),
        }
    }

    /// Flatness, solve and sweep bookkeeping over the soft range.
    pub fn infrequent_update(&mut self, soft_min: usize, soft_max: usize) {
        match self {
            Bias::WangLandau(wl) => {
                wl.infrequent_update(soft_min, soft_max);
            }
            Bias::TransitionMatrix(tm) => tm.infrequent_update(soft_min, soft_max),
            Bias::Wltm(wltm) => wltm.infrequent_update(soft_min, soft_max),
        }
    }

    /// Current estimate driving acceptance.
    pub fn ln_macro_prob(&self) -> &LnProbability {
        match self {
            Bias::WangLandau(wl) => wl.ln_prob(),
            Bias::TransitionMatrix(tm) => tm.ln_prob(),
            Bias::Wltm(wltm) => wltm.ln_prob(),
        }
    }

    /// Replaces the estimate driving acceptance.
    pub fn set_ln_macro_prob(&mut self, ln_prob: LnProbability) {
        match self {
            Bias::WangLandau(wl) => wl.set_ln_prob(ln_prob),
            Bias::TransitionMatrix(tm) => tm.set_ln_prob(ln_prob),
            Bias::Wltm(wltm) => {
                if wltm.is_transition_matrix_stage() {
                    wltm.transition_matrix_mut().set_ln_prob(ln_prob)
                } else {
                    wltm.wang_landau_mut().set_ln_prob(ln_prob)
                }
            }
        }
    }

    /// Collection matrix, when the active estimate is Transition-Matrix.
    pub fn collection(&self) -> Option<&CollectionMatrix> {
        match self {
            Bias::WangLandau(_) => None,
            Bias::TransitionMatrix(tm) => Some(tm.collection()),
            Bias::Wltm(wltm) if wltm.is_transition_matrix_stage() => {
                Some(wltm.transition_matrix().collection())
            }
            Bias::Wltm(_) => None,
        }
    }

    /// Per-bin visit counters of the active estimate.
    pub fn visited(&self) -> &[u64] {
        match self {
            Bias::WangLandau(wl) => wl.visited(),
            Bias::TransitionMatrix(tm) => tm.visits(),
            Bias::Wltm(wltm) if wltm.is_transition_matrix_stage() => {
                wltm.transition_matrix().visits()
            }
            Bias::Wltm(wltm) => wltm.wang_landau().visited(),
        }
    }

    /// Flatness events (Wang-Landau stage) or sweeps (Transition-Matrix stage).
    pub fn num_iterations(&self) -> usize {
        match self {
            Bias::WangLandau(wl) => wl.num_flatness(),
            Bias::TransitionMatrix(tm) => tm.num_sweeps(),
            Bias::Wltm(wltm) => {
                wltm.wang_landau().num_flatness() + wltm.transition_matrix().num_sweeps()
            }
        }
    }

    /// Local completion criterion.
    pub fn is_complete(&self) -> bool {
        match self {
            Bias::WangLandau(wl) => wl.is_complete(),
            Bias::TransitionMatrix(tm) => tm.is_complete(),
            Bias::Wltm(wltm) => wltm.is_complete(),
        }
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.ln_macro_prob().len()
    }

    /// Short estimator name used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Bias::WangLandau(_) => "wang-landau",
            Bias::TransitionMatrix(_) => "transition-matrix",
            Bias::Wltm(_) => "wltm",
        }
    }

    /// Versioned binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, McError> {
        provenance::to_bytes("bias", BIAS_VERSION, self)
    }

    /// Restores a bias written by [`Bias::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, McError> {
        provenance::from_bytes(bytes, "bias", BIAS_VERSION)
    }
}
