use log::info;
use serde::{Deserialize, Serialize};

use fhmc_core::McError;

use super::transition_matrix::TransitionMatrix;
use super::wang_landau::WangLandau;
use crate::config::WltmConfig;
use crate::ln_prob::LnProbability;

/// Wang-Landau drives sampling until `min_flatness`; the collection matrix
/// fills from `collect_flatness` onward and takes over afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wltm {
    wang_landau: WangLandau,
    transition_matrix: TransitionMatrix,
    collect_flatness: usize,
}

impl Wltm {
    /// Fresh hybrid over `num_bins` bins.
    pub fn new(config: &WltmConfig, num_bins: usize) -> Self {
        Self {
            wang_landau: WangLandau::new(&config.wang_landau, num_bins),
            transition_matrix: TransitionMatrix::new(&config.transition_matrix, num_bins),
            collect_flatness: config.collect_flatness,
        }
    }

    /// True once the Transition-Matrix estimate drives acceptance.
    pub fn is_transition_matrix_stage(&self) -> bool {
        self.wang_landau.is_complete()
    }

    fn is_collecting(&self) -> bool {
        self.wang_landau.num_flatness() >= self.collect_flatness
    }

    /// Bias of the active stage.
    pub fn ln_bias(&self, new: usize, old: usize) -> f64 {
        if self.is_transition_matrix_stage() {
            self.transition_matrix.ln_bias(new, old)
        } else {
            self.wang_landau.ln_bias(new, old)
        }
    }

    /// Updates Wang-Landau and, once collecting, the collection matrix.
    pub fn update(
        &mut self,
        old: usize,
        new: usize,
        ln_metropolis_prob: f64,
        accepted: bool,
    ) -> Result<(), McError> {
        self.wang_landau.update(old, new, accepted);
        if self.is_collecting() {
            self.transition_matrix
                .update(old, new, ln_metropolis_prob, accepted)?;
        }
        Ok(())
    }

    /// Flatness test, then solve and sweep bookkeeping when collecting.
    pub fn infrequent_update(&mut self, soft_min: usize, soft_max: usize) {
        let was_stage = self.is_transition_matrix_stage();
        self.wang_landau.infrequent_update(soft_min, soft_max);
        if self.is_collecting() {
            self.transition_matrix.infrequent_update(soft_min, soft_max);
        }
        if !was_stage && self.is_transition_matrix_stage() {
            // bins without transition data keep the Wang-Landau shape
            self.transition_matrix
                .set_ln_prob(self.wang_landau.ln_prob().clone());
            self.transition_matrix.solve();
            info!("wltm switched to transition-matrix estimate");
        }
    }

    /// Estimate of the active stage.
    pub fn ln_prob(&self) -> &LnProbability {
        if self.is_transition_matrix_stage() {
            self.transition_matrix.ln_prob()
        } else {
            self.wang_landau.ln_prob()
        }
    }

    /// Wang-Landau stage.
    pub fn wang_landau(&self) -> &WangLandau {
        &self.wang_landau
    }

    /// Transition-Matrix stage.
    pub fn transition_matrix(&self) -> &TransitionMatrix {
        &self.transition_matrix
    }

    pub(crate) fn wang_landau_mut(&mut self) -> &mut WangLandau {
        &mut self.wang_landau
    }

    pub(crate) fn transition_matrix_mut(&mut self) -> &mut TransitionMatrix {
        &mut self.transition_matrix
    }

    /// Complete when both stages are.
    pub fn is_complete(&self) -> bool {
        self.wang_landau.is_complete() && self.transition_matrix.is_complete()
    }
}
