//! Contract consumed from the particle system collaborator.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::errors::McError;
use crate::rng::RngHandle;

/// Outcome of a single perturbation proposed against a [`System`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Potential energy change of the perturbation.
    pub delta_energy: f64,
    /// Log of the proposal asymmetry and activity factors
    /// (e.g. `ln((M - N) / (N + 1)) + ln z` for an insertion).
    pub ln_proposal_ratio: f64,
    /// Hard rejection signalled by the system (overlap, nothing to select).
    pub reject: bool,
    /// Extra integer shift applied to the macrostate bin for moves that jump
    /// more than the observed bin change.
    pub macrostate_shift: i64,
}

impl Proposal {
    /// A proposal with the given energy change and proposal ratio.
    pub fn new(delta_energy: f64, ln_proposal_ratio: f64) -> Self {
        Self {
            delta_energy,
            ln_proposal_ratio,
            reject: false,
            macrostate_shift: 0,
        }
    }

    /// A hard rejection. The system is left unchanged.
    pub fn rejected() -> Self {
        Self {
            delta_energy: 0.0,
            ln_proposal_ratio: 0.0,
            reject: true,
            macrostate_shift: 0,
        }
    }

    /// Raw log Metropolis probability at inverse temperature `beta`.
    pub fn ln_metropolis_prob(&self, beta: f64) -> f64 {
        -beta * self.delta_energy + self.ln_proposal_ratio
    }
}

/// Particle system driven by the acceptance engine.
///
/// `propose` leaves the system in the proposed state. Exactly one of
/// `commit` or `revert` must follow before the next proposal.
pub trait System: Clone + Send + Sync + Debug {
    /// System specific perturbation kind.
    type Move: Clone + Debug + Send + Sync;

    /// Total potential energy of the current state.
    fn current_energy(&self) -> f64;

    /// Number of particles in the current state.
    fn num_particles(&self) -> usize;

    /// Selects a subset, perturbs it and reports the energy change.
    fn propose(&mut self, mv: &Self::Move, rng: &mut RngHandle) -> Result<Proposal, McError>;

    /// Finalizes the last proposal.
    fn commit(&mut self);

    /// Restores the state preceding the last proposal.
    fn revert(&mut self);

    /// Configuration equality within `tolerance` on energies.
    fn is_equal(&self, other: &Self, tolerance: f64) -> bool;
}
