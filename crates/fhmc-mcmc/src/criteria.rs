use serde::{Deserialize, Serialize};

use fhmc_core::{provenance, ErrorInfo, McError, Proposal, RngHandle, System};

use crate::bias::{Bias, WangLandau};
use crate::config::{CriteriaConfig, RunConfig, WangLandauConfig};
use crate::ln_prob::LnProbability;
use crate::macrostate::Macrostate;

/// Total log probabilities below this never accept; `exp` would underflow.
pub const LN_NEVER: f64 = -700.0;
/// Magnitude of the log probability recorded for forced rejections.
pub const NEAR_INFINITY: f64 = 1.0e30;
/// Serialization tag of [`Criteria`] byte streams.
pub const CRITERIA_VERSION: u32 = 1;

/// Quantities a proposal contributes to the acceptance test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acceptance {
    /// Raw log Metropolis probability (`-beta dU + ln proposal ratio`).
    pub ln_metropolis_prob: f64,
    /// Hard rejection requested by the system.
    pub reject: bool,
    /// Extra macrostate bin shift of the move.
    pub macrostate_shift: i64,
    /// Energy of the proposed state.
    pub energy_new: f64,
}

/// Outcome of the acceptance test, computed without mutating the criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the trial is accepted.
    pub accepted: bool,
    /// Rejected before the Metropolis test (hard rejection or soft bounds).
    pub auto_rejected: bool,
    /// Raw log Metropolis probability, `-NEAR_INFINITY` for forced rejections.
    pub ln_metropolis_prob: f64,
    /// Macrostate bin before the trial.
    pub macrostate_old: usize,
    /// Macrostate bin after the trial if accepted.
    pub macrostate_new: usize,
    /// Energy of the proposed state.
    pub energy_new: f64,
}

impl Decision {
    /// Rejection before the Metropolis test, booked as a stay in `old`.
    fn forced(old: usize, energy: f64) -> Self {
        Self {
            accepted: false,
            auto_rejected: true,
            ln_metropolis_prob: -NEAR_INFINITY,
            macrostate_old: old,
            macrostate_new: old,
            energy_new: energy,
        }
    }
}

/// Flat-histogram state: the macrostate, its bias and the walker position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatHistogram {
    macrostate: Macrostate,
    bias: Bias,
    current: usize,
    old: usize,
}

/// Acceptance mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mode {
    /// Plain Metropolis; no macrostate and no bias.
    Metropolis,
    /// Biased acceptance over a binned macrostate.
    FlatHistogram(FlatHistogram),
}

/// Acceptance state machine.
///
/// A trial runs `before_trial`, then `decide` on the proposed state, then
/// `commit` with that decision and finally `after_trial`. `decide` is pure so
/// a decision taken on one replica can be committed to every other replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    beta: f64,
    current_energy: f64,
    mode: Mode,
}

fn passes(total_ln_prob: f64, uniform: f64) -> bool {
    if total_ln_prob >= 0.0 {
        true
    } else if total_ln_prob < LN_NEVER {
        false
    } else {
        uniform < total_ln_prob.exp()
    }
}

impl Criteria {
    /// Plain Metropolis criteria.
    pub fn metropolis(beta: f64) -> Self {
        Self {
            beta,
            current_energy: 0.0,
            mode: Mode::Metropolis,
        }
    }

    /// Flat-histogram criteria owning `macrostate` and `bias`.
    pub fn flat_histogram(beta: f64, macrostate: Macrostate, bias: Bias) -> Result<Self, McError> {
        if bias.num_bins() != macrostate.num_bins() {
            return Err(McError::Config(
                ErrorInfo::new("bias-bins", "bias and macrostate disagree on the bin count")
                    .with_context("bias", bias.num_bins())
                    .with_context("macrostate", macrostate.num_bins()),
            ));
        }
        Ok(Self {
            beta,
            current_energy: 0.0,
            mode: Mode::FlatHistogram(FlatHistogram {
                macrostate,
                bias,
                current: 0,
                old: 0,
            }),
        })
    }

    /// Builds the configured criteria.
    pub fn from_config(config: &RunConfig) -> Result<Self, McError> {
        match &config.criteria {
            CriteriaConfig::Metropolis => Ok(Self::metropolis(config.beta)),
            CriteriaConfig::FlatHistogram { macrostate, bias } => {
                let histogram = macrostate.histogram()?;
                let num_bins = histogram.num_bins();
                Self::flat_histogram(
                    config.beta,
                    Macrostate::new(macrostate.kind, histogram),
                    Bias::from_config(bias, num_bins)?,
                )
            }
        }
    }

    /// Records the energy and macrostate of a freshly attached system.
    pub fn initialize<S: System>(&mut self, system: &S) -> Result<(), McError> {
        self.current_energy = system.current_energy();
        if let Mode::FlatHistogram(fh) = &mut self.mode {
            let bin = fh.macrostate.bin(system);
            if !fh.macrostate.in_histogram(bin) {
                return Err(McError::Config(
                    ErrorInfo::new("initial-macrostate", "system lies outside the histogram")
                        .with_context("bin", bin)
                        .with_context("num_bins", fh.macrostate.num_bins()),
                ));
            }
            fh.current = bin as usize;
            fh.old = bin as usize;
        }
        Ok(())
    }

    /// Re-reads energy and macrostate after the system was replaced.
    pub fn sync<S: System>(&mut self, system: &S) -> Result<(), McError> {
        self.initialize(system).map_err(|err| match err {
            McError::Config(info) => McError::Consistency(info),
            other => other,
        })
    }

    /// Records the macrostate before a trial.
    pub fn before_trial<S: System>(&mut self, system: &S) -> Result<(), McError> {
        if let Mode::FlatHistogram(fh) = &mut self.mode {
            let bin = fh.macrostate.bin(system);
            if !fh.macrostate.in_histogram(bin) {
                return Err(McError::Consistency(
                    ErrorInfo::new("macrostate-escape", "system left the histogram")
                        .with_context("system_bin", bin)
                        .with_context("criteria_bin", fh.current)
                        .with_context("energy", system.current_energy()),
                ));
            }
            fh.old = bin as usize;
            fh.current = fh.old;
        }
        Ok(())
    }

    /// Acceptance inputs of `proposal`.
    pub fn acceptance(&self, proposal: &Proposal) -> Acceptance {
        Acceptance {
            ln_metropolis_prob: proposal.ln_metropolis_prob(self.beta),
            reject: proposal.reject,
            macrostate_shift: proposal.macrostate_shift,
            energy_new: self.current_energy + proposal.delta_energy,
        }
    }

    /// Accept/reject decision for the system in its proposed state.
    pub fn decide<S: System>(&self, acceptance: &Acceptance, system: &S, uniform: f64) -> Decision {
        let raw = acceptance.ln_metropolis_prob;
        match &self.mode {
            Mode::Metropolis => {
                if acceptance.reject {
                    return Decision::forced(0, self.current_energy);
                }
                Decision {
                    accepted: passes(raw, uniform),
                    auto_rejected: false,
                    ln_metropolis_prob: raw,
                    macrostate_old: 0,
                    macrostate_new: 0,
                    energy_new: acceptance.energy_new,
                }
            }
            Mode::FlatHistogram(fh) => {
                let old = fh.old;
                if acceptance.reject {
                    return Decision::forced(old, self.current_energy);
                }
                let new = fh.macrostate.bin(system) + acceptance.macrostate_shift;
                if !fh.macrostate.is_bin_allowed(new) {
                    return Decision::forced(old, self.current_energy);
                }
                let new = new as usize;
                let total = raw + fh.bias.ln_bias(new, old);
                Decision {
                    accepted: passes(total, uniform),
                    auto_rejected: false,
                    ln_metropolis_prob: raw,
                    macrostate_old: old,
                    macrostate_new: new,
                    energy_new: acceptance.energy_new,
                }
            }
        }
    }

    /// Applies a decision: bias update, then macrostate and energy advance.
    pub fn commit(&mut self, decision: &Decision) -> Result<(), McError> {
        if let Mode::FlatHistogram(fh) = &mut self.mode {
            let old = decision.macrostate_old;
            fh.bias.update(
                old,
                decision.macrostate_new,
                decision.ln_metropolis_prob,
                decision.accepted,
            )?;
            if decision.accepted {
                fh.current = decision.macrostate_new;
            }
        }
        if decision.accepted {
            self.current_energy = decision.energy_new;
        }
        Ok(())
    }

    /// Draws the uniform variate, decides and commits in one step.
    pub fn is_accepted<S: System>(
        &mut self,
        acceptance: &Acceptance,
        system: &S,
        rng: &mut RngHandle,
    ) -> Result<bool, McError> {
        let decision = self.decide(acceptance, system, rng.uniform());
        self.commit(&decision)?;
        Ok(decision.accepted)
    }

    /// Periodic bias bookkeeping after a trial is finalized.
    pub fn after_trial(&mut self) {
        if let Mode::FlatHistogram(fh) = &mut self.mode {
            let (soft_min, soft_max) = (fh.macrostate.soft_min(), fh.macrostate.soft_max());
            fh.bias.infrequent_update(soft_min, soft_max);
        }
    }

    /// Short-lived Wang-Landau criteria whose soft bounds span the current
    /// bin and `[target_min, target_max]`, used to walk a system into range.
    pub fn seek(&self, target_min: usize, target_max: usize) -> Result<Criteria, McError> {
        let Mode::FlatHistogram(fh) = &self.mode else {
            return Err(McError::config(
                "seek-metropolis",
                "seeking a macrostate range needs a flat-histogram criteria",
            ));
        };
        let mut macrostate = fh.macrostate.clone();
        macrostate.set_soft_bounds(fh.current.min(target_min), fh.current.max(target_max))?;
        let num_bins = macrostate.num_bins();
        Ok(Criteria {
            beta: self.beta,
            current_energy: self.current_energy,
            mode: Mode::FlatHistogram(FlatHistogram {
                macrostate,
                bias: Bias::WangLandau(WangLandau::new(&WangLandauConfig::default(), num_bins)),
                current: fh.current,
                old: fh.current,
            }),
        })
    }

    /// Inverse temperature.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Energy of the last accepted state.
    pub fn current_energy(&self) -> f64 {
        self.current_energy
    }

    /// Bias correction for `old -> new`; zero under Metropolis.
    pub fn ln_bias(&self, new: usize, old: usize) -> f64 {
        match &self.mode {
            Mode::Metropolis => 0.0,
            Mode::FlatHistogram(fh) => fh.bias.ln_bias(new, old),
        }
    }

    /// Whether the bias reached its completion criterion. Never under Metropolis.
    pub fn is_complete(&self) -> bool {
        match &self.mode {
            Mode::Metropolis => false,
            Mode::FlatHistogram(fh) => fh.bias.is_complete(),
        }
    }

    /// Acceptance mode.
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Current macrostate bin.
    pub fn current_bin(&self) -> Option<usize> {
        match &self.mode {
            Mode::Metropolis => None,
            Mode::FlatHistogram(fh) => Some(fh.current),
        }
    }

    /// Macrostate, under flat-histogram.
    pub fn macrostate(&self) -> Option<&Macrostate> {
        match &self.mode {
            Mode::Metropolis => None,
            Mode::FlatHistogram(fh) => Some(&fh.macrostate),
        }
    }

    /// Mutable macrostate, under flat-histogram.
    pub fn macrostate_mut(&mut self) -> Option<&mut Macrostate> {
        match &mut self.mode {
            Mode::Metropolis => None,
            Mode::FlatHistogram(fh) => Some(&mut fh.macrostate),
        }
    }

    /// Bias, under flat-histogram.
    pub fn bias(&self) -> Option<&Bias> {
        match &self.mode {
            Mode::Metropolis => None,
            Mode::FlatHistogram(fh) => Some(&fh.bias),
        }
    }

    /// Mutable bias, under flat-histogram.
    pub fn bias_mut(&mut self) -> Option<&mut Bias> {
        match &mut self.mode {
            Mode::Metropolis => None,
            Mode::FlatHistogram(fh) => Some(&mut fh.bias),
        }
    }

    /// Current bias estimate, under flat-histogram.
    pub fn ln_macro_prob(&self) -> Option<&LnProbability> {
        self.bias().map(Bias::ln_macro_prob)
    }

    /// Versioned binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, McError> {
        provenance::to_bytes("criteria", CRITERIA_VERSION, self)
    }

    /// Restores criteria written by [`Criteria::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, McError> {
        provenance::from_bytes(bytes, "criteria", CRITERIA_VERSION)
    }
}
