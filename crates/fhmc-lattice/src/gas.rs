use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError, Proposal, RngHandle, System};

use crate::lattice::Lattice;

/// Perturbations understood by [`LatticeGas`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasMove {
    /// Occupy a uniformly chosen empty site.
    Insert,
    /// Vacate a uniformly chosen occupied site.
    Remove,
    /// Hop a uniformly chosen particle to a random neighboring site.
    Translate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Pending {
    Insert { slot: usize, from: usize },
    Remove { slot: usize, from: usize },
    Translate { particle: usize, site: usize, target: usize },
}

/// Grand canonical lattice gas with nearest-neighbor attraction.
///
/// `E = -epsilon * (number of occupied nearest-neighbor pairs)`.
///
/// Occupied sites live in `order[..n]`, empty sites in `order[n..]`, with
/// `slot` as the inverse permutation, so every move picks its site in O(1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeGas {
    lattice: Lattice,
    epsilon: f64,
    ln_activity: f64,
    occupied: Vec<bool>,
    order: Vec<u32>,
    slot: Vec<u32>,
    n: usize,
    energy: f64,
    #[serde(default)]
    pending: Option<Pending>,
    #[serde(default)]
    pending_energy: f64,
}

impl LatticeGas {
    /// Empty lattice gas at attraction `epsilon` and log activity `ln_activity`.
    pub fn new(lattice: Lattice, epsilon: f64, ln_activity: f64) -> Result<Self, McError> {
        if !epsilon.is_finite() || !ln_activity.is_finite() {
            return Err(McError::Config(
                ErrorInfo::new("gas-parameters", "epsilon and ln_activity must be finite")
                    .with_context("epsilon", epsilon)
                    .with_context("ln_activity", ln_activity),
            ));
        }
        let sites = lattice.n_sites;
        Ok(Self {
            lattice,
            epsilon,
            ln_activity,
            occupied: vec![false; sites],
            order: (0..sites as u32).collect(),
            slot: (0..sites as u32).collect(),
            n: 0,
            energy: 0.0,
            pending: None,
            pending_energy: 0.0,
        })
    }

    /// Ideal lattice gas (no interactions).
    pub fn ideal(lattice: Lattice, ln_activity: f64) -> Result<Self, McError> {
        Self::new(lattice, 0.0, ln_activity)
    }

    /// Occupies `count` random empty sites without any acceptance test.
    pub fn fill(&mut self, count: usize, rng: &mut RngHandle) -> Result<(), McError> {
        if self.n + count > self.lattice.n_sites {
            return Err(McError::Config(
                ErrorInfo::new("gas-fill", "more particles than lattice sites")
                    .with_context("requested", self.n + count)
                    .with_context("sites", self.lattice.n_sites),
            ));
        }
        for _ in 0..count {
            let pick = self.n + rng.index(self.lattice.n_sites - self.n);
            let site = self.order[pick] as usize;
            self.energy -= self.epsilon * self.occupied_neighbors(site) as f64;
            self.swap_slots(pick, self.n);
            self.occupied[site] = true;
            self.n += 1;
        }
        Ok(())
    }

    /// The underlying lattice.
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Whether `site` is occupied.
    pub fn is_occupied(&self, site: usize) -> bool {
        self.occupied[site]
    }

    /// Energy recomputed from scratch by summing every forward bond.
    pub fn recompute_energy(&self) -> f64 {
        let mut bonds = 0usize;
        for site in 0..self.lattice.n_sites {
            if !self.occupied[site] {
                continue;
            }
            for d in 0..self.lattice.n_dims {
                if self.occupied[self.lattice.neighbor(site, d, true)] {
                    bonds += 1;
                }
            }
        }
        -self.epsilon * bonds as f64
    }

    fn occupied_neighbors(&self, site: usize) -> usize {
        self.lattice
            .neighbors_of(site)
            .filter(|&nb| self.occupied[nb])
            .count()
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.order.swap(a, b);
        self.slot[self.order[a] as usize] = a as u32;
        self.slot[self.order[b] as usize] = b as u32;
    }

    fn begin(&mut self, pending: Pending, delta_energy: f64) {
        self.pending = Some(pending);
        self.pending_energy = self.energy;
        self.energy += delta_energy;
    }

    fn propose_insert(&mut self, rng: &mut RngHandle) -> Proposal {
        let sites = self.lattice.n_sites;
        if self.n == sites {
            return Proposal::rejected();
        }
        let empty = sites - self.n;
        let from = self.n + rng.index(empty);
        let site = self.order[from] as usize;
        let delta = -self.epsilon * self.occupied_neighbors(site) as f64;
        self.swap_slots(from, self.n);
        self.occupied[site] = true;
        let ln_ratio = (empty as f64 / (self.n + 1) as f64).ln() + self.ln_activity;
        self.begin(Pending::Insert { slot: self.n, from }, delta);
        self.n += 1;
        Proposal::new(delta, ln_ratio)
    }

    fn propose_remove(&mut self, rng: &mut RngHandle) -> Proposal {
        if self.n == 0 {
            return Proposal::rejected();
        }
        let from = rng.index(self.n);
        let site = self.order[from] as usize;
        let delta = self.epsilon * self.occupied_neighbors(site) as f64;
        let last = self.n - 1;
        self.swap_slots(from, last);
        self.occupied[site] = false;
        let empty_after = self.lattice.n_sites - self.n + 1;
        let ln_ratio = (self.n as f64 / empty_after as f64).ln() - self.ln_activity;
        self.begin(Pending::Remove { slot: last, from }, delta);
        self.n -= 1;
        Proposal::new(delta, ln_ratio)
    }

    fn propose_translate(&mut self, rng: &mut RngHandle) -> Proposal {
        if self.n == 0 {
            return Proposal::rejected();
        }
        let particle = rng.index(self.n);
        let site = self.order[particle] as usize;
        let target = self.lattice.nth_neighbor(site, rng.index(self.lattice.coordination()));
        if self.occupied[target] {
            return Proposal::rejected();
        }
        let before = self.occupied_neighbors(site);
        self.occupied[site] = false;
        self.occupied[target] = true;
        let after = self.occupied_neighbors(target);
        let delta = -self.epsilon * (after as f64 - before as f64);
        let target_slot = self.slot[target] as usize;
        self.swap_slots(particle, target_slot);
        self.begin(
            Pending::Translate {
                particle,
                site,
                target,
            },
            delta,
        );
        Proposal::new(delta, 0.0)
    }
}

impl System for LatticeGas {
    type Move = GasMove;

    fn current_energy(&self) -> f64 {
        self.energy
    }

    fn num_particles(&self) -> usize {
        self.n
    }

    fn propose(&mut self, mv: &GasMove, rng: &mut RngHandle) -> Result<Proposal, McError> {
        if self.pending.is_some() {
            return Err(McError::System(ErrorInfo::new(
                "gas-pending",
                "propose called before the previous proposal was committed or reverted",
            )));
        }
        Ok(match mv {
            GasMove::Insert => self.propose_insert(rng),
            GasMove::Remove => self.propose_remove(rng),
            GasMove::Translate => self.propose_translate(rng),
        })
    }

    fn commit(&mut self) {
        self.pending = None;
        self.pending_energy = 0.0;
    }

    fn revert(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        match pending {
            Pending::Insert { slot, from } => {
                self.occupied[self.order[slot] as usize] = false;
                self.swap_slots(from, slot);
                self.n -= 1;
            }
            Pending::Remove { slot, from } => {
                self.occupied[self.order[slot] as usize] = true;
                self.swap_slots(from, slot);
                self.n += 1;
            }
            Pending::Translate {
                particle,
                site,
                target,
            } => {
                self.occupied[target] = false;
                self.occupied[site] = true;
                let target_slot = self.slot[site] as usize;
                self.swap_slots(particle, target_slot);
            }
        }
        self.energy = self.pending_energy;
        self.pending_energy = 0.0;
    }

    fn is_equal(&self, other: &Self, tolerance: f64) -> bool {
        self.n == other.n
            && self.occupied == other.occupied
            && (self.energy - other.energy).abs() <= tolerance
    }
}
