//! Speculative parallel trial evaluation reconciled to serial semantics.
//!
//! Each cycle, replica `t` evaluates attempt `base + t` against its private
//! copy of the system. The first accepted attempt `f` ends the cycle: later
//! speculation is discarded, rejections `0..f` and then acceptance `f` are
//! committed to every replica in logical order, so all replicas stay
//! identical and the committed sequence is the serial one.
//!
//! Under Metropolis the replicas' criteria do not change on rejection and the
//! result matches a serial run exactly. Under a flat-histogram criteria,
//! speculation of attempt `t` sees the bias as of the cycle start rather than
//! after the rejections `0..t`, which makes the chain an approximation of the
//! serial one whose error vanishes as the bias converges.

use log::{debug, trace};
use rayon::prelude::*;

use fhmc_core::{ErrorInfo, McError, System};

use crate::config::PrefetchConfig;
use crate::criteria::Decision;
use crate::determinism::{cycle_seed, trial_rng};
use crate::sampler::{Outcome, Sampler};
use crate::trial::{finalize, replay, speculate};
use fhmc_core::RngHandle;

/// Energy tolerance of the replica self-check.
pub const CHECK_TOLERANCE: f64 = 1e-8;

/// Synchronization points of one cycle. Each phase is a fork-join over the
/// replicas; the join is the barrier before the next phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Choose trial kinds.
    Select,
    /// Every active replica proposes and decides its own attempt.
    Speculate,
    /// Find the first accepted attempt.
    Resolve,
    /// Revert speculation after the first acceptance.
    Discard,
    /// Commit the rejections preceding the first acceptance.
    ReplayRejections,
    /// Commit the first acceptance on every replica.
    ReplayAcceptance,
    /// Advance the attempt counters.
    Advance,
    /// Periodic replica comparison.
    Check,
}

/// Per-replica record of one speculative attempt, reset every cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolEntry {
    /// Trial index.
    pub trial: usize,
    /// Decision reached on the owning replica.
    pub decision: Decision,
}

/// Prefetch engine over `threads` replicas; replica 0 is canonical.
#[derive(Debug)]
pub struct Prefetch<S: System> {
    replicas: Vec<Sampler<S>>,
    pool: rayon::ThreadPool,
    steps_per_check: u64,
    load_balance: bool,
    cycles: u64,
    phase: Phase,
}

impl<S: System> Prefetch<S> {
    /// Clones `sampler` into one replica per thread.
    pub fn new(sampler: Sampler<S>, config: &PrefetchConfig) -> Result<Self, McError> {
        let threads = config.threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| McError::Config(ErrorInfo::new("thread-pool", err.to_string())))?;
        let mut replicas = Vec::with_capacity(threads);
        for _ in 1..threads {
            replicas.push(sampler.clone());
        }
        replicas.insert(0, sampler);
        Ok(Self {
            replicas,
            pool,
            steps_per_check: config.steps_per_check.max(1),
            load_balance: config.load_balance,
            cycles: 0,
            phase: Phase::Select,
        })
    }

    /// Number of replicas.
    pub fn threads(&self) -> usize {
        self.replicas.len()
    }

    /// Last phase entered.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Canonical replica.
    pub fn canonical(&self) -> &Sampler<S> {
        &self.replicas[0]
    }

    /// Mutable canonical replica. Call [`Prefetch::resync`] after mutating it.
    pub fn canonical_mut(&mut self) -> &mut Sampler<S> {
        &mut self.replicas[0]
    }

    /// Consumes the engine, returning the canonical replica.
    pub fn into_canonical(mut self) -> Sampler<S> {
        self.replicas.swap_remove(0)
    }

    /// Copies the canonical replica over every other replica.
    pub fn resync(&mut self) {
        let (canonical, others) = self.replicas.split_at_mut(1);
        for replica in others {
            replica.clone_from(&canonical[0]);
        }
    }

    /// Attempts resolved so far.
    pub fn attempts(&self) -> u64 {
        self.replicas[0].attempts()
    }

    /// Resolves exactly `num` attempts.
    pub fn attempt(&mut self, num: u64) -> Result<Vec<Outcome>, McError> {
        let mut outcomes = Vec::with_capacity(num as usize);
        while (outcomes.len() as u64) < num {
            let remaining = num - outcomes.len() as u64;
            outcomes.extend(self.cycle(remaining)?);
        }
        Ok(outcomes)
    }

    /// Attempts until the criteria completes or `budget` total attempts are spent.
    pub fn run_until_complete(&mut self, budget: u64) -> Result<bool, McError> {
        while !self.replicas[0].criteria.is_complete() && self.attempts() < budget {
            self.cycle(budget - self.attempts())?;
        }
        Ok(self.replicas[0].criteria.is_complete())
    }

    /// One cycle resolving between 1 and `min(threads, remaining)` attempts.
    pub fn cycle(&mut self, remaining: u64) -> Result<Vec<Outcome>, McError> {
        let active = (self.replicas.len() as u64).min(remaining.max(1)) as usize;
        let base = self.replicas[0].attempts();
        let seed = self.replicas[0].seed();

        self.phase = Phase::Select;
        let forced = if self.load_balance {
            let mut rng = RngHandle::from_seed(cycle_seed(seed, base));
            Some(self.replicas[0].trials.choose(&mut rng))
        } else {
            None
        };

        self.phase = Phase::Speculate;
        let entries: Vec<PoolEntry> = self.pool.install(|| {
            self.replicas[..active]
                .par_iter_mut()
                .enumerate()
                .map(|(t, replica)| -> Result<PoolEntry, McError> {
                    let (trial, mut rng) =
                        trial_rng(seed, base + t as u64, &replica.trials, forced);
                    let decision = speculate(
                        &mut replica.system,
                        &mut replica.criteria,
                        &replica.trials,
                        trial,
                        &mut rng,
                    )?;
                    Ok(PoolEntry { trial, decision })
                })
                .collect::<Result<Vec<PoolEntry>, McError>>()
        })?;

        self.phase = Phase::Resolve;
        let first = entries.iter().position(|entry| entry.decision.accepted);
        let resolved = first.map_or(active, |f| f + 1);
        trace!("prefetch cycle base={base} active={active} first_accepted={first:?}");

        self.phase = Phase::Discard;
        if let Some(f) = first {
            self.pool.install(|| {
                self.replicas[f + 1..active]
                    .par_iter_mut()
                    .zip(&entries[f + 1..active])
                    .for_each(|(replica, entry)| {
                        if entry.decision.accepted {
                            replica.system.revert();
                        }
                    })
            });
        }

        self.phase = Phase::ReplayRejections;
        let rejected = first.unwrap_or(active);
        self.pool.install(|| {
            self.replicas
                .par_iter_mut()
                .try_for_each(|replica| -> Result<(), McError> {
                    for entry in &entries[..rejected] {
                        finalize(
                            &mut replica.system,
                            &mut replica.criteria,
                            &mut replica.trials,
                            entry.trial,
                            &entry.decision,
                        )?;
                    }
                    Ok(())
                })
        })?;

        self.phase = Phase::ReplayAcceptance;
        if let Some(f) = first {
            let entry = entries[f];
            self.pool.install(|| {
                self.replicas
                    .par_iter_mut()
                    .enumerate()
                    .try_for_each(|(r, replica)| -> Result<(), McError> {
                        if r == f {
                            finalize(
                                &mut replica.system,
                                &mut replica.criteria,
                                &mut replica.trials,
                                entry.trial,
                                &entry.decision,
                            )
                        } else {
                            let (_, mut rng) =
                                trial_rng(seed, base + f as u64, &replica.trials, forced);
                            replay(
                                &mut replica.system,
                                &mut replica.criteria,
                                &mut replica.trials,
                                entry.trial,
                                &entry.decision,
                                &mut rng,
                            )
                        }
                    })
            })?;
        }

        self.phase = Phase::Advance;
        for replica in &mut self.replicas {
            replica.advance(resolved as u64);
        }
        self.cycles += 1;

        if self.cycles % self.steps_per_check == 0 {
            self.phase = Phase::Check;
            self.check()?;
            self.resync();
        }

        Ok(entries[..resolved]
            .iter()
            .enumerate()
            .map(|(k, entry)| Outcome {
                attempt: base + k as u64,
                trial: entry.trial,
                accepted: entry.decision.accepted,
            })
            .collect())
    }

    /// Compares every replica with the canonical one.
    pub fn check(&self) -> Result<(), McError> {
        let canonical = &self.replicas[0];
        for (index, replica) in self.replicas.iter().enumerate().skip(1) {
            let expected = canonical.system.current_energy();
            let found = replica.system.current_energy();
            let mismatch = if (expected - found).abs() > CHECK_TOLERANCE {
                Some("energy")
            } else if !replica.system.is_equal(&canonical.system, CHECK_TOLERANCE) {
                Some("configuration")
            } else if replica.trials.stats() != canonical.trials.stats() {
                Some("trial-statistics")
            } else if replica.criteria.current_bin() != canonical.criteria.current_bin()
                || replica.criteria.ln_macro_prob() != canonical.criteria.ln_macro_prob()
            {
                Some("criteria")
            } else {
                None
            };
            if let Some(what) = mismatch {
                return Err(McError::Consistency(
                    ErrorInfo::new("prefetch-replica", "prefetch replica diverged from canonical")
                        .with_context("what", what)
                        .with_context("replica", index)
                        .with_context("cycle", self.cycles)
                        .with_context("expected_energy", expected)
                        .with_context("found_energy", found)
                        .with_context(
                            "expected_bin",
                            format!("{:?}", canonical.criteria.current_bin()),
                        )
                        .with_context("found_bin", format!("{:?}", replica.criteria.current_bin()))
                        .with_hint("replicas must receive identical commits; this is a determinism bug"),
                ));
            }
        }
        debug!("prefetch self-check passed at cycle {}", self.cycles);
        Ok(())
    }
}
