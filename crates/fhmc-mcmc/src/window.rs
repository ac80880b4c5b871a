//! Macrostate windows, each sampled by its own worker, coupled through
//! configuration exchange and joined by splicing.

use log::{debug, info, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError, RngHandle, System};

use crate::config::{PrefetchConfig, WindowConfig};
use crate::criteria::Criteria;
use crate::determinism::{exchange_seed, seek_seed, window_seed};
use crate::ln_prob::LnProbability;
use crate::prefetch::Prefetch;
use crate::sampler::{Outcome, Sampler};
use crate::splice::{splice, Piece};
use crate::trial::TrialSet;

/// One contiguous range of macrostate bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Position in the layout.
    pub index: usize,
    /// Number of windows in the layout.
    pub total: usize,
    /// Lowest bin.
    pub soft_min: usize,
    /// Highest bin.
    pub soft_max: usize,
}

impl Window {
    /// Bins covered.
    pub fn size(&self) -> usize {
        self.soft_max - self.soft_min + 1
    }
}

/// `num + 1` segment edges between `min` and `max`, evenly spaced in
/// `value^exponent`.
pub fn segment(min: f64, max: f64, num: usize, exponent: f64) -> Vec<f64> {
    let low = min.powf(exponent);
    let high = max.powf(exponent);
    (0..=num)
        .map(|i| ((high - low) * i as f64 / num as f64 + low).powf(1.0 / exponent))
        .collect()
}

/// Window layout over bins `[min, max]`.
///
/// Window 0 spans `[min, round(seg[1])]`; window `i > 0` spans
/// `[round(seg[i]) + 1 - overlap, round(seg[i + 1])]`.
pub fn boundaries(min: usize, max: usize, config: &WindowConfig) -> Result<Vec<Window>, McError> {
    let num = config.num;
    if num == 0 || max <= min {
        return Err(McError::Config(
            ErrorInfo::new("window-range", "windows need a positive count and range")
                .with_context("num", num)
                .with_context("min", min)
                .with_context("max", max),
        ));
    }
    let edges = segment(min as f64, max as f64, num, config.exponent);
    let mut windows = Vec::with_capacity(num);
    for i in 0..num {
        let upper = edges[i + 1].round() as i64;
        let lower = if i == 0 {
            min as i64
        } else {
            edges[i].round() as i64 + 1 - config.overlap as i64
        };
        let soft_max = if i + 1 == num { max as i64 } else { upper };
        if lower < min as i64 || soft_max - lower < 1 {
            return Err(McError::Config(
                ErrorInfo::new("window-size", "every window needs at least two bins")
                    .with_context("window", i)
                    .with_context("soft_min", lower)
                    .with_context("soft_max", soft_max)
                    .with_hint("use fewer windows or less overlap"),
            ));
        }
        windows.push(Window {
            index: i,
            total: num,
            soft_min: lower as usize,
            soft_max: soft_max as usize,
        });
    }
    for pair in windows.windows(2) {
        if pair[1].soft_min > pair[0].soft_max + 1 || pair[1].soft_min <= pair[0].soft_min {
            return Err(McError::Config(
                ErrorInfo::new("window-overlap", "overlap must be narrower than a window")
                    .with_context("overlap", config.overlap)
                    .with_context("window", pair[1].index),
            ));
        }
    }
    Ok(windows)
}

/// Metropolis probability of swapping configurations between two windows
/// whose walkers sit in bins `bin_a` and `bin_b`.
pub fn exchange_acceptance(a: &Criteria, bin_a: usize, b: &Criteria, bin_b: usize) -> f64 {
    let ln = a.ln_bias(bin_b, bin_a) + b.ln_bias(bin_a, bin_b);
    ln.min(0.0).exp()
}

/// Attempts an exchange using the provided RNG handle.
pub fn attempt_exchange(probability: f64, rng: &mut RngHandle) -> bool {
    rng.uniform() < probability
}

/// Exchange counters of one neighbouring pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeStats {
    /// Exchanges tried with both walkers in the overlap strip.
    pub attempted: u64,
    /// Exchanges performed.
    pub accepted: u64,
    /// Sum of acceptance probabilities.
    pub probability_sum: f64,
}

impl ExchangeStats {
    /// Mean acceptance probability.
    pub fn mean_acceptance(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.probability_sum / self.attempted as f64
        }
    }
}

/// Serial or prefetch chain sampling one window.
#[derive(Debug)]
pub enum Worker<S: System> {
    /// Single-threaded chain.
    Serial(Sampler<S>),
    /// Speculative parallel chain.
    Prefetch(Prefetch<S>),
}

impl<S: System> Worker<S> {
    /// Wraps `sampler` in a prefetch engine when `prefetch` is set.
    pub fn new(sampler: Sampler<S>, prefetch: Option<&PrefetchConfig>) -> Result<Self, McError> {
        Ok(match prefetch {
            Some(config) if config.threads > 1 => Worker::Prefetch(Prefetch::new(sampler, config)?),
            _ => Worker::Serial(sampler),
        })
    }

    /// Canonical chain.
    pub fn sampler(&self) -> &Sampler<S> {
        match self {
            Worker::Serial(sampler) => sampler,
            Worker::Prefetch(prefetch) => prefetch.canonical(),
        }
    }

    /// Mutable canonical chain. Call [`Worker::resync`] after mutating it.
    pub fn sampler_mut(&mut self) -> &mut Sampler<S> {
        match self {
            Worker::Serial(sampler) => sampler,
            Worker::Prefetch(prefetch) => prefetch.canonical_mut(),
        }
    }

    /// Propagates canonical changes to prefetch replicas.
    pub fn resync(&mut self) {
        if let Worker::Prefetch(prefetch) = self {
            prefetch.resync();
        }
    }

    /// Resolves `num` attempts.
    pub fn attempt(&mut self, num: u64) -> Result<Vec<Outcome>, McError> {
        match self {
            Worker::Serial(sampler) => sampler.attempt(num),
            Worker::Prefetch(prefetch) => prefetch.attempt(num),
        }
    }

    /// Attempts until complete or `budget` total attempts are spent.
    pub fn run_until_complete(&mut self, budget: u64) -> Result<bool, McError> {
        match self {
            Worker::Serial(sampler) => sampler.run_until_complete(budget),
            Worker::Prefetch(prefetch) => prefetch.run_until_complete(budget),
        }
    }

    /// Attempts resolved so far.
    pub fn attempts(&self) -> u64 {
        self.sampler().attempts()
    }

    /// Consumes the worker, returning its canonical chain.
    pub fn into_sampler(self) -> Sampler<S> {
        match self {
            Worker::Serial(sampler) => sampler,
            Worker::Prefetch(prefetch) => prefetch.into_canonical(),
        }
    }
}

/// Flat-histogram windows sampled in parallel.
#[derive(Debug)]
pub struct WindowManager<S: System> {
    config: WindowConfig,
    master_seed: u64,
    workers: Vec<Worker<S>>,
    pool: rayon::ThreadPool,
    exchange: Vec<ExchangeStats>,
    round: u64,
    previous_attempts: u64,
    spliced: Option<LnProbability>,
}

impl<S: System> WindowManager<S> {
    /// Lays out windows over the criteria's histogram and gives each a copy
    /// of `system`, `criteria` and `trials`.
    pub fn new(
        system: S,
        criteria: Criteria,
        trials: TrialSet<S::Move>,
        config: &WindowConfig,
        prefetch: Option<&PrefetchConfig>,
        master_seed: u64,
    ) -> Result<Self, McError> {
        let num_bins = criteria
            .macrostate()
            .map(|macrostate| macrostate.num_bins())
            .ok_or_else(|| {
                McError::config("windows-metropolis", "windows need a flat-histogram criteria")
            })?;
        let layout = boundaries(0, num_bins - 1, config)?;
        let mut samplers = Vec::with_capacity(layout.len());
        for window in &layout {
            let mut window_criteria = criteria.clone();
            if let Some(macrostate) = window_criteria.macrostate_mut() {
                macrostate.set_soft_bounds(window.soft_min, window.soft_max)?;
            }
            samplers.push(Sampler::new(
                system.clone(),
                window_criteria,
                trials.clone(),
                window_seed(master_seed, window.index),
            )?);
        }
        info!(
            "laid out {} windows over {num_bins} bins: {:?}",
            layout.len(),
            layout.iter().map(|w| (w.soft_min, w.soft_max)).collect::<Vec<_>>()
        );
        Self::from_samplers(samplers, config, prefetch, master_seed, 0, Vec::new())
    }

    /// Rebuilds a manager around existing chains, e.g. from a checkpoint.
    pub fn from_samplers(
        samplers: Vec<Sampler<S>>,
        config: &WindowConfig,
        prefetch: Option<&PrefetchConfig>,
        master_seed: u64,
        round: u64,
        exchange: Vec<ExchangeStats>,
    ) -> Result<Self, McError> {
        if samplers.is_empty() {
            return Err(McError::config("windows-empty", "at least one window is required"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(samplers.len())
            .build()
            .map_err(|err| McError::Config(ErrorInfo::new("thread-pool", err.to_string())))?;
        let previous_attempts = samplers[0].attempts();
        let pairs = samplers.len() - 1;
        let exchange = if exchange.len() == pairs {
            exchange
        } else {
            vec![ExchangeStats::default(); pairs]
        };
        let workers = samplers
            .into_iter()
            .map(|sampler| Worker::new(sampler, prefetch))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            config: config.clone(),
            master_seed,
            workers,
            pool,
            exchange,
            round,
            previous_attempts,
            spliced: None,
        })
    }

    /// Current layout, read from each worker's soft bounds.
    pub fn windows(&self) -> Vec<Window> {
        let total = self.workers.len();
        self.workers
            .iter()
            .enumerate()
            .map(|(index, worker)| {
                let (soft_min, soft_max) = worker
                    .sampler()
                    .criteria
                    .macrostate()
                    .map_or((0, 0), |m| (m.soft_min(), m.soft_max()));
                Window {
                    index,
                    total,
                    soft_min,
                    soft_max,
                }
            })
            .collect()
    }

    /// Workers in window order.
    pub fn workers(&self) -> &[Worker<S>] {
        &self.workers
    }

    /// Completed rounds.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Master seed.
    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Exchange counters per neighbouring pair.
    pub fn exchange_stats(&self) -> &[ExchangeStats] {
        &self.exchange
    }

    /// Last spliced estimate over the whole histogram.
    pub fn spliced(&self) -> Option<&LnProbability> {
        self.spliced.as_ref()
    }

    /// Attempts resolved per window.
    pub fn attempts(&self) -> u64 {
        self.workers.iter().map(Worker::attempts).min().unwrap_or(0)
    }

    /// Whether every window reached its completion criterion.
    pub fn is_complete(&self) -> bool {
        self.workers
            .iter()
            .all(|worker| worker.sampler().criteria.is_complete())
    }

    /// Walks every window's system into its range.
    pub fn initialize(&mut self) -> Result<(), McError> {
        let windows = self.windows();
        let master_seed = self.master_seed;
        let attempts = self.config.seek_attempts;
        self.pool.install(|| {
            self.workers
                .par_iter_mut()
                .zip(&windows)
                .try_for_each(|(worker, window)| -> Result<(), McError> {
                    let reached = worker.sampler_mut().seek(
                        window.soft_min,
                        window.soft_max,
                        attempts,
                        seek_seed(master_seed, window.index),
                    )?;
                    worker.resync();
                    if !reached {
                        return Err(McError::Config(
                            ErrorInfo::new("seek-failed", "window never reached its range")
                                .with_context("window", window.index)
                                .with_context("soft_min", window.soft_min)
                                .with_context("soft_max", window.soft_max)
                                .with_context(
                                    "bin",
                                    format!("{:?}", worker.sampler().criteria.current_bin()),
                                )
                                .with_hint("raise windows.seek_attempts or start inside the window"),
                        ));
                    }
                    debug!("window {} seeded", window.index);
                    Ok(())
                })
        })
    }

    /// One round: `attempts` attempts per window in parallel, an exchange
    /// pass, then a splice whenever a multiple of `splice_interval` was crossed.
    pub fn run_round(&mut self, attempts: u64) -> Result<Vec<Vec<Outcome>>, McError> {
        let outcomes = self.pool.install(|| {
            self.workers
                .par_iter_mut()
                .map(|worker| worker.attempt(attempts))
                .collect::<Result<Vec<_>, _>>()
        })?;
        self.round += 1;
        self.exchange()?;
        let done = self.attempts();
        let interval = self.config.splice_interval;
        if interval > 0 && done / interval > self.previous_attempts / interval {
            self.splice()?;
            if self.config.adjust_bounds {
                self.adjust_bounds(self.config.min_window_size)?;
            }
        }
        self.previous_attempts = done;
        Ok(outcomes)
    }

    /// Rounds of `exchange_interval` attempts until every window is complete
    /// or `budget` attempts per window are spent. Returns whether every
    /// window completed.
    pub fn run(&mut self, budget: u64) -> Result<bool, McError> {
        while !self.is_complete() && self.attempts() < budget {
            let attempts = self.config.exchange_interval.min(budget - self.attempts());
            self.run_round(attempts)?;
        }
        self.splice()?;
        Ok(self.is_complete())
    }

    /// Configuration-exchange pass over neighbouring windows whose walkers
    /// both sit in the shared strip. Biases are left untouched.
    pub fn exchange(&mut self) -> Result<(), McError> {
        for pair in 0..self.workers.len().saturating_sub(1) {
            let (lower, upper) = self.workers.split_at_mut(pair + 1);
            let (a, b) = (&mut lower[pair], &mut upper[0]);
            let (Some(bin_a), Some(bin_b)) = (
                a.sampler().criteria.current_bin(),
                b.sampler().criteria.current_bin(),
            ) else {
                continue;
            };
            let strip_min = b
                .sampler()
                .criteria
                .macrostate()
                .map_or(usize::MAX, |m| m.soft_min());
            let strip_max = a.sampler().criteria.macrostate().map_or(0, |m| m.soft_max());
            let in_strip = |bin: usize| bin >= strip_min && bin <= strip_max;
            if !(in_strip(bin_a) && in_strip(bin_b)) {
                continue;
            }
            let probability =
                exchange_acceptance(&a.sampler().criteria, bin_a, &b.sampler().criteria, bin_b);
            let mut rng = RngHandle::from_seed(exchange_seed(self.master_seed, self.round, pair));
            let accepted = attempt_exchange(probability, &mut rng);
            let stats = &mut self.exchange[pair];
            stats.attempted += 1;
            stats.probability_sum += probability;
            if accepted {
                stats.accepted += 1;
                let (sa, sb) = (a.sampler_mut(), b.sampler_mut());
                std::mem::swap(&mut sa.system, &mut sb.system);
                sa.criteria.sync(&sa.system)?;
                sb.criteria.sync(&sb.system)?;
                a.resync();
                b.resync();
            }
            trace!(
                "exchange round={} pair={pair} bins=({bin_a},{bin_b}) p={probability:.4} accepted={accepted}",
                self.round
            );
        }
        Ok(())
    }

    /// Splices every window's estimate into one over the whole histogram.
    pub fn splice(&mut self) -> Result<&LnProbability, McError> {
        let windows = self.windows();
        let pieces = self
            .workers
            .iter()
            .zip(&windows)
            .filter_map(|(worker, window)| {
                worker.sampler().criteria.bias().map(|bias| Piece {
                    bias,
                    soft_min: window.soft_min,
                    soft_max: window.soft_max,
                })
            })
            .collect::<Vec<_>>();
        let spliced = splice(&pieces)?;
        debug!("spliced {} windows at round {}", pieces.len(), self.round);
        Ok(self.spliced.insert(spliced))
    }

    /// Moves each shared boundary one bin toward the window with fewer
    /// iterations, keeping the overlap. A move that would drop a walker's
    /// current bin or leave fewer than `min_window_size` bins is skipped.
    pub fn adjust_bounds(&mut self, min_window_size: usize) -> Result<(), McError> {
        for pair in 0..self.workers.len().saturating_sub(1) {
            let (lower, upper) = self.workers.split_at_mut(pair + 1);
            let (a, b) = (&mut lower[pair], &mut upper[0]);
            let iterations = |worker: &Worker<S>| {
                worker
                    .sampler()
                    .criteria
                    .bias()
                    .map_or(0, |bias| bias.num_iterations())
            };
            let (iter_a, iter_b) = (iterations(&*a), iterations(&*b));
            if iter_a == iter_b {
                continue;
            }
            let shrink_lower = iter_a < iter_b;
            let (shrinking, growing) = if shrink_lower {
                (&mut *a, &mut *b)
            } else {
                (&mut *b, &mut *a)
            };
            let Some(bin) = shrinking.sampler().criteria.current_bin() else {
                continue;
            };
            let Some(macrostate) = shrinking.sampler().criteria.macrostate() else {
                continue;
            };
            let (soft_min, soft_max) = (macrostate.soft_min(), macrostate.soft_max());
            let size = soft_max - soft_min + 1;
            let keeps_walker = if shrink_lower {
                bin < soft_max
            } else {
                bin > soft_min
            };
            if size <= min_window_size || !keeps_walker {
                trace!("bound adjustment of pair {pair} skipped");
                continue;
            }
            if let Some(macrostate) = shrinking.sampler_mut().criteria.macrostate_mut() {
                if shrink_lower {
                    macrostate.shrink_max()?;
                } else {
                    macrostate.shrink_min()?;
                }
            }
            if let Some(macrostate) = growing.sampler_mut().criteria.macrostate_mut() {
                if shrink_lower {
                    macrostate.extend_min()?;
                } else {
                    macrostate.extend_max()?;
                }
            }
            shrinking.resync();
            growing.resync();
            debug!(
                "moved boundary of pair {pair} toward window {}",
                if shrink_lower { pair } else { pair + 1 }
            );
        }
        Ok(())
    }

    /// Consumes the manager, returning each window's canonical chain.
    pub fn into_samplers(self) -> Vec<Sampler<S>> {
        self.workers.into_iter().map(Worker::into_sampler).collect()
    }
}
