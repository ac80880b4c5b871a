use fhmc_core::{derive_substream_seed, RngHandle};

use crate::trial::TrialSet;

/// Seed of the trial stream owned by one window.
pub fn window_seed(master_seed: u64, window: usize) -> u64 {
    derive_substream_seed(master_seed, window as u64)
}

/// Seed of attempt number `attempt` within a window stream.
pub fn trial_seed(window_seed: u64, attempt: u64) -> u64 {
    derive_substream_seed(window_seed, attempt)
}

/// Seed of the trial-kind draw shared by a load-balanced prefetch cycle.
pub fn cycle_seed(window_seed: u64, first_attempt: u64) -> u64 {
    derive_substream_seed(window_seed ^ 0x5A5A_5A5A_5A5A_5A5A, first_attempt)
}

/// Seed of the configuration exchange between windows `pair` and `pair + 1`.
pub fn exchange_seed(master_seed: u64, round: u64, pair: usize) -> u64 {
    derive_substream_seed(
        master_seed ^ 0xA5A5_A5A5_A5A5_A5A5,
        round << 16 | pair as u64,
    )
}

/// Seed of the stream used to walk a window into its macrostate range.
pub fn seek_seed(master_seed: u64, window: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0x3C3C_3C3C_3C3C_3C3C, window as u64)
}

/// RNG and trial index for one attempt.
///
/// The trial kind is drawn from the attempt's own stream unless `forced`,
/// so replaying an attempt reproduces both the choice and the perturbation.
pub fn trial_rng<M>(
    window_seed: u64,
    attempt: u64,
    trials: &TrialSet<M>,
    forced: Option<usize>,
) -> (usize, RngHandle) {
    let mut rng = RngHandle::from_seed(trial_seed(window_seed, attempt));
    let index = match forced {
        Some(index) => index,
        None => trials.choose(&mut rng),
    };
    (index, rng)
}
