use fhmc_core::System;
use fhmc_lattice::{GasMove, Lattice, LatticeGas};
use fhmc_mcmc::window::{boundaries, exchange_acceptance, segment};
use fhmc_mcmc::{
    Bias, BiasConfig, Criteria, Histogram, LnProbability, Macrostate, MacrostateKind, Trial,
    TrialSet, WangLandauConfig, WindowConfig, WindowManager,
};
use proptest::prelude::*;

fn wl_criteria(ln_p: Vec<f64>) -> Criteria {
    let histogram = Histogram::new(1.0, 0.0, (ln_p.len() - 1) as f64).unwrap();
    let macrostate = Macrostate::new(MacrostateKind::NumParticles, histogram);
    let mut bias =
        Bias::from_config(&BiasConfig::WangLandau(WangLandauConfig::default()), ln_p.len())
            .unwrap();
    bias.set_ln_macro_prob(LnProbability::from_values(ln_p));
    Criteria::flat_histogram(1.0, macrostate, bias).unwrap()
}

#[test]
fn segment_endpoints_match_the_range() {
    let edges = segment(2.0, 50.0, 4, 1.5);
    assert_eq!(edges.len(), 5);
    assert!((edges[0] - 2.0).abs() < 1e-9);
    assert!((edges[4] - 50.0).abs() < 1e-9);
    assert!(edges.windows(2).all(|pair| pair[1] > pair[0]));
}

#[test]
fn exchange_between_identical_estimates_always_succeeds() {
    let a = wl_criteria(vec![0.0, 1.0, 2.0, 3.0]);
    let b = wl_criteria(vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(exchange_acceptance(&a, 1, &b, 2), 1.0);
}

#[test]
fn exchange_acceptance_follows_the_bias_difference() {
    let a = wl_criteria(vec![0.0, 2.0, 0.0, 0.0]);
    let b = wl_criteria(vec![0.0, 0.0, 0.0, 0.0]);
    // leaving the over-visited bin 1 is free, entering it costs exp(-2)
    assert_eq!(exchange_acceptance(&a, 1, &b, 2), 1.0);
    let p = exchange_acceptance(&a, 2, &b, 1);
    assert!((p - (-2.0_f64).exp()).abs() < 1e-12);
}

#[test]
fn neighbouring_windows_exchange_inside_their_overlap() {
    let gas = LatticeGas::new(Lattice::new(vec![3, 3]).unwrap(), 1.0, 0.0).unwrap();
    let trials = TrialSet::new(vec![
        Trial::new("insert", 1.0, GasMove::Insert),
        Trial::new("remove", 1.0, GasMove::Remove),
        Trial::new("translate", 1.0, GasMove::Translate),
    ])
    .unwrap();
    let histogram = Histogram::new(1.0, 0.0, 9.0).unwrap();
    let macrostate = Macrostate::new(MacrostateKind::NumParticles, histogram);
    let bias =
        Bias::from_config(&BiasConfig::WangLandau(WangLandauConfig::default()), 10).unwrap();
    let criteria = Criteria::flat_histogram(1.0, macrostate, bias).unwrap();
    let config = WindowConfig {
        num: 2,
        overlap: 3,
        exchange_interval: 50,
        ..WindowConfig::default()
    };
    let mut manager = WindowManager::new(gas, criteria, trials, &config, None, 21).unwrap();
    manager.initialize().unwrap();
    for (worker, window) in manager.workers().iter().zip(manager.windows()) {
        let bin = worker.sampler().criteria.current_bin().unwrap();
        assert!(bin >= window.soft_min && bin <= window.soft_max);
    }

    for _ in 0..200 {
        manager.run_round(50).unwrap();
        for (worker, window) in manager.workers().iter().zip(manager.windows()) {
            let sampler = worker.sampler();
            let bin = sampler.criteria.current_bin().unwrap();
            assert!(bin >= window.soft_min && bin <= window.soft_max);
            assert_eq!(bin, sampler.system.num_particles());
        }
    }
    let stats = manager.exchange_stats()[0];
    assert!(stats.attempted > 0);
    assert!(stats.accepted <= stats.attempted);
    let mean = stats.mean_acceptance();
    assert!((0.0..=1.0).contains(&mean));
    assert_eq!(manager.round(), 200);
    assert_eq!(manager.attempts(), 10_000);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn layout_covers_every_bin_once_plus_overlap(
        max in 20usize..300,
        num in 1usize..6,
        overlap in 0usize..3,
        exponent in 0.5f64..2.5,
    ) {
        let config = WindowConfig { num, overlap, exponent, ..WindowConfig::default() };
        let windows = boundaries(0, max, &config);
        prop_assume!(windows.is_ok());
        let windows = windows.unwrap();
        prop_assert_eq!(windows.len(), num);
        prop_assert_eq!(windows[0].soft_min, 0);
        prop_assert_eq!(windows[num - 1].soft_max, max);
        for window in &windows {
            prop_assert!(window.size() >= 2);
        }
        for pair in windows.windows(2) {
            // neighbours share exactly `overlap` bins and leave no gap
            prop_assert_eq!(pair[0].soft_max + 1 - pair[1].soft_min, overlap);
        }
    }
}
