use fhmc_lattice::{GasMove, Lattice, LatticeGas};
use fhmc_mcmc::{
    run, BiasConfig, CriteriaConfig, MacrostateConfig, MacrostateKind, PrefetchConfig, RunConfig,
    Trial, TrialSet, WangLandauConfig, WindowConfig,
};

fn sample_gas() -> LatticeGas {
    LatticeGas::new(Lattice::new(vec![4, 4]).unwrap(), 1.0, -0.5).unwrap()
}

fn gas_trials() -> TrialSet<GasMove> {
    TrialSet::new(vec![
        Trial::new("insert", 1.0, GasMove::Insert),
        Trial::new("remove", 1.0, GasMove::Remove),
        Trial::new("translate", 2.0, GasMove::Translate),
    ])
    .unwrap()
}

fn metropolis_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.attempts = 5_000;
    config.windows.exchange_interval = 700;
    config
}

fn flat_histogram_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.attempts = 6_000;
    config.criteria = CriteriaConfig::FlatHistogram {
        macrostate: MacrostateConfig {
            kind: MacrostateKind::NumParticles,
            width: 1.0,
            min: 0.0,
            max: 16.0,
        },
        bias: BiasConfig::WangLandau(WangLandauConfig {
            min_visit_per_macro: 10,
            ..WangLandauConfig::default()
        }),
    };
    config.windows = WindowConfig {
        num: 3,
        overlap: 2,
        exchange_interval: 500,
        splice_interval: 2_000,
        ..WindowConfig::default()
    };
    config
}

#[test]
fn repeated_runs_with_same_seed_match() {
    let config = flat_histogram_config();
    let summary_a = run(&config, 2024, sample_gas(), gas_trials()).unwrap();
    let summary_b = run(&config, 2024, sample_gas(), gas_trials()).unwrap();
    assert_eq!(summary_a, summary_b);
    assert_eq!(summary_a.windows.len(), 3);
    assert_eq!(summary_a.exchange_acceptance.len(), 2);
}

#[test]
fn different_seeds_diverge() {
    let config = metropolis_config();
    let summary_a = run(&config, 1, sample_gas(), gas_trials()).unwrap();
    let summary_b = run(&config, 2, sample_gas(), gas_trials()).unwrap();
    assert_ne!(summary_a.final_state_hash, summary_b.final_state_hash);
}

#[test]
fn metropolis_prefetch_matches_serial_run() {
    let serial = run(&metropolis_config(), 77, sample_gas(), gas_trials()).unwrap();
    for threads in [2, 3] {
        let mut config = metropolis_config();
        config.prefetch = Some(PrefetchConfig {
            threads,
            steps_per_check: 13,
            load_balance: false,
        });
        let parallel = run(&config, 77, sample_gas(), gas_trials()).unwrap();
        assert_eq!(parallel.final_state_hash, serial.final_state_hash);
        assert_eq!(parallel.acceptance_rates, serial.acceptance_rates);
        assert_eq!(parallel.attempts, serial.attempts);
        assert_eq!(parallel.rounds, serial.rounds);
    }
}

#[test]
fn flat_histogram_prefetch_keeps_walkers_in_their_windows() {
    let mut config = flat_histogram_config();
    config.prefetch = Some(PrefetchConfig {
        threads: 2,
        steps_per_check: 10,
        load_balance: false,
    });
    let summary = run(&config, 31, sample_gas(), gas_trials()).unwrap();
    assert_eq!(summary.attempts, 6_000);
    for sample in &summary.samples {
        let window = summary.windows[sample.window];
        let bin = sample.bin.unwrap();
        assert!(bin >= window.soft_min && bin <= window.soft_max);
    }
    let ln_p = summary.ln_macro_prob.unwrap();
    assert_eq!(ln_p.len(), 17);
    assert!(ln_p.values().iter().all(|value| value.is_finite()));
}
