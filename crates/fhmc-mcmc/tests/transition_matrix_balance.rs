use fhmc_core::RngHandle;
use fhmc_lattice::{GasMove, Lattice, LatticeGas};
use fhmc_mcmc::collection::{DOWN, STAY, UP};
use fhmc_mcmc::criteria::NEAR_INFINITY;
use fhmc_mcmc::{
    run, BiasConfig, CriteriaConfig, MacrostateConfig, MacrostateKind, RunConfig,
    TransitionMatrix, TransitionMatrixConfig, Trial, TrialSet,
};

fn tm_config(updates_per_solve: u64) -> TransitionMatrixConfig {
    TransitionMatrixConfig {
        min_sweeps: 2,
        min_visits: 1,
        updates_per_solve,
    }
}

fn ln_binomial(n: usize, k: usize) -> f64 {
    let ln_factorial = |m: usize| (1..=m).map(|i| (i as f64).ln()).sum::<f64>();
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

#[test]
fn solve_satisfies_detailed_balance() {
    let mut tm = TransitionMatrix::new(&tm_config(1_000_000), 5);
    let mut rng = RngHandle::from_seed(17);
    let mut bin = 2usize;
    for _ in 0..5_000 {
        let up = rng.uniform() < 0.5;
        let new = match (up, bin) {
            (true, 4) | (false, 0) => bin,
            (true, _) => bin + 1,
            (false, _) => bin - 1,
        };
        let ln_prob = -3.0 * rng.uniform();
        let accepted = rng.uniform() < ln_prob.exp();
        tm.update(bin, new, ln_prob, accepted).unwrap();
        if accepted {
            bin = new;
        }
    }
    tm.solve();
    let ln_p = tm.ln_prob();
    let collection = tm.collection();
    for b in 0..4 {
        let up = collection.transition_probability(b, UP);
        let down = collection.transition_probability(b + 1, DOWN);
        assert!(up > 0.0 && down > 0.0);
        let lhs = ln_p.value(b) + up.ln();
        let rhs = ln_p.value(b + 1) + down.ln();
        assert!((lhs - rhs).abs() < 1e-10, "bin {b}: {lhs} vs {rhs}");
    }
    let total: f64 = ln_p.values().iter().map(|v| v.exp()).sum();
    assert!((total - 1.0).abs() < 1e-10);
}

#[test]
fn every_attempt_fills_one_row_unit() {
    let mut tm = TransitionMatrix::new(&tm_config(100), 3);
    tm.update(1, 2, -0.5, false).unwrap();
    tm.update(1, 0, 0.3, true).unwrap();
    tm.update(1, 1, 0.0, true).unwrap();
    let row = tm.collection().row(1);
    assert!((row.iter().sum::<f64>() - 3.0).abs() < 1e-12);
    assert!((row[UP] - (-0.5_f64).exp()).abs() < 1e-12);
    assert_eq!(row[DOWN], 1.0);
    // only accepted moves count as visits
    assert_eq!(tm.visits(), &[1, 1, 0]);
}

#[test]
fn jumps_of_more_than_one_bin_are_rejected() {
    let mut tm = TransitionMatrix::new(&tm_config(100), 4);
    let err = tm.update(0, 2, -1.0, false).unwrap_err();
    assert_eq!(err.info().code, "tm-jump");
}

#[test]
fn forced_rejections_are_booked_as_stays() {
    let mut tm = TransitionMatrix::new(&tm_config(100), 5);
    tm.update(3, 3, -NEAR_INFINITY, false).unwrap();
    tm.update(4, 4, -NEAR_INFINITY, false).unwrap();
    assert_eq!(tm.collection().row(3), [0.0, 1.0, 0.0]);
    assert_eq!(tm.collection().row(4), [0.0, 1.0, 0.0]);
    assert_eq!(tm.visits(), &[0; 5]);
}

#[test]
fn sweeps_complete_the_estimate() {
    let mut tm = TransitionMatrix::new(&tm_config(1), 2);
    for _ in 0..2 {
        tm.update(0, 1, 0.0, true).unwrap();
        tm.update(1, 0, 0.0, true).unwrap();
        tm.infrequent_update(0, 1);
    }
    assert_eq!(tm.num_sweeps(), 2);
    assert!(tm.is_complete());
}

#[test]
fn ideal_lattice_gas_matches_binomial_coefficients() {
    let sites = 9;
    let gas = LatticeGas::ideal(Lattice::new(vec![3, 3]).unwrap(), 0.0).unwrap();
    let trials = TrialSet::new(vec![
        Trial::new("insert", 1.0, GasMove::Insert),
        Trial::new("remove", 1.0, GasMove::Remove),
    ])
    .unwrap();
    let mut config = RunConfig::default();
    config.attempts = 2_000_000;
    config.criteria = CriteriaConfig::FlatHistogram {
        macrostate: MacrostateConfig {
            kind: MacrostateKind::NumParticles,
            width: 1.0,
            min: 0.0,
            max: sites as f64,
        },
        bias: BiasConfig::TransitionMatrix(TransitionMatrixConfig {
            min_sweeps: 20,
            min_visits: 200,
            updates_per_solve: 1_000,
        }),
    };

    let summary = run(&config, 7, gas, trials).unwrap();
    assert!(summary.complete);
    let ln_p = summary.ln_macro_prob.unwrap();
    for n in 0..=sites {
        let expected = ln_binomial(sites, n) - ln_binomial(sites, 0);
        let found = ln_p.value(n) - ln_p.value(0);
        assert!(
            (expected - found).abs() < 0.25,
            "N={n}: expected {expected:.3}, found {found:.3}"
        );
    }
}
