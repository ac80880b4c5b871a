use fhmc_core::McError;
use fhmc_mcmc::{
    Bias, BiasConfig, Criteria, Ensemble, GrandCanonical, Histogram, LnProbability, Macrostate,
    MacrostateKind, RunConfig, WangLandauConfig,
};

fn ln_binomial(n: usize, k: usize) -> f64 {
    let ln_factorial = |m: usize| (1..=m).map(|i| (i as f64).ln()).sum::<f64>();
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

fn ideal_gas(sites: usize) -> Ensemble {
    let histogram = Histogram::new(1.0, 0.0, sites as f64).unwrap();
    let ln_prob = LnProbability::from_values((0..=sites).map(|n| ln_binomial(sites, n)).collect());
    Ensemble::new(histogram, ln_prob).unwrap()
}

fn two_phase() -> Ensemble {
    let histogram = Histogram::new(1.0, 0.0, 20.0).unwrap();
    let values = (0..=20)
        .map(|n| {
            let n = n as f64;
            (-(n - 4.0).powi(2)).max(-(n - 16.0).powi(2))
        })
        .collect();
    Ensemble::new(histogram, LnProbability::from_values(values)).unwrap()
}

#[test]
fn ideal_gas_reweighting_shifts_the_density() {
    let mut gce = GrandCanonical::new(ideal_gas(20), 0.0).unwrap();
    assert!(!gce.ensemble().is_phase_boundary().unwrap());
    assert!((gce.ensemble().average_macrostate(0).unwrap() - 10.0).abs() < 1e-9);
    assert!((gce.beta_pv(0).unwrap() - 20.0 * 2.0_f64.ln()).abs() < 1e-9);

    // <N> = M z / (1 + z) and beta P V = M ln(1 + z) with z = exp(beta_mu)
    gce.reweight_to(3.0_f64.ln());
    assert!((gce.beta_mu() - 3.0_f64.ln()).abs() < 1e-12);
    assert!((gce.ensemble().average_macrostate(0).unwrap() - 15.0).abs() < 1e-9);
    assert!((gce.beta_pv(0).unwrap() - 20.0 * 4.0_f64.ln()).abs() < 1e-9);

    let total: f64 = gce.ensemble().ln_prob().values().iter().map(|v| v.exp()).sum();
    assert!((total - 1.0).abs() < 1e-12);
    assert_eq!(gce.ensemble().ln_prob_original().value(7), ln_binomial(20, 7));
}

#[test]
fn reweighting_starts_from_the_sampled_distribution() {
    let mut ensemble = ideal_gas(10);
    let once = ensemble.reweight(0.5).clone();
    ensemble.reweight(-2.0);
    assert_eq!(ensemble.reweight(0.5), &once);
    assert_eq!(ensemble.delta_conjugate(), 0.5);
}

#[test]
fn interior_minimum_splits_the_phases() {
    let ensemble = two_phase();
    assert!(ensemble.is_phase_boundary().unwrap());
    assert_eq!(ensemble.phase_boundary(0).unwrap(), (0, 10));
    assert_eq!(ensemble.phase_boundary(1).unwrap(), (10, 20));
    let low = ensemble.average_macrostate(0).unwrap();
    let high = ensemble.average_macrostate(1).unwrap();
    assert!(low < 10.0 && high > 10.0);
    assert!((low + high - 20.0).abs() < 1e-9);

    let err = ensemble.phase_boundary(2).unwrap_err();
    assert_eq!(err.info().code, "ensemble-phase");
}

#[test]
fn several_minima_are_ambiguous() {
    let histogram = Histogram::new(1.0, 0.0, 6.0).unwrap();
    let ln_prob = LnProbability::from_values(vec![0.0, -3.0, -1.0, 0.0, -1.0, -3.0, 0.0]);
    let ensemble = Ensemble::new(histogram, ln_prob).unwrap().with_num_smooth(1);
    let err = ensemble.average_macrostate(0).unwrap_err();
    assert!(matches!(err, McError::Consistency(_)));
    assert_eq!(err.info().code, "ensemble-minima");
}

#[test]
fn per_bin_values_must_match_the_histogram() {
    let ensemble = ideal_gas(4);
    let err = ensemble.average(&[1.0, 2.0], 0).unwrap_err();
    assert_eq!(err.info().code, "ensemble-bins");

    let histogram = Histogram::new(1.0, 0.0, 4.0).unwrap();
    let err = Ensemble::new(histogram, LnProbability::uniform(3)).unwrap_err();
    assert_eq!(err.info().code, "ensemble-bins");
}

#[test]
fn grand_canonical_needs_an_empty_first_bin() {
    let histogram = Histogram::new(1.0, 2.0, 6.0).unwrap();
    let ensemble = Ensemble::new(histogram, LnProbability::uniform(5)).unwrap();
    let err = GrandCanonical::new(ensemble, 0.0).unwrap_err();
    assert_eq!(err.info().code, "ensemble-empty-bin");
}

#[test]
fn criteria_estimate_feeds_an_ensemble() {
    let histogram = Histogram::new(1.0, 0.0, 8.0).unwrap();
    let macrostate = Macrostate::new(MacrostateKind::NumParticles, histogram);
    let mut bias =
        Bias::from_config(&BiasConfig::WangLandau(WangLandauConfig::default()), 9).unwrap();
    bias.set_ln_macro_prob(LnProbability::from_values((0..=8).map(|n| ln_binomial(8, n)).collect()));
    let criteria = Criteria::flat_histogram(1.0, macrostate, bias).unwrap();

    let ensemble = Ensemble::from_criteria(&criteria).unwrap();
    assert_eq!(ensemble.histogram().num_bins(), 9);
    assert!((ensemble.average_macrostate(0).unwrap() - 4.0).abs() < 1e-9);

    let err = Ensemble::from_criteria(&Criteria::metropolis(1.0)).unwrap_err();
    assert_eq!(err.info().code, "ensemble-metropolis");
    let err = Ensemble::from_run(&RunConfig::default(), ensemble.ln_prob()).unwrap_err();
    assert_eq!(err.info().code, "ensemble-metropolis");
}
