use std::fs;
use std::path::Path;

use fhmc_lattice::{GasMove, Lattice, LatticeGas};
use fhmc_mcmc::checkpoint::CheckpointPayload;
use fhmc_mcmc::manifest::RunManifest;
use fhmc_mcmc::{
    resume, run, BiasConfig, CriteriaConfig, MacrostateConfig, MacrostateKind, RunConfig, Trial,
    TrialSet, WangLandauConfig, WindowConfig,
};
use tempfile::tempdir;

fn sample_gas() -> LatticeGas {
    LatticeGas::new(Lattice::new(vec![3, 3]).unwrap(), 1.0, 0.5).unwrap()
}

fn gas_trials() -> TrialSet<GasMove> {
    TrialSet::new(vec![
        Trial::new("insert", 1.0, GasMove::Insert),
        Trial::new("remove", 1.0, GasMove::Remove),
        Trial::new("translate", 1.0, GasMove::Translate),
    ])
    .unwrap()
}

fn flat_histogram_config(root: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.attempts = 4_000;
    config.criteria = CriteriaConfig::FlatHistogram {
        macrostate: MacrostateConfig {
            kind: MacrostateKind::NumParticles,
            width: 1.0,
            min: 0.0,
            max: 9.0,
        },
        bias: BiasConfig::WangLandau(WangLandauConfig {
            min_flatness: 50,
            min_visit_per_macro: 20,
            ..WangLandauConfig::default()
        }),
    };
    config.windows = WindowConfig {
        num: 2,
        overlap: 2,
        exchange_interval: 250,
        splice_interval: 1_000,
        ..WindowConfig::default()
    };
    config.checkpoint.interval = 2;
    config.checkpoint.max_to_keep = 3;
    config.output.run_directory = Some(root.join("run"));
    config
}

#[test]
fn resume_from_checkpoint_preserves_hashes() {
    let dir = tempdir().unwrap();
    let config = flat_histogram_config(dir.path());

    let summary = run(&config, 888, sample_gas(), gas_trials()).unwrap();
    assert_eq!(summary.attempts, 4_000);
    assert_eq!(summary.rounds, 16);
    assert_eq!(summary.checkpoints.len(), 3);
    assert!(summary.checkpoints.iter().all(|path| path.exists()));

    let checkpoint_path = summary.checkpoints[0].clone();
    let payload = CheckpointPayload::<LatticeGas>::load(&checkpoint_path).unwrap();
    assert_eq!(payload.round, 12);
    assert_eq!(payload.windows.len(), 2);
    assert!(payload.windows.iter().all(|window| window.attempts == 3_000));

    let resumed = resume::<LatticeGas>(&checkpoint_path).unwrap();
    assert_eq!(summary.final_state_hash, resumed.final_state_hash);
    assert_eq!(summary.final_energies, resumed.final_energies);
    assert_eq!(summary.rounds, resumed.rounds);
    assert_eq!(summary.exchange_acceptance, resumed.exchange_acceptance);
    let (a, b) = (
        summary.ln_macro_prob.unwrap(),
        resumed.ln_macro_prob.unwrap(),
    );
    for (x, y) in a.values().iter().zip(b.values()) {
        assert!((x - y).abs() < 1e-12);
    }
}

#[test]
fn run_directory_holds_every_artefact() {
    let dir = tempdir().unwrap();
    let config = flat_histogram_config(dir.path());
    let summary = run(&config, 5, sample_gas(), gas_trials()).unwrap();

    let manifest_path = summary.manifest_path.unwrap();
    let manifest = RunManifest::load(&manifest_path).unwrap();
    assert_eq!(manifest.final_state_hash, summary.final_state_hash);
    assert_eq!(manifest.windows.len(), 2);
    assert_eq!(manifest.checkpoints.len(), 3);
    assert_eq!(manifest.provenance.seed, config.seed_policy.master_seed);

    let metrics = fs::read_to_string(summary.metrics_path.unwrap()).unwrap();
    let mut lines = metrics.lines();
    assert_eq!(
        lines.next().unwrap(),
        "round,window,attempts,energy,bin,accepted,proposed,iterations,complete"
    );
    assert_eq!(lines.count(), 16 * 2);

    let report = fs::read_to_string(summary.report_path.unwrap()).unwrap();
    assert_eq!(report.lines().count(), 1 + 10);
}

#[test]
fn unknown_checkpoint_version_is_rejected() {
    let dir = tempdir().unwrap();
    let config = flat_histogram_config(dir.path());
    let summary = run(&config, 9, sample_gas(), gas_trials()).unwrap();
    let path = summary.checkpoints.last().unwrap();

    let contents = fs::read_to_string(path).unwrap();
    let tampered = dir.path().join("tampered.json");
    fs::write(&tampered, contents.replacen("\"version\": 1", "\"version\": 2", 1)).unwrap();
    let err = resume::<LatticeGas>(&tampered).unwrap_err();
    assert_eq!(err.info().code, "version-mismatch");
    assert_eq!(
        err.info().context.get("path").map(String::as_str),
        Some(tampered.display().to_string().as_str())
    );
}

#[test]
fn metropolis_chain_resumes_onto_the_same_trajectory() {
    let dir = tempdir().unwrap();
    let mut config = RunConfig::default();
    config.attempts = 3_000;
    config.windows.exchange_interval = 500;
    config.checkpoint.interval = 2;
    config.output.run_directory = Some(dir.path().join("metropolis"));

    let summary = run(&config, 42, sample_gas(), gas_trials()).unwrap();
    assert!(summary.ln_macro_prob.is_none());
    assert!(summary.report_path.is_none());
    assert_eq!(summary.checkpoints.len(), 3);

    let resumed = resume::<LatticeGas>(&summary.checkpoints[0]).unwrap();
    assert_eq!(summary.final_state_hash, resumed.final_state_hash);
    assert_eq!(summary.final_energies, resumed.final_energies);
}
