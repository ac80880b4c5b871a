use fhmc_core::{McError, RngHandle};
use fhmc_mcmc::criteria::NEAR_INFINITY;
use fhmc_mcmc::splice::{splice, Piece};
use fhmc_mcmc::{
    Bias, BiasConfig, CollectionMatrix, LnProbability, TransitionMatrixConfig, WangLandauConfig,
};
use proptest::prelude::*;

fn wang_landau(values: Vec<f64>) -> Bias {
    let mut bias =
        Bias::from_config(&BiasConfig::WangLandau(WangLandauConfig::default()), values.len())
            .unwrap();
    bias.set_ln_macro_prob(LnProbability::from_values(values));
    bias
}

fn transition_matrix(num_bins: usize, range: (usize, usize), seed: u64) -> Bias {
    let config = BiasConfig::TransitionMatrix(TransitionMatrixConfig::default());
    let mut bias = Bias::from_config(&config, num_bins).unwrap();
    let mut rng = RngHandle::from_seed(seed);
    let (lo, hi) = range;
    let mut bin = lo;
    for _ in 0..2_000 {
        let new = if rng.uniform() < 0.5 { bin + 1 } else { bin.saturating_sub(1) };
        let ln_prob = -2.0 * rng.uniform();
        if new < lo || new > hi {
            bias.update(bin, bin, -NEAR_INFINITY, false).unwrap();
            continue;
        }
        let accepted = rng.uniform() < ln_prob.exp();
        bias.update(bin, new, ln_prob, accepted).unwrap();
        if accepted {
            bin = new;
        }
    }
    bias
}

#[test]
fn transition_matrix_splice_is_idempotent() {
    let lower = transition_matrix(8, (0, 4), 1);
    let upper = transition_matrix(8, (3, 7), 2);
    let pieces = [
        Piece { bias: &lower, soft_min: 0, soft_max: 4 },
        Piece { bias: &upper, soft_min: 3, soft_max: 7 },
    ];
    let first = splice(&pieces).unwrap();
    let second = splice(&pieces).unwrap();
    assert_eq!(first, second);

    let mut total = CollectionMatrix::new(8);
    total.add(lower.collection().unwrap()).unwrap();
    total.add(upper.collection().unwrap()).unwrap();
    let mut expected = LnProbability::uniform(8);
    total.solve(&mut expected);
    assert_eq!(first, expected);
}

#[test]
fn mixed_estimators_fall_back_to_alignment() {
    let lower = wang_landau(vec![0.0, 1.0, 2.0, 3.0, 0.0, 0.0]);
    let upper = transition_matrix(6, (2, 5), 3);
    let spliced = splice(&[
        Piece { bias: &lower, soft_min: 0, soft_max: 3 },
        Piece { bias: &upper, soft_min: 2, soft_max: 5 },
    ])
    .unwrap();
    let values = spliced.values();
    assert!((values[1] - values[0] - 1.0).abs() < 1e-12);
    let total: f64 = values.iter().map(|v| v.exp()).sum();
    assert!((total - 1.0).abs() < 1e-10);
}

#[test]
fn histogram_size_mismatch_is_reported() {
    let lower = wang_landau(vec![0.0; 4]);
    let upper = wang_landau(vec![0.0; 5]);
    let err = splice(&[
        Piece { bias: &lower, soft_min: 0, soft_max: 2 },
        Piece { bias: &upper, soft_min: 2, soft_max: 4 },
    ])
    .unwrap_err();
    assert!(matches!(err, McError::Consistency(_)));
    assert_eq!(err.info().code, "splice-bins");
}

#[test]
fn nothing_to_splice_is_an_error() {
    let err = splice(&[]).unwrap_err();
    assert_eq!(err.info().code, "splice-empty");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn aligned_windows_recover_the_shape(
        shape in proptest::collection::vec(-5.0f64..5.0, 12..30),
        offsets in proptest::collection::vec(-50.0f64..50.0, 3),
        overlap in 1usize..4,
    ) {
        let num_bins = shape.len();
        let third = num_bins / 3;
        let ranges = [
            (0, third),
            (third + 1 - overlap, 2 * third),
            (2 * third + 1 - overlap, num_bins - 1),
        ];
        let biases: Vec<Bias> = ranges
            .iter()
            .zip(&offsets)
            .map(|(&(lo, hi), offset)| {
                let mut values = vec![0.0; num_bins];
                for bin in lo..=hi {
                    values[bin] = shape[bin] + offset;
                }
                wang_landau(values)
            })
            .collect();
        let pieces: Vec<Piece> = biases
            .iter()
            .zip(&ranges)
            .map(|(bias, &(soft_min, soft_max))| Piece { bias, soft_min, soft_max })
            .collect();
        let spliced = splice(&pieces).unwrap();
        for bin in 1..num_bins {
            let found = spliced.value(bin) - spliced.value(bin - 1);
            let expected = shape[bin] - shape[bin - 1];
            prop_assert!((found - expected).abs() < 1e-9, "bin {}: {} vs {}", bin, found, expected);
        }
    }
}
