use fhmc_core::{McError, Proposal, RngHandle, System};
use fhmc_mcmc::{
    Bias, BiasConfig, Criteria, Histogram, Macrostate, MacrostateKind, Sampler, Trial, TrialSet,
    TransitionMatrixConfig, WangLandauConfig,
};
use proptest::prelude::*;

/// Particle counter that jumps by up to `mv` particles at a time.
#[derive(Debug, Clone, PartialEq)]
struct Walker {
    n: i64,
    pending: Option<i64>,
}

impl Walker {
    fn at(n: i64) -> Self {
        Self { n, pending: None }
    }
}

impl System for Walker {
    type Move = i64;

    fn current_energy(&self) -> f64 {
        0.0
    }

    fn num_particles(&self) -> usize {
        self.n as usize
    }

    fn propose(&mut self, mv: &i64, rng: &mut RngHandle) -> Result<Proposal, McError> {
        let jump = if *mv == 0 {
            0
        } else {
            rng.index(2 * *mv as usize + 1) as i64 - mv
        };
        if self.n + jump < 0 {
            return Ok(Proposal::rejected());
        }
        self.pending = Some(self.n);
        self.n += jump;
        Ok(Proposal::new(0.0, 100.0))
    }

    fn commit(&mut self) {
        self.pending = None;
    }

    fn revert(&mut self) {
        if let Some(old) = self.pending.take() {
            self.n = old;
        }
    }

    fn is_equal(&self, other: &Self, _tolerance: f64) -> bool {
        self.n == other.n
    }
}

/// Always jumps by exactly `mv`.
#[derive(Debug, Clone, PartialEq)]
struct Leaper(Walker);

impl System for Leaper {
    type Move = i64;

    fn current_energy(&self) -> f64 {
        0.0
    }

    fn num_particles(&self) -> usize {
        self.0.num_particles()
    }

    fn propose(&mut self, mv: &i64, _rng: &mut RngHandle) -> Result<Proposal, McError> {
        self.0.pending = Some(self.0.n);
        self.0.n += mv;
        Ok(Proposal::new(-50.0, 100.0))
    }

    fn commit(&mut self) {
        self.0.commit();
    }

    fn revert(&mut self) {
        self.0.revert();
    }

    fn is_equal(&self, other: &Self, tolerance: f64) -> bool {
        self.0.is_equal(&other.0, tolerance)
    }
}

fn criteria(max: f64, soft: (usize, usize), bias: &BiasConfig) -> Criteria {
    let histogram = Histogram::new(1.0, 0.0, max).unwrap();
    let mut macrostate = Macrostate::new(MacrostateKind::NumParticles, histogram);
    macrostate.set_soft_bounds(soft.0, soft.1).unwrap();
    let bias = Bias::from_config(bias, macrostate.num_bins()).unwrap();
    Criteria::flat_histogram(1.0, macrostate, bias).unwrap()
}

fn wang_landau() -> BiasConfig {
    BiasConfig::WangLandau(WangLandauConfig::default())
}

#[test]
fn moves_past_the_soft_maximum_are_rejected() {
    let trials = TrialSet::new(vec![Trial::new("leap", 1.0, 5)]).unwrap();
    let mut sampler = Sampler::new(
        Leaper(Walker::at(0)),
        criteria(8.0, (0, 4), &wang_landau()),
        trials,
        1,
    )
    .unwrap();
    let outcome = sampler.attempt_one().unwrap();
    assert!(!outcome.accepted);
    assert_eq!(sampler.system.num_particles(), 0);
    assert_eq!(sampler.criteria.current_bin(), Some(0));
    // the blocked attempt is booked as a stay in the old bin
    let bias = sampler.criteria.bias().unwrap();
    assert_eq!(bias.ln_macro_prob().value(0), 1.0);
    assert_eq!(bias.visited()[0], 1);
    assert_eq!(sampler.trials.get(0).stats.attempted, 1);
    assert_eq!(sampler.trials.get(0).stats.accepted, 0);
}

#[test]
fn moves_inside_the_soft_range_are_accepted() {
    let trials = TrialSet::new(vec![Trial::new("leap", 1.0, 1)]).unwrap();
    let mut sampler = Sampler::new(
        Leaper(Walker::at(3)),
        criteria(8.0, (0, 4), &wang_landau()),
        trials,
        1,
    )
    .unwrap();
    assert!(sampler.attempt_one().unwrap().accepted);
    assert_eq!(sampler.criteria.current_bin(), Some(4));
    assert!(!sampler.attempt_one().unwrap().accepted);
    assert_eq!(sampler.system.num_particles(), 4);
}

#[test]
fn blocked_neighbour_moves_are_booked_as_stays() {
    let trials = TrialSet::new(vec![Trial::new("leap", 1.0, 1)]).unwrap();
    let config = BiasConfig::TransitionMatrix(TransitionMatrixConfig::default());
    let mut sampler = Sampler::new(
        Leaper(Walker::at(4)),
        criteria(8.0, (0, 4), &config),
        trials,
        1,
    )
    .unwrap();
    assert!(!sampler.attempt_one().unwrap().accepted);
    let row = sampler.criteria.bias().unwrap().collection().unwrap().row(4);
    assert_eq!(row, [0.0, 1.0, 0.0]);
    assert_eq!(sampler.criteria.bias().unwrap().visited()[4], 0);
    assert_eq!(sampler.criteria.current_bin(), Some(4));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn walker_never_leaves_its_window(
        soft_min in 0usize..10,
        width in 1usize..8,
        offset in 0usize..8,
        max_jump in 1i64..6,
        seed in any::<u64>(),
    ) {
        let soft_max = soft_min + width;
        let start = soft_min + offset.min(width);
        let trials = TrialSet::new(vec![Trial::new("jump", 1.0, max_jump)]).unwrap();
        let mut sampler = Sampler::new(
            Walker::at(start as i64),
            criteria(20.0, (soft_min, soft_max), &wang_landau()),
            trials,
            seed,
        )
        .unwrap();
        for _ in 0..200 {
            sampler.attempt_one().unwrap();
            let n = sampler.system.num_particles();
            prop_assert!(n >= soft_min && n <= soft_max, "n={} outside [{}, {}]", n, soft_min, soft_max);
            prop_assert_eq!(sampler.criteria.current_bin(), Some(n));
        }
    }
}
