use fhmc_core::{McError, Proposal, RngHandle, System};

#[derive(Debug, Clone, PartialEq)]
struct Counter {
    value: i64,
    pending: Option<i64>,
}

impl System for Counter {
    type Move = i64;

    fn current_energy(&self) -> f64 {
        self.value as f64
    }

    fn num_particles(&self) -> usize {
        self.value.max(0) as usize
    }

    fn propose(&mut self, mv: &i64, _rng: &mut RngHandle) -> Result<Proposal, McError> {
        self.pending = Some(self.value);
        self.value += mv;
        Ok(Proposal::new(*mv as f64, 0.0))
    }

    fn commit(&mut self) {
        self.pending = None;
    }

    fn revert(&mut self) {
        if let Some(old) = self.pending.take() {
            self.value = old;
        }
    }

    fn is_equal(&self, other: &Self, _tolerance: f64) -> bool {
        self.value == other.value
    }
}

#[test]
fn propose_then_revert_restores_state() {
    let mut sys = Counter { value: 3, pending: None };
    let mut rng = RngHandle::from_seed(1);
    let proposal = sys.propose(&2, &mut rng).unwrap();
    assert_eq!(sys.value, 5);
    assert_eq!(proposal.ln_metropolis_prob(0.5), -1.0);
    sys.revert();
    assert_eq!(sys.value, 3);
}

#[test]
fn hard_rejection_has_no_energy_change() {
    let proposal = Proposal::rejected();
    assert!(proposal.reject);
    assert_eq!(proposal.delta_energy, 0.0);
}
