#![deny(missing_docs)]
#![doc = "Periodic lattice gas implementing the `System` contract of `fhmc-core`."]

mod gas;
pub mod lattice;

pub use gas::{GasMove, LatticeGas};
pub use lattice::Lattice;
