#![deny(missing_docs)]
#![doc = "Core errors, deterministic RNG and collaborator contracts for the flat-histogram Monte Carlo engine."]

pub mod errors;
pub mod provenance;
pub mod rng;
pub mod system;

pub use errors::{ErrorInfo, McError};
pub use provenance::{from_bytes, from_json, to_bytes, to_json, RunProvenance, Versioned};
pub use rng::{derive_substream_seed, RngHandle};
pub use system::{Proposal, System};
