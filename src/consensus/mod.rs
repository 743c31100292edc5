pub mod attestation;
pub mod delegate;
pub mod emission;

pub use attestation::{Attestation, block_weight, merge_attestation};
pub use delegate::{DEFAULT_DELEGATE_COUNT, DelegateEntry, DelegateRoster, select};
pub use emission::EmissionSchedule;
