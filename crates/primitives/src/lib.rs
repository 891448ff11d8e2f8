//! Core primitives for anchoring a subnet chain onto Bitcoin: the taproot
//! key/sighash kernel, party identities and the threshold key configuration
//! shared by every validator.

pub mod party;
pub mod taproot;
pub mod threshold;

pub use party::PartyId;
pub use threshold::{threshold_for, ThresholdKeyConfig, VerificationShare};
