//! The checkpoint coordinator: listens to the subnet chain, rotates the
//! threshold key on validator-set changes and anchors the subnet's tipset
//! onto Bitcoin at every checkpoint epoch.

pub mod blob;
pub mod child;
pub mod coordinator;
pub mod errors;
pub mod matcher;
pub mod state;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use errors::CheckpointError;
pub use matcher::{is_checkpoint_epoch, MatcherParams, EPOCH_INTERVAL};
pub use state::CoordinatorState;
