//! Typed broadcast transport for the key ceremony messages.
//!
//! All threshold protocol traffic rides a single pubsub topic. The raw fabric
//! (gossipsub in production, an in-process channel in tests) is abstracted
//! behind [`Fabric`]; [`KeygenTopic`] layers party identities and self-echo
//! filtering on top.

pub mod fabric;
pub mod topic;

pub use fabric::{Fabric, LocalFabric, Subscription};
pub use topic::{Envelope, KeygenTopic, KEYGEN_TOPIC};

use thiserror::Error;

/// Errors surfaced by the pubsub transport.
#[derive(Debug, Error)]
pub enum PubsubError {
    /// The underlying fabric dropped the topic or the process is shutting
    /// down.
    #[error("pubsub channel closed")]
    Closed,

    /// An envelope failed to encode or decode.
    #[error("envelope codec: {0}")]
    Codec(#[from] bincode::Error),
}
