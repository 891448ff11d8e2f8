//! Interface to the subnet full node.
//!
//! The node itself is an external collaborator; the coordinator only needs
//! sync status, tipset lookups and the power-actor state that lists the
//! current validators.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A subnet chain epoch number.
pub type ChainEpoch = i64;

/// Opaque identifier of the block set at one subnet epoch. Used verbatim as
/// the checkpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipsetKey(#[serde(with = "hex::serde")] Vec<u8>);

impl TipsetKey {
    /// Wraps raw key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the key into its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Display for TipsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// A finalized subnet tipset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tipset {
    /// The tipset's epoch.
    pub height: ChainEpoch,

    /// The tipset's key.
    pub key: TipsetKey,
}

/// One in-flight sync of the subnet node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSync {
    /// The height this sync has reached.
    pub height: ChainEpoch,
}

/// The subnet node's sync status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// All in-flight syncs; the last one is the most recent.
    pub active_syncs: Vec<ActiveSync>,
}

impl SyncStatus {
    /// Whether the node has caught up to `height`.
    pub fn caught_up_to(&self, height: ChainEpoch) -> bool {
        self.active_syncs
            .last()
            .is_some_and(|sync| sync.height == height)
    }
}

/// The power-actor state at one tipset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerState {
    /// Number of registered miners.
    pub miner_count: u64,

    /// Miner identities, in actor order.
    pub miners: Vec<String>,
}

/// A head movement reported by the subnet node.
#[derive(Debug, Clone)]
pub enum HeadChange {
    /// The chain advanced from `old` to `new`.
    Apply {
        /// The tipset being built on.
        old: Tipset,
        /// The new finalized tipset.
        new: Tipset,
    },

    /// A tipset was reverted. Tolerated: the next checkpoint epoch anchors
    /// the then-current tipset.
    Revert(Tipset),
}

/// Errors talking to the subnet node.
#[derive(Debug, Clone, Error)]
#[error("subnet rpc: {0}")]
pub struct ChildRpcError(pub String);

/// Queries the coordinator issues against the subnet node.
#[async_trait]
pub trait ChildClient: Send + Sync {
    /// The node's sync status.
    async fn sync_status(&self) -> Result<SyncStatus, ChildRpcError>;

    /// Looks up a tipset by key.
    async fn tipset(&self, key: &TipsetKey) -> Result<Tipset, ChildRpcError>;

    /// The genesis tipset.
    async fn genesis(&self) -> Result<Tipset, ChildRpcError>;

    /// The power-actor state at `key`.
    async fn power_state(&self, key: &TipsetKey) -> Result<PowerState, ChildRpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caught_up_requires_matching_height() {
        let status = SyncStatus {
            active_syncs: vec![ActiveSync { height: 10 }, ActiveSync { height: 25 }],
        };
        assert!(status.caught_up_to(25));
        assert!(!status.caught_up_to(10), "only the last sync counts");
        assert!(!SyncStatus::default().caught_up_to(0));
    }
}
