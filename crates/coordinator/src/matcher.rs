//! Policy constants and predicates for the state-change matcher.

use std::collections::BTreeSet;

use crate::child::{ChainEpoch, PowerState};

/// A checkpoint is anchored every this many subnet epochs.
pub const EPOCH_INTERVAL: ChainEpoch = 25;

/// Number of tipsets a head change must be buried under before the matcher
/// sees it.
pub const MATCH_CONFIDENCE: ChainEpoch = 5;

/// The "no timeout" sentinel handed to the state-change subscription.
pub const MATCH_TIMEOUT_SENTINEL: ChainEpoch = 76_587_687_658_765_876;

/// Parameters of the state-change subscription on the subnet node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherParams {
    /// See [`MATCH_CONFIDENCE`].
    pub confidence: ChainEpoch,

    /// See [`MATCH_TIMEOUT_SENTINEL`].
    pub timeout: ChainEpoch,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            confidence: MATCH_CONFIDENCE,
            timeout: MATCH_TIMEOUT_SENTINEL,
        }
    }
}

/// Whether `height` is a checkpoint epoch.
pub fn is_checkpoint_epoch(height: ChainEpoch) -> bool {
    height % EPOCH_INTERVAL == 0
}

/// Whether the validator roster changed between two power states, compared
/// as the sorted set of miner ids. A pure size comparison would miss
/// equal-size swaps and double-count reorderings.
pub fn miners_changed(old: &PowerState, new: &PowerState) -> bool {
    let old: BTreeSet<&str> = old.miners.iter().map(String::as_str).collect();
    let new: BTreeSet<&str> = new.miners.iter().map(String::as_str).collect();
    old != new
}
