//! The single mutable state owned by the coordinator.

use anchor_primitives::{
    taproot::{merkle_root, tweak_value},
    ThresholdKeyConfig,
};
use bitcoin::Txid;

use crate::child::{ChainEpoch, TipsetKey};

/// Process-wide coordinator state, one instance per node, always mutated
/// under the coordinator's mutex.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorState {
    /// The active threshold key config, if any.
    pub config: Option<ThresholdKeyConfig>,

    /// A pending config from the latest key generation, installed at the
    /// next checkpoint epoch.
    pub new_config: Option<ThresholdKeyConfig>,

    /// The tweaked x-only output key of the current checkpoint.
    pub pubkey: [u8; 32],

    /// The TapTweak scalar for the current checkpoint.
    pub tweaked_value: [u8; 32],

    /// The TapLeaf merkle root behind `tweaked_value`; the signing ceremony
    /// consumes the root and re-derives the tweak itself, so both are kept
    /// and always updated together.
    pub tweak_root: [u8; 32],

    /// Funding transaction of the current checkpoint UTXO; `None` until the
    /// wallet has been consulted or right after a key advance.
    pub prev_txid: Option<Txid>,

    /// The subnet tipset recovered from Bitcoin at boot.
    pub latest_config_checkpoint: Option<TipsetKey>,

    /// Whether the subnet node has caught up past
    /// `latest_config_checkpoint`.
    pub synced: bool,

    /// Highest subnet epoch known to be reflected on Bitcoin.
    pub height: ChainEpoch,
}

impl CoordinatorState {
    /// Creates the boot state: `config` comes from the share file when one
    /// exists, and a node that already holds shares starts out synced.
    pub fn at_boot(config: Option<ThresholdKeyConfig>) -> Self {
        let synced = config.is_some();
        Self {
            config,
            synced,
            ..Self::default()
        }
    }

    /// Derives and installs the key material committing `internal` to `cp`.
    fn derive_key(&mut self, internal: &[u8; 32], cp: &[u8], pubkey: [u8; 32]) {
        let root = merkle_root(internal, cp);
        self.tweak_root = root;
        self.tweaked_value = tweak_value(internal, &root);
        self.pubkey = pubkey;
    }

    /// First-ever installation of a generated config at a checkpoint epoch.
    ///
    /// There is no predecessor UTXO to spend, so nothing is broadcast; the
    /// pending config simply becomes active, keyed to `cp`.
    pub fn install_first_config(&mut self, cp: &[u8], pubkey: [u8; 32]) {
        let new_config = self
            .new_config
            .take()
            .expect("caller checked a pending config exists");
        let internal = new_config.public_key;
        self.derive_key(&internal, cp, pubkey);
        self.config = Some(new_config);
    }

    /// The state update after a signing ceremony succeeds: the key chain
    /// advances to `cp`, a pending config (whose key produced `pubkey`)
    /// becomes active, and the previous txid is cleared until broadcast
    /// reports the new one.
    pub fn advance_key(&mut self, internal: &[u8; 32], cp: &[u8], pubkey: [u8; 32]) {
        self.derive_key(internal, cp, pubkey);
        if let Some(new_config) = self.new_config.take() {
            self.config = Some(new_config);
        }
        self.prev_txid = None;
    }

    /// Restores the key material for an already-anchored checkpoint, used at
    /// boot.
    pub fn restore_key(&mut self, internal: &[u8; 32], cp: &[u8], pubkey: [u8; 32]) {
        self.derive_key(internal, cp, pubkey);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anchor_primitives::{PartyId, VerificationShare};

    use super::*;

    fn dummy_config(party: &str, public_key: [u8; 32]) -> ThresholdKeyConfig {
        ThresholdKeyConfig {
            party_id: PartyId::from(party),
            threshold: 2,
            private_share: [1; 32],
            public_key,
            verification_shares: BTreeMap::from([
                (PartyId::from(party), VerificationShare([2; 33])),
                (PartyId::from("other"), VerificationShare([3; 33])),
            ]),
        }
    }

    #[test]
    fn boot_with_shares_is_synced() {
        let state = CoordinatorState::at_boot(Some(dummy_config("a", [7; 32])));
        assert!(state.synced);
        assert!(state.config.is_some());

        let state = CoordinatorState::at_boot(None);
        assert!(!state.synced);
    }

    #[test]
    fn advance_key_installs_pending_config() {
        let mut state = CoordinatorState::at_boot(Some(dummy_config("a", [7; 32])));
        let pending = dummy_config("a", [9; 32]);
        state.new_config = Some(pending.clone());

        state.advance_key(&[9; 32], b"cp", [0xaa; 32]);

        assert_eq!(state.config, Some(pending));
        assert!(state.new_config.is_none());
        assert!(state.prev_txid.is_none());
        assert_eq!(state.pubkey, [0xaa; 32]);
        assert_eq!(state.tweak_root, merkle_root(&[9; 32], b"cp"));
        assert_eq!(
            state.tweaked_value,
            tweak_value(&[9; 32], &merkle_root(&[9; 32], b"cp"))
        );
    }

    #[test]
    fn advance_key_without_pending_keeps_config() {
        let config = dummy_config("a", [7; 32]);
        let mut state = CoordinatorState::at_boot(Some(config.clone()));

        state.advance_key(&[7; 32], b"cp", [0xbb; 32]);

        assert_eq!(state.config, Some(config));
    }
}
