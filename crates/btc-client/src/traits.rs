//! Trait seam between the coordinator and the Bitcoin wallet.

use async_trait::async_trait;
use bitcoin::{ScriptBuf, Txid};

use crate::{
    types::{LatestCheckpoint, TxOutEntry, TxOutput},
    BtcClientError,
};

/// The wallet operations the checkpoint coordinator relies on.
///
/// Implemented by [`crate::BitcoinClient`] against a real node and by mock
/// wallets in tests.
#[async_trait]
pub trait CheckpointWallet: Send + Sync {
    /// Verifies the node is reachable.
    async fn ping(&self) -> Result<(), BtcClientError>;

    /// Registers a watch-only taproot output script so the wallet indexes
    /// UTXOs paying to it. Idempotent.
    async fn import_taproot(&self, script: &ScriptBuf) -> Result<(), BtcClientError>;

    /// Finds the single wallet UTXO paying to `address`, if any.
    async fn find_prev_txid(&self, address: &str) -> Result<Option<Txid>, BtcClientError>;

    /// Looks up an unspent output by outpoint.
    async fn get_txout(&self, txid: &Txid, vout: u32) -> Result<TxOutEntry, BtcClientError>;

    /// Builds an unsigned raw transaction with a single input and the given
    /// outputs, returning its hex serialization.
    async fn create_raw_tx(
        &self,
        prev_txid: &Txid,
        vout: u32,
        sequence: u32,
        outputs: &[TxOutput],
    ) -> Result<String, BtcClientError>;

    /// Broadcasts a fully signed raw transaction and returns its txid.
    async fn send_raw_tx(&self, tx_hex: &str) -> Result<Txid, BtcClientError>;

    /// Recovers the tip of the on-chain checkpoint chain anchored to
    /// `internal_key`, synthesizing the genesis anchor from `genesis_key`
    /// when nothing is on chain yet.
    async fn get_latest_checkpoint(
        &self,
        internal_key: &[u8; 32],
        genesis_key: &[u8],
    ) -> Result<LatestCheckpoint, BtcClientError>;
}
