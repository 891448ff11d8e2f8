//! Unified error type for the checkpoint coordinator.

use anchor_blob_store::BlobStoreError;
use anchor_btc_client::BtcClientError;
use anchor_frost::SessionError;
use anchor_primitives::{taproot::TaprootError, threshold::ShareFileError};
use bitcoin::Amount;
use thiserror::Error;

use crate::child::ChildRpcError;

/// Everything that can go wrong while matching events or building a
/// checkpoint. The policy per variant lives with the event loop: most
/// failures are logged and naturally retried at the next epoch.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// A subnet node query failed; the current match attempt becomes a
    /// no-op.
    #[error(transparent)]
    Child(#[from] ChildRpcError),

    /// The Bitcoin node could not be reached at boot; the coordinator does
    /// not start.
    #[error("bitcoin node unreachable: {0}")]
    BitcoinUnreachable(String),

    /// A Bitcoin RPC call failed mid-operation; state is preserved and the
    /// next epoch retries.
    #[error("bitcoin rpc: {0}")]
    Rpc(BtcClientError),

    /// A threshold ceremony aborted.
    #[error(transparent)]
    Frost(#[from] SessionError),

    /// The wallet does not know a UTXO paying the current checkpoint
    /// address.
    #[error("no predecessor utxo for {0}")]
    NoPredecessorUtxo(String),

    /// The checkpoint UTXO cannot cover the configured fee. Operator
    /// intervention is required.
    #[error("checkpoint value {value} cannot cover fee {fee}")]
    InsufficientFunds {
        /// Value of the UTXO being spent.
        value: Amount,
        /// The configured fee.
        fee: Amount,
    },

    /// Broadcasting the signed checkpoint failed; the advanced key state is
    /// kept and the next epoch retries with a fresh payload.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    /// The object store rejected or lost a config blob.
    #[error(transparent)]
    Blob(#[from] BlobStoreError),

    /// Taproot key derivation failed.
    #[error(transparent)]
    Taproot(#[from] TaprootError),

    /// The share file could not be written or read.
    #[error(transparent)]
    Share(#[from] ShareFileError),

    /// The wallet returned a transaction the coordinator cannot work with.
    #[error("unworkable transaction: {0}")]
    BadTx(String),
}

impl From<BtcClientError> for CheckpointError {
    fn from(e: BtcClientError) -> Self {
        match e {
            BtcClientError::Unreachable(msg) => CheckpointError::BitcoinUnreachable(msg),
            other => CheckpointError::Rpc(other),
        }
    }
}
