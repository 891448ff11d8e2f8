//! Bitcoin Core JSON-RPC adapter for the checkpoint chain.
//!
//! A thin async client over the handful of wallet and raw-transaction calls
//! the coordinator needs, plus the [`CheckpointWallet`] trait seam that lets
//! tests substitute a mock wallet. The adapter never retries internally; the
//! coordinator owns the retry policy.

pub mod client;
pub mod traits;
pub mod types;

use thiserror::Error;

pub use client::{BitcoinClient, BtcClientConfig};
pub use traits::CheckpointWallet;
pub use types::{LatestCheckpoint, TxOutEntry, TxOutput};

/// Errors produced by the Bitcoin RPC adapter.
#[derive(Debug, Error)]
pub enum BtcClientError {
    /// The node could not be reached at all.
    #[error("bitcoin node unreachable: {0}")]
    Unreachable(String),

    /// The node answered with a JSON-RPC error.
    #[error("bitcoin rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// No wallet is loaded on the node.
    #[error("bitcoin node has no loaded wallet")]
    WalletMissing,

    /// The requested output does not exist (or is already spent).
    #[error("txout {txid}:{vout} not found")]
    MissingTxOut {
        txid: bitcoin::Txid,
        vout: u32,
    },

    /// The node answered with something the adapter could not interpret.
    #[error("unexpected bitcoin rpc response: {0}")]
    BadResponse(String),

    /// Key derivation for a checkpoint address failed.
    #[error(transparent)]
    Taproot(#[from] anchor_primitives::taproot::TaprootError),
}

/// `RPC_WALLET_NOT_FOUND` in Bitcoin Core's error table.
const RPC_WALLET_NOT_FOUND: i32 = -18;

impl From<jsonrpsee::core::ClientError> for BtcClientError {
    fn from(e: jsonrpsee::core::ClientError) -> Self {
        match e {
            jsonrpsee::core::ClientError::Call(err) if err.code() == RPC_WALLET_NOT_FOUND => {
                BtcClientError::WalletMissing
            }
            jsonrpsee::core::ClientError::Call(err) => BtcClientError::Rpc {
                code: err.code(),
                message: err.message().to_owned(),
            },
            jsonrpsee::core::ClientError::Transport(err) => {
                BtcClientError::Unreachable(err.to_string())
            }
            jsonrpsee::core::ClientError::RequestTimeout => {
                BtcClientError::Unreachable("request timed out".to_owned())
            }
            other => BtcClientError::BadResponse(other.to_string()),
        }
    }
}
