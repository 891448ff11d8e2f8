//! Request/response types for the Bitcoin RPC adapter.
//!
//! The serde structs mirror Bitcoin Core's JSON shapes; only the fields the
//! coordinator consumes are modeled.

use bitcoin::{Amount, Txid};
use serde::Deserialize;

/// One output of the transaction being built by
/// [`crate::CheckpointWallet::create_raw_tx`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutput {
    /// Pay `amount` to a bech32m address.
    Address {
        /// Encoded address string.
        address: String,
        /// Output value.
        amount: Amount,
    },

    /// Embed raw bytes in an `OP_RETURN` data output.
    Data {
        /// Payload bytes, hex-encoded on the wire.
        bytes: Vec<u8>,
    },
}

/// An unspent output as reported by `gettxout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutEntry {
    /// Output value.
    pub value: Amount,

    /// Raw scriptPubKey bytes.
    pub script_pubkey: Vec<u8>,
}

/// The recovered tip of the on-chain checkpoint chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestCheckpoint {
    /// Funding transaction of the tip UTXO; `None` when no anchor exists on
    /// chain yet.
    pub txid: Option<Txid>,

    /// Hash of the config blob embedded next to the tip output; `None` for
    /// the synthesized genesis anchor.
    pub data_hash: Option<[u8; 32]>,

    /// The taproot output key of the tip (the genesis-derived key when
    /// synthesized).
    pub pubkey: [u8; 32],
}

/// `gettxout` response.
#[derive(Debug, Deserialize)]
pub(crate) struct GetTxOutResult {
    pub value: f64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKeyResult,
}

/// Nested scriptPubKey object shared by several RPC responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ScriptPubKeyResult {
    pub hex: String,
}

/// One `listunspent` entry.
#[derive(Debug, Deserialize)]
pub(crate) struct ListUnspentEntry {
    pub txid: Txid,
    #[allow(dead_code)]
    pub vout: u32,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
}

/// `getrawtransaction` verbose response, outputs only.
#[derive(Debug, Deserialize)]
pub(crate) struct RawTransactionResult {
    pub vout: Vec<RawTransactionVout>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTransactionVout {
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKeyResult,
}

/// Serializes an [`Amount`] the way Bitcoin Core's JSON-RPC expects BTC
/// values: a fixed 8-decimal string, exact to the satoshi.
pub fn format_btc(amount: Amount) -> String {
    format!("{:.8}", amount.to_btc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_btc_is_exact_to_the_satoshi() {
        assert_eq!(format_btc(Amount::from_sat(10_000_000)), "0.10000000");
        assert_eq!(format_btc(Amount::from_sat(12_345_678_901)), "123.45678901");
        assert_eq!(format_btc(Amount::from_sat(1)), "0.00000001");
        assert_eq!(
            format_btc(Amount::from_sat(4_999_900_000)),
            "49.99900000"
        );
    }
}
