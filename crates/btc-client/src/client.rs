//! JSON-RPC client against a Bitcoin Core node.

use std::time::Duration;

use anchor_primitives::taproot;
use async_trait::async_trait;
use base64::Engine;
use bitcoin::{Amount, ScriptBuf, Txid};
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde_json::json;
use tracing::{debug, trace};

use crate::{
    types::{
        format_btc, GetTxOutResult, LatestCheckpoint, ListUnspentEntry, RawTransactionResult,
        TxOutEntry, TxOutput,
    },
    BtcClientError, CheckpointWallet,
};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the Bitcoin Core JSON-RPC interface.
#[derive(Debug, Clone)]
pub struct BtcClientConfig {
    /// `host:port` of the RPC endpoint, no scheme.
    pub host: String,

    /// Basic-auth user.
    pub user: String,

    /// Basic-auth password.
    pub pass: String,

    /// Per-request timeout; `None` uses the 30s default.
    pub timeout: Option<Duration>,
}

/// Async client for the wallet and raw-transaction calls the coordinator
/// needs.
#[derive(Debug, Clone)]
pub struct BitcoinClient {
    client: HttpClient,
}

impl BitcoinClient {
    /// Builds a client for the configured endpoint.
    pub fn new(config: &BtcClientConfig) -> Result<Self, BtcClientError> {
        let mut headers = HeaderMap::new();
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", config.user, config.pass));
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Basic {credentials}"))
                .map_err(|e| BtcClientError::BadResponse(e.to_string()))?,
        );

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build(format!("http://{}", config.host))
            .map_err(|e| BtcClientError::Unreachable(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl CheckpointWallet for BitcoinClient {
    async fn ping(&self) -> Result<(), BtcClientError> {
        let height: u64 = self.client.request("getblockcount", rpc_params![]).await?;
        trace!(%height, "pinged bitcoind");
        Ok(())
    }

    async fn import_taproot(&self, script: &ScriptBuf) -> Result<(), BtcClientError> {
        let script_hex = hex::encode(script.as_bytes());
        debug!(%script_hex, "importing watch-only taproot script");

        // Rescan is left to the operator; a missing predecessor UTXO is
        // retried at the next epoch.
        let _: serde_json::Value = self
            .client
            .request("importaddress", rpc_params![script_hex, "", false])
            .await?;
        Ok(())
    }

    async fn find_prev_txid(&self, address: &str) -> Result<Option<Txid>, BtcClientError> {
        let unspent: Vec<ListUnspentEntry> = self
            .client
            .request("listunspent", rpc_params![0, 9_999_999, [address]])
            .await?;

        Ok(unspent.first().map(|entry| entry.txid))
    }

    async fn get_txout(&self, txid: &Txid, vout: u32) -> Result<TxOutEntry, BtcClientError> {
        let result: Option<GetTxOutResult> = self
            .client
            .request("gettxout", rpc_params![*txid, vout, true])
            .await?;

        let result = result.ok_or(BtcClientError::MissingTxOut { txid: *txid, vout })?;

        let value = Amount::from_btc(result.value)
            .map_err(|e| BtcClientError::BadResponse(format!("txout value: {e}")))?;
        let script_pubkey = hex::decode(&result.script_pub_key.hex)
            .map_err(|e| BtcClientError::BadResponse(format!("txout script: {e}")))?;

        Ok(TxOutEntry {
            value,
            script_pubkey,
        })
    }

    async fn create_raw_tx(
        &self,
        prev_txid: &Txid,
        vout: u32,
        sequence: u32,
        outputs: &[TxOutput],
    ) -> Result<String, BtcClientError> {
        let inputs = json!([{
            "txid": *prev_txid,
            "vout": vout,
            "sequence": sequence,
        }]);

        let outputs: Vec<serde_json::Value> = outputs
            .iter()
            .map(|output| match output {
                TxOutput::Address { address, amount } => json!({ address: format_btc(*amount) }),
                TxOutput::Data { bytes } => json!({ "data": hex::encode(bytes) }),
            })
            .collect();

        let raw: String = self
            .client
            .request("createrawtransaction", rpc_params![inputs, outputs])
            .await?;

        Ok(raw)
    }

    async fn send_raw_tx(&self, tx_hex: &str) -> Result<Txid, BtcClientError> {
        let txid: String = self
            .client
            .request("sendrawtransaction", rpc_params![tx_hex])
            .await?;

        txid.parse::<Txid>()
            .map_err(|e| BtcClientError::BadResponse(format!("txid: {e}")))
    }

    async fn get_latest_checkpoint(
        &self,
        internal_key: &[u8; 32],
        genesis_key: &[u8],
    ) -> Result<LatestCheckpoint, BtcClientError> {
        let genesis_pubkey = taproot::checkpoint_pubkey(internal_key, genesis_key)?;
        let genesis_script = taproot::taproot_script(&genesis_pubkey)?;
        self.import_taproot(&genesis_script).await?;

        let unspent: Vec<ListUnspentEntry> = self
            .client
            .request("listunspent", rpc_params![0, 9_999_999])
            .await?;

        // The chain tip is the one unspent taproot output the wallet watches;
        // every predecessor has been spent by its successor.
        let genesis_script_hex = hex::encode(genesis_script.as_bytes());
        let mut genesis_anchor = None;
        for entry in unspent
            .iter()
            .filter(|e| e.script_pub_key.starts_with("5120"))
        {
            let tx: RawTransactionResult = self
                .client
                .request("getrawtransaction", rpc_params![entry.txid, true])
                .await?;

            if let Some(data_hash) = embedded_data_hash(&tx) {
                let program = hex::decode(&entry.script_pub_key)
                    .map_err(|e| BtcClientError::BadResponse(format!("utxo script: {e}")))?;
                let pubkey: [u8; 32] = program[2..34]
                    .try_into()
                    .map_err(|_| BtcClientError::BadResponse("short witness program".into()))?;

                debug!(txid = %entry.txid, "found checkpoint chain tip");
                return Ok(LatestCheckpoint {
                    txid: Some(entry.txid),
                    data_hash: Some(data_hash),
                    pubkey,
                });
            }

            if entry.script_pub_key == genesis_script_hex {
                genesis_anchor = Some(entry.txid);
            }
        }

        debug!(
            address = ?unspent.first().and_then(|e| e.address.as_deref()),
            "no checkpoint beyond the bootstrap anchor"
        );
        Ok(LatestCheckpoint {
            txid: genesis_anchor,
            data_hash: None,
            pubkey: genesis_pubkey,
        })
    }
}

/// Extracts the 32-byte config blob hash from a checkpoint transaction's
/// `OP_RETURN` output.
fn embedded_data_hash(tx: &RawTransactionResult) -> Option<[u8; 32]> {
    tx.vout.iter().find_map(|vout| {
        let hex_script = &vout.script_pub_key.hex;
        // OP_RETURN PUSHBYTES_32 <hash>
        if hex_script.len() == 68 && hex_script.starts_with("6a20") {
            let bytes = hex::decode(&hex_script[4..]).ok()?;
            bytes.try_into().ok()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawTransactionVout, ScriptPubKeyResult};

    #[test]
    fn embedded_data_hash_skips_non_data_outputs() {
        let tx = RawTransactionResult {
            vout: vec![
                RawTransactionVout {
                    script_pub_key: ScriptPubKeyResult {
                        hex: format!("5120{}", "11".repeat(32)),
                    },
                },
                RawTransactionVout {
                    script_pub_key: ScriptPubKeyResult {
                        hex: format!("6a20{}", "ab".repeat(32)),
                    },
                },
            ],
        };

        assert_eq!(embedded_data_hash(&tx), Some([0xab; 32]));
    }

    #[test]
    fn embedded_data_hash_none_without_op_return() {
        let tx = RawTransactionResult {
            vout: vec![RawTransactionVout {
                script_pub_key: ScriptPubKeyResult {
                    hex: format!("5120{}", "11".repeat(32)),
                },
            }],
        };

        assert_eq!(embedded_data_hash(&tx), None);
    }
}
