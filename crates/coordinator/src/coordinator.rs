//! The coordinator task: owns the mutable state, sequences
//! epoch → ceremony → broadcast, and enforces the checkpoint chain
//! invariant.

use std::{path::PathBuf, sync::Arc};

use anchor_blob_store::{content_hash, BlobStore};
use anchor_btc_client::{CheckpointWallet, TxOutEntry, TxOutput};
use anchor_frost::{run_session, KeygenSession, SessionOutcome, SignSession};
use anchor_primitives::{
    party::sort_parties,
    taproot::{checkpoint_pubkey, taproot_address, taproot_script, taproot_sighash},
    threshold::{store_share_file, threshold_for},
    PartyId,
};
use anchor_pubsub::KeygenTopic;
use bitcoin::{consensus, Amount, Network, Transaction, Witness};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    blob::{build_config_blob, checkpoint_from_blob},
    child::{ChildClient, HeadChange, Tipset, TipsetKey},
    errors::CheckpointError,
    matcher::{is_checkpoint_epoch, miners_changed},
    state::CoordinatorState,
};

/// Input sequence for every checkpoint spend.
const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Static configuration of the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// The Bitcoin network checkpoints are anchored on.
    pub network: Network,

    /// Fixed fee per checkpoint transaction.
    pub fee: Amount,

    /// The initial (pre-tweak) threshold public key used to locate the
    /// bootstrap anchor on chain.
    pub bootstrap_pubkey: [u8; 32],

    /// Where to persist the share file after the first successful key
    /// generation; `None` disables persistence.
    pub share_file: Option<PathBuf>,
}

/// The checkpoint coordinator.
///
/// One instance per node. All state transitions happen under the single
/// state mutex; the ceremonies inside a transition cooperatively yield to
/// the pubsub transport but never release the coordinator to other events.
pub struct Coordinator<C, W, B> {
    child: C,
    wallet: W,
    blobs: B,
    topic: KeygenTopic,
    party_id: PartyId,
    cfg: CoordinatorConfig,
    state: Arc<Mutex<CoordinatorState>>,
}

impl<C, W, B> Coordinator<C, W, B>
where
    C: ChildClient,
    W: CheckpointWallet,
    B: BlobStore,
{
    /// Creates a coordinator in its boot state.
    pub fn new(
        child: C,
        wallet: W,
        blobs: B,
        topic: KeygenTopic,
        cfg: CoordinatorConfig,
        state: CoordinatorState,
    ) -> Self {
        let party_id = topic.party_id().clone();
        Self {
            child,
            wallet,
            blobs,
            topic,
            party_id,
            cfg,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A handle on the coordinator state, for inspection.
    pub fn state_handle(&self) -> Arc<Mutex<CoordinatorState>> {
        Arc::clone(&self.state)
    }

    /// Boot-time recovery: verify the Bitcoin node is reachable, locate the
    /// tip of the on-chain checkpoint chain, recover the anchored subnet
    /// tipset from the object store and re-derive the active key material.
    pub async fn bootstrap(&mut self) -> Result<(), CheckpointError> {
        self.wallet
            .ping()
            .await
            .map_err(|e| CheckpointError::BitcoinUnreachable(e.to_string()))?;
        debug!("bitcoin node reachable");

        let genesis = self.child.genesis().await?;
        let latest = self
            .wallet
            .get_latest_checkpoint(&self.cfg.bootstrap_pubkey, genesis.key.as_bytes())
            .await?;

        let state = Arc::clone(&self.state);
        let mut st = state.lock().await;

        match latest.txid {
            Some(txid) => info!(%txid, "found checkpoint chain tip"),
            None => info!("no checkpoint anchored yet"),
        }

        if let Some(data_hash) = latest.data_hash {
            match self.blobs.get(&hex::encode(data_hash)).await {
                Ok(blob) => match checkpoint_from_blob(&blob) {
                    Some(cp) => {
                        info!(checkpoint = %hex::encode(&cp), "recovered anchored checkpoint");
                        st.latest_config_checkpoint = Some(TipsetKey::new(cp));
                    }
                    None => warn!("anchored config blob is malformed"),
                },
                Err(e) => warn!(%e, "anchored config blob unavailable"),
            }
        }

        if let Some(config) = st.config.clone() {
            let anchor_cp = st
                .latest_config_checkpoint
                .clone()
                .map(TipsetKey::into_bytes)
                .unwrap_or_else(|| genesis.key.as_bytes().to_vec());

            let pubkey = checkpoint_pubkey(&config.public_key, &anchor_cp)?;
            st.restore_key(&config.public_key, &anchor_cp, pubkey);

            let address = taproot_address(&st.pubkey, self.cfg.network)?;
            info!(%address, "active checkpoint address");
        }

        Ok(())
    }

    /// Consumes head changes until the feed closes. Failures are logged and
    /// absorbed: the next epoch retries naturally.
    pub async fn listen(&mut self, mut head_changes: mpsc::Receiver<HeadChange>) {
        while let Some(change) = head_changes.recv().await {
            match change {
                HeadChange::Apply { old, new } => {
                    debug!(height = new.height, "head change");
                    match self.handle_head_change(&old, &new).await {
                        Ok(true) => info!(height = new.height, "state change handled"),
                        Ok(false) => {}
                        Err(e @ CheckpointError::InsufficientFunds { .. }) => {
                            error!(%e, "cannot fund checkpoint; operator intervention required");
                        }
                        Err(e) => {
                            error!(%e, "checkpoint attempt failed; retrying at the next epoch");
                        }
                    }
                }
                HeadChange::Revert(tipset) => {
                    debug!(height = tipset.height, "head revert observed");
                }
            }
        }
        info!("head change feed closed; coordinator stopping");
    }

    /// The match policy, run under the state mutex for every applied head
    /// change. Returns whether a branch fired.
    pub async fn handle_head_change(
        &mut self,
        old: &Tipset,
        new: &Tipset,
    ) -> Result<bool, CheckpointError> {
        let state = Arc::clone(&self.state);
        let mut st = state.lock().await;

        if !st.synced {
            let sync = self.child.sync_status().await?;
            if !sync.caught_up_to(new.height) {
                return Ok(false);
            }

            info!(height = new.height, "subnet node is synced");
            if let Some(key) = st.latest_config_checkpoint.clone() {
                let anchored = self.child.tipset(&key).await?;
                info!(height = anchored.height, "checkpoint chain covers subnet up to here");
                st.height = anchored.height;
            }
            st.synced = true;
        }

        let old_power = self.child.power_state(&old.key).await?;
        let new_power = self.child.power_state(&new.key).await?;

        if is_checkpoint_epoch(new.height) && (st.config.is_some() || st.new_config.is_some()) {
            info!(height = new.height, "checkpoint epoch");

            // The payload is the parent tipset: the new head may still move.
            let cp = old.key.as_bytes().to_vec();

            if st.config.is_none() {
                // First installation: there is no predecessor UTXO to
                // spend, so no transaction goes out.
                let internal = st
                    .new_config
                    .as_ref()
                    .expect("branch condition guarantees a pending config")
                    .public_key;
                let pubkey = checkpoint_pubkey(&internal, &cp)?;
                st.install_first_config(&cp, pubkey);
                info!("installed first threshold key config");
            } else {
                let parties = st
                    .config
                    .as_ref()
                    .expect("checked above")
                    .participants();
                let blob = build_config_blob(&cp, &parties);
                let blob_hash = content_hash(&blob);
                self.blobs.put(&hex::encode(blob_hash), blob).await?;

                self.create_checkpoint(&mut st, &cp, blob_hash).await?;
            }

            Ok(true)
        } else if miners_changed(&old_power, &new_power) {
            info!(
                old = old_power.miners.len(),
                new = new_power.miners.len(),
                "validator set changed; generating new keys"
            );
            self.generate_new_keys(&mut st, new_power.miners).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Runs a key generation ceremony over the given miner set and parks the
    /// result in `new_config` for installation at the next checkpoint epoch.
    async fn generate_new_keys(
        &mut self,
        st: &mut CoordinatorState,
        miners: Vec<String>,
    ) -> Result<(), CheckpointError> {
        let parties = sort_parties(miners.into_iter().map(PartyId::from).collect());
        let threshold = threshold_for(parties.len());
        debug!(parties = parties.len(), threshold, "starting key generation");

        let session = KeygenSession::new(self.party_id.clone(), &parties, threshold)?;
        let outcome = run_session(session, &mut self.topic).await?;

        let SessionOutcome::Config(config) = outcome else {
            return Err(CheckpointError::Frost(anchor_frost::SessionError::Aborted(
                "key generation yielded a signature".into(),
            )));
        };

        info!(
            public_key = %hex::encode(config.public_key),
            threshold = config.threshold,
            "key generation finished"
        );

        if let Some(path) = &self.cfg.share_file {
            // Written once, after the first successful ceremony.
            if !path.exists() {
                store_share_file(path, &config)?;
                info!(path = %path.display(), "share file written");
            }
        }

        st.new_config = Some(config);
        Ok(())
    }

    /// Builds, threshold-signs and broadcasts the next checkpoint
    /// transaction, spending the previous checkpoint's UTXO.
    async fn create_checkpoint(
        &mut self,
        st: &mut CoordinatorState,
        cp: &[u8],
        blob_hash: [u8; 32],
    ) -> Result<(), CheckpointError> {
        let config = st.config.clone().expect("caller guarantees an active config");

        let old_address = taproot_address(&st.pubkey, self.cfg.network)?;

        // The next output key commits the incoming key (if a rotation is
        // pending) to this checkpoint's payload.
        let internal = st
            .new_config
            .as_ref()
            .map(|c| c.public_key)
            .unwrap_or(config.public_key);
        let next_pubkey = checkpoint_pubkey(&internal, cp)?;
        let next_address = taproot_address(&next_pubkey, self.cfg.network)?;

        if st.prev_txid.is_none() {
            debug!(%old_address, "looking up predecessor utxo");
            self.wallet
                .import_taproot(&taproot_script(&st.pubkey)?)
                .await?;
            let found = self.wallet.find_prev_txid(&old_address.to_string()).await?;
            st.prev_txid =
                Some(found.ok_or_else(|| {
                    CheckpointError::NoPredecessorUtxo(old_address.to_string())
                })?);
        }
        let prev_txid = st.prev_txid.expect("set above");

        // The chain always has one taproot output and one data output; their
        // order is whatever the node's transaction builder chose.
        let mut vout = 0u32;
        let mut utxo = self.wallet.get_txout(&prev_txid, vout).await?;
        if utxo.script_pubkey.first() != Some(&0x51) {
            debug!(%prev_txid, "vout 0 is not the taproot output, trying vout 1");
            vout = 1;
            utxo = self.wallet.get_txout(&prev_txid, vout).await?;
        }

        let new_value =
            utxo.value
                .checked_sub(self.cfg.fee)
                .ok_or(CheckpointError::InsufficientFunds {
                    value: utxo.value,
                    fee: self.cfg.fee,
                })?;

        let outputs = [
            TxOutput::Address {
                address: next_address.to_string(),
                amount: new_value,
            },
            TxOutput::Data {
                bytes: blob_hash.to_vec(),
            },
        ];
        let raw_hex = self
            .wallet
            .create_raw_tx(&prev_txid, vout, SEQUENCE_FINAL, &outputs)
            .await?;
        let raw = hex::decode(&raw_hex)
            .map_err(|e| CheckpointError::BadTx(format!("raw tx hex: {e}")))?;

        let prev_utxo = prevout_bytes(&utxo)?;
        let sighash = taproot_sighash(&raw, &prev_utxo, 0x00)?;

        info!(%prev_txid, vout, "starting signing ceremony");
        let session = SignSession::new(&config, sighash, st.tweak_root)?;
        let outcome = run_session(session, &mut self.topic).await?;
        let SessionOutcome::Signature(signature) = outcome else {
            return Err(CheckpointError::Frost(anchor_frost::SessionError::Aborted(
                "signing yielded a config".into(),
            )));
        };

        // The ceremony succeeded: the key chain advances now, before the
        // broadcast. A failed broadcast keeps this state and the next epoch
        // re-derives from the installed key.
        st.advance_key(&internal, cp, next_pubkey);

        let tx_hex = attach_keyspend_witness(&raw, &signature)?;
        match self.wallet.send_raw_tx(&tx_hex).await {
            Ok(txid) => {
                info!(%txid, address = %next_address, "checkpoint broadcast");
                st.prev_txid = Some(txid);
                Ok(())
            }
            Err(e) => Err(CheckpointError::BroadcastFailed(e.to_string())),
        }
    }
}

/// Reassembles the prevout bytes consumed by the sighash: `amount_le64 ||
/// 0x22 || scriptPubKey(34)`.
fn prevout_bytes(utxo: &TxOutEntry) -> Result<Vec<u8>, CheckpointError> {
    if utxo.script_pubkey.len() != 34 {
        return Err(CheckpointError::BadTx(
            "previous checkpoint output is not a witness-v1 script".into(),
        ));
    }

    let mut bytes = Vec::with_capacity(43);
    bytes.extend_from_slice(&utxo.value.to_sat().to_le_bytes());
    bytes.push(0x22);
    bytes.extend_from_slice(&utxo.script_pubkey);
    Ok(bytes)
}

/// Attaches the 64-byte Schnorr signature as the single witness element of
/// input 0, producing the broadcastable hex with SegWit marker and flag.
pub fn attach_keyspend_witness(
    raw: &[u8],
    signature: &[u8; 64],
) -> Result<String, CheckpointError> {
    let mut tx: Transaction = consensus::encode::deserialize(raw)
        .map_err(|e| CheckpointError::BadTx(format!("raw tx: {e}")))?;

    if tx.input.len() != 1 {
        return Err(CheckpointError::BadTx("expected exactly one input".into()));
    }

    tx.input[0].witness = Witness::from_slice(&[signature.as_slice()]);
    Ok(consensus::encode::serialize_hex(&tx))
}
