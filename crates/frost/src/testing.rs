//! Helpers for running whole ceremonies inside one process.
//!
//! Used by integration tests and local multi-validator setups: every
//! participant runs its real session; only the fabric is in-process.

use std::sync::Arc;

use anchor_primitives::{party::sort_parties, threshold_for, PartyId, ThresholdKeyConfig};
use anchor_pubsub::{Fabric, KeygenTopic, LocalFabric};

use crate::{run_session, KeygenSession, SessionError, SessionOutcome, SignSession};

/// Runs a full key generation ceremony among `parties` over an in-process
/// fabric and returns each participant's config, ordered like the sorted
/// party list.
pub async fn run_local_keygen(parties: &[&str]) -> Result<Vec<ThresholdKeyConfig>, SessionError> {
    let sorted = sort_parties(parties.iter().map(|p| PartyId::from(*p)).collect());
    let threshold = threshold_for(sorted.len());
    let fabric = LocalFabric::new();

    // Every topic joins before any session broadcasts, so nothing is missed.
    let mut topics = Vec::with_capacity(sorted.len());
    for party in &sorted {
        let fabric: Arc<dyn Fabric> = fabric.clone();
        topics.push(KeygenTopic::join(fabric, party.clone()).await?);
    }

    let mut handles = Vec::with_capacity(sorted.len());
    for (party, mut topic) in sorted.iter().cloned().zip(topics) {
        let parties = sorted.clone();
        handles.push(tokio::spawn(async move {
            let session = KeygenSession::new(party, &parties, threshold)?;
            run_session(session, &mut topic).await
        }));
    }

    let mut configs = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle
            .await
            .map_err(|e| SessionError::Aborted(e.to_string()))??
        {
            SessionOutcome::Config(config) => configs.push(config),
            SessionOutcome::Signature(_) => {
                return Err(SessionError::Aborted("keygen yielded a signature".into()))
            }
        }
    }

    Ok(configs)
}

/// Runs a full signing ceremony among every holder of `configs` over an
/// in-process fabric and returns the (identical) aggregated signature.
pub async fn run_local_sign(
    configs: &[ThresholdKeyConfig],
    message: [u8; 32],
    merkle_root: [u8; 32],
) -> Result<[u8; 64], SessionError> {
    let fabric = LocalFabric::new();

    let mut topics = Vec::with_capacity(configs.len());
    for config in configs {
        let fabric: Arc<dyn Fabric> = fabric.clone();
        topics.push(KeygenTopic::join(fabric, config.party_id.clone()).await?);
    }

    let mut handles = Vec::with_capacity(configs.len());
    for (config, mut topic) in configs.iter().cloned().zip(topics) {
        handles.push(tokio::spawn(async move {
            let session = SignSession::new(&config, message, merkle_root)?;
            run_session(session, &mut topic).await
        }));
    }

    let mut signature = None;
    for handle in handles {
        match handle
            .await
            .map_err(|e| SessionError::Aborted(e.to_string()))??
        {
            SessionOutcome::Signature(sig) => {
                if let Some(previous) = signature {
                    if previous != sig {
                        return Err(SessionError::Aborted(
                            "participants aggregated different signatures".into(),
                        ));
                    }
                }
                signature = Some(sig);
            }
            SessionOutcome::Config(_) => {
                return Err(SessionError::Aborted("signing yielded a config".into()))
            }
        }
    }

    signature.ok_or_else(|| SessionError::Aborted("no signing participants".into()))
}

#[cfg(test)]
mod tests {
    use anchor_primitives::taproot::{apply_tweak, merkle_root, tweak_value};
    use secp256k1::{schnorr, Message, XOnlyPublicKey, SECP256K1};

    use super::*;

    #[tokio::test]
    async fn three_party_keygen_agrees_on_group_key() {
        let configs = run_local_keygen(&["carol", "alice", "bob"]).await.unwrap();

        assert_eq!(configs.len(), 3);
        assert_eq!(configs[0].threshold, 2);
        for config in &configs {
            assert_eq!(config.public_key, configs[0].public_key);
            assert_eq!(config.threshold, configs[0].threshold);
            assert_eq!(
                config.participants(),
                vec![
                    PartyId::from("alice"),
                    PartyId::from("bob"),
                    PartyId::from("carol")
                ]
            );
        }
        // Each participant's config is bound to its own identity.
        assert_eq!(configs[0].party_id, PartyId::from("alice"));
        assert_eq!(configs[2].party_id, PartyId::from("carol"));
    }

    #[tokio::test]
    async fn keygen_then_sign_verifies_against_tweaked_key() {
        let configs = run_local_keygen(&["alice", "bob", "carol"]).await.unwrap();

        let checkpoint = b"subnet tipset key".to_vec();
        let root = merkle_root(&configs[0].public_key, &checkpoint);
        let sighash = [0x42u8; 32];

        let signature = run_local_sign(&configs, sighash, root).await.unwrap();

        let tweaked = apply_tweak(
            &configs[0].public_key,
            &tweak_value(&configs[0].public_key, &root),
        )
        .unwrap();

        let pubkey = XOnlyPublicKey::from_slice(&tweaked).unwrap();
        let sig = schnorr::Signature::from_slice(&signature).unwrap();
        let msg = Message::from_digest(sighash);
        SECP256K1
            .verify_schnorr(&sig, &msg, &pubkey)
            .expect("aggregated signature must verify against the tweaked output key");
    }
}
