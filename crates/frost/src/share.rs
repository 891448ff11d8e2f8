//! Mapping between party identities and FROST identifiers, and between the
//! persisted [`ThresholdKeyConfig`] and the ciphersuite's key packages.

use std::collections::BTreeMap;

use anchor_primitives::{PartyId, ThresholdKeyConfig, VerificationShare};
use frost_secp256k1_tr::{
    keys::{KeyPackage, PublicKeyPackage, SigningShare, VerifyingShare},
    Identifier, VerifyingKey,
};

use crate::SessionError;

/// Bidirectional map between party ids and protocol identifiers.
///
/// Identifiers are derived from the party id bytes, so every node that agrees
/// on the (lexicographically sorted) participant list derives the same
/// Lagrange domain.
#[derive(Debug, Clone)]
pub struct PartyIndex {
    by_party: BTreeMap<PartyId, Identifier>,
    by_identifier: BTreeMap<Identifier, PartyId>,
}

impl PartyIndex {
    /// Builds the index for a participant list.
    pub fn new(parties: &[PartyId]) -> Result<Self, SessionError> {
        let mut by_party = BTreeMap::new();
        let mut by_identifier = BTreeMap::new();

        for party in parties {
            let identifier = Identifier::derive(party.as_bytes())
                .map_err(|_| SessionError::UnknownParty(party.clone()))?;
            by_party.insert(party.clone(), identifier);
            by_identifier.insert(identifier, party.clone());
        }

        Ok(Self {
            by_party,
            by_identifier,
        })
    }

    /// The protocol identifier for a party.
    pub fn identifier(&self, party: &PartyId) -> Option<Identifier> {
        self.by_party.get(party).copied()
    }

    /// The party behind a protocol identifier.
    pub fn party(&self, identifier: &Identifier) -> Option<&PartyId> {
        self.by_identifier.get(identifier)
    }

    /// Number of indexed parties.
    pub fn len(&self) -> usize {
        self.by_party.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_party.is_empty()
    }
}

/// Builds the persisted config from the packages a key generation ceremony
/// produced.
pub fn config_from_packages(
    party_id: PartyId,
    index: &PartyIndex,
    key_package: &KeyPackage,
    pubkey_package: &PublicKeyPackage,
) -> Result<ThresholdKeyConfig, SessionError> {
    let group_key = pubkey_package.verifying_key().serialize()?;
    // The ciphersuite normalizes the group key to even parity; drop the
    // leading SEC1 byte to get the x-only form.
    let public_key: [u8; 32] = group_key[1..]
        .try_into()
        .map_err(|_| SessionError::Aborted("group key is not a 33-byte point".into()))?;

    let private_share: [u8; 32] = key_package
        .signing_share()
        .serialize()
        .try_into()
        .map_err(|_| SessionError::Aborted("signing share is not 32 bytes".into()))?;

    let mut verification_shares = BTreeMap::new();
    for (identifier, share) in pubkey_package.verifying_shares() {
        let party = index
            .party(identifier)
            .ok_or_else(|| SessionError::Aborted("verifying share for unknown party".into()))?;
        let bytes: [u8; 33] = share
            .serialize()?
            .try_into()
            .map_err(|_| SessionError::Aborted("verifying share is not a 33-byte point".into()))?;
        verification_shares.insert(party.clone(), VerificationShare(bytes));
    }

    Ok(ThresholdKeyConfig {
        party_id,
        threshold: *key_package.min_signers(),
        private_share,
        public_key,
        verification_shares,
    })
}

/// Rebuilds the ciphersuite key packages from a persisted config.
pub fn packages_from_config(
    config: &ThresholdKeyConfig,
) -> Result<(KeyPackage, PublicKeyPackage, PartyIndex), SessionError> {
    let index = PartyIndex::new(&config.participants())?;
    let identifier = index
        .identifier(&config.party_id)
        .ok_or_else(|| SessionError::UnknownParty(config.party_id.clone()))?;

    let signing_share = SigningShare::deserialize(&config.private_share)?;

    let mut group_key = [0u8; 33];
    group_key[0] = 0x02;
    group_key[1..].copy_from_slice(&config.public_key);
    let verifying_key = VerifyingKey::deserialize(&group_key)?;

    let mut verifying_shares = BTreeMap::new();
    for (party, share) in &config.verification_shares {
        let identifier = index
            .identifier(party)
            .ok_or_else(|| SessionError::UnknownParty(party.clone()))?;
        verifying_shares.insert(identifier, VerifyingShare::deserialize(&share.0)?);
    }

    let own_share = verifying_shares
        .get(&identifier)
        .cloned()
        .ok_or_else(|| SessionError::UnknownParty(config.party_id.clone()))?;

    let key_package = KeyPackage::new(
        identifier,
        signing_share,
        own_share,
        verifying_key,
        config.threshold,
    );
    let pubkey_package = PublicKeyPackage::new(verifying_shares, verifying_key);

    Ok((key_package, pubkey_package, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_derivation_is_order_independent() {
        let forward = PartyIndex::new(&[PartyId::from("a"), PartyId::from("b")]).unwrap();
        let backward = PartyIndex::new(&[PartyId::from("b"), PartyId::from("a")]).unwrap();

        assert_eq!(
            forward.identifier(&PartyId::from("a")),
            backward.identifier(&PartyId::from("a")),
        );
        assert_eq!(forward.len(), 2);
    }

    #[test]
    fn identifier_round_trips_to_party() {
        let index = PartyIndex::new(&[PartyId::from("alice"), PartyId::from("bob")]).unwrap();
        let id = index.identifier(&PartyId::from("alice")).unwrap();
        assert_eq!(index.party(&id), Some(&PartyId::from("alice")));
    }
}
