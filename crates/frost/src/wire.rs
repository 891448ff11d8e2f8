//! Wire messages exchanged over the ceremony topic.

use anchor_primitives::PartyId;
use frost_secp256k1_tr::{
    keys::dkg,
    round1::SigningCommitments,
    round2::SignatureShare,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::SessionError;

/// One protocol message.
///
/// The session id pins a message to one ceremony, and the round structure
/// rides in the body, so the transport's lack of ordering and the topic's
/// long life across ceremonies are both harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMsg {
    /// The ceremony this message belongs to.
    pub sid: [u8; 32],

    /// The round payload.
    pub body: SessionBody,
}

/// Round payloads for both session variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionBody {
    /// Key generation round 1: commitment package, broadcast to everyone.
    KeygenRound1(dkg::round1::Package),

    /// Key generation round 2: a share package addressed to one recipient.
    KeygenRound2 {
        /// The party this package is for; everyone else ignores it.
        to: PartyId,
        /// The round 2 package.
        package: dkg::round2::Package,
    },

    /// Signing round 1: nonce commitments, broadcast to everyone.
    SignCommitments(SigningCommitments),

    /// Signing round 2: the sender's signature share.
    SignShare(SignatureShare),
}

impl SessionMsg {
    /// Serializes the message for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, SessionError> {
        Ok(bincode::serialize(self)?)
    }

    /// Parses a message off the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self, SessionError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Session id of a key generation ceremony: every node with the same sorted
/// roster and threshold derives the same id.
pub fn keygen_sid(parties: &[PartyId], threshold: u16) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"anchor/keygen");
    hasher.update(threshold.to_le_bytes());
    for party in parties {
        hasher.update(party.as_bytes());
        hasher.update([b'\n']);
    }
    hasher.finalize().into()
}

/// Session id of a signing ceremony over one sighash and tweak root.
pub fn sign_sid(message: &[u8; 32], merkle_root: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"anchor/sign");
    hasher.update(message);
    hasher.update(merkle_root);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keygen_sid_depends_on_roster() {
        let a = keygen_sid(&[PartyId::from("a"), PartyId::from("b")], 2);
        let b = keygen_sid(&[PartyId::from("a"), PartyId::from("c")], 2);
        let c = keygen_sid(&[PartyId::from("a"), PartyId::from("b")], 2);
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn sign_sid_depends_on_message() {
        let a = sign_sid(&[1; 32], &[2; 32]);
        let b = sign_sid(&[3; 32], &[2; 32]);
        assert_ne!(a, b);
    }
}
