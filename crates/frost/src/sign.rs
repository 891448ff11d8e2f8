//! Taproot signing session.

use std::collections::{BTreeMap, VecDeque};

use anchor_primitives::{PartyId, ThresholdKeyConfig};
use frost_secp256k1_tr::{
    aggregate,
    keys::{KeyPackage, PublicKeyPackage, Tweak},
    round1::{self, SigningCommitments, SigningNonces},
    round2::{self, SignatureShare},
    Identifier, SigningPackage,
};
use rand::rngs::OsRng;
use tracing::{debug, trace, warn};

use crate::{
    share::{packages_from_config, PartyIndex},
    wire::{sign_sid, SessionBody, SessionMsg},
    SessionError, SessionHandler, SessionOutcome,
};

/// One participant's view of a signing ceremony over a 32-byte sighash.
///
/// The key and group packages are tweaked with the checkpoint's TapLeaf
/// merkle root before any round runs, so the aggregated signature verifies
/// against the on-chain output key.
pub struct SignSession {
    party_id: PartyId,
    identifier: Identifier,
    index: PartyIndex,
    sid: [u8; 32],
    signers: usize,
    key_package: KeyPackage,
    pubkey_package: PublicKeyPackage,
    message: [u8; 32],
    nonces: SigningNonces,
    outgoing: VecDeque<SessionMsg>,
    early_shares: BTreeMap<Identifier, SignatureShare>,
    stage: Stage,
}

enum Stage {
    Commitments {
        own: SigningCommitments,
        received: BTreeMap<Identifier, SigningCommitments>,
    },
    Shares {
        signing_package: SigningPackage,
        received: BTreeMap<Identifier, SignatureShare>,
    },
    Done([u8; 64]),
    Failed(String),
}

impl SignSession {
    /// Starts a signing ceremony among every holder of `config` over
    /// `message`, committing the group key to `merkle_root`.
    pub fn new(
        config: &ThresholdKeyConfig,
        message: [u8; 32],
        merkle_root: [u8; 32],
    ) -> Result<Self, SessionError> {
        let (key_package, pubkey_package, index) = packages_from_config(config)?;
        let key_package = key_package.tweak(Some(&merkle_root));
        let pubkey_package = pubkey_package.tweak(Some(&merkle_root));

        let identifier = index
            .identifier(&config.party_id)
            .ok_or_else(|| SessionError::UnknownParty(config.party_id.clone()))?;

        let sid = sign_sid(&message, &merkle_root);
        let (nonces, commitments) = round1::commit(key_package.signing_share(), &mut OsRng);

        debug!(
            party_id = %config.party_id,
            message = %hex::encode(message),
            "signing round 1 started"
        );

        let mut outgoing = VecDeque::new();
        outgoing.push_back(SessionMsg {
            sid,
            body: SessionBody::SignCommitments(commitments),
        });

        Ok(Self {
            party_id: config.party_id.clone(),
            identifier,
            sid,
            signers: index.len(),
            index,
            key_package,
            pubkey_package,
            message,
            nonces,
            outgoing,
            early_shares: BTreeMap::new(),
            stage: Stage::Commitments {
                own: commitments,
                received: BTreeMap::new(),
            },
        })
    }

    fn accept_commitments(
        &mut self,
        sender: Identifier,
        commitments: SigningCommitments,
    ) -> Result<(), SessionError> {
        let stage = std::mem::replace(&mut self.stage, Stage::Failed("mid-transition".into()));

        let Stage::Commitments { own, mut received } = stage else {
            self.stage = stage;
            return Ok(());
        };

        received.insert(sender, commitments);
        if received.len() < self.signers - 1 {
            self.stage = Stage::Commitments { own, received };
            return Ok(());
        }

        received.insert(self.identifier, own);
        let signing_package = SigningPackage::new(received, &self.message);

        let own_share = match round2::sign(&signing_package, &self.nonces, &self.key_package) {
            Ok(share) => share,
            Err(e) => {
                self.stage = Stage::Failed(e.to_string());
                return Err(e.into());
            }
        };

        debug!(party_id = %self.party_id, "signing advanced to share exchange");
        self.outgoing.push_back(SessionMsg {
            sid: self.sid,
            body: SessionBody::SignShare(own_share.clone()),
        });

        let mut received = std::mem::take(&mut self.early_shares);
        received.insert(self.identifier, own_share);
        self.stage = Stage::Shares {
            signing_package,
            received,
        };
        self.try_aggregate()
    }

    fn accept_share(
        &mut self,
        sender: Identifier,
        share: SignatureShare,
    ) -> Result<(), SessionError> {
        match &mut self.stage {
            Stage::Commitments { .. } => {
                trace!(party_id = %self.party_id, "buffering early signature share");
                self.early_shares.insert(sender, share);
                Ok(())
            }
            Stage::Shares { received, .. } => {
                received.insert(sender, share);
                self.try_aggregate()
            }
            _ => Ok(()),
        }
    }

    fn try_aggregate(&mut self) -> Result<(), SessionError> {
        let ready =
            matches!(&self.stage, Stage::Shares { received, .. } if received.len() >= self.signers);
        if !ready {
            return Ok(());
        }

        let stage = std::mem::replace(&mut self.stage, Stage::Failed("mid-transition".into()));
        let Stage::Shares {
            signing_package,
            received,
        } = stage
        else {
            unreachable!("checked above");
        };

        let signature = match aggregate(&signing_package, &received, &self.pubkey_package) {
            Ok(signature) => signature,
            Err(e) => {
                self.stage = Stage::Failed(e.to_string());
                return Err(e.into());
            }
        };

        let bytes: [u8; 64] = signature
            .serialize()?
            .try_into()
            .map_err(|_| SessionError::Aborted("signature is not 64 bytes".into()))?;

        debug!(party_id = %self.party_id, "signing finished");
        self.stage = Stage::Done(bytes);
        Ok(())
    }
}

impl SessionHandler for SignSession {
    fn listen(&mut self) -> Option<SessionMsg> {
        self.outgoing.pop_front()
    }

    fn accept(&mut self, from: &PartyId, msg: SessionMsg) -> Result<(), SessionError> {
        if msg.sid != self.sid {
            trace!(%from, "ignoring message from another ceremony");
            return Ok(());
        }
        let Some(sender) = self.index.identifier(from) else {
            warn!(%from, "ignoring ceremony message from non-signer");
            return Ok(());
        };
        if sender == self.identifier {
            return Ok(());
        }

        match msg.body {
            SessionBody::SignCommitments(commitments) => {
                self.accept_commitments(sender, commitments)
            }
            SessionBody::SignShare(share) => self.accept_share(sender, share),
            // Key generation traffic is not ours.
            _ => Ok(()),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.stage, Stage::Done(_) | Stage::Failed(_))
    }

    fn result(self) -> Result<SessionOutcome, SessionError> {
        match self.stage {
            Stage::Done(signature) => Ok(SessionOutcome::Signature(signature)),
            Stage::Failed(reason) => Err(SessionError::Aborted(reason)),
            _ => Err(SessionError::Aborted("signing incomplete".into())),
        }
    }
}
