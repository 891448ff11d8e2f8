//! Distributed key generation session.

use std::collections::{BTreeMap, VecDeque};

use anchor_primitives::{PartyId, ThresholdKeyConfig};
use frost_secp256k1_tr::{keys::dkg, Identifier};
use rand::rngs::OsRng;
use tracing::{debug, trace, warn};

use crate::{
    share::{config_from_packages, PartyIndex},
    wire::{keygen_sid, SessionBody, SessionMsg},
    SessionError, SessionHandler, SessionOutcome,
};

/// One participant's view of a key generation ceremony.
///
/// Round 1 broadcasts a commitment package; once every peer's package has
/// arrived, round 2 sends one addressed share package per peer; once every
/// peer's addressed package has arrived, the ceremony finalizes into a
/// [`ThresholdKeyConfig`].
pub struct KeygenSession {
    party_id: PartyId,
    identifier: Identifier,
    index: PartyIndex,
    sid: [u8; 32],
    group_size: usize,
    outgoing: VecDeque<SessionMsg>,
    // Round 2 packages that arrived while round 1 was still collecting; the
    // transport gives no inter-peer ordering.
    early_round2: BTreeMap<Identifier, dkg::round2::Package>,
    stage: Stage,
}

enum Stage {
    Round1 {
        secret: dkg::round1::SecretPackage,
        received: BTreeMap<Identifier, dkg::round1::Package>,
    },
    Round2 {
        secret: dkg::round2::SecretPackage,
        round1_packages: BTreeMap<Identifier, dkg::round1::Package>,
        received: BTreeMap<Identifier, dkg::round2::Package>,
    },
    Done(Box<ThresholdKeyConfig>),
    Failed(String),
}

impl KeygenSession {
    /// Starts a ceremony among `parties` (must already be in canonical
    /// order) with the given signing threshold.
    pub fn new(
        party_id: PartyId,
        parties: &[PartyId],
        threshold: u16,
    ) -> Result<Self, SessionError> {
        let index = PartyIndex::new(parties)?;
        let identifier = index
            .identifier(&party_id)
            .ok_or_else(|| SessionError::UnknownParty(party_id.clone()))?;
        let group_size = parties.len();
        let sid = keygen_sid(parties, threshold);

        let (secret, package) = dkg::part1(identifier, group_size as u16, threshold, OsRng)?;

        debug!(%party_id, group_size, threshold, "key generation round 1 started");

        let mut outgoing = VecDeque::new();
        outgoing.push_back(SessionMsg {
            sid,
            body: SessionBody::KeygenRound1(package),
        });

        Ok(Self {
            party_id,
            identifier,
            index,
            sid,
            group_size,
            outgoing,
            early_round2: BTreeMap::new(),
            stage: Stage::Round1 {
                secret,
                received: BTreeMap::new(),
            },
        })
    }

    fn accept_round1(
        &mut self,
        sender: Identifier,
        package: dkg::round1::Package,
    ) -> Result<(), SessionError> {
        let stage = std::mem::replace(&mut self.stage, Stage::Failed("mid-transition".into()));

        let Stage::Round1 {
            secret,
            mut received,
        } = stage
        else {
            // Late round 1 traffic after we advanced; nothing to do with it.
            self.stage = stage;
            return Ok(());
        };

        received.insert(sender, package);
        if received.len() < self.group_size - 1 {
            self.stage = Stage::Round1 { secret, received };
            return Ok(());
        }

        let (round2_secret, round2_packages) = match dkg::part2(secret, &received) {
            Ok(out) => out,
            Err(e) => {
                self.stage = Stage::Failed(e.to_string());
                return Err(e.into());
            }
        };

        for (recipient, package) in round2_packages {
            let to = self
                .index
                .party(&recipient)
                .ok_or_else(|| SessionError::Aborted("round 2 recipient unknown".into()))?
                .clone();
            self.outgoing.push_back(SessionMsg {
                sid: self.sid,
                body: SessionBody::KeygenRound2 { to, package },
            });
        }

        debug!(party_id = %self.party_id, "key generation advanced to round 2");

        self.stage = Stage::Round2 {
            secret: round2_secret,
            round1_packages: received,
            received: std::mem::take(&mut self.early_round2),
        };
        self.try_finalize()
    }

    fn accept_round2(
        &mut self,
        sender: Identifier,
        package: dkg::round2::Package,
    ) -> Result<(), SessionError> {
        match &mut self.stage {
            Stage::Round1 { .. } => {
                trace!(party_id = %self.party_id, "buffering early round 2 package");
                self.early_round2.insert(sender, package);
                Ok(())
            }
            Stage::Round2 { received, .. } => {
                received.insert(sender, package);
                self.try_finalize()
            }
            _ => Ok(()),
        }
    }

    fn try_finalize(&mut self) -> Result<(), SessionError> {
        let needs = self.group_size - 1;
        let ready = matches!(&self.stage, Stage::Round2 { received, .. } if received.len() >= needs);
        if !ready {
            return Ok(());
        }

        let stage = std::mem::replace(&mut self.stage, Stage::Failed("mid-transition".into()));
        let Stage::Round2 {
            secret,
            round1_packages,
            received,
        } = stage
        else {
            unreachable!("checked above");
        };

        let (key_package, pubkey_package) = match dkg::part3(&secret, &round1_packages, &received)
        {
            Ok(out) => out,
            Err(e) => {
                self.stage = Stage::Failed(e.to_string());
                return Err(e.into());
            }
        };

        let config = config_from_packages(
            self.party_id.clone(),
            &self.index,
            &key_package,
            &pubkey_package,
        )?;

        debug!(
            party_id = %self.party_id,
            public_key = %hex::encode(config.public_key),
            "key generation finished"
        );

        self.stage = Stage::Done(Box::new(config));
        Ok(())
    }
}

impl SessionHandler for KeygenSession {
    fn listen(&mut self) -> Option<SessionMsg> {
        self.outgoing.pop_front()
    }

    fn accept(&mut self, from: &PartyId, msg: SessionMsg) -> Result<(), SessionError> {
        if msg.sid != self.sid {
            trace!(%from, "ignoring message from another ceremony");
            return Ok(());
        }
        let Some(sender) = self.index.identifier(from) else {
            warn!(%from, "ignoring ceremony message from non-participant");
            return Ok(());
        };
        if sender == self.identifier {
            return Ok(());
        }

        match msg.body {
            SessionBody::KeygenRound1(package) => self.accept_round1(sender, package),
            SessionBody::KeygenRound2 { to, package } if to == self.party_id => {
                self.accept_round2(sender, package)
            }
            // Addressed to someone else, or signing traffic: not ours.
            _ => Ok(()),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.stage, Stage::Done(_) | Stage::Failed(_))
    }

    fn result(self) -> Result<SessionOutcome, SessionError> {
        match self.stage {
            Stage::Done(config) => Ok(SessionOutcome::Config(*config)),
            Stage::Failed(reason) => Err(SessionError::Aborted(reason)),
            _ => Err(SessionError::Aborted("key generation incomplete".into())),
        }
    }
}
