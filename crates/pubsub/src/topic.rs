//! The typed `"keygen"` topic carrying threshold protocol messages.

use std::sync::Arc;

use anchor_primitives::PartyId;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    fabric::{Fabric, Subscription},
    PubsubError,
};

/// The single topic every ceremony message is published on.
pub const KEYGEN_TOPIC: &str = "keygen";

/// A protocol payload tagged with its originator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The publishing party.
    pub from: PartyId,

    /// Opaque protocol message bytes.
    pub payload: Vec<u8>,
}

/// A party's handle on the ceremony topic.
///
/// Broadcasts wrap payloads in an [`Envelope`]; [`KeygenTopic::next`] never
/// yields the local party's own messages back.
pub struct KeygenTopic {
    party_id: PartyId,
    fabric: Arc<dyn Fabric>,
    subscription: Subscription<Vec<u8>>,
}

impl KeygenTopic {
    /// Joins the topic as `party_id`. The subscription is opened before this
    /// returns, so no message published afterwards can be missed.
    pub async fn join(fabric: Arc<dyn Fabric>, party_id: PartyId) -> Result<Self, PubsubError> {
        let subscription = fabric.subscribe(KEYGEN_TOPIC).await?;
        Ok(Self {
            party_id,
            fabric,
            subscription,
        })
    }

    /// The local party identity this handle publishes under.
    pub fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    /// Broadcasts a protocol payload to every participant.
    pub async fn broadcast(&self, payload: Vec<u8>) -> Result<(), PubsubError> {
        let envelope = Envelope {
            from: self.party_id.clone(),
            payload,
        };
        self.fabric
            .publish(KEYGEN_TOPIC, bincode::serialize(&envelope)?)
            .await
    }

    /// Awaits the next peer message, skipping self-echoes and undecodable
    /// envelopes.
    pub async fn next(&mut self) -> Result<(PartyId, Vec<u8>), PubsubError> {
        loop {
            let raw = self.subscription.recv().await.ok_or(PubsubError::Closed)?;
            let envelope: Envelope = match bincode::deserialize(&raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    trace!(%e, "dropping undecodable envelope");
                    continue;
                }
            };
            if envelope.from == self.party_id {
                continue;
            }
            return Ok((envelope.from, envelope.payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::LocalFabric;

    #[tokio::test]
    async fn next_skips_self_echo() {
        let fabric = LocalFabric::new();
        let mut alice = KeygenTopic::join(fabric.clone(), PartyId::from("alice"))
            .await
            .unwrap();
        let mut bob = KeygenTopic::join(fabric.clone(), PartyId::from("bob"))
            .await
            .unwrap();

        alice.broadcast(b"round one".to_vec()).await.unwrap();
        bob.broadcast(b"round one too".to_vec()).await.unwrap();

        let (from, payload) = alice.next().await.unwrap();
        assert_eq!(from, PartyId::from("bob"));
        assert_eq!(payload, b"round one too");

        let (from, payload) = bob.next().await.unwrap();
        assert_eq!(from, PartyId::from("alice"));
        assert_eq!(payload, b"round one");
    }

    #[tokio::test]
    async fn undecodable_envelopes_are_dropped() {
        let fabric = LocalFabric::new();
        let mut alice = KeygenTopic::join(fabric.clone(), PartyId::from("alice"))
            .await
            .unwrap();

        fabric
            .publish(KEYGEN_TOPIC, vec![0xff, 0xfe, 0xfd])
            .await
            .unwrap();
        let bob = KeygenTopic::join(fabric.clone(), PartyId::from("bob"))
            .await
            .unwrap();
        bob.broadcast(b"real".to_vec()).await.unwrap();

        let (from, payload) = alice.next().await.unwrap();
        assert_eq!(from, PartyId::from("bob"));
        assert_eq!(payload, b"real");
    }
}
