//! FROST threshold Schnorr sessions for the checkpoint chain.
//!
//! Two cooperative session state machines share one handler surface: key
//! generation (producing a [`ThresholdKeyConfig`]) and taproot signing
//! (producing a 64-byte BIP-340 signature over a sighash). Sessions pull
//! outgoing messages via [`SessionHandler::listen`] and are pushed incoming
//! peer messages via [`SessionHandler::accept`]; [`driver::run_session`]
//! pumps a session against the pubsub topic until it completes or aborts.

pub mod driver;
pub mod keygen;
pub mod share;
pub mod sign;
pub mod testing;
pub mod wire;

use anchor_primitives::{PartyId, ThresholdKeyConfig};
use anchor_pubsub::PubsubError;
use thiserror::Error;

pub use driver::run_session;
pub use keygen::KeygenSession;
pub use sign::SignSession;
pub use wire::{SessionBody, SessionMsg};

/// What a completed session yields.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// A key generation ceremony finished; every participant holds a share.
    Config(ThresholdKeyConfig),

    /// A signing ceremony finished with an aggregated BIP-340 signature.
    Signature([u8; 64]),
}

/// Errors produced by a threshold session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The protocol aborted; the ceremony is retried at the next epoch.
    #[error("threshold session aborted: {0}")]
    Aborted(String),

    /// The pubsub transport failed underneath the session.
    #[error(transparent)]
    Transport(#[from] PubsubError),

    /// A wire message failed to encode or decode.
    #[error("session codec: {0}")]
    Codec(#[from] bincode::Error),

    /// A party id could not be mapped to a protocol identifier.
    #[error("party {0} has no protocol identifier")]
    UnknownParty(PartyId),
}

impl From<frost_secp256k1_tr::Error> for SessionError {
    fn from(e: frost_secp256k1_tr::Error) -> Self {
        SessionError::Aborted(e.to_string())
    }
}

/// The uniform capability set both session variants expose.
pub trait SessionHandler {
    /// Pulls the next outgoing protocol message, if any is queued.
    fn listen(&mut self) -> Option<SessionMsg>;

    /// Feeds one incoming peer message into the session.
    fn accept(&mut self, from: &PartyId, msg: SessionMsg) -> Result<(), SessionError>;

    /// Whether the session has produced its result.
    fn is_complete(&self) -> bool;

    /// Consumes the session and returns its outcome. Read exactly once,
    /// after [`SessionHandler::is_complete`] reports true.
    fn result(self) -> Result<SessionOutcome, SessionError>;
}
