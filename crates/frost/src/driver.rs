//! Cooperative pump loop between a session and the ceremony topic.

use anchor_pubsub::KeygenTopic;
use tracing::{trace, warn};

use crate::{wire::SessionMsg, SessionError, SessionHandler, SessionOutcome};

/// Drives a session to completion over the topic.
///
/// Each iteration drains the session's queued outgoing messages onto the
/// topic, then feeds it one incoming peer message. The loop ends when the
/// session reports completion; a protocol failure aborts the ceremony and is
/// retried at the next epoch by the caller.
pub async fn run_session<H: SessionHandler>(
    mut handler: H,
    topic: &mut KeygenTopic,
) -> Result<SessionOutcome, SessionError> {
    loop {
        while let Some(msg) = handler.listen() {
            topic.broadcast(msg.encode()?).await?;
        }

        if handler.is_complete() {
            break;
        }

        let (from, payload) = topic.next().await?;
        let msg = match SessionMsg::decode(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(%from, %e, "dropping undecodable ceremony message");
                continue;
            }
        };

        trace!(%from, "feeding ceremony message into session");
        handler.accept(&from, msg)?;
    }

    handler.result()
}
