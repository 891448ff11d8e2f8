//! JSON-RPC client against the subnet node, plus the pubsub fabric bridged
//! over it.
//!
//! The subnet node carries the ceremony topic on its own gossip network; the
//! anchor process publishes and drains messages through the node's RPC.

use std::{sync::Arc, time::Duration};

use anchor_coordinator::{
    child::{ChildClient, ChildRpcError, HeadChange, PowerState, SyncStatus, Tipset, TipsetKey},
    matcher::MatcherParams,
};
use anchor_pubsub::{Fabric, PubsubError, Subscription};
use async_trait::async_trait;
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use tokio::sync::mpsc;
use tracing::warn;

/// How often the fabric bridge drains pending topic messages.
const PUBSUB_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Client for the queries the coordinator issues against the subnet node.
#[derive(Debug, Clone)]
pub(crate) struct ChildRpcClient {
    client: HttpClient,
}

impl ChildRpcClient {
    /// Builds a client for the node's RPC endpoint.
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: HttpClientBuilder::default().build(url)?,
        })
    }

    /// The node's current head tipset.
    pub async fn head(&self) -> Result<Tipset, ChildRpcError> {
        self.client
            .request("Anchor.ChainHead", rpc_params![])
            .await
            .map_err(|e| ChildRpcError(e.to_string()))
    }

    /// The tipset at `height`.
    pub async fn tipset_by_height(&self, height: i64) -> Result<Tipset, ChildRpcError> {
        self.client
            .request("Anchor.ChainGetTipSetByHeight", rpc_params![height])
            .await
            .map_err(|e| ChildRpcError(e.to_string()))
    }
}

#[async_trait]
impl ChildClient for ChildRpcClient {
    async fn sync_status(&self) -> Result<SyncStatus, ChildRpcError> {
        self.client
            .request("Anchor.SyncState", rpc_params![])
            .await
            .map_err(|e| ChildRpcError(e.to_string()))
    }

    async fn tipset(&self, key: &TipsetKey) -> Result<Tipset, ChildRpcError> {
        self.client
            .request("Anchor.ChainGetTipSet", rpc_params![key])
            .await
            .map_err(|e| ChildRpcError(e.to_string()))
    }

    async fn genesis(&self) -> Result<Tipset, ChildRpcError> {
        self.client
            .request("Anchor.ChainGetGenesis", rpc_params![])
            .await
            .map_err(|e| ChildRpcError(e.to_string()))
    }

    async fn power_state(&self, key: &TipsetKey) -> Result<PowerState, ChildRpcError> {
        self.client
            .request("Anchor.StateGetPower", rpc_params![key])
            .await
            .map_err(|e| ChildRpcError(e.to_string()))
    }
}

/// Emits `(old, new)` tipset pairs for every confirmed head advance.
///
/// A tipset is reported once it is `params.confidence` epochs behind the
/// node's head; the subscription itself never expires (the timeout is the
/// "no timeout" sentinel).
pub(crate) fn spawn_head_poller(
    client: ChildRpcClient,
    params: MatcherParams,
    interval: Duration,
) -> mpsc::Receiver<HeadChange> {
    let (sender, receiver) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut last_reported: Option<Tipset> = None;

        loop {
            tokio::time::sleep(interval).await;

            let head = match client.head().await {
                Ok(head) => head,
                Err(e) => {
                    warn!(%e, "head poll failed");
                    continue;
                }
            };

            let confirmed = head.height - params.confidence;
            let reported = last_reported
                .as_ref()
                .map(|tipset| tipset.height)
                .unwrap_or(confirmed - 1);
            if confirmed <= reported {
                continue;
            }

            for height in (reported + 1)..=confirmed {
                let new = match client.tipset_by_height(height).await {
                    Ok(tipset) => tipset,
                    Err(e) => {
                        warn!(%e, height, "tipset lookup failed");
                        break;
                    }
                };

                let old = match last_reported.take() {
                    Some(tipset) => tipset,
                    None => match client.tipset_by_height(height - 1).await {
                        Ok(tipset) => tipset,
                        Err(e) => {
                            warn!(%e, height = height - 1, "tipset lookup failed");
                            break;
                        }
                    },
                };

                let event = HeadChange::Apply {
                    old,
                    new: new.clone(),
                };
                if sender.send(event).await.is_err() {
                    return;
                }
                last_reported = Some(new);
            }
        }
    });

    receiver
}

/// The ceremony fabric, bridged over the subnet node's pubsub RPC.
#[derive(Debug)]
pub(crate) struct RpcFabric {
    client: HttpClient,
}

impl RpcFabric {
    /// Builds a fabric bridge against the node's RPC endpoint.
    pub fn new(url: &str) -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            client: HttpClientBuilder::default().build(url)?,
        }))
    }
}

#[async_trait]
impl Fabric for RpcFabric {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PubsubError> {
        let _: serde_json::Value = self
            .client
            .request(
                "Anchor.PubsubPublish",
                rpc_params![topic, hex::encode(payload)],
            )
            .await
            .map_err(|_| PubsubError::Closed)?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription<Vec<u8>>, PubsubError> {
        let _: serde_json::Value = self
            .client
            .request("Anchor.PubsubSubscribe", rpc_params![topic])
            .await
            .map_err(|_| PubsubError::Closed)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let topic = topic.to_owned();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(PUBSUB_POLL_INTERVAL).await;

                let batch: Vec<String> = match client
                    .request("Anchor.PubsubNext", rpc_params![&topic])
                    .await
                {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!(%e, %topic, "pubsub drain failed");
                        continue;
                    }
                };

                for payload in batch {
                    let Ok(bytes) = hex::decode(&payload) else {
                        warn!(%topic, "dropping undecodable pubsub payload");
                        continue;
                    };
                    if sender.send(bytes).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Subscription::from_receiver(receiver))
    }
}
