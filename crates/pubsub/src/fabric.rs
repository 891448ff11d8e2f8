//! The raw broadcast fabric and its in-process implementation.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::PubsubError;

/// A handle to the stream of raw payloads published on one topic.
///
/// Use it via its [`futures::Stream`] API or [`Subscription::recv`]. The
/// backlog is unbounded; protocol rounds arrive in bursts and must never be
/// dropped by the transport.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wraps a receiver handed out by a fabric implementation.
    pub const fn from_receiver(receiver: mpsc::UnboundedReceiver<T>) -> Subscription<T> {
        Subscription { receiver }
    }

    /// Returns the number of messages in the backlog for this subscription.
    pub fn backlog(&self) -> usize {
        self.receiver.len()
    }

    /// Awaits the next payload; `None` once the fabric drops the topic.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

impl<T> futures::Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// The raw pubsub fabric carrying opaque payloads per named topic.
///
/// Publishing delivers to every subscriber of the topic, including the
/// publisher's own subscriptions; echo suppression happens in the typed
/// layer above.
#[async_trait]
pub trait Fabric: Send + Sync {
    /// Publishes `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PubsubError>;

    /// Subscribes to `topic`, receiving every payload published after this
    /// call.
    async fn subscribe(&self, topic: &str) -> Result<Subscription<Vec<u8>>, PubsubError>;
}

/// In-process fabric connecting every participant of a local cluster.
///
/// Production deployments plug a gossipsub-backed fabric in here; tests and
/// single-host clusters share one `LocalFabric`.
#[derive(Debug, Default)]
pub struct LocalFabric {
    topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl LocalFabric {
    /// Creates an empty fabric.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Fabric for LocalFabric {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PubsubError> {
        let mut topics = self.topics.lock().await;
        let subscribers = topics.entry(topic.to_owned()).or_default();
        subscribers.retain(|sub| sub.send(payload.clone()).is_ok());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription<Vec<u8>>, PubsubError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .lock()
            .await
            .entry(topic.to_owned())
            .or_default()
            .push(sender);
        Ok(Subscription::from_receiver(receiver))
    }
}
