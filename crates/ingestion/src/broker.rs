//! Broker trait - topic subscription interface
//!
//! Controllers and the listener only see this trait, so the in-process bus
//! can be swapped for a networked broker that forwards into a `Subscription`.

use async_channel::Receiver;
use bytes::Bytes;

use crate::Result;

/// Topic subscription source
#[trait_variant::make(Broker: Send)]
pub trait LocalBroker {
    /// Subscribe to a topic
    ///
    /// Messages published after this call returns are delivered in publish
    /// order.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

/// Live subscription to one topic
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: Receiver<Bytes>,
}

impl Subscription {
    /// Wrap a receiver fed by a broker
    pub fn new(topic: impl Into<String>, rx: Receiver<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next payload, `None` once the broker side is gone and the queue drained
    pub async fn recv(&self) -> Option<Bytes> {
        self.rx.recv().await.ok()
    }

    /// Payloads queued but not yet received
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Stop receiving; the broker drops this subscriber on its next publish
    pub fn unsubscribe(self) {
        self.rx.close();
    }
}
