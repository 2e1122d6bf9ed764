//! MessageBus - in-process topic fan-out
//!
//! Each subscriber gets its own bounded async-channel queue. Publishing waits
//! for queue space, so a slow subscriber applies backpressure to its topic's
//! publisher instead of losing messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_channel::{bounded, Sender};
use bytes::Bytes;
use metrics::counter;
use tokio::sync::Notify;
use tracing::{debug, info, trace};

use crate::{Broker, IngestionError, Result, Subscription};

/// Bus counters
#[derive(Debug, Default)]
pub struct BusMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    unrouted: AtomicU64,
    pruned: AtomicU64,
}

impl BusMetrics {
    /// Payloads handed to `publish`
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Payloads queued to a subscriber (one per subscriber)
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Payloads published to a topic with no live subscriber
    pub fn unrouted(&self) -> u64 {
        self.unrouted.load(Ordering::Relaxed)
    }

    /// Closed subscriptions removed
    pub fn pruned(&self) -> u64 {
        self.pruned.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            published: self.published(),
            delivered: self.delivered(),
            unrouted: self.unrouted(),
            pruned: self.pruned(),
        }
    }
}

/// Bus counters at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusMetricsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub unrouted: u64,
    pub pruned: u64,
}

struct BusInner {
    topics: Mutex<HashMap<String, Vec<Sender<Bytes>>>>,
    capacity: usize,
    closed: AtomicBool,
    /// Woken on every subscribe and on shutdown
    subscribed: Notify,
    metrics: BusMetrics,
}

/// In-process publish/subscribe bus
///
/// Cheap to clone; all clones share the same topics.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Create a bus whose subscriptions queue up to `capacity` payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
                subscribed: Notify::new(),
                metrics: BusMetrics::default(),
            }),
        }
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.inner.metrics
    }

    /// Live subscribers of a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock_topics()
            .get(topic)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Wait until `topic` has at least `count` live subscribers.
    ///
    /// Returns `false` if that does not happen within `timeout`, or the bus
    /// shuts down first.
    pub async fn wait_for_subscribers(&self, topic: &str, count: usize, timeout: Duration) -> bool {
        let reached = async {
            loop {
                // register before checking so a concurrent subscribe is not missed
                let notified = self.inner.subscribed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.subscriber_count(topic) >= count {
                    return true;
                }
                if self.is_shut_down() {
                    return false;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, reached)
            .await
            .unwrap_or(false)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Publish a payload to every live subscriber of `topic`.
    ///
    /// Returns the number of subscribers it was queued to. Publishing after
    /// shutdown delivers nothing.
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        let metrics = &self.inner.metrics;
        metrics.published.fetch_add(1, Ordering::Relaxed);

        let senders: Vec<Sender<Bytes>> = self
            .lock_topics()
            .get(topic)
            .map(|s| s.to_vec())
            .unwrap_or_default();

        let mut delivered = 0;
        let mut saw_closed = false;
        for tx in &senders {
            if tx.send(payload.clone()).await.is_ok() {
                delivered += 1;
            } else {
                saw_closed = true;
            }
        }

        if saw_closed {
            self.prune(topic);
        }

        if delivered == 0 {
            metrics.unrouted.fetch_add(1, Ordering::Relaxed);
            counter!("telemetry_syncer_bus_unrouted_total").increment(1);
            trace!(topic = %topic, "No subscriber for payload");
        } else {
            metrics
                .delivered
                .fetch_add(delivered as u64, Ordering::Relaxed);
        }

        delivered
    }

    /// Close every subscription.
    ///
    /// Subscribers still receive what was already queued, then `recv` returns
    /// `None`.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let topics: HashMap<_, _> = std::mem::take(&mut *self.lock_topics());
        let subscriptions: usize = topics.values().map(Vec::len).sum();
        drop(topics);
        self.inner.subscribed.notify_waiters();
        info!(subscriptions, "Message bus shut down");
    }

    fn prune(&self, topic: &str) {
        let mut topics = self.lock_topics();
        if let Some(senders) = topics.get_mut(topic) {
            let before = senders.len();
            senders.retain(|tx| !tx.is_closed());
            let removed = before - senders.len();
            if senders.is_empty() {
                topics.remove(topic);
            }
            if removed > 0 {
                self.inner
                    .metrics
                    .pruned
                    .fetch_add(removed as u64, Ordering::Relaxed);
                debug!(topic = %topic, removed, "Pruned closed subscriptions");
            }
        }
    }

    fn lock_topics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Sender<Bytes>>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Broker for MessageBus {
    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        if self.is_shut_down() {
            return Err(IngestionError::BusClosed {
                topic: topic.to_string(),
            });
        }

        let (tx, rx) = bounded(self.inner.capacity);
        self.lock_topics()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        self.inner.subscribed.notify_waiters();

        debug!(topic = %topic, "Subscribed");
        Ok(Subscription::new(topic, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = MessageBus::new(8);
        let a = bus.subscribe("t").await.unwrap();
        let b = bus.subscribe("t").await.unwrap();

        assert_eq!(bus.publish("t", "hello").await, 2);
        assert_eq!(a.recv().await.unwrap(), Bytes::from("hello"));
        assert_eq!(b.recv().await.unwrap(), Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = MessageBus::new(8);
        let a = bus.subscribe("a").await.unwrap();

        assert_eq!(bus.publish("b", "x").await, 0);
        assert_eq!(a.pending(), 0);
        assert_eq!(bus.metrics().unrouted(), 1);
    }

    #[tokio::test]
    async fn test_publish_order_is_preserved() {
        let bus = MessageBus::new(16);
        let sub = bus.subscribe("t").await.unwrap();

        for i in 0..10 {
            bus.publish("t", i.to_string()).await;
        }
        for i in 0..10 {
            assert_eq!(sub.recv().await.unwrap(), Bytes::from(i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_is_pruned() {
        let bus = MessageBus::new(8);
        let sub = bus.subscribe("t").await.unwrap();
        assert_eq!(bus.subscriber_count("t"), 1);

        sub.unsubscribe();
        assert_eq!(bus.publish("t", "x").await, 0);
        assert_eq!(bus.subscriber_count("t"), 0);
        assert_eq!(bus.metrics().pruned(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_subscribers() {
        let bus = MessageBus::new(8);
        assert!(!bus.wait_for_subscribers("t", 1, Duration::from_millis(5)).await);

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.wait_for_subscribers("t", 1, Duration::from_secs(5)).await })
        };
        let _sub = bus.subscribe("t").await.unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_subscribers_wakes_on_subscribe() {
        let bus = MessageBus::new(8);
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.wait_for_subscribers("t", 2, Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;

        let _a = bus.subscribe("t").await.unwrap();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let _b = bus.subscribe("t").await.unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_subscribers_ends_on_shutdown() {
        let bus = MessageBus::new(8);
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.wait_for_subscribers("t", 1, Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;

        bus.shutdown();
        let woke = tokio::time::timeout(Duration::from_secs(5), waiter).await;
        assert!(!woke.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_ends() {
        let bus = MessageBus::new(8);
        let sub = bus.subscribe("t").await.unwrap();
        bus.publish("t", "last").await;

        bus.shutdown();

        assert_eq!(sub.recv().await.unwrap(), Bytes::from("last"));
        assert!(sub.recv().await.is_none());
        assert!(matches!(
            bus.subscribe("t").await,
            Err(IngestionError::BusClosed { .. })
        ));
    }
}
