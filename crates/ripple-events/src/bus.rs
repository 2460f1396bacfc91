//! Publish/subscribe bus seam and in-memory implementation.
//!
//! Topics fan messages out to every current subscriber. Publish is
//! non-blocking from the publisher's perspective: a slow subscriber lags
//! and drops messages on its own receiver, and a closed subscriber is
//! simply no longer counted — neither can stall the publisher or a
//! sibling subscriber.
//!
//! Delivery is at-most-once, best-effort: there is no retry or outbox.
//! Subscribers that need stronger guarantees must layer their own
//! sequencing into the payload.

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use ripple_core::event::BusMessage;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default per-topic channel capacity.
pub const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// Bus failure.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus backend rejected the publish.
    #[error("publish to topic {topic:?} failed: {message}")]
    Publish {
        /// Target topic.
        topic: String,
        /// Backend detail.
        message: String,
    },
}

/// One topic subscription.
///
/// Receives messages in publish order. Dropping the subscription
/// unsubscribes. External bus backends bridge their delivery into the
/// same broadcast pair, so the receiving side is uniform.
pub struct BusSubscription {
    topic: String,
    rx: broadcast::Receiver<BusMessage>,
}

impl BusSubscription {
    /// Wrap a raw receiver (used by bus implementations).
    #[must_use]
    pub fn new(topic: impl Into<String>, rx: broadcast::Receiver<BusMessage>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    /// The subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive the next message.
    ///
    /// Returns `None` once the topic is closed. A lagged receiver skips
    /// the overwritten messages (logged) and keeps receiving — losing
    /// old messages is preferable to stalling the fan-out.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    counter!("bus_subscriber_lag_total").increment(skipped);
                    warn!(topic = %self.topic, skipped, "subscriber lagged, skipping messages");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive attempt (test helper and drain loops).
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

/// Publish/subscribe message delivery seam.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a message to its topic.
    ///
    /// Returns the number of subscribers that received it; zero when the
    /// topic has no subscribers.
    async fn publish(&self, message: BusMessage) -> Result<usize, BusError>;

    /// Subscribe to a topic.
    fn subscribe(&self, topic: &str) -> BusSubscription;
}

/// In-process bus over per-topic broadcast channels.
pub struct MemoryBus {
    topics: DashMap<String, broadcast::Sender<BusMessage>>,
    capacity: usize,
}

impl MemoryBus {
    /// Create a bus with the default per-topic capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a bus with a custom per-topic capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    /// Number of live topics.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Current subscriber count for a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, message: BusMessage) -> Result<usize, BusError> {
        let topic = message.topic.clone();
        let delivered = match self.topics.get(&topic) {
            // send fails only when no receiver is subscribed; that is a
            // delivery count of zero, not an error.
            Some(tx) => tx.send(message).unwrap_or(0),
            None => 0,
        };
        if delivered == 0 {
            // Drop the channel once nobody is listening.
            let _ = self
                .topics
                .remove_if(&topic, |_, tx| tx.receiver_count() == 0);
        }
        counter!("bus_publish_total").increment(1);
        debug!(topic = %topic, delivered, "published to topic");
        Ok(delivered)
    }

    fn subscribe(&self, topic: &str) -> BusSubscription {
        let rx = self
            .topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        BusSubscription::new(topic, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(topic: &str, n: i64) -> BusMessage {
        BusMessage::new(topic, json!({"n": n}))
    }

    #[tokio::test]
    async fn publish_without_subscribers_delivers_zero() {
        let bus = MemoryBus::new();
        let delivered = bus.publish(message("room:1", 1)).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn two_subscribers_same_topic_receive_identical_order() {
        let bus = MemoryBus::new();
        let mut sub_a = bus.subscribe("room:1");
        let mut sub_b = bus.subscribe("room:1");

        for n in 0..3 {
            let delivered = bus.publish(message("room:1", n)).await.unwrap();
            assert_eq!(delivered, 2);
        }

        for n in 0..3 {
            let a = sub_a.recv().await.unwrap();
            let b = sub_b.recv().await.unwrap();
            assert_eq!(a, b);
            assert_eq!(a.payload["n"], n);
        }
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_block_survivor() {
        let bus = MemoryBus::new();
        let sub_dead = bus.subscribe("room:1");
        let mut sub_live = bus.subscribe("room:1");

        drop(sub_dead);
        let delivered = bus.publish(message("room:1", 7)).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(sub_live.recv().await.unwrap().payload["n"], 7);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = MemoryBus::new();
        let mut sub_a = bus.subscribe("room:a");
        let mut sub_b = bus.subscribe("room:b");

        let _ = bus.publish(message("room:a", 1)).await.unwrap();
        assert_eq!(sub_a.recv().await.unwrap().topic, "room:a");
        assert!(sub_b.try_recv().is_none());
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_but_keeps_receiving() {
        let bus = MemoryBus::with_capacity(2);
        let mut sub = bus.subscribe("room:1");

        for n in 0..5 {
            let _ = bus.publish(message("room:1", n)).await.unwrap();
        }
        // The first receive lands after the lag skip; only the newest
        // messages survive.
        let first = sub.recv().await.unwrap();
        assert_eq!(first.payload["n"], 3);
        let second = sub.recv().await.unwrap();
        assert_eq!(second.payload["n"], 4);
    }

    #[tokio::test]
    async fn empty_topic_cleaned_up_after_publish() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("room:1");
        assert_eq!(bus.topic_count(), 1);

        drop(sub);
        let _ = bus.publish(message("room:1", 1)).await.unwrap();
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_count_tracks_lifecycle() {
        let bus = MemoryBus::new();
        assert_eq!(bus.subscriber_count("room:1"), 0);
        let sub1 = bus.subscribe("room:1");
        let sub2 = bus.subscribe("room:1");
        assert_eq!(bus.subscriber_count("room:1"), 2);
        drop(sub1);
        assert_eq!(bus.subscriber_count("room:1"), 1);
        drop(sub2);
        assert_eq!(bus.subscriber_count("room:1"), 0);
    }

    #[tokio::test]
    async fn subscription_reports_topic() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("room:9");
        assert_eq!(sub.topic(), "room:9");
    }
}
