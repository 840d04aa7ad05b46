//! Topic-based pub/sub for state deltas.
//!
//! Topics are plain strings: the literal `"network"` for topology events and
//! each device id for that device's deltas. The same subscriber may register
//! on a topic more than once. Delivery is asynchronous through bounded
//! per-subscriber queues and never blocks publishers; when a subscriber's
//! queue is full the payload is dropped for that subscriber (drop-newest).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::RwLock;

/// Topic carrying device online/offline announcements.
pub const NETWORK_TOPIC: &str = "network";

/// Queue depth per subscriber.
const SUBSCRIBER_QUEUE: usize = 64;

/// A published state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StateDelta {
    /// A device finished initialization; carries its full state snapshot.
    Online { state: Value },
    /// A device's agent terminated.
    Offline { device_id: String },
    /// Changed sub-paths of a device's state.
    Update { device_id: String, changes: Value },
}

/// A live subscription on one topic.
///
/// Dropping the subscription (or the receiver going away) removes its entry
/// on the next dispatch to that topic.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    topic: String,
    receiver: mpsc::Receiver<StateDelta>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive the next delta, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<StateDelta> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<StateDelta> {
        self.receiver.try_recv().ok()
    }
}

struct Entry {
    id: u64,
    sender: mpsc::Sender<StateDelta>,
}

/// Duplicate-keyed topic index with fan-out dispatch.
#[derive(Clone, Default)]
pub struct PubSub {
    topics: Arc<RwLock<HashMap<String, Vec<Entry>>>>,
    next_id: Arc<AtomicU64>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber on `topic`.
    pub async fn subscribe(&self, topic: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_default()
            .push(Entry { id, sender });

        Subscription {
            id,
            topic: topic.to_string(),
            receiver,
        }
    }

    /// Remove one subscription from `topic`.
    pub async fn unsubscribe(&self, topic: &str, id: u64) {
        let mut topics = self.topics.write().await;
        if let Some(entries) = topics.get_mut(topic) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Fan a delta out to every subscriber of `topic`.
    ///
    /// Subscribers whose receiver has gone away are pruned here.
    pub async fn publish(&self, topic: &str, delta: StateDelta) {
        let mut topics = self.topics.write().await;
        let entries = match topics.get_mut(topic) {
            Some(entries) => entries,
            None => return,
        };

        entries.retain(|entry| match entry.sender.try_send(delta.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(topic, subscriber = entry.id, "subscriber queue full, dropping delta");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if entries.is_empty() {
            topics.remove(topic);
        }
    }

    /// Number of live subscriptions on a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
