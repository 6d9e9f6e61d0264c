//! Typed pub-sub fan-out for the public `/feed` SSE stream (`spec` §4.4).
//! Every subscriber gets its own bounded queue so a slow HTTP client can't
//! starve the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pulz_types::FeedEvent;
use tokio::sync::{mpsc, Mutex};

/// Bounded so one stalled subscriber can only ever hold this many events
/// before publish starts silently dropping for it (best-effort, at-most-once
/// per subscriber, per `spec` §4.4/§5).
const SUBSCRIBER_CAPACITY: usize = 256;

pub type FeedReceiver = mpsc::Receiver<FeedEvent>;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<FeedEvent>,
}

#[derive(Clone)]
pub struct Broadcaster {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers a new subscriber and returns its id (for `unsubscribe`) and
    /// the receiving half of its queue.
    pub async fn subscribe(&self) -> (u64, FeedReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().await.push(Subscriber { id, tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().await.retain(|s| s.id != id);
    }

    /// Delivers `event` to every live subscriber, insertion-order-preserving
    /// per publish. Holds the subscriber-list lock only long enough to clone
    /// out the senders, never while sending (`spec` §5 "Shared resources").
    /// A full queue is a silently dropped delivery for that subscriber; a
    /// closed queue is pruned from the list on this pass.
    pub async fn publish(&self, event: FeedEvent) {
        let senders: Vec<(u64, mpsc::Sender<FeedEvent>)> = {
            let guard = self.subscribers.lock().await;
            guard.iter().map(|s| (s.id, s.tx.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in senders {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut guard = self.subscribers.lock().await;
            guard.retain(|s| !dead.contains(&s.id));
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = Broadcaster::new();
        let (_, mut rx1) = bus.subscribe().await;
        let (_, mut rx2) = bus.subscribe().await;

        bus.publish(FeedEvent::new("signal", serde_json::json!({"n": 1}))).await;

        assert_eq!(rx1.recv().await.unwrap().kind, "signal");
        assert_eq!(rx2.recv().await.unwrap().kind, "signal");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = Broadcaster::new();
        let (id, mut rx) = bus.subscribe().await;
        bus.unsubscribe(id).await;

        bus.publish(FeedEvent::new("signal", serde_json::json!({}))).await;
        assert!(rx.recv().await.is_none() || rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_publish() {
        let bus = Broadcaster::new();
        let (_, rx) = bus.subscribe().await;
        drop(rx);

        bus.publish(FeedEvent::new("heartbeat", serde_json::json!({}))).await;
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn publish_preserves_insertion_order_per_subscriber() {
        let bus = Broadcaster::new();
        let (_, mut rx) = bus.subscribe().await;

        bus.publish(FeedEvent::new("a", serde_json::json!({}))).await;
        bus.publish(FeedEvent::new("b", serde_json::json!({}))).await;

        assert_eq!(rx.recv().await.unwrap().kind, "a");
        assert_eq!(rx.recv().await.unwrap().kind, "b");
    }
}
