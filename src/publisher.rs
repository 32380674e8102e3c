//! Outbound publish/subscribe seam
//!
//! The monitor pushes snapshots and synthetic payloads through a
//! [`Publisher`]. Delivery is best-effort: a message published while nobody
//! listens is simply dropped.

use std::sync::Arc;
use tokio::sync::broadcast;

/// Event name used for synthetic push-driver payloads
pub const DATA_EVENT: &str = "arduinoData";

/// One pushed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub event: String,
    pub body: Arc<str>,
}

/// Transport-agnostic push channel
pub trait Publisher: Send + Sync {
    /// Publish `body` under `event` to every current subscriber.
    fn publish(&self, event: &str, body: &str);

    /// Number of currently connected subscribers
    fn subscriber_count(&self) -> usize;

    /// Publisher name for debugging
    fn publisher_name(&self) -> &'static str;
}

/// In-process fan-out hub on a Tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<PushMessage>,
}

impl BroadcastHub {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// losing messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Publisher for BroadcastHub {
    fn publish(&self, event: &str, body: &str) {
        // Err only means there are no receivers right now
        let _ = self.sender.send(PushMessage {
            event: event.to_string(),
            body: Arc::from(body),
        });
    }

    fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn publisher_name(&self) -> &'static str {
        "broadcast-hub"
    }
}

/// Publisher with no subscribers, for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish(&self, _event: &str, _body: &str) {}

    fn subscriber_count(&self) -> usize {
        0
    }

    fn publisher_name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hub_fans_out_to_every_subscriber() {
        let hub = BroadcastHub::new(8);
        assert_eq!(hub.subscriber_count(), 0);
        hub.publish("metrics", "{}");

        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        hub.publish("metrics", "{\"cpu\":1}");

        let got_a = a.recv().await.unwrap();
        let got_b = b.recv().await.unwrap();
        assert_eq!(got_a, got_b);
        assert_eq!(got_a.event, "metrics");
        assert_eq!(&*got_a.body, "{\"cpu\":1}");

        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
    }
}
