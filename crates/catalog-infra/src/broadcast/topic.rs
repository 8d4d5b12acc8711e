use async_trait::async_trait;
use catalog_core::models::{BroadcastMessage, UPLOAD_TOPIC};
use tokio::sync::broadcast;

use super::{BroadcastError, Broadcaster};

/// In-process topic over `tokio::sync::broadcast`.
///
/// Subscribers only see messages published after they subscribed. A slow subscriber
/// that falls more than `capacity` messages behind loses the oldest ones.
pub struct TopicBroadcaster {
    tx: broadcast::Sender<BroadcastMessage>,
}

impl TopicBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl Broadcaster for TopicBroadcaster {
    fn topic(&self) -> &str {
        UPLOAD_TOPIC
    }

    async fn publish(&self, message: &BroadcastMessage) -> Result<(), BroadcastError> {
        // No subscribers is not a failure; the message is simply not observed.
        match self.tx.send(message.clone()) {
            Ok(receivers) => {
                tracing::trace!(receivers, upload_id = %message.upload.id, "Broadcast published");
            }
            Err(_) => {
                tracing::trace!(upload_id = %message.upload.id, "Broadcast published with no subscribers");
            }
        }
        Ok(())
    }
}
