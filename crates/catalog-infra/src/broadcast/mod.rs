//! Upload lifecycle broadcasting
//!
//! Every message goes to the single `file-uploads` topic. Delivery is best effort:
//! [`UploadNotifier`] logs and swallows publish failures, so the persisted upload
//! status stays the source of truth.

mod http;
mod notifier;
mod topic;

use std::sync::Arc;

use async_trait::async_trait;
use catalog_core::models::BroadcastMessage;
use catalog_core::{BroadcastBackend, Config};
use thiserror::Error;

pub use http::{HttpBroadcaster, HttpBroadcasterConfig, SIGNATURE_HEADER, TOPIC_HEADER};
pub use notifier::UploadNotifier;
pub use topic::TopicBroadcaster;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Failed to serialize broadcast message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Broadcast delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("Broadcast relay returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Broadcast configuration error: {0}")]
    Config(String),
}

/// Publishes lifecycle messages to subscribers of a topic.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Topic this broadcaster publishes on.
    fn topic(&self) -> &str;

    async fn publish(&self, message: &BroadcastMessage) -> Result<(), BroadcastError>;
}

/// Build the configured broadcaster. The topic backend is returned alongside so
/// in-process consumers can subscribe to it.
pub fn create_broadcaster(
    config: &Config,
) -> Result<(Arc<dyn Broadcaster>, Option<Arc<TopicBroadcaster>>), BroadcastError> {
    match config.broadcast_backend {
        BroadcastBackend::Topic => {
            let topic = Arc::new(TopicBroadcaster::new(config.broadcast_topic_capacity));
            Ok((topic.clone(), Some(topic)))
        }
        BroadcastBackend::Http => {
            let url = config.broadcast_url.clone().ok_or_else(|| {
                BroadcastError::Config("BROADCAST_URL is required for the http backend".to_string())
            })?;
            let broadcaster = HttpBroadcaster::new(HttpBroadcasterConfig {
                url,
                secret: config.broadcast_secret.clone(),
                timeout_seconds: config.broadcast_timeout_seconds,
            })?;
            Ok((Arc::new(broadcaster), None))
        }
    }
}
