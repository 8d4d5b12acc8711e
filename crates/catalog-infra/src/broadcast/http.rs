use std::time::Duration;

use async_trait::async_trait;
use catalog_core::models::{BroadcastMessage, UPLOAD_TOPIC};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;

use super::{BroadcastError, Broadcaster};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Broadcast-Signature";
pub const TOPIC_HEADER: &str = "X-Broadcast-Topic";

#[derive(Clone, Debug)]
pub struct HttpBroadcasterConfig {
    pub url: String,
    pub secret: Option<String>,
    pub timeout_seconds: u64,
}

/// Posts each message as JSON to a relay that fans it out to remote clients.
#[derive(Clone)]
pub struct HttpBroadcaster {
    http_client: Client,
    config: HttpBroadcasterConfig,
}

impl HttpBroadcaster {
    pub fn new(config: HttpBroadcasterConfig) -> Result<Self, BroadcastError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Hex-encoded HMAC-SHA256 of `body`.
    pub fn sign_payload(body: &str, secret: &str) -> Result<String, BroadcastError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BroadcastError::Config(format!("Invalid signing secret: {}", e)))?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl Broadcaster for HttpBroadcaster {
    fn topic(&self) -> &str {
        UPLOAD_TOPIC
    }

    #[tracing::instrument(skip(self, message), fields(upload_id = %message.upload.id, status = %message.upload.status))]
    async fn publish(&self, message: &BroadcastMessage) -> Result<(), BroadcastError> {
        let body = serde_json::to_string(message)?;

        let mut request = self
            .http_client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "Catalog-Broadcast/1.0")
            .header(TOPIC_HEADER, UPLOAD_TOPIC);

        if let Some(secret) = &self.config.secret {
            let signature = Self::sign_payload(&body, secret)?;
            request = request.header(SIGNATURE_HEADER, format!("v1={}", signature));
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("Failed to read response body"));
        Err(BroadcastError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
