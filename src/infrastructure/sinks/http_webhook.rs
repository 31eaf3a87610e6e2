//! Outbound HTTP webhook sink

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{info, warn};

use crate::domain::queue::{QueueEntry, QueueSink, QueueTarget, SinkType};
use crate::domain::DomainError;

type HmacSha256 = Hmac<Sha256>;

/// POSTs the entry payload as JSON to the entry's endpoint
#[derive(Debug, Clone)]
pub struct HttpWebhookSink {
    http_client: Client,
    signing_secret: Option<String>,
}

impl HttpWebhookSink {
    pub fn new(signing_secret: Option<String>, timeout: Duration) -> Result<Self, DomainError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            signing_secret: signing_secret.filter(|s| !s.is_empty()),
        })
    }

    /// Generates HMAC-SHA256 signature for a payload
    pub fn generate_signature(secret: &str, payload: &str) -> Result<String, DomainError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| DomainError::internal(format!("Invalid signing key: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl QueueSink for HttpWebhookSink {
    fn sink_type(&self) -> SinkType {
        SinkType::Webhook
    }

    async fn deliver(&self, entry: &QueueEntry) -> Result<(), DomainError> {
        let QueueTarget::Webhook { endpoint } = &entry.target else {
            return Err(DomainError::sink(
                "webhook",
                format!("Entry '{}' has no webhook endpoint", entry.id),
            ));
        };

        let payload = serde_json::to_string(&entry.payload)
            .map_err(|e| DomainError::internal(format!("Failed to serialize payload: {}", e)))?;

        let mut request = self
            .http_client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Delivery-Id", entry.id.as_str())
            .header("X-Action-Hash", entry.action_hash.as_str());

        if let Some(secret) = &self.signing_secret {
            let signature = Self::generate_signature(secret, &payload)?;
            request = request.header("X-Webhook-Signature", format!("sha256={}", signature));
        }

        match request.body(payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    entry_id = %entry.id,
                    endpoint = %endpoint,
                    status = response.status().as_u16(),
                    "Webhook delivery succeeded"
                );
                Ok(())
            }
            Ok(response) => {
                let status = response.status().as_u16();
                warn!(entry_id = %entry.id, endpoint = %endpoint, status = status, "Webhook delivery failed with HTTP error");
                Err(DomainError::sink("webhook", format!("HTTP status {}", status)))
            }
            Err(e) => {
                let error_msg = if e.is_timeout() {
                    "Request timed out".to_string()
                } else if e.is_connect() {
                    "Connection failed".to_string()
                } else {
                    format!("Request failed: {}", e)
                };
                warn!(entry_id = %entry.id, endpoint = %endpoint, error = %error_msg, "Webhook delivery failed");
                Err(DomainError::sink("webhook", error_msg))
            }
        }
    }
}
