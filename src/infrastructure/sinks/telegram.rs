//! Telegram notification sink

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::queue::{NotificationKind, QueueEntry, QueueSink, QueueTarget, SinkType};
use crate::domain::DomainError;

/// Sends notification and escalation entries to a Telegram chat
#[derive(Debug, Clone)]
pub struct TelegramNotificationSink {
    http_client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotificationSink {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

/// Plain-text message for a notification entry
pub fn render_message(entry: &QueueEntry) -> String {
    let mut lines = Vec::new();

    if let QueueTarget::Notification {
        kind,
        template,
        to_roles,
    } = &entry.target
    {
        let label = match kind {
            NotificationKind::Notify => "NOTIFY",
            NotificationKind::Escalate => "ESCALATE",
        };
        lines.push(format!("[{}] {}", label, template));
        if !to_roles.is_empty() {
            let roles: Vec<_> = to_roles.iter().map(|r| r.as_str()).collect();
            lines.push(format!("Roles: {}", roles.join(", ")));
        }
    }

    if let Some(deal_id) = &entry.deal_id {
        lines.push(format!("Deal: {}", deal_id));
    }
    if let Some(stage) = entry.payload.get("stage").and_then(|s| s.as_str()) {
        lines.push(format!("Stage: {}", stage));
    }

    lines.join("\n")
}

#[async_trait]
impl QueueSink for TelegramNotificationSink {
    fn sink_type(&self) -> SinkType {
        SinkType::Notification
    }

    async fn deliver(&self, entry: &QueueEntry) -> Result<(), DomainError> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": render_message(entry),
            "disable_web_page_preview": true,
        });

        let response = self
            .http_client
            .post(self.send_message_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::sink("telegram", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(500)
                .collect();
            warn!(entry_id = %entry.id, status = status.as_u16(), "Telegram delivery failed");
            return Err(DomainError::sink(
                "telegram",
                format!("HTTP status {}: {}", status.as_u16(), text),
            ));
        }

        info!(entry_id = %entry.id, "Telegram notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::Role;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification() -> QueueEntry {
        QueueEntry::new(
            QueueTarget::Notification {
                kind: NotificationKind::Notify,
                template: "risk_review_started".into(),
                to_roles: vec![Role::new("RISK_MANAGER")],
            },
            "hash-1",
            json!({"stage": "RISK_REVIEW"}),
        )
        .with_deal("deal-1")
    }

    #[test]
    fn test_render_message() {
        let text = render_message(&notification());

        assert!(text.starts_with("[NOTIFY] risk_review_started"));
        assert!(text.contains("Roles: RISK_MANAGER"));
        assert!(text.contains("Deal: deal-1"));
        assert!(text.contains("Stage: RISK_REVIEW"));
    }

    #[tokio::test]
    async fn test_deliver_posts_to_bot_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botsecret/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "-100"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let sink =
            TelegramNotificationSink::new(server.uri(), "secret", "-100", Duration::from_secs(5))
                .unwrap();

        sink.deliver(&notification()).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_is_sink_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bot was blocked"))
            .mount(&server)
            .await;

        let sink =
            TelegramNotificationSink::new(server.uri(), "secret", "-100", Duration::from_secs(5))
                .unwrap();

        let err = sink.deliver(&notification()).await.unwrap_err();
        assert!(matches!(err, DomainError::Sink { .. }));
        assert!(err.to_string().contains("403"));
    }
}
