//! Outbound sink configuration

use serde::{Deserialize, Serialize};

/// Outbound sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default)]
    pub notification: NotificationSinkConfig,
    #[serde(default)]
    pub webhook: WebhookSinkConfig,
}

/// Notification delivery. Without a bot token and chat id notifications
/// are only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSinkConfig {
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for NotificationSinkConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            api_base: default_telegram_api_base(),
        }
    }
}

impl NotificationSinkConfig {
    /// Token and chat id, when both are set and non-empty
    pub fn telegram(&self) -> Option<(&str, &str)> {
        let token = self.telegram_bot_token.as_deref().filter(|t| !t.is_empty())?;
        let chat_id = self.telegram_chat_id.as_deref().filter(|c| !c.is_empty())?;
        Some((token, chat_id))
    }
}

/// Outbound HTTP webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSinkConfig {
    /// Signs request bodies with HMAC-SHA256 when set
    #[serde(default)]
    pub signing_secret: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

impl Default for WebhookSinkConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            timeout_secs: default_webhook_timeout(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_webhook_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telegram_requires_both_values() {
        let mut config = NotificationSinkConfig::default();
        assert!(config.telegram().is_none());

        config.telegram_bot_token = Some("token".into());
        assert!(config.telegram().is_none());

        config.telegram_chat_id = Some("".into());
        assert!(config.telegram().is_none());

        config.telegram_chat_id = Some("-100".into());
        assert_eq!(config.telegram(), Some(("token", "-100")));
    }

    #[test]
    fn test_defaults() {
        let config = SinksConfig::default();
        assert_eq!(config.notification.api_base, "https://api.telegram.org");
        assert_eq!(config.webhook.timeout_secs, 10);
        assert!(config.webhook.signing_secret.is_none());
    }
}
