//! Queue sink implementations

mod config;
mod http_webhook;
mod logging;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::domain::queue::QueueSink;
use crate::domain::DomainError;

pub use config::{NotificationSinkConfig, SinksConfig, WebhookSinkConfig};
pub use http_webhook::HttpWebhookSink;
pub use logging::{LogNotificationSink, LogScheduleSink};
pub use telegram::{render_message, TelegramNotificationSink};

/// Builds one sink per sink type from configuration
pub fn build_sinks(config: &SinksConfig) -> Result<Vec<Arc<dyn QueueSink>>, DomainError> {
    let timeout = Duration::from_secs(config.webhook.timeout_secs);

    let notification: Arc<dyn QueueSink> = match config.notification.telegram() {
        Some((token, chat_id)) => {
            info!("Notifications delivered via Telegram");
            Arc::new(TelegramNotificationSink::new(
                &config.notification.api_base,
                token,
                chat_id,
                timeout,
            )?)
        }
        None => {
            info!("Telegram not configured, notifications are logged only");
            Arc::new(LogNotificationSink)
        }
    };

    Ok(vec![
        notification,
        Arc::new(HttpWebhookSink::new(
            config.webhook.signing_secret.clone(),
            timeout,
        )?),
        Arc::new(LogScheduleSink),
    ])
}
