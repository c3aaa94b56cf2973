use super::Notifier;
use crate::config::{TelegramSettings, TelegramTarget};
use crate::error::NotifyError;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Telegram Bot API notifier
///
/// Without a bot token and chat id it runs log-only: messages are written to
/// the log at info level and no request is made.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    target: Option<TelegramTarget>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(
        settings: &TelegramSettings,
        target: Option<TelegramTarget>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        if target.is_none() {
            tracing::warn!("Telegram credentials not set, notifications go to the log only");
        }

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            target,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Send a message and report the outcome
    ///
    /// Endpoint: POST /bot{token}/sendMessage
    pub async fn try_send(&self, text: &str) -> Result<(), NotifyError> {
        let Some(target) = &self.target else {
            tracing::info!(message = %text, "Notification (log only)");
            return Ok(());
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, target.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &target.chat_id,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotifyError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) {
        if let Err(e) = self.try_send(text).await {
            tracing::warn!("Telegram delivery failed: {}", e);
        }
    }
}
