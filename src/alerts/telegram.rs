//! Telegram Bot API delivery.
//!
//! API docs: https://core.telegram.org/bots/api#sendmessage
//! Auth: bot token in the URL path, so it must never reach a log line.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::Notifier;
use crate::types::ScanError;

const BASE_URL: &str = "https://api.telegram.org";

/// Telegram rejects longer messages.
const MAX_MESSAGE_CHARS: usize = 4096;

pub struct TelegramNotifier {
    http: Client,
    token: SecretString,
    chat_id: String,
    base_url: String,
}

impl TelegramNotifier {
    /// `base_url` overrides the public API endpoint (local bot API servers).
    pub fn new(token: String, chat_id: String, base_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            token: SecretString::new(token),
            chat_id,
            base_url: base_url
                .unwrap_or_else(|| BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token.expose_secret())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, message: &str) -> Result<(), ScanError> {
        let text = truncate_chars(message, MAX_MESSAGE_CHARS);

        let resp = self
            .http
            .post(self.send_url())
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await
            .map_err(|e| ScanError::DeliveryFailed(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScanError::DeliveryFailed(format!(
                "Telegram API error {status}: {body}"
            )));
        }

        debug!(chat_id = %self.chat_id, chars = text.chars().count(), "Telegram alert sent");
        Ok(())
    }
}

/// Cut `s` to at most `max` characters on a char boundary.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
