//! Alert composition and delivery.
//!
//! Defines the `Notifier` trait and provides implementations for:
//! - Telegram bot messages
//! - Dry-run logging (no credentials configured)
//!
//! `AlertPolicy` decides whether a cycle's result is worth a message and
//! renders it.

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AlertsConfig, AppConfig};
use crate::types::{ScanError, ScanResult, SpikeVerdict, Timeframe};

/// Delivers a rendered alert somewhere a human will see it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one message. Transport failures are `DeliveryFailed`.
    async fn deliver(&self, message: &str) -> Result<(), ScanError>;
}

/// Writes alerts to the log instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, message: &str) -> Result<(), ScanError> {
        info!(message = %message, "[DRY RUN] Would send alert");
        Ok(())
    }
}

/// Pick Telegram when both secrets resolve, otherwise fall back to a dry run.
pub fn build_notifier(cfg: &AlertsConfig) -> Result<Arc<dyn Notifier>> {
    let (Some(token_env), Some(chat_env)) = (
        cfg.telegram_bot_token_env.as_deref(),
        cfg.telegram_chat_id_env.as_deref(),
    ) else {
        info!("No Telegram credentials configured, alerts go to the log");
        return Ok(Arc::new(LogNotifier));
    };

    match (AppConfig::resolve_env(token_env), AppConfig::resolve_env(chat_env)) {
        (Ok(token), Ok(chat_id)) => Ok(Arc::new(telegram::TelegramNotifier::new(
            token, chat_id, None,
        )?)),
        (token, chat) => {
            warn!(
                token_set = token.is_ok(),
                chat_id_set = chat.is_ok(),
                "Telegram credentials incomplete, alerts go to the log"
            );
            Ok(Arc::new(LogNotifier))
        }
    }
}

// ---------------------------------------------------------------------------
// Alert policy
// ---------------------------------------------------------------------------

/// Which verdicts make it into a message, and how it is rendered.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    /// Only the first `top_n` ranked verdicts are considered.
    pub top_n: usize,
    /// Listed verdicts need a z-score strictly above this.
    pub min_zscore: f64,
    /// Also list verdicts without a z-score (ratio rule only).
    pub include_multiplier_only: bool,
    /// Venue label for the header.
    pub exchange: String,
    pub timeframe: Timeframe,
}

impl AlertPolicy {
    pub fn new(cfg: &AlertsConfig, exchange: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            top_n: cfg.top_n,
            min_zscore: cfg.min_zscore,
            include_multiplier_only: cfg.include_multiplier_only,
            exchange: exchange.into(),
            timeframe,
        }
    }

    /// Render the alert for `result`, or `None` if nothing qualifies.
    ///
    /// A verdict without a z-score is dropped unless
    /// `include_multiplier_only` is set, even if its ratio is large.
    pub fn compose(&self, result: &ScanResult, now: DateTime<Utc>) -> Option<String> {
        let lines: Vec<String> = result
            .verdicts
            .iter()
            .take(self.top_n)
            .filter_map(|v| self.line(v))
            .collect();

        if lines.is_empty() {
            return None;
        }

        let header = format!(
            "Volume spike: {} instruments ({} perpetuals, {}) at {}",
            result.len(),
            self.exchange,
            self.timeframe,
            now.format("%Y-%m-%d %H:%M:%S UTC"),
        );

        let mut msg = header;
        msg.push_str("\n\n");
        msg.push_str(&lines.join("\n"));
        Some(msg)
    }

    fn line(&self, v: &SpikeVerdict) -> Option<String> {
        let z = match v.zscore {
            // `{:?}` always keeps a fractional part: `10.0`, `7.25`.
            Some(z) if z > self.min_zscore => format!("{z:?}"),
            None if self.include_multiplier_only => "n/a".to_string(),
            _ => return None,
        };
        Some(format!(
            "{}: vol={:.0} mean={:.0} z={}",
            v.instrument, v.volume_now, v.mean_prev, z
        ))
    }
}
