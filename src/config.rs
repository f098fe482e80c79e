//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every scan constant has a default, so a minimal file only needs to
//! name what it changes. Secrets (Telegram token, chat id) are referenced
//! by env-var name in the config and resolved at startup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::{ScanError, Timeframe};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Exchange identifier, e.g. `bingx`.
    #[serde(default = "default_exchange_id")]
    pub id: String,
    /// Override for the REST base URL (testing, proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            id: default_exchange_id(),
            base_url: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Candle bucket size, e.g. `15m`.
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Candles requested per instrument.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Candles before the latest one that form the baseline.
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Latest volume must exceed `multiplier * mean` for the ratio rule.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_zscore_threshold")]
    pub zscore_threshold: f64,
    /// Absolute volume floor for the ratio rule.
    #[serde(default = "default_min_volume")]
    pub min_volume: f64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Settlement currency of eligible contracts.
    #[serde(default = "default_settlement_suffix")]
    pub settlement_suffix: String,
    /// Pause (seconds) a worker takes after each instrument.
    #[serde(default = "default_rate_limit_sleep")]
    pub rate_limit_sleep: f64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeframe: default_timeframe(),
            history_limit: default_history_limit(),
            lookback: default_lookback(),
            multiplier: default_multiplier(),
            zscore_threshold: default_zscore_threshold(),
            min_volume: default_min_volume(),
            max_workers: default_max_workers(),
            settlement_suffix: default_settlement_suffix(),
            rate_limit_sleep: default_rate_limit_sleep(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    /// How many of the top-ranked verdicts are considered for the message.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// A verdict is listed only if its z-score is strictly above this.
    #[serde(default = "default_min_zscore")]
    pub min_zscore: f64,
    /// List ratio-only spikes (no z-score) as `z=n/a` instead of dropping them.
    #[serde(default)]
    pub include_multiplier_only: bool,
    #[serde(default)]
    pub telegram_bot_token_env: Option<String>,
    #[serde(default)]
    pub telegram_chat_id_env: Option<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            min_zscore: default_min_zscore(),
            include_multiplier_only: false,
            telegram_bot_token_env: None,
            telegram_chat_id_env: None,
        }
    }
}

fn default_exchange_id() -> String {
    "bingx".to_string()
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_timeframe() -> String {
    "15m".to_string()
}
fn default_history_limit() -> usize {
    50
}
fn default_lookback() -> usize {
    20
}
fn default_multiplier() -> f64 {
    3.0
}
fn default_zscore_threshold() -> f64 {
    3.0
}
fn default_min_volume() -> f64 {
    1e6
}
fn default_max_workers() -> usize {
    5
}
fn default_settlement_suffix() -> String {
    "USDT".to_string()
}
fn default_rate_limit_sleep() -> f64 {
    0.3
}
fn default_check_interval_secs() -> u64 {
    15 * 60
}
fn default_top_n() -> usize {
    10
}
fn default_min_zscore() -> f64 {
    5.0
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which the scanner can't do meaningful work.
    pub fn validate(&self) -> Result<(), ScanError> {
        let s = &self.scan;
        let bad = |msg: String| Err(ScanError::Config(msg));

        if self.exchange.id.trim().is_empty() {
            return bad("exchange.id must not be empty".into());
        }
        if let Err(e) = s.timeframe.parse::<Timeframe>() {
            return bad(e.to_string());
        }
        if s.lookback < 3 {
            return bad(format!("scan.lookback must be at least 3, got {}", s.lookback));
        }
        if s.history_limit < s.lookback + 2 {
            return bad(format!(
                "scan.history_limit ({}) must be at least lookback + 2 ({})",
                s.history_limit,
                s.lookback + 2
            ));
        }
        if s.max_workers == 0 {
            return bad("scan.max_workers must be at least 1".into());
        }
        if !s.multiplier.is_finite() || s.multiplier <= 0.0 {
            return bad(format!("scan.multiplier must be positive, got {}", s.multiplier));
        }
        if !s.zscore_threshold.is_finite() {
            return bad("scan.zscore_threshold must be finite".into());
        }
        if !s.min_volume.is_finite() || s.min_volume < 0.0 {
            return bad(format!("scan.min_volume must be >= 0, got {}", s.min_volume));
        }
        if Duration::try_from_secs_f64(s.rate_limit_sleep).is_err() {
            return bad(format!(
                "scan.rate_limit_sleep must be a non-negative number of seconds, got {}",
                s.rate_limit_sleep
            ));
        }
        if s.check_interval_secs == 0 {
            return bad("scan.check_interval_secs must be at least 1".into());
        }
        if s.settlement_suffix.trim().is_empty() {
            return bad("scan.settlement_suffix must not be empty".into());
        }
        if self.alerts.top_n == 0 {
            return bad("alerts.top_n must be at least 1".into());
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl ScanConfig {
    /// Parsed timeframe. Falls back to 15m only if `validate` was skipped.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe.parse().unwrap_or(Timeframe::M15)
    }

    /// Zero if the value is out of range, which `validate` rejects up front.
    pub fn rate_limit_sleep(&self) -> Duration {
        Duration::try_from_secs_f64(self.rate_limit_sleep).unwrap_or(Duration::ZERO)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}
