//! Exchange integrations.
//!
//! Defines the `ExchangeClient` trait and provides an implementation for:
//! - BingX perpetual swaps (USDT-settled standard contracts)

pub mod bingx;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ExchangeConfig;
use crate::types::{Candle, ExchangeError, MarketDescriptor, Timeframe};

/// Read-only market data access.
///
/// Implementations are shared across scan workers behind an `Arc`, so
/// every call must be self-contained (no per-call session state).
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Load every listed market, keyed by unified instrument id.
    async fn load_markets(&self) -> Result<HashMap<String, MarketDescriptor>, ExchangeError>;

    /// Fetch up to `limit` recent candles for `instrument` (unified id).
    /// Ordering is whatever the venue returns; callers normalise it.
    async fn fetch_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Exchange name for logging and alert headers.
    fn name(&self) -> &str;
}

/// Build the client named by `cfg.id`. An unknown id is a startup error.
pub fn connect(cfg: &ExchangeConfig) -> Result<Arc<dyn ExchangeClient>> {
    match cfg.id.to_lowercase().as_str() {
        "bingx" => Ok(Arc::new(bingx::BingxClient::new(cfg)?)),
        other => bail!("Unsupported exchange id: {other}"),
    }
}
