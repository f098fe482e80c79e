//! Candle history fetcher.
//!
//! Wraps `ExchangeClient::fetch_candles` and normalises whatever the venue
//! returns into a clean window: ascending, one candle per open time, at
//! most `limit` long, finite non-negative volumes.

use std::sync::Arc;
use tracing::debug;

use crate::exchange::ExchangeClient;
use crate::types::{Candle, ExchangeError, HistoryWindow, ScanError, Timeframe};

pub struct SeriesFetcher {
    exchange: Arc<dyn ExchangeClient>,
}

impl SeriesFetcher {
    pub fn new(exchange: Arc<dyn ExchangeClient>) -> Self {
        Self { exchange }
    }

    /// Fetch the most recent `limit` candles for `instrument`.
    ///
    /// Every failure is reported as `FetchFailed` for this instrument only.
    pub async fn fetch_history(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<HistoryWindow, ScanError> {
        let fail = |cause| ScanError::FetchFailed {
            instrument: instrument.to_string(),
            cause,
        };

        let raw = self
            .exchange
            .fetch_candles(instrument, timeframe, limit)
            .await
            .map_err(fail)?;
        let fetched = raw.len();

        let window = normalise(raw, limit).map_err(fail)?;

        debug!(instrument, fetched, kept = window.len(), "History fetched");
        Ok(window)
    }
}

/// Sort ascending, collapse duplicate open times (last wins), keep the
/// newest `limit` candles. Rejects non-finite or negative volumes.
pub fn normalise(mut candles: Vec<Candle>, limit: usize) -> Result<HistoryWindow, ExchangeError> {
    if let Some(bad) = candles
        .iter()
        .find(|c| !c.volume.is_finite() || c.volume < 0.0)
    {
        return Err(ExchangeError::Malformed(format!(
            "invalid volume {} at {}",
            bad.volume, bad.open_time
        )));
    }

    // Stable, so among equal open times the later-received candle stays last.
    candles.sort_by_key(|c| c.open_time);

    let mut window: HistoryWindow = Vec::with_capacity(candles.len());
    for c in candles {
        match window.last_mut() {
            Some(prev) if prev.open_time == c.open_time => *prev = c,
            _ => window.push(c),
        }
    }

    if window.len() > limit {
        window.drain(..window.len() - limit);
    }

    Ok(window)
}
