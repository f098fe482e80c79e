//! Mock exchange for integration testing.
//!
//! Provides a deterministic `ExchangeClient` implementation that serves
//! known markets and candle series from memory, with controllable
//! per-instrument failures, latency, and in-flight tracking.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use volscan::exchange::ExchangeClient;
use volscan::types::*;

pub const T0: i64 = 1_700_000_000_000;
pub const STEP: i64 = 900_000;

/// A mock exchange for deterministic testing.
///
/// All state is in-memory. Markets, candle series and failures are
/// fully controllable from test code.
pub struct MockExchange {
    markets: HashMap<String, MarketDescriptor>,
    series: HashMap<String, Vec<f64>>,
    failures: HashMap<String, ExchangeError>,
    /// If set, `load_markets` returns this error.
    catalog_error: Mutex<Option<ExchangeError>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetches: Mutex<Vec<String>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            markets: HashMap::new(),
            series: HashMap::new(),
            failures: HashMap::new(),
            catalog_error: Mutex::new(None),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// List a USDT-settled perpetual with the given volume series
    /// (oldest first).
    pub fn with_swap(mut self, base: &str, volumes: Vec<f64>) -> Self {
        let m = MarketDescriptor::swap(base, "USDT", "USDT", &format!("{base}-USDT"));
        self.series.insert(m.id.clone(), volumes);
        self.markets.insert(m.id.clone(), m);
        self
    }

    /// List a market that the catalog must filter out.
    pub fn with_listing(mut self, market: MarketDescriptor) -> Self {
        self.markets.insert(market.id.clone(), market);
        self
    }

    /// Make every candle fetch for `base` fail with `error`.
    pub fn failing(mut self, base: &str, error: ExchangeError) -> Self {
        self.failures.insert(format!("{base}/USDT:USDT"), error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_catalog_error(&self, error: Option<ExchangeError>) {
        *self.catalog_error.lock().unwrap() = error;
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn load_markets(&self) -> Result<HashMap<String, MarketDescriptor>, ExchangeError> {
        if let Some(err) = self.catalog_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.markets.clone())
    }

    async fn fetch_candles(
        &self,
        instrument: &str,
        _timeframe: Timeframe,
        _limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.fetches.lock().unwrap().push(instrument.to_string());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = match self.failures.get(instrument) {
            Some(err) => Err(err.clone()),
            None => match self.series.get(instrument) {
                // Newest first and untrimmed; the fetcher must normalise.
                Some(vols) => Ok(vols
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(i, v)| Candle::with_volume(T0 + i as i64 * STEP, *v))
                    .collect()),
                None => Err(ExchangeError::UnknownInstrument(instrument.to_string())),
            },
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// `n` baseline candles of `base` volume followed by one of `last`.
pub fn flat_then(n: usize, base: f64, last: f64) -> Vec<f64> {
    let mut v = vec![base; n];
    v.push(last);
    v
}

/// `n` baseline candles alternating `base - spread` / `base + spread`
/// (mean `base`, population stdev `spread` for even `n`), then `last`.
pub fn noisy_then(n: usize, base: f64, spread: f64, last: f64) -> Vec<f64> {
    let mut v: Vec<f64> = (0..n)
        .map(|i| if i % 2 == 0 { base - spread } else { base + spread })
        .collect();
    v.push(last);
    v
}
