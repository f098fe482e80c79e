//! Shared types for the VOLSCAN scanner.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that exchange, strategy,
//! and engine modules can depend on them without circular references.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market metadata
// ---------------------------------------------------------------------------

/// Kind of instrument listed by an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketKind {
    Spot,
    /// Perpetual swap (no expiry).
    Swap,
    /// Dated future.
    Future,
    Option,
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Spot => write!(f, "spot"),
            MarketKind::Swap => write!(f, "swap"),
            MarketKind::Future => write!(f, "future"),
            MarketKind::Option => write!(f, "option"),
        }
    }
}

/// Exchange descriptor for one listed instrument.
///
/// `id` is the unified identifier (`BTC/USDT:USDT` for a USDT-settled
/// perpetual, `BTC/USDT` for spot); `exchange_symbol` is what the venue's
/// REST API expects on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDescriptor {
    pub id: String,
    pub exchange_symbol: String,
    pub kind: MarketKind,
    /// Whether the instrument is a derivative contract.
    pub contract: bool,
    /// Settlement currency (derivatives only).
    pub settle: Option<String>,
    /// Trading status. Absent means the venue didn't say; treat as active.
    pub active: Option<bool>,
}

impl MarketDescriptor {
    /// Helper to build a perpetual swap descriptor from its parts.
    pub fn swap(base: &str, quote: &str, settle: &str, exchange_symbol: &str) -> Self {
        Self {
            id: format!("{base}/{quote}:{settle}"),
            exchange_symbol: exchange_symbol.to_string(),
            kind: MarketKind::Swap,
            contract: true,
            settle: Some(settle.to_string()),
            active: Some(true),
        }
    }

    /// Helper to build a spot descriptor from its parts.
    pub fn spot(base: &str, quote: &str, exchange_symbol: &str) -> Self {
        Self {
            id: format!("{base}/{quote}"),
            exchange_symbol: exchange_symbol.to_string(),
            kind: MarketKind::Spot,
            contract: false,
            settle: None,
            active: Some(true),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// Candles
// ---------------------------------------------------------------------------

/// One OHLCV bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket open time, ms since epoch.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Flat candle carrying only a timestamp and a volume (tests, fixtures).
    pub fn with_volume(open_time: i64, volume: f64) -> Self {
        Self {
            open_time,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume,
        }
    }
}

/// Ascending, bounded candle history for one instrument.
pub type HistoryWindow = Vec<Candle>;

/// Candle bucket size accepted by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
    Mo1,
}

impl Timeframe {
    /// Exchange wire representation (`15m`, `1h`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
            Timeframe::Mo1 => "1M",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-sensitive: `1m` is one minute, `1M` is one month.
impl std::str::FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Timeframe::M1),
            "3m" => Ok(Timeframe::M3),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "6h" => Ok(Timeframe::H6),
            "8h" => Ok(Timeframe::H8),
            "12h" => Ok(Timeframe::H12),
            "1d" => Ok(Timeframe::D1),
            "3d" => Ok(Timeframe::D3),
            "1w" => Ok(Timeframe::W1),
            "1M" => Ok(Timeframe::Mo1),
            other => Err(anyhow::anyhow!("Unknown timeframe: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection output
// ---------------------------------------------------------------------------

/// Guard added to the mean when ranking verdicts that have no z-score.
pub const RANK_EPSILON: f64 = 1e-9;

/// A fired volume-spike signal for one instrument in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeVerdict {
    pub instrument: String,
    /// Volume of the most recent candle.
    pub volume_now: f64,
    /// Mean volume over the lookback candles before the most recent one.
    pub mean_prev: f64,
    /// Population standard deviation over the same candles.
    pub stdev_prev: f64,
    /// Present iff `stdev_prev > 0`.
    pub zscore: Option<f64>,
    /// Fired rules, multiplier rule first.
    pub reasons: Vec<String>,
    /// Open time of the most recent candle (ms).
    pub timestamp: i64,
}

impl SpikeVerdict {
    /// Ranking key: the z-score when there is one, otherwise the
    /// volume-to-mean ratio. The two scales are not comparable; verdicts
    /// of both kinds are still placed in one order.
    pub fn rank_key(&self) -> f64 {
        match self.zscore {
            Some(z) => z,
            None => self.volume_now / (self.mean_prev + RANK_EPSILON),
        }
    }

    /// Volume expressed as a multiple of the lookback mean.
    pub fn ratio(&self) -> f64 {
        self.volume_now / (self.mean_prev + RANK_EPSILON)
    }
}

impl fmt::Display for SpikeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let z = match self.zscore {
            Some(z) => format!("{z:.2}"),
            None => "n/a".to_string(),
        };
        write!(
            f,
            "{} vol={:.0} mean={:.0} x{:.1} z={} [{}]",
            self.instrument,
            self.volume_now,
            self.mean_prev,
            self.ratio(),
            z,
            self.reasons.join("; "),
        )
    }
}

/// Ranked verdicts for one scan cycle, plus what happened to the rest.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Sorted descending by [`SpikeVerdict::rank_key`].
    pub verdicts: Vec<SpikeVerdict>,
    /// Instruments the catalog returned for this cycle.
    pub instruments: usize,
    /// Instruments whose fetch (or task) failed.
    pub failed: usize,
    /// Instruments with too little history to analyse.
    pub insufficient: usize,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of a single scan-and-alert cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub instruments: usize,
    pub failed: usize,
    pub insufficient: usize,
    pub spikes: usize,
    /// Whether the catalog could be loaded at all.
    pub catalog_available: bool,
    /// Whether an alert message was delivered.
    pub notified: bool,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.catalog_available {
            return write!(f, "Cycle #{}: market catalog unavailable", self.cycle_number);
        }
        write!(
            f,
            "Cycle #{}: instruments={} failed={} short={} spikes={} notified={}",
            self.cycle_number,
            self.instruments,
            self.failed,
            self.insufficient,
            self.spikes,
            self.notified,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure talking to the exchange.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("exchange API error {code}: {message}")]
    Api { code: i64, message: String },
}

/// Scanner error taxonomy. Each variant is contained at its own scope:
/// instrument failures never end a cycle, cycle failures never end the process.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("market catalog unavailable: {0}")]
    CatalogUnavailable(#[source] ExchangeError),

    #[error("fetch failed for {instrument}: {cause}")]
    FetchFailed {
        instrument: String,
        #[source]
        cause: ExchangeError,
    },

    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("cycle failed: {0}")]
    Cycle(String),

    #[error("configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
