//! BingX perpetual swap market data.
//!
//! Used to discover USDT-settled standard contracts and pull their
//! candle history. Only public endpoints are touched, so no API key
//! or request signing is needed.
//!
//! API docs: https://bingx-api.github.io/docs/
//! Base URL: https://open-api.bingx.com
//! Rate limit: market endpoints are limited per IP; the scanner's
//! worker pool and post-task pause keep well under it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ExchangeClient;
use crate::config::ExchangeConfig;
use crate::types::{Candle, ExchangeError, MarketDescriptor, Timeframe};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://open-api.bingx.com";
const EXCHANGE_NAME: &str = "BingX";

const SWAP_CONTRACTS_PATH: &str = "/openApi/swap/v2/quote/contracts";
const SPOT_SYMBOLS_PATH: &str = "/openApi/spot/v1/common/symbols";
const SWAP_KLINES_PATH: &str = "/openApi/swap/v3/quote/klines";

/// The klines endpoint refuses larger pages.
const MAX_KLINE_LIMIT: usize = 1440;

/// Error codes BingX returns for a symbol it doesn't list.
const UNKNOWN_SYMBOL_CODES: &[i64] = &[109400, 109425, 80014];

// ---------------------------------------------------------------------------
// API response types (BingX JSON → Rust)
// ---------------------------------------------------------------------------

/// Common envelope: `{"code": 0, "msg": "", "data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

/// One entry of `/openApi/swap/v2/quote/contracts`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapContract {
    /// Exchange symbol, `BTC-USDT`.
    symbol: String,
    /// Settlement currency.
    #[serde(default)]
    currency: Option<String>,
    /// 1 = trading; anything else is suspended or delisted.
    #[serde(default)]
    status: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SpotSymbols {
    #[serde(default)]
    symbols: Vec<SpotSymbol>,
}

#[derive(Debug, Deserialize)]
struct SpotSymbol {
    symbol: String,
    #[serde(default)]
    status: Option<i64>,
}

/// One entry of `/openApi/swap/v3/quote/klines`. Prices and volume
/// arrive as strings on some deployments and numbers on others.
#[derive(Debug, Deserialize)]
struct Kline {
    #[serde(deserialize_with = "lenient_f64")]
    open: f64,
    #[serde(deserialize_with = "lenient_f64")]
    close: f64,
    #[serde(deserialize_with = "lenient_f64")]
    high: f64,
    #[serde(deserialize_with = "lenient_f64")]
    low: f64,
    #[serde(deserialize_with = "lenient_f64")]
    volume: f64,
    time: i64,
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// BingX public market data client.
pub struct BingxClient {
    http: Client,
    base_url: String,
    /// Unified id → wire symbol, refreshed on every `load_markets`.
    symbols: RwLock<HashMap<String, String>>,
}

impl BingxClient {
    pub fn new(cfg: &ExchangeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs.max(1)))
            .user_agent("VOLSCAN/0.1.0 (volume-spike-scanner)")
            .build()
            .context("Failed to build HTTP client for BingX")?;

        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            base_url,
            symbols: RwLock::new(HashMap::new()),
        })
    }

    /// Wire symbol for `instrument`: the one the venue listed it under,
    /// else derived from the unified id.
    fn wire_symbol(&self, instrument: &str) -> Option<String> {
        let listed = match self.symbols.read() {
            Ok(map) => map.get(instrument).cloned(),
            Err(poisoned) => poisoned.into_inner().get(instrument).cloned(),
        };
        listed.or_else(|| to_exchange_symbol(instrument))
    }

    fn remember_symbols(&self, markets: &HashMap<String, MarketDescriptor>) {
        let fresh: HashMap<String, String> = markets
            .iter()
            .map(|(id, m)| (id.clone(), m.exchange_symbol.clone()))
            .collect();
        match self.symbols.write() {
            Ok(mut map) => *map = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
    }

    // -- Internal helpers ------------------------------------------------

    /// GET `path` with `query` and unwrap the BingX envelope.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "BingX request");

        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(classify_http_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(classify_http_error)?;

        if !status.is_success() {
            // BingX usually still sends its envelope on errors.
            if let Ok(env) = serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
                return Err(classify_api_error(env.code, env.msg));
            }
            return Err(ExchangeError::Network(format!("HTTP {status}: {body}")));
        }

        parse_envelope(&body)
    }

    async fn fetch_swap_markets(&self) -> Result<Vec<MarketDescriptor>, ExchangeError> {
        let contracts: Vec<SwapContract> = self.get(SWAP_CONTRACTS_PATH, &[]).await?;
        Ok(contracts.iter().filter_map(convert_swap).collect())
    }

    async fn fetch_spot_markets(&self) -> Result<Vec<MarketDescriptor>, ExchangeError> {
        let spot: SpotSymbols = self.get(SPOT_SYMBOLS_PATH, &[]).await?;
        Ok(spot.symbols.iter().filter_map(convert_spot).collect())
    }
}

#[async_trait]
impl ExchangeClient for BingxClient {
    async fn load_markets(&self) -> Result<HashMap<String, MarketDescriptor>, ExchangeError> {
        let (swaps, spots) = tokio::join!(self.fetch_swap_markets(), self.fetch_spot_markets());

        // Swaps are what we scan; without them there is no catalog.
        let swaps = swaps?;
        let spots = spots.unwrap_or_else(|e| {
            warn!(error = %e, "BingX spot symbols unavailable, continuing with swaps only");
            Vec::new()
        });

        info!(swaps = swaps.len(), spot = spots.len(), "BingX markets loaded");

        let markets: HashMap<String, MarketDescriptor> = spots
            .into_iter()
            .chain(swaps)
            .map(|m| (m.id.clone(), m))
            .collect();
        self.remember_symbols(&markets);
        Ok(markets)
    }

    async fn fetch_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let symbol = self
            .wire_symbol(instrument)
            .ok_or_else(|| ExchangeError::UnknownInstrument(instrument.to_string()))?;
        let limit = limit.clamp(1, MAX_KLINE_LIMIT);

        let klines: Vec<Kline> = self
            .get(
                SWAP_KLINES_PATH,
                &[
                    ("symbol", symbol),
                    ("interval", timeframe.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await
            .map_err(|e| match e {
                ExchangeError::UnknownInstrument(_) => {
                    ExchangeError::UnknownInstrument(instrument.to_string())
                }
                other => other,
            })?;

        Ok(klines.into_iter().map(convert_kline).collect())
    }

    fn name(&self) -> &str {
        EXCHANGE_NAME
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ExchangeError> {
    let env: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| ExchangeError::Malformed(format!("BingX response: {e}")))?;

    if env.code != 0 {
        return Err(classify_api_error(env.code, env.msg));
    }

    env.data
        .ok_or_else(|| ExchangeError::Malformed("BingX response has no data".into()))
}

fn classify_api_error(code: i64, msg: String) -> ExchangeError {
    let lower = msg.to_lowercase();
    if UNKNOWN_SYMBOL_CODES.contains(&code)
        || lower.contains("not exist")
        || lower.contains("invalid symbol")
    {
        ExchangeError::UnknownInstrument(msg)
    } else {
        ExchangeError::Api { code, message: msg }
    }
}

fn classify_http_error(e: reqwest::Error) -> ExchangeError {
    if e.is_timeout() {
        ExchangeError::Timeout
    } else if e.is_decode() {
        ExchangeError::Malformed(e.to_string())
    } else {
        ExchangeError::Network(e.to_string())
    }
}

/// Split `BTC-USDT` into `("BTC", "USDT")`.
fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once('-')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}

/// The id is built from the listed symbol, never the reported base asset:
/// `1000PEPE-USDT` reports asset `PEPE` but must stay distinct from a
/// plain `PEPE-USDT`.
fn convert_swap(c: &SwapContract) -> Option<MarketDescriptor> {
    let (base, quote) = split_symbol(&c.symbol)?;
    let settle = c.currency.as_deref().unwrap_or(quote);

    let mut m = MarketDescriptor::swap(base, quote, settle, &c.symbol);
    m.active = c.status.map(|s| s == 1);
    Some(m)
}

fn convert_spot(s: &SpotSymbol) -> Option<MarketDescriptor> {
    let (base, quote) = split_symbol(&s.symbol)?;
    let mut m = MarketDescriptor::spot(base, quote, &s.symbol);
    m.active = s.status.map(|st| st == 1);
    Some(m)
}

fn convert_kline(k: Kline) -> Candle {
    Candle {
        open_time: k.time,
        open: k.open,
        high: k.high,
        low: k.low,
        close: k.close,
        volume: k.volume,
    }
}

/// `BTC/USDT:USDT` → `BTC-USDT`.
fn to_exchange_symbol(instrument: &str) -> Option<String> {
    let pair = instrument.split(':').next()?;
    let (base, quote) = pair.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some(format!("{base}-{quote}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
