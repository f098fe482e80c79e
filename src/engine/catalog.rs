//! Market catalog.
//!
//! Turns the exchange's full market listing into the sorted list of
//! instruments a scan cycle will cover: active perpetual swaps settled
//! in the configured currency.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::exchange::ExchangeClient;
use crate::types::{MarketDescriptor, MarketKind, ScanError};

pub struct MarketCatalog {
    exchange: Arc<dyn ExchangeClient>,
    settlement: String,
}

impl MarketCatalog {
    pub fn new(exchange: Arc<dyn ExchangeClient>, settlement: impl Into<String>) -> Self {
        Self {
            exchange,
            settlement: settlement.into(),
        }
    }

    /// Load markets and return the eligible instrument ids, sorted.
    ///
    /// A failed market load is `CatalogUnavailable`; the caller decides
    /// what that means for the cycle.
    pub async fn list_instruments(&self) -> Result<Vec<String>, ScanError> {
        let markets = self
            .exchange
            .load_markets()
            .await
            .map_err(ScanError::CatalogUnavailable)?;

        let instruments = eligible_instruments(&markets, &self.settlement);

        info!(
            exchange = self.exchange.name(),
            listed = markets.len(),
            eligible = instruments.len(),
            settlement = %self.settlement,
            "Market catalog loaded"
        );

        Ok(instruments)
    }
}

/// Whether a market is a live perpetual swap settled in `settlement`.
pub fn is_eligible(market: &MarketDescriptor, settlement: &str) -> bool {
    market.contract
        && market.kind == MarketKind::Swap
        && market.settle.as_deref() == Some(settlement)
        && market.is_active()
}

/// Filter a market listing down to eligible ids, deduplicated and sorted.
pub fn eligible_instruments(
    markets: &HashMap<String, MarketDescriptor>,
    settlement: &str,
) -> Vec<String> {
    let set: BTreeSet<&str> = markets
        .iter()
        .filter(|(id, m)| {
            let keep = is_eligible(m, settlement);
            if !keep {
                debug!(instrument = %id, kind = %m.kind, settle = ?m.settle, "Market excluded");
            }
            keep
        })
        .map(|(id, _)| id.as_str())
        .collect();

    set.into_iter().map(String::from).collect()
}
