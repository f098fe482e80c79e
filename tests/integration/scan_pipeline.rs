//! End-to-end scan cycles: catalog → fetch → detect → rank → alert.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use volscan::alerts::{AlertPolicy, Notifier};
use volscan::config::{AlertsConfig, ScanConfig};
use volscan::engine::scanner::ScanOrchestrator;
use volscan::engine::supervisor::Supervisor;
use volscan::types::*;

use crate::mock_exchange::{flat_then, noisy_then, MockExchange, STEP, T0};

/// Records every message instead of sending it.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, message: &str) -> Result<(), ScanError> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

fn fast_config() -> ScanConfig {
    ScanConfig {
        rate_limit_sleep: 0.0,
        max_workers: 4,
        ..ScanConfig::default()
    }
}

fn supervisor_with(exchange: Arc<MockExchange>, notifier: Arc<RecordingNotifier>) -> Supervisor {
    let cfg = fast_config();
    Supervisor::new(
        ScanOrchestrator::new(exchange, &cfg),
        notifier,
        AlertPolicy::new(&AlertsConfig::default(), "Mock", Timeframe::M15),
        Duration::from_millis(5),
    )
}

fn ids(result: &ScanResult) -> Vec<&str> {
    result.verdicts.iter().map(|v| v.instrument.as_str()).collect()
}

// -- Detection through the full pipeline ---------------------------------

#[tokio::test]
async fn test_flat_history_multiplier_spike() {
    // 21 flat candles at 1e6, then 5e6.
    let exchange = MockExchange::new()
        .with_swap("BTC", flat_then(21, 1_000_000.0, 5_000_000.0))
        .shared();
    let result = ScanOrchestrator::new(exchange, &fast_config())
        .scan()
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    let v = &result.verdicts[0];
    assert_eq!(v.instrument, "BTC/USDT:USDT");
    assert_eq!(v.mean_prev, 1_000_000.0);
    assert_eq!(v.stdev_prev, 0.0);
    assert!(v.zscore.is_none());
    assert_eq!(v.reasons.len(), 1);
    assert!(v.reasons[0].starts_with("multiplier:"));
    assert_eq!(v.timestamp, T0 + 21 * STEP);
}

#[tokio::test]
async fn test_history_is_trimmed_to_limit_before_detection() {
    // 60 candles served, limit 50. The first 10 are enormous and must not
    // leak into anything; the lookback only sees the 1e6 baseline anyway.
    let mut vols = vec![9_000_000_000.0; 10];
    vols.extend(flat_then(49, 1_000_000.0, 5_000_000.0));
    let exchange = MockExchange::new().with_swap("ETH", vols).shared();

    let result = ScanOrchestrator::new(exchange, &fast_config())
        .scan()
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.verdicts[0].mean_prev, 1_000_000.0);
    assert_eq!(result.verdicts[0].timestamp, T0 + 59 * STEP);
}

#[tokio::test]
async fn test_short_history_skipped_not_failed() {
    let exchange = MockExchange::new()
        .with_swap("NEW", flat_then(10, 1_000_000.0, 50_000_000.0))
        .shared();
    let result = ScanOrchestrator::new(exchange, &fast_config())
        .scan()
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.insufficient, 1);
    assert_eq!(result.failed, 0);
}

// -- Failure isolation ---------------------------------------------------

#[tokio::test]
async fn test_timeout_does_not_block_others() {
    let exchange = MockExchange::new()
        .with_swap("BTC", noisy_then(21, 1_000_000.0, 100_000.0, 2_000_000.0))
        .with_swap("ETH", noisy_then(21, 1_000_000.0, 100_000.0, 3_000_000.0))
        .with_swap("SOL", flat_then(21, 1_000_000.0, 4_000_000.0))
        .failing("ETH", ExchangeError::Timeout)
        .shared();

    let result = ScanOrchestrator::new(exchange.clone(), &fast_config())
        .scan()
        .await
        .unwrap();

    assert_eq!(result.instruments, 3);
    assert_eq!(result.failed, 1);
    assert!(!ids(&result).contains(&"ETH/USDT:USDT"));
    assert_eq!(ids(&result), vec!["BTC/USDT:USDT", "SOL/USDT:USDT"]);
    assert_eq!(exchange.fetched().len(), 3);
}

#[tokio::test]
async fn test_unknown_and_malformed_instruments_isolated() {
    let mut nan_series = flat_then(21, 1_000_000.0, 5_000_000.0);
    nan_series[3] = f64::NAN;

    let exchange = MockExchange::new()
        .with_swap("BTC", flat_then(21, 1_000_000.0, 5_000_000.0))
        .with_swap("NAN", nan_series)
        .with_listing(MarketDescriptor::swap("GHOST", "USDT", "USDT", "GHOST-USDT"))
        .shared();

    let result = ScanOrchestrator::new(exchange, &fast_config())
        .scan()
        .await
        .unwrap();

    assert_eq!(result.instruments, 3);
    assert_eq!(result.failed, 2);
    assert_eq!(ids(&result), vec!["BTC/USDT:USDT"]);
}

#[tokio::test]
async fn test_catalog_failure_is_catalog_unavailable() {
    let exchange = MockExchange::new()
        .with_swap("BTC", flat_then(21, 1_000_000.0, 5_000_000.0))
        .shared();
    exchange.set_catalog_error(Some(ExchangeError::Network("connection reset".into())));

    let err = ScanOrchestrator::new(exchange.clone(), &fast_config())
        .scan()
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::CatalogUnavailable(_)));
    assert!(exchange.fetched().is_empty());
}

// -- Catalog filtering ---------------------------------------------------

#[tokio::test]
async fn test_only_eligible_markets_are_fetched() {
    let mut halted = MarketDescriptor::swap("HALT", "USDT", "USDT", "HALT-USDT");
    halted.active = Some(false);

    let exchange = MockExchange::new()
        .with_swap("BTC", flat_then(21, 1_000_000.0, 1_000_000.0))
        .with_swap("ADA", flat_then(21, 1_000_000.0, 1_000_000.0))
        .with_listing(MarketDescriptor::spot("BTC", "USDT", "BTC-USDT"))
        .with_listing(MarketDescriptor::swap("ETH", "USD", "USD", "ETH-USD"))
        .with_listing(halted)
        .shared();

    let cfg = ScanConfig {
        max_workers: 1,
        ..fast_config()
    };
    let result = ScanOrchestrator::new(exchange.clone(), &cfg)
        .scan()
        .await
        .unwrap();

    assert_eq!(result.instruments, 2);
    // One worker drains the queue in catalog (sorted) order.
    assert_eq!(exchange.fetched(), vec!["ADA/USDT:USDT", "BTC/USDT:USDT"]);
}

// -- Concurrency and pacing ----------------------------------------------

#[tokio::test]
async fn test_in_flight_bounded_by_max_workers() {
    let mut exchange = MockExchange::new().with_latency(Duration::from_millis(20));
    for i in 0..12 {
        exchange = exchange.with_swap(&format!("C{i:02}"), flat_then(21, 1_000_000.0, 1_000_000.0));
    }
    let exchange = exchange.shared();

    let cfg = ScanConfig {
        max_workers: 3,
        ..fast_config()
    };
    let result = ScanOrchestrator::new(exchange.clone(), &cfg)
        .scan()
        .await
        .unwrap();

    assert_eq!(result.instruments, 12);
    assert_eq!(exchange.fetched().len(), 12);
    assert!(exchange.max_in_flight() <= 3, "saw {}", exchange.max_in_flight());
    assert!(exchange.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_worker_pauses_after_each_instrument() {
    let exchange = MockExchange::new()
        .with_swap("A", flat_then(21, 1.0, 1.0))
        .with_swap("B", flat_then(21, 1.0, 1.0))
        .with_swap("C", flat_then(21, 1.0, 1.0))
        .shared();

    let cfg = ScanConfig {
        max_workers: 1,
        rate_limit_sleep: 0.05,
        ..ScanConfig::default()
    };
    let started = Instant::now();
    ScanOrchestrator::new(exchange, &cfg).scan().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn test_ranking_independent_of_completion_order() {
    let build = || {
        MockExchange::new()
            .with_swap("AAA", noisy_then(21, 1_000_000.0, 100_000.0, 1_600_000.0)) // z=6
            .with_swap("BBB", flat_then(21, 1_000_000.0, 8_000_000.0)) // ratio 8
            .with_swap("CCC", noisy_then(21, 1_000_000.0, 100_000.0, 2_500_000.0)) // z=15
            .with_swap("DDD", noisy_then(21, 1_000_000.0, 100_000.0, 1_400_000.0)) // z=4
            .with_swap("EEE", flat_then(21, 1_000_000.0, 1_000_000.0)) // quiet
            .shared()
    };

    let serial = ScanOrchestrator::new(
        build(),
        &ScanConfig {
            max_workers: 1,
            ..fast_config()
        },
    )
    .scan()
    .await
    .unwrap();
    let parallel = ScanOrchestrator::new(
        build(),
        &ScanConfig {
            max_workers: 5,
            ..fast_config()
        },
    )
    .scan()
    .await
    .unwrap();

    let expected = vec!["CCC/USDT:USDT", "BBB/USDT:USDT", "AAA/USDT:USDT", "DDD/USDT:USDT"];
    assert_eq!(ids(&serial), expected);
    assert_eq!(ids(&parallel), expected);
}

// -- Alerting ------------------------------------------------------------

#[tokio::test]
async fn test_quiet_cycle_sends_nothing() {
    let exchange = MockExchange::new()
        .with_swap("BTC", flat_then(21, 1_000_000.0, 1_000_000.0))
        .with_swap("ETH", noisy_then(21, 1_000_000.0, 100_000.0, 1_000_000.0))
        .shared();
    let notifier = Arc::new(RecordingNotifier::default());

    let report = supervisor_with(exchange, notifier.clone())
        .run_cycle(1)
        .await
        .unwrap();

    assert_eq!(report.spikes, 0);
    assert!(!report.notified);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_weak_top_ten_sends_nothing() {
    // Twelve verdicts, all z = 4 or ratio-only: nothing above the z > 5 floor.
    let mut exchange = MockExchange::new();
    for i in 0..10 {
        exchange = exchange.with_swap(
            &format!("W{i:02}"),
            noisy_then(21, 1_000_000.0, 100_000.0, 1_400_000.0),
        );
    }
    exchange = exchange
        .with_swap("FLAT1", flat_then(21, 1_000_000.0, 9_000_000.0))
        .with_swap("FLAT2", flat_then(21, 1_000_000.0, 7_000_000.0));
    let notifier = Arc::new(RecordingNotifier::default());

    let report = supervisor_with(exchange.shared(), notifier.clone())
        .run_cycle(1)
        .await
        .unwrap();

    assert_eq!(report.spikes, 12);
    assert!(!report.notified);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_strong_spike_sends_one_message() {
    let exchange = MockExchange::new()
        .with_swap("PEPE", noisy_then(21, 1_000_000.0, 100_000.0, 2_000_000.0)) // z=10
        .with_swap("WIF", noisy_then(21, 1_000_000.0, 100_000.0, 1_400_000.0)) // z=4
        .with_swap("FLAT", flat_then(21, 1_000_000.0, 20_000_000.0)) // ratio 20
        .shared();
    let notifier = Arc::new(RecordingNotifier::default());

    let report = supervisor_with(exchange, notifier.clone())
        .run_cycle(1)
        .await
        .unwrap();

    assert!(report.notified);
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);

    let lines: Vec<&str> = messages[0].lines().collect();
    assert!(lines[0].starts_with("Volume spike: 3 instruments (Mock perpetuals, 15m) at "));
    assert!(lines[0].ends_with(" UTC"));
    assert_eq!(lines[1], "");
    assert_eq!(lines[2], "PEPE/USDT:USDT: vol=2000000 mean=1000000 z=10.0");
    // Ratio-only and sub-threshold verdicts are not listed.
    assert_eq!(lines.len(), 3);
}

#[tokio::test]
async fn test_catalog_outage_then_recovery() {
    let exchange = MockExchange::new()
        .with_swap("PEPE", noisy_then(21, 1_000_000.0, 100_000.0, 2_000_000.0))
        .shared();
    let notifier = Arc::new(RecordingNotifier::default());
    let sup = supervisor_with(exchange.clone(), notifier.clone());

    exchange.set_catalog_error(Some(ExchangeError::Timeout));
    let down = sup.run_cycle(1).await.unwrap();
    assert!(!down.catalog_available);
    assert!(notifier.messages().is_empty());

    exchange.set_catalog_error(None);
    let up = sup.run_cycle(2).await.unwrap();
    assert!(up.catalog_available);
    assert!(up.notified);
    assert_eq!(notifier.messages().len(), 1);
}
