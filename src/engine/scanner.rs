//! Concurrent volume scanner.
//!
//! One scan cycle: load the catalog once, then run fetch + detect for every
//! instrument on a fixed pool of `max_workers` tasks pulling from a shared
//! queue. Each worker pauses `rate_limit_sleep` after every instrument,
//! which caps throughput at roughly `max_workers / rate_limit_sleep`
//! requests per second across the batch. Outcomes flow back over a single
//! channel to the collector, which ranks the verdicts once every worker
//! has finished.

use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::catalog::MarketCatalog;
use super::fetcher::SeriesFetcher;
use crate::config::ScanConfig;
use crate::exchange::ExchangeClient;
use crate::strategy::{rank_verdicts, SpikeConfig, SpikeDetector};
use crate::types::{ScanError, ScanResult, SpikeVerdict, Timeframe};

// ---------------------------------------------------------------------------
// Per-instrument task
// ---------------------------------------------------------------------------

/// What happened to one instrument.
#[derive(Debug)]
enum Outcome {
    Spike(SpikeVerdict),
    Quiet,
    /// Fewer candles than the detector needs.
    Insufficient,
    Failed,
}

/// Fetch + detect for a single instrument. Shared read-only by all workers.
struct InstrumentTask {
    fetcher: SeriesFetcher,
    detector: SpikeDetector,
    timeframe: Timeframe,
    history_limit: usize,
}

impl InstrumentTask {
    async fn run(&self, instrument: &str) -> Outcome {
        let window = match self
            .fetcher
            .fetch_history(instrument, self.timeframe, self.history_limit)
            .await
        {
            Ok(w) => w,
            Err(e) => {
                warn!(instrument, error = %e, "Instrument skipped");
                return Outcome::Failed;
            }
        };

        if window.len() < self.detector.min_window() {
            debug!(
                instrument,
                candles = window.len(),
                needed = self.detector.min_window(),
                "Not enough history"
            );
            return Outcome::Insufficient;
        }

        match self.detector.detect(instrument, &window) {
            Some(v) => Outcome::Spike(v),
            None => Outcome::Quiet,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ScanOrchestrator {
    catalog: MarketCatalog,
    task: Arc<InstrumentTask>,
    max_workers: usize,
    rate_limit_sleep: Duration,
}

impl ScanOrchestrator {
    /// Wire up catalog, fetcher and detector from the scan configuration.
    pub fn new(exchange: Arc<dyn ExchangeClient>, cfg: &ScanConfig) -> Self {
        Self::from_parts(
            MarketCatalog::new(exchange.clone(), cfg.settlement_suffix.clone()),
            SeriesFetcher::new(exchange),
            SpikeDetector::new(SpikeConfig::from(cfg)),
            cfg,
        )
    }

    pub fn from_parts(
        catalog: MarketCatalog,
        fetcher: SeriesFetcher,
        detector: SpikeDetector,
        cfg: &ScanConfig,
    ) -> Self {
        Self {
            catalog,
            task: Arc::new(InstrumentTask {
                fetcher,
                detector,
                timeframe: cfg.timeframe(),
                history_limit: cfg.history_limit,
            }),
            max_workers: cfg.max_workers.max(1),
            rate_limit_sleep: cfg.rate_limit_sleep(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.task.timeframe
    }

    /// Run one full scan cycle.
    ///
    /// Only a catalog failure is returned as an error. Per-instrument
    /// failures and task panics are logged, counted, and otherwise ignored.
    pub async fn scan(&self) -> Result<ScanResult, ScanError> {
        let started = Instant::now();
        let instruments = self.catalog.list_instruments().await?;
        let total = instruments.len();

        let mut result = ScanResult {
            instruments: total,
            ..ScanResult::default()
        };
        if total == 0 {
            info!("No eligible instruments, nothing to scan");
            return Ok(result);
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(instruments)));
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();

        let workers = self.max_workers.min(total);
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            handles.push(tokio::spawn(run_worker(
                worker,
                queue.clone(),
                self.task.clone(),
                tx.clone(),
                self.rate_limit_sleep,
            )));
        }
        // Collector ends once every worker has dropped its sender.
        drop(tx);

        let mut verdicts = Vec::new();
        while let Some(outcome) = rx.recv().await {
            match outcome {
                Outcome::Spike(v) => verdicts.push(v),
                Outcome::Quiet => {}
                Outcome::Insufficient => result.insufficient += 1,
                Outcome::Failed => result.failed += 1,
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Scan worker terminated abnormally");
            }
        }

        // Only possible if every worker died early; count the leftovers as failed.
        let unclaimed = queue.lock().map(|q| q.len()).unwrap_or(0);
        if unclaimed > 0 {
            warn!(unclaimed, "Instruments left unscanned");
            result.failed += unclaimed;
        }

        // Back to catalog order first so equal keys don't depend on completion order.
        verdicts.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        result.verdicts = rank_verdicts(verdicts);

        info!(
            instruments = total,
            spikes = result.verdicts.len(),
            failed = result.failed,
            short = result.insufficient,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan complete"
        );

        Ok(result)
    }
}

/// Pull instruments until the queue is empty, pausing after each one.
async fn run_worker(
    worker: usize,
    queue: Arc<Mutex<VecDeque<String>>>,
    task: Arc<InstrumentTask>,
    tx: mpsc::UnboundedSender<Outcome>,
    pause: Duration,
) {
    loop {
        let next = match queue.lock() {
            Ok(mut q) => q.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        let Some(instrument) = next else {
            break;
        };

        let outcome = AssertUnwindSafe(task.run(&instrument))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                error!(
                    worker,
                    instrument = %instrument,
                    panic = panic_message(panic.as_ref()),
                    "Instrument task panicked"
                );
                Outcome::Failed
            });

        if tx.send(outcome).is_err() {
            break;
        }

        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
