//! Cycle supervisor.
//!
//! Runs scan → alert cycles back to back with a fixed pause in between.
//! Every failure inside a cycle, panics included, comes back as a typed
//! result that is logged; the loop itself only stops on shutdown.

use chrono::Utc;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::scanner::ScanOrchestrator;
use crate::alerts::{AlertPolicy, Notifier};
use crate::types::{CycleReport, ScanError};

pub struct Supervisor {
    scanner: ScanOrchestrator,
    notifier: Arc<dyn Notifier>,
    policy: AlertPolicy,
    check_interval: Duration,
}

impl Supervisor {
    pub fn new(
        scanner: ScanOrchestrator,
        notifier: Arc<dyn Notifier>,
        policy: AlertPolicy,
        check_interval: Duration,
    ) -> Self {
        Self {
            scanner,
            notifier,
            policy,
            check_interval,
        }
    }

    /// One scan followed by at most one alert.
    ///
    /// A missing catalog ends the cycle early with an empty report; a
    /// delivery failure is logged and leaves `notified` false.
    pub async fn run_cycle(&self, cycle_number: u64) -> Result<CycleReport, ScanError> {
        let mut report = CycleReport {
            cycle_number,
            ..CycleReport::default()
        };

        let result = match self.scanner.scan().await {
            Ok(r) => r,
            Err(e @ ScanError::CatalogUnavailable(_)) => {
                error!(error = %e, "Market catalog unavailable, skipping cycle");
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        report.catalog_available = true;
        report.instruments = result.instruments;
        report.failed = result.failed;
        report.insufficient = result.insufficient;
        report.spikes = result.len();

        for v in result.verdicts.iter().take(self.policy.top_n) {
            debug!(verdict = %v, "Spike");
        }

        match self.policy.compose(&result, Utc::now()) {
            Some(message) => match self.notifier.deliver(&message).await {
                Ok(()) => {
                    report.notified = true;
                    info!(spikes = report.spikes, "Alert sent");
                }
                Err(e) => warn!(error = %e, "Alert delivery failed"),
            },
            None if result.is_empty() => info!("No volume spikes this cycle"),
            None => info!(
                spikes = report.spikes,
                min_zscore = self.policy.min_zscore,
                "Spikes found, none strong enough to alert"
            ),
        }

        Ok(report)
    }

    /// `run_cycle` with panics turned into `ScanError::Cycle`.
    pub async fn run_guarded(&self, cycle_number: u64) -> Result<CycleReport, ScanError> {
        AssertUnwindSafe(self.run_cycle(cycle_number))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ScanError::Cycle(format!("panicked: {msg}")))
            })
    }

    /// Loop until `shutdown` resolves. Shutdown is only observed between
    /// cycles; a running cycle always finishes. Returns the cycle count.
    pub async fn run_forever<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycle = 0u64;

        info!(
            interval_secs = self.check_interval.as_secs(),
            "Entering scan loop. Press Ctrl+C to stop."
        );

        loop {
            cycle += 1;
            let span = info_span!("cycle", n = cycle, id = %Uuid::new_v4());

            match self.run_guarded(cycle).instrument(span).await {
                Ok(report) => log_cycle_report(&report),
                Err(e) => error!(cycle, error = %e, "Cycle failed, continuing to next"),
            }

            info!(
                wait_secs = self.check_interval.as_secs(),
                "Waiting before next scan"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }

        cycle
    }
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    if report.catalog_available {
        info!(cycle = report.cycle_number, report = %report, "Cycle complete");
    } else {
        warn!(cycle = report.cycle_number, report = %report, "Cycle skipped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
