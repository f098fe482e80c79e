//! Volume spike detection.
//!
//! Two cheap, complementary tests on the latest candle's volume:
//! - a ratio test against the lookback mean (scale-free, needs a real mean)
//! - a z-score test against the lookback distribution (works near zero mean)
//!
//! Both use the population standard deviation: the lookback window is
//! the whole population of interest, not a sample.

use tracing::debug;

use crate::config::ScanConfig;
use crate::types::{Candle, SpikeVerdict};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Below this many baseline candles the statistics are meaningless.
const MIN_BASELINE: usize = 3;

/// Spike detection thresholds.
#[derive(Debug, Clone)]
pub struct SpikeConfig {
    /// Candles before the latest one used as the baseline.
    pub lookback: usize,
    /// Ratio rule: latest volume must exceed `multiplier * mean`.
    pub multiplier: f64,
    /// Z-score rule: fires strictly above this.
    pub zscore_threshold: f64,
    /// Ratio rule: absolute volume floor.
    pub min_volume: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            multiplier: 3.0,
            zscore_threshold: 3.0,
            min_volume: 1e6,
        }
    }
}

impl From<&ScanConfig> for SpikeConfig {
    fn from(cfg: &ScanConfig) -> Self {
        Self {
            lookback: cfg.lookback,
            multiplier: cfg.multiplier,
            zscore_threshold: cfg.zscore_threshold,
            min_volume: cfg.min_volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Arithmetic mean. Caller guarantees `xs` is non-empty.
fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation (divisor N) around a precomputed mean.
fn pstdev(xs: &[f64], mean: f64) -> f64 {
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / xs.len() as f64;
    var.sqrt()
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct SpikeDetector {
    config: SpikeConfig,
}

impl SpikeDetector {
    pub fn new(config: SpikeConfig) -> Self {
        Self { config }
    }

    /// Smallest window `detect` will look at.
    pub fn min_window(&self) -> usize {
        self.config.lookback + 2
    }

    /// Judge whether the latest candle in `window` is a volume spike.
    ///
    /// `window` must be ascending by time. Returns `None` when the window
    /// is too short or neither rule fires.
    pub fn detect(&self, instrument: &str, window: &[Candle]) -> Option<SpikeVerdict> {
        let cfg = &self.config;

        if window.len() < self.min_window() {
            return None;
        }

        let last = window.last()?;
        let volume_now = last.volume;

        let end = window.len() - 1;
        let prev_vols: Vec<f64> = window[end - cfg.lookback..end]
            .iter()
            .map(|c| c.volume)
            .collect();
        if prev_vols.len() < MIN_BASELINE {
            return None;
        }

        let mean = mean(&prev_vols);
        let stdev = pstdev(&prev_vols, mean);

        let mut reasons = Vec::new();

        if mean > 0.0 && volume_now > cfg.multiplier * mean && volume_now >= cfg.min_volume {
            reasons.push(format!(
                "multiplier: {volume_now:.0} > {}*{mean:.0}",
                cfg.multiplier
            ));
        }

        let zscore = if stdev > 0.0 {
            let z = (volume_now - mean) / stdev;
            if z > cfg.zscore_threshold {
                reasons.push(format!("zscore: {z:.2} > {}", cfg.zscore_threshold));
            }
            Some(z)
        } else {
            None
        };

        if reasons.is_empty() {
            return None;
        }

        debug!(
            instrument,
            volume_now,
            mean,
            stdev,
            zscore = ?zscore,
            "Volume spike detected"
        );

        Some(SpikeVerdict {
            instrument: instrument.to_string(),
            volume_now,
            mean_prev: mean,
            stdev_prev: stdev,
            zscore,
            reasons,
            timestamp: last.open_time,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
