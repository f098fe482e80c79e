//! Strategy engine: spike detection and verdict ranking.
//!
//! Everything here is pure: no I/O, no clocks, no shared state. The scan
//! engine feeds candle windows in and gets ranked verdicts out.

pub mod ranking;
pub mod spike;

pub use ranking::rank_verdicts;
pub use spike::{SpikeConfig, SpikeDetector};
