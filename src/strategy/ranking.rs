//! Verdict ranking.
//!
//! Orders a cycle's verdicts strongest first. Verdicts with a z-score are
//! keyed by it; verdicts without one (flat baseline) are keyed by their
//! volume-to-mean ratio. The two scales are mixed in one order on purpose:
//! a flat-baseline spike has no z-score to compare with.

use std::cmp::Ordering;

use crate::types::SpikeVerdict;

/// Sort descending by [`SpikeVerdict::rank_key`]. Stable: verdicts with
/// equal keys keep their input order.
pub fn rank_verdicts(mut verdicts: Vec<SpikeVerdict>) -> Vec<SpikeVerdict> {
    verdicts.sort_by(compare_desc);
    verdicts
}

fn compare_desc(a: &SpikeVerdict, b: &SpikeVerdict) -> Ordering {
    b.rank_key().total_cmp(&a.rank_key())
}
