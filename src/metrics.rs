//! Positional error statistics between a reconstructed track and the
//! enriched ground truth.
//!
//! Matching is by timestamp rounded to three decimal places through a
//! string key; the rounding is part of the contract so independent
//! implementations reproduce scores bit-exactly.

use std::collections::HashMap;

use crate::geodesy::haversine;
use crate::types::{AccuracyMetrics, EnrichedPoint, PositionalFix};

/// Three-decimal timestamp key shared by both sides of the match.
pub fn timestamp_key(t: f64) -> String {
    format!("{t:.3}")
}

/// Compare an estimate against ground truth.
///
/// Every ground-truth sample whose rounded timestamp appears in the
/// estimate contributes one residual. An empty match set reports
/// infinite statistics and count 0.
pub fn compute_accuracy(truth: &[EnrichedPoint], estimate: &[PositionalFix]) -> AccuracyMetrics {
    let by_key: HashMap<String, &PositionalFix> = estimate
        .iter()
        .map(|p| (timestamp_key(p.timestamp), p))
        .collect();

    let mut sum_sq = 0.0;
    let mut sum_abs = 0.0;
    let mut max_error = 0.0_f64;
    let mut count = 0usize;

    for g in truth {
        let Some(e) = by_key.get(&timestamp_key(g.sample.timestamp)) else {
            continue;
        };
        let d = haversine(g.sample.lat, g.sample.lon, e.lat, e.lon);
        sum_sq += d * d;
        sum_abs += d;
        max_error = max_error.max(d);
        count += 1;
    }

    if count == 0 {
        return AccuracyMetrics::empty();
    }

    AccuracyMetrics {
        rmse: (sum_sq / count as f64).sqrt(),
        mae: sum_abs / count as f64,
        max_error,
        count,
    }
}
