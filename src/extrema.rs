//! Speed-extrema detection for lap annotation.
//!
//! The speed series is smoothed with a centred moving average, strict
//! local extrema above a speed floor are collected, consecutive
//! same-type extrema are merged keeping the stronger one, and adjacent
//! min/max pairs whose speed difference is too small to matter are
//! pruned until a full pass changes nothing.

use serde::{Deserialize, Serialize};

use crate::config::ExtremaConfig;
use crate::types::EnrichedPoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremumKind {
    Min,
    Max,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedExtremum {
    pub index: usize,
    pub kind: ExtremumKind,
    pub timestamp: f64,
    pub distance: f64,
    pub lap_position: f64,
    pub speed_ms: f64,
    pub speed_kmh: f64,
}

/// Centred moving average with half-width `window`, clamped at the
/// series edges.
fn smooth(series: &[f64], window: usize) -> Vec<f64> {
    let n = series.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(window);
            let hi = (i + window).min(n - 1);
            let span = &series[lo..=hi];
            span.iter().sum::<f64>() / span.len() as f64
        })
        .collect()
}

fn make_extremum(enriched: &[EnrichedPoint], index: usize, kind: ExtremumKind, speed: f64) -> SpeedExtremum {
    let p = &enriched[index];
    SpeedExtremum {
        index,
        kind,
        timestamp: p.sample.timestamp,
        distance: p.distance,
        lap_position: p.lap_position,
        speed_ms: speed,
        speed_kmh: speed * 3.6,
    }
}

/// Keep the stronger of consecutive same-type extrema: the slower
/// minimum, the faster maximum.
fn merge_same_type(list: Vec<SpeedExtremum>) -> Vec<SpeedExtremum> {
    let mut merged: Vec<SpeedExtremum> = Vec::with_capacity(list.len());
    for e in list {
        match merged.last_mut() {
            Some(last) if last.kind == e.kind => {
                let replace = match e.kind {
                    ExtremumKind::Min => e.speed_ms < last.speed_ms,
                    ExtremumKind::Max => e.speed_ms > last.speed_ms,
                };
                if replace {
                    *last = e;
                }
            }
            _ => merged.push(e),
        }
    }
    merged
}

/// Detect the surviving speed extrema of one lap.
pub fn detect_speed_extrema(enriched: &[EnrichedPoint], cfg: &ExtremaConfig) -> Vec<SpeedExtremum> {
    if enriched.len() < 3 {
        return Vec::new();
    }

    let speeds: Vec<f64> = enriched.iter().map(|p| p.sample.speed).collect();
    let smoothed = smooth(&speeds, cfg.window_size);

    let mut candidates = Vec::new();
    for i in 1..smoothed.len() - 1 {
        let (prev, here, next) = (smoothed[i - 1], smoothed[i], smoothed[i + 1]);
        if here <= cfg.min_speed_threshold {
            continue;
        }
        if here > prev && here > next {
            candidates.push(make_extremum(enriched, i, ExtremumKind::Max, here));
        } else if here < prev && here < next {
            candidates.push(make_extremum(enriched, i, ExtremumKind::Min, here));
        }
    }

    let min_delta_ms = cfg.min_delta_kmh / 3.6;
    let mut list = merge_same_type(candidates);

    // Prune weak min/max pairs until a pass makes no change.
    loop {
        let mut changed = false;
        let mut i = 0;
        while i + 1 < list.len() {
            let delta = (list[i].speed_ms - list[i + 1].speed_ms).abs();
            if list[i].kind != list[i + 1].kind && delta < min_delta_ms {
                list.drain(i..=i + 1);
                list = merge_same_type(list);
                changed = true;
                break;
            }
            i += 1;
        }
        if !changed {
            break;
        }
    }

    list
}
