//! Physics-based outlier rejection for positional fixes.
//!
//! Each candidate fix is scored against the previous *accepted* fix,
//! so one bad sample cannot drag its successors down with it, and the
//! triangle-window test flags single-point excursions geometrically.
//! The rejector is pure; callers log the counts and never abort a lap.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::config::{OutlierConfig, OutlierMethod};
use crate::geodesy::{bearing_diff_deg, gps_to_local, haversine};
use crate::types::{DownsampledFix, OutlierScores, OutlierVerdict};

/// A rejected fix together with the evidence against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RejectedFix {
    pub fix: DownsampledFix,
    pub reason: String,
    pub scores: OutlierScores,
    pub total_score: f64,
}

/// Partition of the input into survivors (input order preserved) and
/// rejects.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutlierSplit {
    pub kept: Vec<DownsampledFix>,
    pub rejected: Vec<RejectedFix>,
}

/// Run the configured rejector over a time-ordered fix sequence.
pub fn filter_fixes(
    fixes: &[DownsampledFix],
    cfg: &OutlierConfig,
    g: f64,
    meters_per_deg_lat: f64,
) -> OutlierSplit {
    if !cfg.enabled || fixes.len() < 2 {
        return OutlierSplit {
            kept: fixes.to_vec(),
            rejected: Vec::new(),
        };
    }
    match cfg.method {
        OutlierMethod::Physics => filter_physics(fixes, cfg, g, meters_per_deg_lat),
        OutlierMethod::Simple => filter_simple(fixes, cfg),
    }
}

// ─── Physics mode ────────────────────────────────────────────────────────────

fn filter_physics(
    fixes: &[DownsampledFix],
    cfg: &OutlierConfig,
    g: f64,
    meters_per_deg_lat: f64,
) -> OutlierSplit {
    let triangle = if cfg.use_temporal_check {
        triangle_flags(fixes, cfg, meters_per_deg_lat)
    } else {
        vec![false; fixes.len()]
    };

    let mut split = OutlierSplit::default();
    // The first fix is always kept.
    split.kept.push(fixes[0].clone());
    let mut prev = &fixes[0];
    // Implied speed of the previous accepted fix, seeded with the first
    // fix's reported speed.
    let mut v_prev = fixes[0].speed;

    for (i, fix) in fixes.iter().enumerate().skip(1) {
        let (verdict, v_implied) = score_fix(fix, prev, v_prev, triangle[i], cfg, g);
        match verdict {
            OutlierVerdict::Kept => {
                split.kept.push(fix.clone());
                prev = fix;
                if let Some(v) = v_implied {
                    v_prev = v;
                }
            }
            OutlierVerdict::Rejected {
                reason,
                scores,
                total_score,
            } => {
                log::debug!(
                    "fix at t={:.3} rejected: {} (score {:.2})",
                    fix.timestamp,
                    reason,
                    total_score
                );
                split.rejected.push(RejectedFix {
                    fix: fix.clone(),
                    reason,
                    scores,
                    total_score,
                });
            }
        }
    }

    split
}

/// Score one candidate against the previous accepted fix. Returns the
/// verdict and, when a time step existed, the implied speed that the
/// caller threads forward as `v_prev`.
fn score_fix(
    fix: &DownsampledFix,
    prev: &DownsampledFix,
    v_prev: f64,
    triangle_positive: bool,
    cfg: &OutlierConfig,
    g: f64,
) -> (OutlierVerdict, Option<f64>) {
    let dt = fix.timestamp - prev.timestamp;
    if dt <= 0.0 {
        // Non-monotone or duplicate timestamp: zero score, keep.
        return (OutlierVerdict::Kept, None);
    }

    let distance = haversine(prev.lat, prev.lon, fix.lat, fix.lon);
    let v_implied = distance / dt;

    let mut scores = OutlierScores::default();

    // 1. Implied acceleration against the accepted chain.
    let a_implied = (v_implied - v_prev).abs() / dt;
    let a_max = cfg.max_accel_g * g;
    if a_max > 0.0 {
        scores.accel = ((a_implied - a_max) / a_max).max(0.0);
    }

    // 2. GPS bearing rate vs averaged inertial yaw rate. The sensor
    // yaw rate is positive counter-clockwise while bearings grow
    // clockwise, hence the sign flip.
    let gps_yaw_rate = bearing_diff_deg(prev.bearing, fix.bearing) / dt;
    let inertial_yaw_rate = -(prev.yaw_rate + fix.yaw_rate) / 2.0;
    let yaw_diff = (gps_yaw_rate - inertial_yaw_rate).abs();
    if yaw_diff > cfg.max_yaw_rate_diff {
        scores.yaw = (yaw_diff - cfg.max_yaw_rate_diff) / cfg.max_yaw_rate_diff;
    }

    // 3. Implied vs reported speed.
    let speed_diff = (v_implied - fix.speed).abs();
    if speed_diff > cfg.max_speed_diff {
        scores.speed = (speed_diff - cfg.max_speed_diff) / cfg.max_speed_diff;
    }

    // 4. Expected lateral acceleration from the turn rate, only
    // meaningful above walking pace.
    if fix.speed > 2.0 {
        let omega = fix.yaw_rate.to_radians().abs();
        let expected_lat_g = omega * fix.speed / g;
        let lat_diff = (expected_lat_g - fix.lateral_acc.abs()).abs();
        if lat_diff > cfg.max_lat_acc_diff {
            scores.lat_acc = (lat_diff - cfg.max_lat_acc_diff) / cfg.max_lat_acc_diff;
        }
    }

    let total = scores.total();
    let over_threshold = total > cfg.anomaly_threshold;
    let triangle_reject = triangle_positive && total > cfg.anomaly_threshold / 2.0;

    if over_threshold || triangle_reject {
        let reason = if over_threshold {
            dominant_criterion(&scores).to_string()
        } else {
            "triangle window".to_string()
        };
        (
            OutlierVerdict::Rejected {
                reason,
                scores,
                total_score: total,
            },
            Some(v_implied),
        )
    } else {
        (OutlierVerdict::Kept, Some(v_implied))
    }
}

fn dominant_criterion(scores: &OutlierScores) -> &'static str {
    let weighted = [
        (2.0 * scores.accel, "implied acceleration"),
        (1.5 * scores.yaw, "yaw-rate mismatch"),
        (1.0 * scores.speed, "speed mismatch"),
        (1.0 * scores.lat_acc, "lateral-acceleration mismatch"),
    ];
    weighted
        .iter()
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, name)| *name)
        .unwrap_or("anomaly score")
}

/// Triangle-window flags over the raw input: a fix is suspicious when
/// the detour through it is much longer than the direct hop between its
/// neighbours AND it sits far off that baseline.
fn triangle_flags(
    fixes: &[DownsampledFix],
    cfg: &OutlierConfig,
    meters_per_deg_lat: f64,
) -> Vec<bool> {
    let n = fixes.len();
    let mut flags = vec![false; n];
    for i in 1..n.saturating_sub(1) {
        let (a, b, c) = (&fixes[i - 1], &fixes[i], &fixes[i + 1]);
        let d_ab = haversine(a.lat, a.lon, b.lat, b.lon);
        let d_bc = haversine(b.lat, b.lon, c.lat, c.lon);
        let d_ac = haversine(a.lat, a.lon, c.lat, c.lon);
        let ratio = (d_ab + d_bc) / d_ac.max(0.1);
        if ratio <= cfg.triangle_ratio {
            continue;
        }
        if perpendicular_distance(a, b, c, meters_per_deg_lat) > cfg.min_perp_distance {
            flags[i] = true;
        }
    }
    flags
}

/// Perpendicular distance from `b` to the segment `[a, c]`, in local
/// tangent-plane metres anchored at `a`.
fn perpendicular_distance(
    a: &DownsampledFix,
    b: &DownsampledFix,
    c: &DownsampledFix,
    meters_per_deg_lat: f64,
) -> f64 {
    let (pe, pn) = gps_to_local(b.lat, b.lon, a.lat, a.lon, meters_per_deg_lat);
    let (qe, qn) = gps_to_local(c.lat, c.lon, a.lat, a.lon, meters_per_deg_lat);
    let p = Vector2::new(pe, pn);
    let q = Vector2::new(qe, qn);

    let len_sq = q.norm_squared();
    if len_sq < 1e-9 {
        return p.norm();
    }
    let t = (p.dot(&q) / len_sq).clamp(0.0, 1.0);
    (p - q * t).norm()
}

// ─── Simple mode ─────────────────────────────────────────────────────────────

/// Threshold-only mode: implied speed far above the reported speed, or
/// a jump longer than `max_jump_m`, rejects the fix outright.
fn filter_simple(fixes: &[DownsampledFix], cfg: &OutlierConfig) -> OutlierSplit {
    let mut split = OutlierSplit::default();
    split.kept.push(fixes[0].clone());
    let mut prev = &fixes[0];

    for fix in fixes.iter().skip(1) {
        let dt = fix.timestamp - prev.timestamp;
        if dt <= 0.0 {
            split.kept.push(fix.clone());
            prev = fix;
            continue;
        }
        let distance = haversine(prev.lat, prev.lon, fix.lat, fix.lon);
        let v_implied = distance / dt;

        if v_implied > fix.speed + cfg.max_speed_diff || distance > cfg.max_jump_m {
            let scores = OutlierScores {
                speed: (v_implied - fix.speed).max(0.0) / cfg.max_speed_diff.max(1e-9),
                ..OutlierScores::default()
            };
            split.rejected.push(RejectedFix {
                fix: fix.clone(),
                reason: "implied speed / jump distance".to_string(),
                total_score: scores.total(),
                scores,
            });
        } else {
            split.kept.push(fix.clone());
            prev = fix;
        }
    }

    split
}
