//! Scalar resampling kernels over an irregular time axis, and the two
//! fix-sequence reconstructors built on them.
//!
//! Both reconstructors are exact at control-point timestamps: linear by
//! construction, Catmull-Rom because each segment is evaluated with a
//! normalised parameter that hits the two inner control points at
//! u = 0 and u = 1.

use crate::types::PositionalFix;

/// Index of the segment `[i, i+1]` bracketing `t`, clamped to the valid
/// range. Assumes `ts` is non-decreasing with at least two entries.
fn segment_index(ts: &[f64], t: f64) -> usize {
    // First index whose timestamp exceeds t, shifted back onto the
    // segment start.
    let upper = ts.partition_point(|&x| x <= t);
    upper.clamp(1, ts.len() - 1) - 1
}

/// Piecewise-linear interpolation; clamps outside the covered span.
pub fn interp_linear(ts: &[f64], values: &[f64], t: f64) -> f64 {
    debug_assert_eq!(ts.len(), values.len());
    if ts.is_empty() {
        return 0.0;
    }
    if ts.len() == 1 || t <= ts[0] {
        return values[0];
    }
    if t >= ts[ts.len() - 1] {
        return values[values.len() - 1];
    }
    let i = segment_index(ts, t);
    let span = ts[i + 1] - ts[i];
    if span <= 0.0 {
        return values[i];
    }
    let u = (t - ts[i]) / span;
    values[i] + (values[i + 1] - values[i]) * u
}

/// Uniform Catmull-Rom basis on one segment, u in [0, 1].
fn catmull_rom_basis(p0: f64, p1: f64, p2: f64, p3: f64, u: f64) -> f64 {
    let u2 = u * u;
    let u3 = u2 * u;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * u
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * u2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * u3)
}

/// Catmull-Rom interpolation with clamped end control points; outside
/// the covered span the nearest endpoint value is returned.
pub fn interp_catmull_rom(ts: &[f64], values: &[f64], t: f64) -> f64 {
    debug_assert_eq!(ts.len(), values.len());
    if ts.is_empty() {
        return 0.0;
    }
    if ts.len() == 1 || t <= ts[0] {
        return values[0];
    }
    if t >= ts[ts.len() - 1] {
        return values[values.len() - 1];
    }
    if ts.len() < 3 {
        // Two control points degenerate to a straight segment.
        return interp_linear(ts, values, t);
    }
    let i = segment_index(ts, t);
    let span = ts[i + 1] - ts[i];
    if span <= 0.0 {
        return values[i];
    }
    let u = (t - ts[i]) / span;
    let p0 = values[i.saturating_sub(1)];
    let p1 = values[i];
    let p2 = values[i + 1];
    let p3 = values[(i + 2).min(values.len() - 1)];
    catmull_rom_basis(p0, p1, p2, p3, u)
}

fn resample_with(
    points: &[PositionalFix],
    times: &[f64],
    kernel: fn(&[f64], &[f64], f64) -> f64,
) -> Vec<PositionalFix> {
    if points.is_empty() {
        return Vec::new();
    }
    let ts: Vec<f64> = points.iter().map(|p| p.timestamp).collect();
    let lats: Vec<f64> = points.iter().map(|p| p.lat).collect();
    let lons: Vec<f64> = points.iter().map(|p| p.lon).collect();

    times
        .iter()
        .map(|&t| PositionalFix {
            timestamp: t,
            lat: kernel(&ts, &lats, t),
            lon: kernel(&ts, &lons, t),
        })
        .collect()
}

/// Linear reconstructor: evaluate the fix polyline at every target
/// timestamp. Exact at control-point timestamps.
pub fn apply_linear(points: &[PositionalFix], times: &[f64]) -> Vec<PositionalFix> {
    resample_with(points, times, interp_linear)
}

/// Catmull-Rom reconstructor over the same timebase.
pub fn apply_catmull_rom(points: &[PositionalFix], times: &[f64]) -> Vec<PositionalFix> {
    resample_with(points, times, interp_catmull_rom)
}
