//! One-dimensional Kalman filter with Rauch-Tung-Striebel smoothing.
//!
//! Applied independently to the latitude and longitude series over the
//! full high-rate timebase: the predict step advances at the IMU `dt`
//! and the update step fires only on samples that carry a downsampled
//! fix (matched through `original_index`). The backward pass then
//! spreads each fix's information across the gap, which is what turns
//! a sparse fix set into a dense reconstruction.
//!
//! The filter runs on raw degrees; the configured metre-denominated
//! variances are converted per axis with the tangent-plane factor at
//! the lap's reference latitude.

use ndarray::{arr1, arr2, Array1, Array2};

use crate::config::KalmanConfig;
use crate::types::linalg::{det2, invert, SINGULAR_EPS};
use crate::types::{DownsampledFix, EnrichedPoint, PositionalFix};

/// Constant-velocity transition for one axis.
fn transition(dt: f64) -> Array2<f64> {
    arr2(&[[1.0, dt], [0.0, 1.0]])
}

/// Discretised process noise for intensity `q` over `dt`.
fn process_noise(dt: f64, q: f64) -> Array2<f64> {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt3 * dt;
    arr2(&[
        [dt4 / 4.0 * q, dt3 / 2.0 * q],
        [dt3 / 2.0 * q, dt2 * q],
    ])
}

struct ForwardStep {
    x_pred: Array1<f64>,
    p_pred: Array2<f64>,
    x_filt: Array1<f64>,
    p_filt: Array2<f64>,
    dt: f64,
}

/// Forward filter + backward RTS pass for one scalar axis.
///
/// `measurements[i]` is `Some` where the timebase sample `i` carries a
/// fix. Returns the smoothed position per sample. Samples before the
/// first measurement repeat the first smoothed value.
fn smooth_axis(
    times: &[f64],
    measurements: &[Option<f64>],
    r: f64,
    q: f64,
    initial_p: f64,
) -> Vec<f64> {
    debug_assert_eq!(times.len(), measurements.len());
    let n = times.len();
    let Some(first) = measurements.iter().position(|m| m.is_some()) else {
        return vec![0.0; n];
    };
    let z0 = measurements[first].unwrap_or(0.0);

    // ── Forward pass ──
    let mut steps: Vec<ForwardStep> = Vec::with_capacity(n - first);
    let init = ForwardStep {
        x_pred: arr1(&[z0, 0.0]),
        p_pred: arr2(&[[initial_p, 0.0], [0.0, initial_p]]),
        x_filt: arr1(&[z0, 0.0]),
        p_filt: arr2(&[[initial_p, 0.0], [0.0, initial_p]]),
        dt: 0.0,
    };
    steps.push(init);

    for i in (first + 1)..n {
        let prev = &steps[steps.len() - 1];
        let dt = times[i] - times[i - 1];

        let (x_pred, p_pred) = if dt > 0.0 {
            let f = transition(dt);
            let x_pred = f.dot(&prev.x_filt);
            let p_pred = f.dot(&prev.p_filt).dot(&f.t()) + process_noise(dt, q);
            (x_pred, p_pred)
        } else {
            // Duplicate timestamp: predict is a no-op.
            (prev.x_filt.clone(), prev.p_filt.clone())
        };

        let (x_filt, p_filt) = match measurements[i] {
            Some(z) => {
                // Scalar update with H = [1, 0].
                let s = p_pred[[0, 0]] + r;
                if s.abs() < SINGULAR_EPS {
                    (x_pred.clone(), p_pred.clone())
                } else {
                    let k = arr1(&[p_pred[[0, 0]] / s, p_pred[[1, 0]] / s]);
                    let innovation = z - x_pred[0];
                    let x = &x_pred + &(k.clone() * innovation);
                    let mut p = p_pred.clone();
                    // P <- (I - K H) P, written out for H = [1, 0].
                    p[[0, 0]] = (1.0 - k[0]) * p_pred[[0, 0]];
                    p[[0, 1]] = (1.0 - k[0]) * p_pred[[0, 1]];
                    p[[1, 0]] = p_pred[[1, 0]] - k[1] * p_pred[[0, 0]];
                    p[[1, 1]] = p_pred[[1, 1]] - k[1] * p_pred[[0, 1]];
                    (x, p)
                }
            }
            None => (x_pred.clone(), p_pred.clone()),
        };

        steps.push(ForwardStep {
            x_pred,
            p_pred,
            x_filt,
            p_filt,
            dt,
        });
    }

    // ── Backward (RTS) pass ──
    let m = steps.len();
    let mut smoothed: Vec<Array1<f64>> = vec![arr1(&[0.0, 0.0]); m];
    smoothed[m - 1] = steps[m - 1].x_filt.clone();

    for i in (0..m - 1).rev() {
        let next = &steps[i + 1];
        if det2(&next.p_pred).abs() < SINGULAR_EPS {
            // Numerical guard: fall back to the forward estimate.
            smoothed[i] = steps[i].x_filt.clone();
            continue;
        }
        let f = transition(next.dt);
        let gain = steps[i].p_filt.dot(&f.t()).dot(&invert(&next.p_pred));
        let residual = &smoothed[i + 1] - &next.x_pred;
        smoothed[i] = &steps[i].x_filt + &gain.dot(&residual);
    }

    let mut out = Vec::with_capacity(n);
    // Leading samples with no measurement history hold the first value.
    for _ in 0..first {
        out.push(smoothed[0][0]);
    }
    for s in &smoothed {
        out.push(s[0]);
    }
    out
}

/// Smooth a fix sequence onto the enriched stream's timebase.
pub fn smooth_fixes(
    enriched: &[EnrichedPoint],
    fixes: &[DownsampledFix],
    cfg: &KalmanConfig,
    meters_per_deg_lat: f64,
) -> Vec<PositionalFix> {
    if enriched.is_empty() || fixes.is_empty() {
        return Vec::new();
    }

    let n = enriched.len();
    let times: Vec<f64> = enriched.iter().map(|p| p.sample.timestamp).collect();

    let mut lat_meas: Vec<Option<f64>> = vec![None; n];
    let mut lon_meas: Vec<Option<f64>> = vec![None; n];
    for f in fixes {
        if f.original_index < n {
            lat_meas[f.original_index] = Some(f.lat);
            lon_meas[f.original_index] = Some(f.lon);
        }
    }

    // Metre-space variances to degree-space, per axis.
    let ref_lat = enriched[0].sample.lat;
    let lat_factor = 1.0 / meters_per_deg_lat;
    let lon_factor = 1.0 / (meters_per_deg_lat * ref_lat.to_radians().cos());
    let (r_lat, q_lat) = (cfg.r * lat_factor * lat_factor, cfg.q * lat_factor * lat_factor);
    let (r_lon, q_lon) = (cfg.r * lon_factor * lon_factor, cfg.q * lon_factor * lon_factor);

    let lat_smooth = smooth_axis(&times, &lat_meas, r_lat, q_lat, cfg.initial_p);
    let lon_smooth = smooth_axis(&times, &lon_meas, r_lon, q_lon, cfg.initial_p);

    times
        .iter()
        .zip(lat_smooth.iter().zip(lon_smooth.iter()))
        .map(|(&t, (&lat, &lon))| PositionalFix {
            timestamp: t,
            lat,
            lon,
        })
        .collect()
}
