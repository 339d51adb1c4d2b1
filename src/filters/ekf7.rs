//! Seven-state Extended Kalman Filter fusing positional fixes with
//! body-frame inertial measurements.
//!
//! State: [px, py, vx, vy, psi, b_ax, b_ay]. Positions and velocities
//! are local east/north metres relative to a reference fix; psi is the
//! heading in radians, clockwise from north, kept in (-pi, pi]; the
//! biases are body-frame accelerometer biases modelled as random walks.
//!
//! Input sign conventions: the recorded lateral acceleration is
//! positive to the left and the recorded yaw rate positive
//! counter-clockwise, while the filter wants right-positive lateral
//! and clockwise-positive yaw. The fixed negations at the top of
//! `predict` are part of the input contract.

use ndarray::{arr1, Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::EkfConfig;
use crate::geodesy::{gps_to_local, local_to_gps, normalize_angle};
use crate::types::linalg::{det2, invert, SINGULAR_EPS};
use crate::types::{DownsampledFix, EnrichedPoint, PositionalFix};

const STATE_DIM: usize = 7;

/// Snapshot of the filter for diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ekf7State {
    pub position_local: (f64, f64),
    pub velocity: (f64, f64),
    pub heading: f64,
    pub accel_bias: (f64, f64),
    pub covariance_trace: f64,
    pub predict_count: u64,
    pub update_count: u64,
}

pub struct Ekf7 {
    state: Array1<f64>,
    covariance: Array2<f64>,
    ref_lat: f64,
    ref_lon: f64,
    sigma_accel: f64,
    sigma_gyro: f64,
    sigma_bias: f64,
    gps_pos_noise: f64,
    g: f64,
    meters_per_deg_lat: f64,
    predict_count: u64,
    update_count: u64,
}

impl Ekf7 {
    /// Initialise from the first fix fast enough to trust its bearing.
    pub fn from_fix(fix: &DownsampledFix, cfg: &EkfConfig, g: f64, meters_per_deg_lat: f64) -> Self {
        let psi = normalize_angle(fix.bearing.to_radians());
        let mut state = Array1::zeros(STATE_DIM);
        state[2] = fix.speed * psi.sin();
        state[3] = fix.speed * psi.cos();
        state[4] = psi;

        let mut covariance = Array2::zeros((STATE_DIM, STATE_DIM));
        let diag = [10.0, 10.0, 1.0, 1.0, 0.1, 0.1, 0.1];
        for (i, &v) in diag.iter().enumerate() {
            covariance[[i, i]] = v;
        }

        Self {
            state,
            covariance,
            ref_lat: fix.lat,
            ref_lon: fix.lon,
            sigma_accel: cfg.sigma_accel,
            sigma_gyro: cfg.sigma_gyro,
            sigma_bias: cfg.sigma_bias,
            gps_pos_noise: cfg.gps_pos_noise,
            g,
            meters_per_deg_lat,
            predict_count: 0,
            update_count: 0,
        }
    }

    fn process_noise(&self, dt: f64) -> Array2<f64> {
        let sa2 = self.sigma_accel * self.sigma_accel;
        let sg2 = self.sigma_gyro * self.sigma_gyro;
        let sb2 = self.sigma_bias * self.sigma_bias;
        let dt2 = dt * dt;
        let q_pos = sa2 * dt2 * dt2 / 4.0;
        let q_vel = sa2 * dt2;
        let q_psi = sg2 * dt2;
        let q_bias = sb2 * dt;

        let mut q = Array2::zeros((STATE_DIM, STATE_DIM));
        q[[0, 0]] = q_pos;
        q[[1, 1]] = q_pos;
        q[[2, 2]] = q_vel;
        q[[3, 3]] = q_vel;
        q[[4, 4]] = q_psi;
        q[[5, 5]] = q_bias;
        q[[6, 6]] = q_bias;
        q
    }

    /// Propagate with one IMU sample. `lateral_acc` and
    /// `longitudinal_acc` are in G, `yaw_rate` in deg/s, all in the
    /// recorded sign conventions. A non-positive `dt` is a no-op.
    pub fn predict(&mut self, dt: f64, lateral_acc: f64, longitudinal_acc: f64, yaw_rate: f64) {
        if dt <= 0.0 {
            return;
        }

        // Input adapter: flip to right-positive lateral, clockwise-
        // positive yaw, subtract the current bias estimates.
        let a_lat = -lateral_acc * self.g - self.state[5];
        let a_lon = longitudinal_acc * self.g - self.state[6];
        let omega = -yaw_rate.to_radians();

        let psi = self.state[4];
        let (sin_psi, cos_psi) = psi.sin_cos();
        let ax_w = a_lat * cos_psi + a_lon * sin_psi;
        let ay_w = -a_lat * sin_psi + a_lon * cos_psi;

        let dt2 = dt * dt;

        // Jacobian at the pre-update state.
        let mut f = Array2::eye(STATE_DIM);
        f[[0, 2]] = dt;
        f[[1, 3]] = dt;
        f[[0, 4]] = 0.5 * ay_w * dt2;
        f[[1, 4]] = -0.5 * ax_w * dt2;
        f[[2, 4]] = ay_w * dt;
        f[[3, 4]] = -ax_w * dt;
        f[[0, 5]] = -0.5 * cos_psi * dt2;
        f[[0, 6]] = -0.5 * sin_psi * dt2;
        f[[1, 5]] = 0.5 * sin_psi * dt2;
        f[[1, 6]] = -0.5 * cos_psi * dt2;
        f[[2, 5]] = -cos_psi * dt;
        f[[2, 6]] = -sin_psi * dt;
        f[[3, 5]] = sin_psi * dt;
        f[[3, 6]] = -cos_psi * dt;

        self.state[0] += self.state[2] * dt + 0.5 * ax_w * dt2;
        self.state[1] += self.state[3] * dt + 0.5 * ay_w * dt2;
        self.state[2] += ax_w * dt;
        self.state[3] += ay_w * dt;
        self.state[4] = normalize_angle(psi + omega * dt);

        self.covariance = f.dot(&self.covariance).dot(&f.t()) + self.process_noise(dt);
        self.predict_count += 1;
    }

    /// Positional update from one fix. A singular innovation matrix
    /// skips the update rather than aborting the lap.
    pub fn update(&mut self, lat: f64, lon: f64, accuracy: f64) {
        let (zx, zy) = gps_to_local(lat, lon, self.ref_lat, self.ref_lon, self.meters_per_deg_lat);

        let r = if accuracy > 0.0 {
            accuracy
        } else {
            self.gps_pos_noise
        };
        let r2 = r * r;

        // S = H P H^T + R with H selecting (px, py).
        let mut s = Array2::zeros((2, 2));
        s[[0, 0]] = self.covariance[[0, 0]] + r2;
        s[[0, 1]] = self.covariance[[0, 1]];
        s[[1, 0]] = self.covariance[[1, 0]];
        s[[1, 1]] = self.covariance[[1, 1]] + r2;

        if det2(&s).abs() < SINGULAR_EPS {
            log::warn!("singular innovation covariance, skipping positional update");
            return;
        }
        let s_inv = invert(&s);

        // K = P H^T S^-1: the first two columns of P times S^-1.
        let pht = self.covariance.slice(ndarray::s![.., 0..2]).to_owned();
        let k = pht.dot(&s_inv);

        let innovation = arr1(&[zx - self.state[0], zy - self.state[1]]);
        self.state = &self.state + &k.dot(&innovation);

        let h = {
            let mut h = Array2::zeros((2, STATE_DIM));
            h[[0, 0]] = 1.0;
            h[[1, 1]] = 1.0;
            h
        };
        let i_kh = Array2::eye(STATE_DIM) - k.dot(&h);
        self.covariance = i_kh.dot(&self.covariance);

        // Keep the covariance symmetric against drift.
        let sym = (&self.covariance + &self.covariance.t()) * 0.5;
        self.covariance = sym;

        self.state[4] = normalize_angle(self.state[4]);
        self.update_count += 1;
    }

    pub fn position(&self) -> (f64, f64) {
        local_to_gps(
            self.state[0],
            self.state[1],
            self.ref_lat,
            self.ref_lon,
            self.meters_per_deg_lat,
        )
    }

    pub fn heading(&self) -> f64 {
        self.state[4]
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    pub fn snapshot(&self) -> Ekf7State {
        Ekf7State {
            position_local: (self.state[0], self.state[1]),
            velocity: (self.state[2], self.state[3]),
            heading: self.state[4],
            accel_bias: (self.state[5], self.state[6]),
            covariance_trace: (0..STATE_DIM).map(|i| self.covariance[[i, i]]).sum(),
            predict_count: self.predict_count,
            update_count: self.update_count,
        }
    }
}

/// Drive the EKF over one lap.
///
/// Initialisation waits for the first fix whose reported speed clears
/// the heading-validity threshold; from that sample onward the filter
/// emits exactly one positional fix per IMU sample, updating whenever
/// the stream reaches the next fix's timestamp.
pub fn run_ekf(
    enriched: &[EnrichedPoint],
    fixes: &[DownsampledFix],
    cfg: &EkfConfig,
    g: f64,
    meters_per_deg_lat: f64,
) -> Vec<PositionalFix> {
    if enriched.is_empty() {
        return Vec::new();
    }
    let Some(init_pos) = fixes.iter().position(|f| f.speed > cfg.min_speed_for_heading) else {
        log::warn!("no fix fast enough to initialise EKF heading, skipping EKF");
        return Vec::new();
    };
    let init_fix = &fixes[init_pos];
    let start = init_fix.original_index.min(enriched.len().saturating_sub(1));

    let mut ekf = Ekf7::from_fix(init_fix, cfg, g, meters_per_deg_lat);
    let mut fix_cursor = init_pos + 1;

    let mut out = Vec::with_capacity(enriched.len() - start);
    let (lat0, lon0) = ekf.position();
    out.push(PositionalFix {
        timestamp: enriched[start].sample.timestamp,
        lat: lat0,
        lon: lon0,
    });

    for i in (start + 1)..enriched.len() {
        let sample = &enriched[i].sample;
        let dt = sample.timestamp - enriched[i - 1].sample.timestamp;
        ekf.predict(
            dt,
            sample.lateral_acc,
            sample.longitudinal_acc,
            sample.yaw_rate,
        );

        if fix_cursor < fixes.len() && sample.timestamp >= fixes[fix_cursor].timestamp - 1e-9 {
            let f = &fixes[fix_cursor];
            ekf.update(f.lat, f.lon, f.accuracy);
            fix_cursor += 1;
        }

        let (lat, lon) = ekf.position();
        out.push(PositionalFix {
            timestamp: sample.timestamp,
            lat,
            lon,
        });
    }

    out
}
