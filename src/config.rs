//! Pipeline configuration as a value.
//!
//! Every knob lives in one cloneable struct that is passed explicitly
//! into each stage; the EKF parameter sweep clones it per trial, so
//! concurrent laps never share mutable state.

use serde::{Deserialize, Serialize};

use crate::types::EkfTuning;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// High-rate output cadence [Hz]
    pub imu_hz: f64,
    /// Positional fix cadence [Hz]
    pub gps_hz: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            imu_hz: 25.0,
            gps_hz: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Gate for the noisy-path simulation
    pub enabled: bool,
    /// Half-width of the uniform pre-average [m]; the injected stddev
    /// is the mean of min and max.
    pub min_meters: f64,
    pub max_meters: f64,
    /// Base RNG seed; each lap derives its own stream from it.
    pub seed: u64,
}

impl NoiseConfig {
    pub fn stddev_meters(&self) -> f64 {
        (self.min_meters + self.max_meters) / 2.0
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_meters: 1.0,
            max_meters: 3.0,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    /// Measurement variance [m^2]
    #[serde(rename = "R")]
    pub r: f64,
    /// Continuous-time process noise intensity [m^2/s^3]
    #[serde(rename = "Q")]
    pub q: f64,
    /// Initial axis covariance
    #[serde(rename = "initial_P")]
    pub initial_p: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            r: 0.01,
            q: 1.0,
            initial_p: 100.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EkfConfig {
    /// Accelerometer noise [m/s^2]
    pub sigma_accel: f64,
    /// Gyro noise [rad/s]
    pub sigma_gyro: f64,
    /// Bias random-walk intensity
    pub sigma_bias: f64,
    /// Default fix stddev when a fix reports no accuracy [m]
    pub gps_pos_noise: f64,
    /// Minimum reported speed for a usable initial heading [m/s]
    pub min_speed_for_heading: f64,
}

impl EkfConfig {
    /// Overlay one sweep-grid point onto this configuration.
    pub fn with_tuning(&self, t: &EkfTuning) -> Self {
        Self {
            sigma_accel: t.sigma_accel,
            sigma_gyro: t.sigma_gyro,
            sigma_bias: t.sigma_bias,
            gps_pos_noise: t.gps_pos_noise,
            min_speed_for_heading: self.min_speed_for_heading,
        }
    }

    pub fn tuning(&self) -> EkfTuning {
        EkfTuning {
            sigma_accel: self.sigma_accel,
            sigma_gyro: self.sigma_gyro,
            sigma_bias: self.sigma_bias,
            gps_pos_noise: self.gps_pos_noise,
        }
    }
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            sigma_accel: 0.5,
            sigma_gyro: 0.02,
            sigma_bias: 0.001,
            gps_pos_noise: 5.0,
            min_speed_for_heading: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    Physics,
    Simple,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub enabled: bool,
    pub method: OutlierMethod,
    /// Implied-acceleration threshold [G]
    pub max_accel_g: f64,
    /// GPS-vs-inertial yaw mismatch threshold [deg/s]
    pub max_yaw_rate_diff: f64,
    /// Implied-vs-reported speed threshold [m/s]
    pub max_speed_diff: f64,
    /// Expected-vs-measured lateral threshold [G]
    pub max_lat_acc_diff: f64,
    /// Weighted-score rejection threshold
    pub anomaly_threshold: f64,
    /// Gate for the triangle-window test
    pub use_temporal_check: bool,
    /// Triangle perpendicular distance floor [m]
    pub min_perp_distance: f64,
    /// Triangle detour ratio
    pub triangle_ratio: f64,
    /// Simple mode: maximum jump between neighbouring fixes [m]
    pub max_jump_m: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: OutlierMethod::Physics,
            max_accel_g: 2.0,
            max_yaw_rate_diff: 45.0,
            max_speed_diff: 15.0,
            max_lat_acc_diff: 0.8,
            anomaly_threshold: 4.0,
            use_temporal_check: true,
            min_perp_distance: 15.0,
            triangle_ratio: 2.5,
            max_jump_m: 100.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremaConfig {
    /// Moving-average half-width [samples]
    pub window_size: usize,
    /// Extrema below this speed are ignored [m/s]
    pub min_speed_threshold: f64,
    /// Adjacent min/max pairs closer than this are pruned [km/h]
    pub min_delta_kmh: f64,
}

impl Default for ExtremaConfig {
    fn default() -> Self {
        Self {
            window_size: 25,
            min_speed_threshold: 5.0,
            min_delta_kmh: 20.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub noise: NoiseConfig,
    pub kalman: KalmanConfig,
    pub ekf: EkfConfig,
    pub outlier: OutlierConfig,
    pub extrema: ExtremaConfig,
    /// Standard gravity [m/s^2]
    #[serde(rename = "G")]
    pub g: f64,
    /// Flat-earth conversion factor [m/deg latitude]
    pub meters_per_deg_lat: f64,
}

impl Config {
    /// Downsampling stride from the configured cadences, at least 1.
    pub fn downsample_ratio(&self) -> usize {
        let ratio = (self.sampling.imu_hz / self.sampling.gps_hz).round();
        (ratio as usize).max(1)
    }

    /// Chart-data stride targeting roughly 2 Hz.
    pub fn chart_stride(&self) -> usize {
        let stride = (self.sampling.imu_hz / 2.0).round();
        (stride as usize).max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            noise: NoiseConfig::default(),
            kalman: KalmanConfig::default(),
            ekf: EkfConfig::default(),
            outlier: OutlierConfig::default(),
            extrema: ExtremaConfig::default(),
            g: 9.81,
            meters_per_deg_lat: 111_320.0,
        }
    }
}
