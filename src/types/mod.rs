pub mod linalg;

use serde::{Deserialize, Serialize};

/// One fused sensor sample. Immutable once emitted by the parser or a
/// synthetic generator; timestamps are origin-normalised per lap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Seconds from lap start, monotonically non-decreasing within a lap.
    pub timestamp: f64,
    pub lat: f64,
    pub lon: f64,
    /// Reported speed [m/s]
    pub speed: f64,
    /// Degrees from true north, clockwise, [0, 360)
    pub bearing: f64,
    /// Reported fix accuracy [m], > 0
    pub accuracy: f64,
    pub lap: u32,
    /// Proper acceleration, body frame, positive left [G]
    pub lateral_acc: f64,
    /// Proper acceleration, body frame, positive forward [G]
    pub longitudinal_acc: f64,
    /// Body yaw rate, positive counter-clockwise [deg/s]
    pub yaw_rate: f64,
}

/// A sample plus the along-path fields derived once per lap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPoint {
    #[serde(flatten)]
    pub sample: TelemetryPoint,
    /// Cumulative great-circle distance from lap start [m]
    pub distance: f64,
    /// distance / total lap distance, non-decreasing in [0, 1]
    pub lap_position: f64,
    /// Seconds since the first sample of the lap
    pub lap_time: f64,
}

/// Positional-only triple; the output unit of every reconstructor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionalFix {
    pub timestamp: f64,
    pub lat: f64,
    pub lon: f64,
}

/// A downsampled positional fix that still carries the speed/bearing and
/// inertial channels the outlier rejector and the EKF need, plus the
/// index of the enriched sample it was taken from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownsampledFix {
    pub original_index: usize,
    pub timestamp: f64,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub bearing: f64,
    pub accuracy: f64,
    pub lateral_acc: f64,
    pub longitudinal_acc: f64,
    pub yaw_rate: f64,
}

impl DownsampledFix {
    pub fn fix(&self) -> PositionalFix {
        PositionalFix {
            timestamp: self.timestamp,
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Per-criterion contributions of the physics rejector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlierScores {
    pub accel: f64,
    pub yaw: f64,
    pub speed: f64,
    pub lat_acc: f64,
}

impl OutlierScores {
    /// Weighted total: 2.0 accel + 1.5 yaw + 1.0 speed + 1.0 latAcc.
    pub fn total(&self) -> f64 {
        2.0 * self.accel + 1.5 * self.yaw + 1.0 * self.speed + 1.0 * self.lat_acc
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OutlierVerdict {
    Kept,
    Rejected {
        reason: String,
        scores: OutlierScores,
        total_score: f64,
    },
}

/// Positional error statistics of one reconstructor against ground
/// truth, all in metres. `0 <= mae <= rmse <= max_error` whenever
/// `count > 0`; an empty match set reports infinity.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub max_error: f64,
    pub count: usize,
}

impl AccuracyMetrics {
    pub fn empty() -> Self {
        Self {
            rmse: f64::INFINITY,
            mae: f64::INFINITY,
            max_error: f64::INFINITY,
            count: 0,
        }
    }
}

/// One point of the EKF noise-parameter grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EkfTuning {
    pub sigma_accel: f64,
    pub sigma_gyro: f64,
    pub sigma_bias: f64,
    pub gps_pos_noise: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_weighting() {
        let scores = OutlierScores {
            accel: 1.0,
            yaw: 2.0,
            speed: 3.0,
            lat_acc: 4.0,
        };
        assert!((scores.total() - (2.0 + 3.0 + 3.0 + 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_metrics_are_infinite() {
        let m = AccuracyMetrics::empty();
        assert_eq!(m.count, 0);
        assert!(m.rmse.is_infinite() && m.mae.is_infinite() && m.max_error.is_infinite());
    }

    #[test]
    fn test_downsampled_fix_projection() {
        let f = DownsampledFix {
            original_index: 7,
            timestamp: 1.5,
            lat: 45.0,
            lon: 9.0,
            speed: 20.0,
            bearing: 90.0,
            accuracy: 5.0,
            lateral_acc: 0.1,
            longitudinal_acc: -0.2,
            yaw_rate: 3.0,
        };
        let p = f.fix();
        assert_eq!(p.timestamp, 1.5);
        assert_eq!(p.lat, 45.0);
        assert_eq!(p.lon, 9.0);
    }
}
