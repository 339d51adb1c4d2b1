//! Geodesy primitives on the flat tangent plane.
//!
//! Valid at track scale: a few kilometres at mid latitudes keeps the
//! conversion error well below 0.1 m, and it keeps filter state in
//! metres with closed-form Jacobians.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Mean Earth radius [m], shared with the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two WGS-84 points [m].
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Project a point onto the local tangent plane anchored at
/// `(lat0, lon0)`. Returns (east, north) in metres.
pub fn gps_to_local(
    lat: f64,
    lon: f64,
    lat0: f64,
    lon0: f64,
    meters_per_deg_lat: f64,
) -> (f64, f64) {
    let east = (lon - lon0) * meters_per_deg_lat * lat0.to_radians().cos();
    let north = (lat - lat0) * meters_per_deg_lat;
    (east, north)
}

/// Algebraic inverse of [`gps_to_local`], using the same constants.
pub fn local_to_gps(
    east: f64,
    north: f64,
    lat0: f64,
    lon0: f64,
    meters_per_deg_lat: f64,
) -> (f64, f64) {
    let lat = lat0 + north / meters_per_deg_lat;
    let lon = lon0 + east / (meters_per_deg_lat * lat0.to_radians().cos());
    (lat, lon)
}

/// Map an angle in radians to (-pi, pi].
pub fn normalize_angle(rad: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let mut a = rad % two_pi;
    if a <= -std::f64::consts::PI {
        a += two_pi;
    } else if a > std::f64::consts::PI {
        a -= two_pi;
    }
    a
}

/// Signed difference `b - a` between two bearings in degrees, mapped to
/// [-180, 180).
pub fn bearing_diff_deg(a: f64, b: f64) -> f64 {
    let mut d = (b - a) % 360.0;
    if d < -180.0 {
        d += 360.0;
    } else if d >= 180.0 {
        d -= 360.0;
    }
    d
}

/// Seedable Gaussian sampler.
///
/// Box-Muller over two uniform draws per sample; the generator is a
/// `Pcg64Mcg` so a fixed seed reproduces a run bit-exactly.
pub struct GaussianSampler {
    rng: Pcg64Mcg,
}

impl GaussianSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn sample(&mut self, mean: f64, stddev: f64) -> f64 {
        // 1 - u keeps the log argument in (0, 1].
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen::<f64>();
        let mag = (-2.0 * u1.ln()).sqrt();
        mean + stddev * mag * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude at the equator.
        let d = haversine(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(d, EARTH_RADIUS_M * PI / 180.0, epsilon = 1e-6);
    }

    #[test]
    fn test_haversine_symmetry_and_zero() {
        let d_ab = haversine(45.1, 9.2, 45.2, 9.3);
        let d_ba = haversine(45.2, 9.3, 45.1, 9.2);
        assert_relative_eq!(d_ab, d_ba, epsilon = 1e-9);
        assert_eq!(haversine(45.1, 9.2, 45.1, 9.2), 0.0);
    }

    #[test]
    fn test_local_round_trip() {
        let (lat0, lon0) = (44.34, 11.71);
        let (east, north) = gps_to_local(44.35, 11.73, lat0, lon0, 111_320.0);
        let (lat, lon) = local_to_gps(east, north, lat0, lon0, 111_320.0);
        assert_relative_eq!(lat, 44.35, epsilon = 1e-12);
        assert_relative_eq!(lon, 11.73, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_angle_range() {
        assert_relative_eq!(normalize_angle(3.0 * PI), PI, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-3.0 * PI), PI, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(0.5), 0.5, epsilon = 1e-12);
        // -pi maps to +pi: the interval is half-open on the left.
        assert_relative_eq!(normalize_angle(-PI), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_bearing_diff_wraps() {
        assert_relative_eq!(bearing_diff_deg(350.0, 10.0), 20.0, epsilon = 1e-12);
        assert_relative_eq!(bearing_diff_deg(10.0, 350.0), -20.0, epsilon = 1e-12);
        assert_relative_eq!(bearing_diff_deg(90.0, 95.0), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_is_seed_deterministic() {
        let mut a = GaussianSampler::new(1234);
        let mut b = GaussianSampler::new(1234);
        for _ in 0..100 {
            assert_eq!(a.sample(0.0, 2.5), b.sample(0.0, 2.5));
        }
    }

    #[test]
    fn test_gaussian_moments() {
        let mut s = GaussianSampler::new(99);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| s.sample(3.0, 2.0)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 3.0).abs() < 0.1, "mean {mean}");
        assert!((var - 4.0).abs() < 0.3, "var {var}");
    }
}
