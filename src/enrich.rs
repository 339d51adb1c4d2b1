//! Trajectory enrichment: cumulative along-path distance, normalised
//! lap position and lap-relative time, computed once per lap.

use crate::geodesy::haversine;
use crate::types::{EnrichedPoint, TelemetryPoint};

/// Derive the along-path fields for one lap of samples.
///
/// The first point gets distance 0 and lap_position 0; the last gets
/// lap_position 1. A degenerate lap that never moves keeps every
/// lap_position at 0.
pub fn enrich_lap(samples: &[TelemetryPoint]) -> Vec<EnrichedPoint> {
    if samples.is_empty() {
        return Vec::new();
    }

    let t0 = samples[0].timestamp;
    let mut cumulative = Vec::with_capacity(samples.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for w in samples.windows(2) {
        total += haversine(w[0].lat, w[0].lon, w[1].lat, w[1].lon);
        cumulative.push(total);
    }

    samples
        .iter()
        .zip(cumulative)
        .map(|(s, distance)| EnrichedPoint {
            sample: s.clone(),
            distance,
            lap_position: if total > 0.0 { distance / total } else { 0.0 },
            lap_time: s.timestamp - t0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(t: f64, lat: f64, lon: f64) -> TelemetryPoint {
        TelemetryPoint {
            timestamp: t,
            lat,
            lon,
            speed: 10.0,
            bearing: 0.0,
            accuracy: 5.0,
            lap: 0,
            lateral_acc: 0.0,
            longitudinal_acc: 0.0,
            yaw_rate: 0.0,
        }
    }

    #[test]
    fn test_endpoints_and_monotonicity() {
        let samples: Vec<TelemetryPoint> = (0..50)
            .map(|i| point(10.0 + i as f64 * 0.04, 45.0 + i as f64 * 1e-5, 9.0))
            .collect();
        let enriched = enrich_lap(&samples);

        assert_eq!(enriched[0].distance, 0.0);
        assert_eq!(enriched[0].lap_position, 0.0);
        assert_relative_eq!(enriched.last().expect("non-empty").lap_position, 1.0);
        for w in enriched.windows(2) {
            assert!(w[1].lap_position >= w[0].lap_position);
            assert!(w[1].distance >= w[0].distance);
        }
    }

    #[test]
    fn test_lap_time_is_origin_relative() {
        let samples = vec![point(100.0, 45.0, 9.0), point(100.5, 45.0001, 9.0)];
        let enriched = enrich_lap(&samples);
        assert_eq!(enriched[0].lap_time, 0.0);
        assert_relative_eq!(enriched[1].lap_time, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_matches_haversine_sum() {
        let samples = vec![
            point(0.0, 45.0, 9.0),
            point(1.0, 45.001, 9.0),
            point(2.0, 45.001, 9.001),
        ];
        let enriched = enrich_lap(&samples);
        let d1 = haversine(45.0, 9.0, 45.001, 9.0);
        let d2 = haversine(45.001, 9.0, 45.001, 9.001);
        assert_relative_eq!(enriched[1].distance, d1, epsilon = 1e-9);
        assert_relative_eq!(enriched[2].distance, d1 + d2, epsilon = 1e-9);
    }

    #[test]
    fn test_stationary_lap_keeps_zero_position() {
        let samples = vec![point(0.0, 45.0, 9.0), point(1.0, 45.0, 9.0)];
        let enriched = enrich_lap(&samples);
        assert_eq!(enriched[1].lap_position, 0.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(enrich_lap(&[]).is_empty());
    }
}
