//! Session-file parser.
//!
//! Reads the recorder's tabular export: a 13-line header followed by
//! comma-separated rows addressed by fixed column index. Rows whose
//! timestamp or position fail numeric parsing are skipped; a missing
//! or non-positive accuracy defaults to 5 m; absent channels default
//! to zero. `.gz` files are decompressed transparently.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::Result;
use crate::types::TelemetryPoint;

const HEADER_LINES: usize = 13;

const COL_TIMESTAMP: usize = 0;
const COL_LAP: usize = 2;
const COL_ACCURACY: usize = 5;
const COL_BEARING: usize = 7;
const COL_LAT: usize = 11;
const COL_LON: usize = 12;
const COL_SPEED: usize = 14;
const COL_LATERAL_ACC: usize = 17;
const COL_LONGITUDINAL_ACC: usize = 19;
const COL_YAW_RATE: usize = 28;

const DEFAULT_ACCURACY_M: f64 = 5.0;

fn field(cols: &[&str], idx: usize) -> Option<f64> {
    cols.get(idx).and_then(|s| s.trim().parse::<f64>().ok())
}

/// Parse telemetry rows from an open reader.
pub fn parse_session<R: BufRead>(reader: R) -> Result<Vec<TelemetryPoint>> {
    let mut samples = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line_no < HEADER_LINES {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let cols: Vec<&str> = line.split(',').collect();
        let (Some(timestamp), Some(lat), Some(lon)) = (
            field(&cols, COL_TIMESTAMP),
            field(&cols, COL_LAT),
            field(&cols, COL_LON),
        ) else {
            log::debug!("skipping unparsable row {}", line_no + 1);
            continue;
        };

        let accuracy = match field(&cols, COL_ACCURACY) {
            Some(a) if a > 0.0 => a,
            _ => DEFAULT_ACCURACY_M,
        };

        samples.push(TelemetryPoint {
            timestamp,
            lat,
            lon,
            speed: field(&cols, COL_SPEED).unwrap_or(0.0),
            bearing: field(&cols, COL_BEARING).unwrap_or(0.0),
            accuracy,
            lap: field(&cols, COL_LAP).unwrap_or(0.0).max(0.0) as u32,
            lateral_acc: field(&cols, COL_LATERAL_ACC).unwrap_or(0.0),
            longitudinal_acc: field(&cols, COL_LONGITUDINAL_ACC).unwrap_or(0.0),
            yaw_rate: field(&cols, COL_YAW_RATE).unwrap_or(0.0),
        });
    }

    Ok(samples)
}

/// Load a session file, decompressing `.gz` by extension.
pub fn load_session(path: &Path) -> Result<Vec<TelemetryPoint>> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        parse_session(BufReader::new(gz))
    } else {
        parse_session(BufReader::new(file))
    }
}

/// Convenience wrapper used by tests and the replay binary.
pub fn parse_session_str(contents: &str) -> Result<Vec<TelemetryPoint>> {
    parse_session(contents.as_bytes())
}
