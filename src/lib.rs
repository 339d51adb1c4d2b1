//! trajectory_replay_rs — offline reconstruction of a high-rate
//! vehicle trajectory from a low-rate positional stream fused with
//! synchronous inertial measurements.
//!
//! The core is the pure function [`pipeline::process`]: it takes an
//! in-memory telemetry stream plus a [`config::Config`] and returns
//! per-lap reconstructions and error statistics for several
//! strategies (linear, Catmull-Rom, 1-D Kalman + RTS smoothing, a
//! seven-state EKF and its spline-smoothed and grid-tuned variants).
//! All I/O, rendering and interaction belong to callers; the bundled
//! replay binary is one such caller.

pub mod config;
pub mod enrich;
pub mod error;
pub mod extrema;
pub mod filters;
pub mod geodesy;
pub mod interp;
pub mod metrics;
pub mod outlier;
pub mod pipeline;
pub mod session;
pub mod types;

pub use config::Config;
pub use error::Error;
pub use pipeline::{process, LapResult, ProcessOutput};
pub use types::{
    AccuracyMetrics, DownsampledFix, EnrichedPoint, PositionalFix, TelemetryPoint,
};
