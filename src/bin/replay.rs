use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;

use trajectory_replay_rs::config::Config;
use trajectory_replay_rs::pipeline::{process, LapResult};
use trajectory_replay_rs::session::load_session;

#[derive(Parser, Debug)]
#[command(about = "Replay a recorded session through the reconstruction pipeline")]
struct Args {
    /// Path to the session export (.csv or .csv.gz)
    #[arg(long)]
    session: PathBuf,

    /// Optional JSON config overlay; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report only this lap
    #[arg(long)]
    lap: Option<u32>,

    /// Override the noise-injection seed
    #[arg(long)]
    seed: Option<u64>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

fn metrics_json(lap: &LapResult) -> serde_json::Value {
    let variant = |m: &trajectory_replay_rs::AccuracyMetrics| {
        json!({ "rmse": m.rmse, "mae": m.mae, "max_error": m.max_error, "count": m.count })
    };
    let set = |s: &trajectory_replay_rs::pipeline::ReconstructionSet| {
        json!({
            "fixes": s.fixes.len(),
            "rejected": s.rejected.len(),
            "ekf_best_tuning": s.ekf_best_tuning,
            "metrics": {
                "linear": variant(&s.metrics.linear),
                "spline": variant(&s.metrics.spline),
                "kalman_rts": variant(&s.metrics.kalman_rts),
                "ekf_raw": variant(&s.metrics.ekf_raw),
                "ekf_smoothed": variant(&s.metrics.ekf_smoothed),
                "ekf_best": variant(&s.metrics.ekf_best),
            },
        })
    };

    json!({
        "lap": lap.lap,
        "samples": lap.ground_truth.len(),
        "duration_s": lap.duration,
        "distance_m": lap.total_distance,
        "outliers": {
            "clean": lap.outliers.clean,
            "noisy": lap.outliers.noisy,
            "total": lap.outliers.total,
        },
        "clean": set(&lap.clean),
        "noisy": lap.noisy.as_ref().map(set),
        "speed_extrema": lap.chart_data.extrema.len(),
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<Config>(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(seed) = args.seed {
        config.noise.seed = seed;
    }

    let samples = load_session(&args.session)
        .with_context(|| format!("loading session {}", args.session.display()))?;
    let output = process(&samples, &config).context("running pipeline")?;

    let laps: Vec<serde_json::Value> = output
        .per_lap
        .values()
        .filter(|r| args.lap.map_or(true, |wanted| r.lap == wanted))
        .map(metrics_json)
        .collect();

    let report = json!({
        "session": args.session.display().to_string(),
        "generated_at": Utc::now().to_rfc3339(),
        "laps": output.laps,
        "selected_lap": output.selected_lap,
        "results": laps,
    });

    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", serde_json::to_string(&report)?);
    }

    Ok(())
}
