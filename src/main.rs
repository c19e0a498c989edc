//! `staypoints`: detect stay points in a directory of GeoLife `.plt` logs.
//!
//! Writes one CSV per subject to `<output>/<subject>.csv`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::Duration;
use clap::Parser;
use log::{error, info, LevelFilter};

use staypoint_miner::{
    load_subjects, process_subjects, save_stay_points_csv, DistanceMetric, PipelineConfig, TailPolicy,
};

/// Directory name used when no output directory is given.
const DEFAULT_OUTPUT_DIR: &str = "StayPoint";

#[derive(Debug, Parser)]
#[command(name = "staypoints", version, about = "Detect stay points in GPS trajectory logs")]
struct Cli {
    /// Directory searched recursively for `.plt` files
    #[arg(short = 'i', long)]
    input_directory: PathBuf,

    /// Where CSV files are written (default: <input>/StayPoint)
    #[arg(short = 'o', long)]
    output_directory: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON pipeline configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum distance from a candidate's anchor point, in meters
    #[arg(long, value_name = "METERS")]
    distance_threshold: Option<f64>,

    /// Minimum stay duration, in minutes
    #[arg(long, value_name = "MINUTES")]
    time_threshold: Option<i64>,

    /// Time gap that splits trajectories, in minutes
    #[arg(long, value_name = "MINUTES")]
    gap_threshold: Option<i64>,

    /// Earth model for distances: haversine or geodesic
    #[arg(long)]
    metric: Option<DistanceMetric>,

    /// Discard the candidate still open when a trajectory ends
    #[arg(long)]
    drop_trailing: bool,

    /// Process subjects on all cores
    #[cfg(feature = "parallel")]
    #[arg(long)]
    parallel: bool,
}

impl Cli {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(meters) = self.distance_threshold {
            config.stay_points.distance_threshold = meters;
        }
        if let Some(minutes) = self.time_threshold {
            config.stay_points.time_threshold = minutes_to_duration(minutes)?;
        }
        if let Some(minutes) = self.gap_threshold {
            config.segmentation.gap_threshold = minutes_to_duration(minutes)?;
        }
        if let Some(metric) = self.metric {
            config.metric = metric;
        }
        if self.drop_trailing {
            config.stay_points.tail_policy = TailPolicy::Drop;
        }

        config.validate()?;
        Ok(config)
    }

    fn output_directory(&self) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(|| self.input_directory.join(DEFAULT_OUTPUT_DIR))
    }
}

fn minutes_to_duration(minutes: i64) -> anyhow::Result<Duration> {
    match Duration::try_minutes(minutes) {
        Some(d) => Ok(d),
        None => bail!("{} minutes is out of range", minutes),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_secs()
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    if !cli.input_directory.is_dir() {
        bail!("input directory {} does not exist", cli.input_directory.display());
    }

    let config = cli.pipeline_config()?;
    let output = cli.output_directory();
    info!(
        "distance_threshold={}m time_threshold={}s gap_threshold={}s metric={} tail={:?}",
        config.stay_points.distance_threshold,
        config.stay_points.time_threshold.num_seconds(),
        config.segmentation.gap_threshold.num_seconds(),
        config.metric,
        config.stay_points.tail_policy
    );

    let (subjects, load_failures) = load_subjects(&cli.input_directory)?;
    let mut all_ok = load_failures.is_empty();
    for failure in &load_failures {
        error!("[Subject {}] {}", failure.subject_id, failure.error);
    }

    #[cfg(feature = "parallel")]
    let results = if cli.parallel {
        staypoint_miner::process_subjects_parallel(&subjects, &config)
    } else {
        process_subjects(&subjects, &config)
    };
    #[cfg(not(feature = "parallel"))]
    let results = process_subjects(&subjects, &config);

    let mut total = 0;
    for (subject_id, result) in results {
        let saved = result.and_then(|report| {
            let path = output.join(format!("{}.csv", subject_id));
            save_stay_points_csv(&path, &report.stay_points)?;
            Ok(report.stay_points.len())
        });
        match saved {
            Ok(count) => total += count,
            Err(e) => {
                error!("[Subject {}] {}", subject_id, e);
                all_ok = false;
            }
        }
    }

    info!("{} stay points written to {}", total, output.display());
    Ok(all_ok)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let start = Instant::now();
    let outcome = run(&cli);
    info!("Execution time: {:.2?}", start.elapsed());

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("Some subjects failed; see messages above");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
