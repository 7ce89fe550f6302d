//! TLE Ingest CLI
//!
//! Usage:
//!   tle-ingest extract dumps/2024-02-*.txt
//!   tle-ingest fetch --start-date 2024-02-01
//!   tle-ingest ground-trace 25544 --before-minutes 10 --after-minutes 20
//!   tle-ingest propagate 25544 --stop "+1 day" --output iss.json

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use orbital_mechanics::{
    compute_ground_trace, default_window, orbital_period_minutes, parse_stop_time,
    parse_time_input, to_geodetic, Propagator,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tle_archive::{ArchiveStore, DedupPolicy};
use tle_elements::TleRecord;
use tle_pipeline::{
    event_channel, BulkExtractor, FetchRunner, Phase, PipelineConfig, PipelineEvent, RunSummary,
    SpaceTrackSource, StopSignal,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tle-ingest", about = "Archive, fetch and propagate Two-Line Element sets")]
struct Args {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Archive root (overrides config and TLE_OBJECTS_DIR)
    #[arg(long, global = true)]
    objects_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fold TLE dump files into the per-object archive
    Extract {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Read undecodable B* terms as zero instead of skipping the record
        #[arg(long)]
        lenient_bstar: bool,

        /// Reject element sets with a bad checksum
        #[arg(long)]
        verify_checksum: bool,

        /// Merge policy: exact-content (default) or epoch-watermark
        #[arg(long)]
        policy: Option<DedupPolicy>,
    },
    /// Download history day by day from Space-Track, then extract it
    Fetch {
        /// First day to fetch when no watermark exists
        #[arg(long)]
        start_date: Option<NaiveDate>,

        #[arg(long)]
        download_dir: Option<PathBuf>,

        /// Seconds between requests
        #[arg(long)]
        delay_secs: Option<u64>,

        /// Restrict to these catalog numbers
        #[arg(long, value_delimiter = ',')]
        norad: Vec<u32>,
    },
    /// Ground track around the latest archived epoch of one object
    GroundTrace {
        norad_id: u32,

        /// Window start, YYYY-MM-DD[ HH:MM:SS]; default is half a period before epoch
        #[arg(long)]
        start: Option<String>,

        /// Window stop, absolute or "+N days"
        #[arg(long)]
        stop: Option<String>,

        #[arg(long, default_value_t = 10.0)]
        before_minutes: f64,

        #[arg(long, default_value_t = 20.0)]
        after_minutes: f64,

        #[arg(long, default_value_t = 60)]
        step_secs: i64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Propagate the latest archived element set of one object
    Propagate {
        norad_id: u32,

        /// Start time; default is the element set epoch
        #[arg(long)]
        start: Option<String>,

        #[arg(long, default_value = "+1 day")]
        stop: String,

        #[arg(long, default_value_t = 60)]
        step_secs: i64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct PropagationReport {
    norad_id: u32,
    times: Vec<DateTime<Utc>>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    altitudes: Vec<f64>,
    dropped: usize,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "tle_pipeline=debug,tle_archive=debug,tle_elements=debug,orbital_mechanics=debug,info"
    } else {
        "tle_pipeline=info,tle_archive=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.objects_dir {
        config.objects_dir = dir;
    }

    match args.command {
        Command::Extract {
            inputs,
            lenient_bstar,
            verify_checksum,
            policy,
        } => {
            config.strict_bstar &= !lenient_bstar;
            config.verify_checksum |= verify_checksum;
            if policy.is_some() {
                config.dedup_policy = policy;
            }
            let summary = run_extract(config, inputs).await?;
            write_json(None, &summary)
        }
        Command::Fetch {
            start_date,
            download_dir,
            delay_secs,
            norad,
        } => {
            if start_date.is_some() {
                config.fetch_start_date = start_date;
            }
            if let Some(dir) = download_dir {
                config.download_dir = dir;
            }
            if let Some(delay) = delay_secs {
                config.request_delay_secs = delay;
            }
            let summary = run_fetch(config, norad).await?;
            write_json(None, &summary)
        }
        Command::GroundTrace {
            norad_id,
            start,
            stop,
            before_minutes,
            after_minutes,
            step_secs,
            output,
        } => {
            let store = ArchiveStore::open(&config.objects_dir)?;
            let record = latest_record(&store, norad_id)?;
            let epoch = record.sort_key();
            let period = orbital_period_minutes(&record);

            let (start, stop) = match start {
                None => default_window(epoch, period),
                Some(text) => {
                    let start = parse_time_input(&text)
                        .with_context(|| format!("unrecognised start time {:?}", text))?;
                    let stop = match stop {
                        Some(text) => parse_stop_time(start, &text),
                        None => start + minutes(period),
                    };
                    (start, stop)
                }
            };
            info!("NORAD {}: ground trace {} .. {}", norad_id, start, stop);

            let trace = compute_ground_trace(
                &record,
                start,
                stop,
                minutes(before_minutes),
                minutes(after_minutes),
                Duration::seconds(step_secs),
            )?;
            write_json(output.as_deref(), &trace)
        }
        Command::Propagate {
            norad_id,
            start,
            stop,
            step_secs,
            output,
        } => {
            let store = ArchiveStore::open(&config.objects_dir)?;
            let record = latest_record(&store, norad_id)?;
            let start = match start {
                Some(text) => parse_time_input(&text)
                    .with_context(|| format!("unrecognised start time {:?}", text))?,
                None => record.sort_key(),
            };
            let stop = parse_stop_time(start, &stop);

            let trajectory =
                Propagator::new(&record)?.propagate(start, stop, Duration::seconds(step_secs))?;
            if trajectory.dropped > 0 {
                warn!("NORAD {}: {} samples dropped", norad_id, trajectory.dropped);
            }
            let track = to_geodetic(&trajectory);
            let report = PropagationReport {
                norad_id,
                times: trajectory.times,
                latitudes: track.latitudes,
                longitudes: track.longitudes,
                altitudes: track.altitudes,
                dropped: trajectory.dropped,
            };
            write_json(output.as_deref(), &report)
        }
    }
}

async fn run_extract(config: PipelineConfig, inputs: Vec<PathBuf>) -> Result<RunSummary> {
    let store = Arc::new(ArchiveStore::open(&config.objects_dir)?);
    let extractor = Arc::new(
        BulkExtractor::new(store, config.parse_options()).with_policy(config.extract_policy()),
    );
    stop_on_ctrl_c(extractor.stop_signal().clone());

    let (sink, rx) = event_channel();
    let reporter = tokio::spawn(report_progress(rx));

    let worker = Arc::clone(&extractor);
    let summary = tokio::task::spawn_blocking(move || worker.run(&inputs, &sink)).await??;
    reporter.await?;
    Ok(summary)
}

async fn run_fetch(config: PipelineConfig, norad_ids: Vec<u32>) -> Result<RunSummary> {
    let store = Arc::new(ArchiveStore::open(&config.objects_dir)?);
    let runner = Arc::new(FetchRunner::new(store, &config).with_norad_ids(&norad_ids));
    stop_on_ctrl_c(runner.stop_signal().clone());

    let (sink, rx) = event_channel();
    let reporter = tokio::spawn(report_progress(rx));

    let worker = Arc::clone(&runner);
    let summary = tokio::task::spawn_blocking(move || -> Result<RunSummary> {
        // The blocking HTTP client must be built off the async runtime.
        let mut source = SpaceTrackSource::from_env()?;
        Ok(worker.run(&mut source, &sink)?)
    })
    .await??;
    reporter.await?;
    Ok(summary)
}

fn stop_on_ctrl_c(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing current step");
            stop.stop();
        }
    });
}

/// Progress lines in 10% steps; everything else is already in the log.
async fn report_progress(mut rx: UnboundedReceiver<PipelineEvent>) {
    let mut shown: HashMap<Phase, u8> = HashMap::new();
    while let Some(event) = rx.recv().await {
        if let PipelineEvent::Progress { phase, percent } = event {
            let bucket = percent / 10 * 10;
            if shown.get(&phase).map_or(true, |last| bucket > *last) {
                shown.insert(phase, bucket);
                info!("{:?}: {}%", phase, bucket);
            }
        }
    }
}

fn latest_record(store: &ArchiveStore, norad_id: u32) -> Result<TleRecord> {
    store
        .load(norad_id)?
        .into_iter()
        .filter(|r| !r.has_epoch_anomaly())
        .max_by_key(|r| r.sort_key())
        .with_context(|| format!("no archived element set with a valid epoch for NORAD {}", norad_id))
}

fn minutes(value: f64) -> Duration {
    Duration::milliseconds((value * 60_000.0).round() as i64)
}

fn write_json<T: Serialize>(output: Option<&Path>, value: &T) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            info!("Wrote {:?}", path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}
