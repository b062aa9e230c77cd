use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use growxcor_engine::{Dispatcher, EventFeature, XcorFormatter, load_events};
use growxcor_io::{
    ConfigReader, EventListReader, EventListWriter, RunArchive, RunSummary, SummaryWriter,
    XcorWriter, discover_event_ids,
};

#[derive(Parser)]
#[command(name = "growxcor")]
#[command(about = "Pairwise differential times and waveform similarity for GrowClust xcordata")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Number every located event found in the runs directory
    EventIds {
        /// Runs directory searched recursively for *.event files
        #[arg(long, default_value = "./outputs/runs")]
        runs: PathBuf,

        /// Event list file to write
        #[arg(long, default_value = "./evID.txt")]
        output: PathBuf,
    },

    /// Correlate every event pair and write the xcordata file
    Generate {
        /// Path to the JSON run configuration
        #[arg(long)]
        config: PathBuf,

        /// Worker threads (overrides the configuration)
        #[arg(long)]
        workers: Option<usize>,

        /// xcordata output path (overrides the configuration)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Directory receiving the generate_<timestamp>.log run log
        #[arg(long, default_value = ".")]
        log_dir: PathBuf,
    },
}

/// File name of the run log for a run started at `started`.
fn run_log_name(started: DateTime<Local>) -> String {
    format!("generate_{}.log", started.format("%Y%m%d%H%M%S"))
}

fn create_run_log(dir: &Path) -> Result<(File, PathBuf)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = dir.join(run_log_name(Local::now()));
    let file = File::create(&path)
        .with_context(|| format!("failed to create run log {}", path.display()))?;
    Ok((file, path))
}

/// Install the stderr subscriber, plus a plain-text file layer when a run
/// log is given. The returned guard flushes the file on drop.
fn init_tracing(verbose: bool, quiet: bool, run_log: Option<File>) -> Option<WorkerGuard> {
    let filter = match (verbose, quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // the run log keeps info records even under --quiet
    let (file_layer, guard) = match run_log {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(if verbose { "debug" } else { "info" }));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct EventIdsOutput {
    n_events: usize,
    first: Option<String>,
    last: Option<String>,
    output: String,
}

fn event_ids(runs: &Path, output: &Path) -> Result<EventIdsOutput> {
    let ids = discover_event_ids(runs).context("failed to discover event files")?;
    let entries = EventListWriter::new(output)
        .write(&ids)
        .context("failed to write event list")?;
    info!(n_events = entries.len(), "event IDs written");
    Ok(EventIdsOutput {
        n_events: entries.len(),
        first: entries.first().map(|e| e.event_id.to_string()),
        last: entries.last().map(|e| e.event_id.to_string()),
        output: output.display().to_string(),
    })
}

fn generate(config_path: &Path, workers: Option<usize>, output: Option<PathBuf>) -> Result<RunSummary> {
    let started = Instant::now();
    let mut config = ConfigReader::new(config_path)
        .read()
        .context("failed to read configuration")?;
    if let Some(workers) = workers {
        config.engine = config.engine.with_workers(workers);
    }
    if let Some(output) = output {
        config.output = output;
    }

    let entries = EventListReader::new(&config.event_list)
        .read()
        .context("failed to read event list")?;
    let archive = RunArchive::open(config.layout.clone())
        .context("failed to open run archive")?
        .with_unavailable_marker(config.unavailable_pick.as_str());
    let events = load_events(&archive, &entries).context("failed to load events")?;
    info!(
        n_events = events.len(),
        elapsed_mins = format!("{:.2}", started.elapsed().as_secs_f64() / 60.0),
        "data reading complete"
    );

    let dispatcher = Dispatcher::new(&config.engine).context("failed to start workers")?;
    let features = dispatcher
        .build_features(&events)
        .context("failed to build event features")?;
    let outcome = dispatcher
        .run(&features)
        .context("pairwise computation failed")?;

    let formatter = XcorFormatter::new(config.engine.precision());
    let pairs_written = XcorWriter::new(&config.output, formatter)
        .write(&outcome.pairs)
        .context("failed to write xcordata")?;
    info!(pairs_written, "total pairwise event computations");

    let summary = RunSummary {
        n_events: events.len(),
        pairs_evaluated: outcome.counters.pairs_evaluated,
        pairs_written,
        lines_written: outcome.pairs.iter().map(|p| p.lines.len()).sum(),
        matches: outcome.counters.matches,
        degenerate_matches: outcome.counters.degenerate_matches,
        truncated_windows: features.iter().map(EventFeature::n_truncated).sum(),
        workers: dispatcher.workers(),
        elapsed_secs: started.elapsed().as_secs_f64(),
        output: config.output.display().to_string(),
    };
    SummaryWriter::for_output(&config.output)
        .write(&summary)
        .context("failed to write run summary")?;
    Ok(summary)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let run_log = match &cli.command {
        Command::Generate { log_dir, .. } => Some(create_run_log(log_dir)?),
        Command::EventIds { .. } => None,
    };
    let log_path = run_log.as_ref().map(|(_, path)| path.clone());
    let _guard = init_tracing(cli.verbose, cli.quiet, run_log.map(|(file, _)| file));
    if let Some(path) = &log_path {
        info!(path = %path.display(), "run log opened");
    }

    match cli.command {
        Command::EventIds { runs, output } => {
            let out = event_ids(&runs, &output)?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Command::Generate {
            config,
            workers,
            output,
            ..
        } => {
            let summary = generate(&config, workers, output)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
