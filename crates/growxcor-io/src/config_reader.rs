//! JSON run configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use growxcor_engine::{
    Channel, DegeneratePolicy, EdgePolicy, EngineConfig, EngineError, Phase, PhaseWindow,
    Precision, TdiffConvention,
};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::IoError;
use crate::archive::ArchiveLayout;
use crate::tables::{DEFAULT_UNAVAILABLE_PICK, parse_timestamp};

/// `tdiff_convention` accepts either a name or the numeric alias.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConventionValue {
    Code(u32),
    Name(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPrecision {
    tdiff_digits: usize,
    score_digits: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawConfig {
    event_list: PathBuf,
    runs_path: PathBuf,
    output: PathBuf,
    chunk_origin: Option<String>,
    chunk_size_secs: i64,
    channel_phases: BTreeMap<String, String>,
    phase_windows: BTreeMap<String, (i64, i64)>,
    tdiff_convention: ConventionValue,
    precision: RawPrecision,
    progress_every: usize,
    workers: Option<usize>,
    degenerate_windows: String,
    truncated_windows: String,
    unavailable_pick: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            event_list: PathBuf::from("./evID.txt"),
            runs_path: PathBuf::from("./outputs/runs"),
            output: PathBuf::from("./xcordata.txt"),
            chunk_origin: None,
            chunk_size_secs: 7200,
            channel_phases: BTreeMap::from([
                ("GPZ".to_string(), "P".to_string()),
                ("GP1".to_string(), "S".to_string()),
                ("GP2".to_string(), "S".to_string()),
            ]),
            phase_windows: BTreeMap::from([
                ("P".to_string(), (-10, 30)),
                ("S".to_string(), (-8, 64)),
            ]),
            tdiff_convention: ConventionValue::Name("first_minus_second".to_string()),
            precision: RawPrecision {
                tdiff_digits: 5,
                score_digits: 4,
            },
            progress_every: 100,
            workers: None,
            degenerate_windows: "propagate".to_string(),
            truncated_windows: "keep".to_string(),
            unavailable_pick: DEFAULT_UNAVAILABLE_PICK.to_string(),
        }
    }
}

/// Validated configuration of one `generate` run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Event list file.
    pub event_list: PathBuf,
    /// Destination of the xcordata file.
    pub output: PathBuf,
    /// Run archive layout.
    pub layout: ArchiveLayout,
    /// Engine configuration.
    pub engine: EngineConfig,
    /// Pick table marker for unpicked phases.
    pub unavailable_pick: String,
}

/// Reads a JSON run configuration file.
///
/// Every key is optional except `chunk_origin`. Unknown keys are rejected.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::ConfigParse`] | Not JSON, wrong types or unknown keys |
/// | [`IoError::ConfigValue`] | `chunk_origin` absent or unparsable |
/// | [`IoError::InvalidChunkSize`] | `chunk_size_secs <= 0` |
/// | [`IoError::InvalidConfig`] | Engine validation failed |
pub struct ConfigReader {
    path: PathBuf,
}

impl ConfigReader {
    /// Create a reader for the given configuration path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the configuration.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<RunConfig, IoError> {
        let text = fs::read_to_string(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;
        let raw: RawConfig = serde_json::from_str(&text).map_err(|e| IoError::ConfigParse {
            path: self.path.clone(),
            source: e,
        })?;
        let config = self.validate(raw)?;
        debug!(
            workers = config.engine.workers(),
            progress_every = config.engine.progress_every(),
            "configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self, raw: RawConfig) -> Result<RunConfig, IoError> {
        let engine_error = |source: EngineError| IoError::InvalidConfig {
            path: self.path.clone(),
            source,
        };

        let raw_origin = raw.chunk_origin.ok_or_else(|| IoError::ConfigValue {
            path: self.path.clone(),
            key: "chunk_origin",
            reason: "required".to_string(),
        })?;
        let chunk_origin = parse_timestamp(&raw_origin).ok_or_else(|| IoError::ConfigValue {
            path: self.path.clone(),
            key: "chunk_origin",
            reason: format!("\"{raw_origin}\" is not a UTC timestamp"),
        })?;
        let layout = ArchiveLayout::new(&raw.runs_path, chunk_origin, raw.chunk_size_secs)?;

        let channel_phases: BTreeMap<Channel, Phase> = raw
            .channel_phases
            .into_iter()
            .map(|(c, p)| (Channel::new(c), Phase::new(p)))
            .collect();
        let phase_windows = raw
            .phase_windows
            .into_iter()
            .map(|(p, (lower, upper))| {
                let phase = Phase::new(p);
                PhaseWindow::new(&phase, lower, upper).map(|w| (phase, w))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map_err(engine_error)?;

        let convention = match raw.tdiff_convention {
            ConventionValue::Code(code) => code.to_string().parse::<TdiffConvention>(),
            ConventionValue::Name(name) => name.parse::<TdiffConvention>(),
        }
        .map_err(engine_error)?;
        let precision = Precision::new(raw.precision.tdiff_digits, raw.precision.score_digits)
            .map_err(engine_error)?;
        let degenerate = raw
            .degenerate_windows
            .parse::<DegeneratePolicy>()
            .map_err(engine_error)?;
        let edges = raw
            .truncated_windows
            .parse::<EdgePolicy>()
            .map_err(engine_error)?;

        let mut engine = EngineConfig::new(channel_phases, phase_windows)
            .map_err(engine_error)?
            .with_convention(convention)
            .with_precision(precision)
            .with_progress_every(raw.progress_every)
            .with_degenerate_policy(degenerate)
            .with_edge_policy(edges);
        if let Some(workers) = raw.workers {
            engine = engine.with_workers(workers);
        }
        if engine.progress_every() == 0 {
            return Err(engine_error(EngineError::InvalidProgressInterval));
        }
        if engine.workers() == 0 {
            return Err(engine_error(EngineError::InvalidWorkerCount));
        }

        Ok(RunConfig {
            event_list: raw.event_list,
            output: raw.output,
            layout,
            engine,
            unavailable_pick: raw.unavailable_pick,
        })
    }
}
