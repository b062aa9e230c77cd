//! Run archive layout resolution and the on-disk event provider.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use growxcor_engine::{Event, EventEntry, EventProvider};
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::mseed::MseedReader;
use crate::tables::{DEFAULT_UNAVAILABLE_PICK, OriginReader, PickReader};

/// Timestamp format of event ID prefixes and run directory components.
const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const STAMP_LEN: usize = 14;

/// Where run directories live and how time chunks are laid out.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveLayout {
    runs_path: PathBuf,
    chunk_origin: DateTime<Utc>,
    chunk_size: Duration,
}

impl ArchiveLayout {
    /// Create a layout.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidChunkSize`] if `chunk_size_secs <= 0`.
    pub fn new(
        runs_path: &Path,
        chunk_origin: DateTime<Utc>,
        chunk_size_secs: i64,
    ) -> Result<Self, IoError> {
        if chunk_size_secs <= 0 {
            return Err(IoError::InvalidChunkSize {
                secs: chunk_size_secs,
            });
        }
        Ok(Self {
            runs_path: runs_path.to_path_buf(),
            chunk_origin,
            chunk_size: Duration::seconds(chunk_size_secs),
        })
    }

    /// Return the runs directory.
    #[must_use]
    pub fn runs_path(&self) -> &Path {
        &self.runs_path
    }

    /// Start of the time chunk containing `event_id`'s detection time.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidEventId`] if the ID does not start with a
    /// `%Y%m%d%H%M%S` timestamp.
    pub fn chunk_start(&self, event_id: &str) -> Result<DateTime<Utc>, IoError> {
        let invalid = || IoError::InvalidEventId {
            event_id: event_id.to_string(),
        };
        let stamp = event_id.get(..STAMP_LEN).ok_or_else(invalid)?;
        let detected = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
            .map_err(|_| invalid())?
            .and_utc();

        let size_ms = self.chunk_size.num_milliseconds();
        let offset_ms = (detected - self.chunk_origin).num_milliseconds();
        Ok(detected - Duration::milliseconds(offset_ms.rem_euclid(size_ms)))
    }
}

/// Artifact files of one event inside its run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventArtifacts {
    /// Cut waveforms (miniSEED).
    pub waveforms: PathBuf,
    /// Pick table (CSV).
    pub picks: PathBuf,
    /// Location record (CSV).
    pub event: PathBuf,
}

/// Run archive on disk. Implements [`EventProvider`].
///
/// Run directories are the immediate subdirectories of the runs path,
/// listed once on open and kept sorted by name.
#[derive(Debug, Clone)]
pub struct RunArchive {
    layout: ArchiveLayout,
    run_dirs: Vec<String>,
    unavailable: String,
}

impl RunArchive {
    /// List the run directories of `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::ReadDir`] if the runs path cannot be listed.
    #[instrument(skip_all, fields(runs_path = %layout.runs_path.display()))]
    pub fn open(layout: ArchiveLayout) -> Result<Self, IoError> {
        let read_dir_error = |e| IoError::ReadDir {
            path: layout.runs_path.clone(),
            source: e,
        };
        let mut run_dirs = Vec::new();
        for entry in fs::read_dir(&layout.runs_path).map_err(read_dir_error)? {
            let entry = entry.map_err(read_dir_error)?;
            if entry.path().is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                run_dirs.push(name.to_string());
            }
        }
        run_dirs.sort();
        info!(n_runs = run_dirs.len(), "run archive opened");
        Ok(Self {
            layout,
            run_dirs,
            unavailable: DEFAULT_UNAVAILABLE_PICK.to_string(),
        })
    }

    /// Override the pick table's unavailable-pick marker.
    #[must_use]
    pub fn with_unavailable_marker(mut self, marker: impl Into<String>) -> Self {
        self.unavailable = marker.into();
        self
    }

    /// Return the layout.
    #[must_use]
    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Return the sorted run directory names.
    #[must_use]
    pub fn run_dirs(&self) -> &[String] {
        &self.run_dirs
    }

    /// Find the run directory holding `event_id`: the first, in name order,
    /// whose second-to-last `_`-separated component starts with the event's
    /// chunk start.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::InvalidEventId`] | The ID has no timestamp prefix |
    /// | [`IoError::RunDirNotFound`] | No run directory matches |
    pub fn run_dir(&self, event_id: &str) -> Result<PathBuf, IoError> {
        let chunk_start = self
            .layout
            .chunk_start(event_id)?
            .format(STAMP_FORMAT)
            .to_string();
        self.run_dirs
            .iter()
            .find(|name| {
                name.contains('_')
                    && name
                        .rsplit('_')
                        .nth(1)
                        .is_some_and(|start| start.starts_with(&chunk_start))
            })
            .map(|name| self.layout.runs_path.join(name))
            .ok_or_else(|| IoError::RunDirNotFound {
                event_id: event_id.to_string(),
                chunk_start,
            })
    }

    /// Resolve and check the artifact paths of `event_id`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::InvalidEventId`] | The ID has no timestamp prefix |
    /// | [`IoError::RunDirNotFound`] | No run directory matches |
    /// | [`IoError::MissingArtifacts`] | Any artifact file is absent |
    pub fn artifacts(&self, event_id: &str) -> Result<EventArtifacts, IoError> {
        let locate = self.run_dir(event_id)?.join("locate");
        let artifacts = EventArtifacts {
            waveforms: locate
                .join("raw_cut_waveforms")
                .join(format!("{event_id}.m")),
            picks: locate.join("picks").join(format!("{event_id}.picks")),
            event: locate.join("events").join(format!("{event_id}.event")),
        };
        let missing: Vec<PathBuf> = [&artifacts.waveforms, &artifacts.picks, &artifacts.event]
            .into_iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(IoError::MissingArtifacts {
                event_id: event_id.to_string(),
                paths: missing,
            });
        }
        Ok(artifacts)
    }
}

impl EventProvider for RunArchive {
    type Error = IoError;

    #[instrument(skip_all, fields(event = %entry.event_id))]
    fn load(&self, entry: &EventEntry) -> Result<Event, IoError> {
        let artifacts = self.artifacts(entry.event_id.as_str())?;
        let traces = MseedReader::new(&artifacts.waveforms).read()?;
        let picks = PickReader::new(&artifacts.picks)
            .with_unavailable_marker(self.unavailable.as_str())
            .read()?;
        let origin = OriginReader::new(&artifacts.event).read()?;
        debug!(n_traces = traces.len(), n_picks = picks.len(), "event loaded");
        Ok(Event {
            id: entry.event_id.clone(),
            seq_id: entry.seq_id.clone(),
            origin,
            picks,
            traces,
        })
    }
}
