//! Pick table and location record readers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use growxcor_engine::{Phase, Pick, PickTime, Station};
use tracing::{debug, instrument};

use crate::IoError;

/// Default marker for a phase that was not picked.
pub const DEFAULT_UNAVAILABLE_PICK: &str = "-1";

/// Parse a UTC timestamp: RFC 3339, or `%Y-%m-%dT%H:%M:%S%.f` (also with a
/// space separator) with an optional trailing `Z`.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|t| t.and_utc())
}

fn open_csv(path: &Path) -> Result<csv::Reader<std::fs::File>, IoError> {
    let file = std::fs::File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    // flexible(true) so short rows surface as missing cells rather than
    // low-level CsvParse errors.
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn csv_error(path: &Path, e: csv::Error) -> IoError {
    IoError::CsvParse {
        path: path.to_path_buf(),
        offset: e.position().map_or(0, |p| p.byte()),
        source: e,
    }
}

fn column(
    headers: &csv::StringRecord,
    path: &Path,
    name: &'static str,
) -> Result<usize, IoError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| IoError::MissingColumn {
            path: path.to_path_buf(),
            column: name,
        })
}

/// Reads a pick table: CSV with `Station`, `Phase` and `PickTime` columns.
///
/// Other columns are ignored. A `PickTime` equal to the unavailable marker
/// yields [`PickTime::Unavailable`].
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | A required column is absent |
/// | [`IoError::InvalidTimestamp`] | A pick time is neither the marker nor a timestamp |
pub struct PickReader {
    path: PathBuf,
    unavailable: String,
}

impl PickReader {
    /// Create a reader using the default unavailable marker `-1`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            unavailable: DEFAULT_UNAVAILABLE_PICK.to_string(),
        }
    }

    /// Override the unavailable-pick marker.
    #[must_use]
    pub fn with_unavailable_marker(mut self, marker: impl Into<String>) -> Self {
        self.unavailable = marker.into();
        self
    }

    /// Read the picks in table order.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Vec<Pick>, IoError> {
        let mut rdr = open_csv(&self.path)?;
        let headers = rdr.headers().map_err(|e| csv_error(&self.path, e))?.clone();
        let station_col = column(&headers, &self.path, "Station")?;
        let phase_col = column(&headers, &self.path, "Phase")?;
        let time_col = column(&headers, &self.path, "PickTime")?;

        let mut picks = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| csv_error(&self.path, e))?;
            let raw = record.get(time_col).unwrap_or("");
            let time = if raw == self.unavailable {
                PickTime::Unavailable
            } else {
                PickTime::At(parse_timestamp(raw).ok_or_else(|| IoError::InvalidTimestamp {
                    path: self.path.clone(),
                    row_index,
                    raw: raw.to_string(),
                })?)
            };
            picks.push(Pick {
                station: Station::new(record.get(station_col).unwrap_or("")),
                phase: Phase::new(record.get(phase_col).unwrap_or("")),
                time,
            });
        }

        debug!(n_picks = picks.len(), "picks loaded");
        Ok(picks)
    }
}

/// Reads the origin time from a location record: CSV whose first data
/// row's `DT` column holds the event origin.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | No `DT` column |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InvalidTimestamp`] | `DT` is not a timestamp |
pub struct OriginReader {
    path: PathBuf,
}

impl OriginReader {
    /// Create a reader for the given location record.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read the origin time.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<DateTime<Utc>, IoError> {
        let mut rdr = open_csv(&self.path)?;
        let headers = rdr.headers().map_err(|e| csv_error(&self.path, e))?.clone();
        let dt_col = column(&headers, &self.path, "DT")?;

        let record = rdr
            .records()
            .next()
            .ok_or_else(|| IoError::EmptyDataset {
                path: self.path.clone(),
            })?
            .map_err(|e| csv_error(&self.path, e))?;
        let raw = record.get(dt_col).unwrap_or("");
        parse_timestamp(raw).ok_or_else(|| IoError::InvalidTimestamp {
            path: self.path.clone(),
            row_index: 0,
            raw: raw.to_string(),
        })
    }
}
