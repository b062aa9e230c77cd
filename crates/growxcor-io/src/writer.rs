//! xcordata and run summary writers.

use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use growxcor_engine::{PairResult, XcorFormatter};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::IoError;

fn ensure_parent(path: &Path) -> Result<(), IoError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| IoError::OutputDirCreate {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Sibling path `path` + `suffix`, e.g. `xcordata.txt.summary.json`.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(OsString::new, OsString::from);
    name.push(suffix);
    path.with_file_name(name)
}

/// Writes pair results as an xcordata file.
///
/// Blocks are rendered into a uniquely named temporary file in the
/// destination directory, which replaces the destination only once every
/// block is written. A failed run never leaves a partial file behind, and
/// concurrent runs never share a staging file.
pub struct XcorWriter {
    path: PathBuf,
    formatter: XcorFormatter,
}

impl XcorWriter {
    /// Create a writer targeting `path`.
    pub fn new(path: &Path, formatter: XcorFormatter) -> Self {
        Self {
            path: path.to_path_buf(),
            formatter,
        }
    }

    /// Write every pair in order. Returns the number of pair blocks written.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::OutputDirCreate`] | The parent directory cannot be created |
    /// | [`IoError::WriteFile`] | Creating, writing or renaming the staging file failed |
    #[instrument(skip_all, fields(path = %self.path.display(), n_pairs = pairs.len()))]
    pub fn write(&self, pairs: &[PairResult]) -> Result<usize, IoError> {
        ensure_parent(&self.path)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let write_error = |e| IoError::WriteFile {
            path: self.path.clone(),
            source: e,
        };

        // dropping the staging file on any error path removes it
        let mut staging = NamedTempFile::new_in(dir).map_err(write_error)?;
        debug!(staging = %staging.path().display(), "staging xcordata");
        let written = {
            let mut out = BufWriter::new(&mut staging);
            let written = self
                .formatter
                .write_all(&mut out, pairs)
                .map_err(write_error)?;
            out.flush().map_err(write_error)?;
            written
        };
        staging
            .persist(&self.path)
            .map_err(|e| write_error(e.error))?;
        info!(written, "xcordata written");
        Ok(written)
    }
}

/// Totals of one `generate` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Events loaded.
    pub n_events: usize,
    /// Event pairs evaluated.
    pub pairs_evaluated: usize,
    /// Pair blocks written.
    pub pairs_written: usize,
    /// Station/phase lines written.
    pub lines_written: usize,
    /// Channel matches scored.
    pub matches: usize,
    /// Channel matches with a zero-variance window.
    pub degenerate_matches: usize,
    /// Similarity windows clipped by a trace boundary.
    pub truncated_windows: usize,
    /// Worker threads used.
    pub workers: usize,
    /// Wall-clock duration of the run in seconds.
    pub elapsed_secs: f64,
    /// Path of the xcordata file.
    pub output: String,
}

/// Writes a [`RunSummary`] as pretty JSON next to the xcordata file.
pub struct SummaryWriter {
    path: PathBuf,
}

impl SummaryWriter {
    /// Target `<output>.summary.json` for the given xcordata path.
    pub fn for_output(output: &Path) -> Self {
        Self {
            path: with_suffix(output, ".summary.json"),
        }
    }

    /// Return the summary path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the summary.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::OutputDirCreate`] | The parent directory cannot be created |
    /// | [`IoError::WriteFile`] | The file cannot be written |
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn write(&self, summary: &RunSummary) -> Result<(), IoError> {
        ensure_parent(&self.path)?;
        let json = serde_json::to_string_pretty(summary).map_err(|e| IoError::WriteFile {
            path: self.path.clone(),
            source: e.into(),
        })?;
        fs::write(&self.path, json).map_err(|e| IoError::WriteFile {
            path: self.path.clone(),
            source: e,
        })?;
        info!("run summary written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growxcor_engine::{MatchLine, Phase, SeqId, Station};
    use tempfile::TempDir;

    fn pair(first: &str, second: &str, tdiff: f64) -> PairResult {
        PairResult {
            first: SeqId::new(first),
            second: SeqId::new(second),
            lines: vec![MatchLine {
                phase: Phase::new("P"),
                station: Station::new("A1"),
                tdiff,
                score: 1.0,
            }],
        }
    }

    #[test]
    fn writes_blocks_and_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/xcordata.txt");
        let written = XcorWriter::new(&path, XcorFormatter::default())
            .write(&[pair("0000001", "0000002", -0.05)])
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# 0000001 0000002 0.000\n  A1 -0.05000 1.0000 P\n"
        );
        assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 1);
    }

    #[test]
    fn replaces_existing_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xcordata.txt");
        fs::write(&path, "stale").unwrap();
        XcorWriter::new(&path, XcorFormatter::default())
            .write(&[])
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn failed_write_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        // a directory in place of the output makes the final rename fail
        let path = dir.path().join("xcordata.txt");
        fs::create_dir(&path).unwrap();
        let err = XcorWriter::new(&path, XcorFormatter::default())
            .write(&[pair("0000001", "0000002", 0.1)])
            .unwrap_err();
        assert!(matches!(err, IoError::WriteFile { .. }));
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("xcordata.txt")]);
        assert!(path.is_dir());
    }

    #[test]
    fn staging_does_not_touch_foreign_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xcordata.txt");
        // leftover of another run staging next to the same output
        let other = dir.path().join("xcordata.txt.tmp");
        fs::write(&other, "other run").unwrap();
        for tdiff in [0.1, 0.2] {
            XcorWriter::new(&path, XcorFormatter::default())
                .write(&[pair("0000001", "0000002", tdiff)])
                .unwrap();
        }
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# 0000001 0000002 0.000\n  A1  0.20000 1.0000 P\n"
        );
        assert_eq!(fs::read_to_string(&other).unwrap(), "other run");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn summary_is_written_next_to_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("xcordata.txt");
        let writer = SummaryWriter::for_output(&output);
        assert_eq!(writer.path(), dir.path().join("xcordata.txt.summary.json"));

        let summary = RunSummary {
            n_events: 3,
            pairs_evaluated: 3,
            pairs_written: 2,
            lines_written: 4,
            matches: 4,
            degenerate_matches: 0,
            truncated_windows: 1,
            workers: 2,
            elapsed_secs: 0.5,
            output: output.display().to_string(),
        };
        writer.write(&summary).unwrap();

        let content: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(writer.path()).unwrap()).unwrap();
        assert_eq!(content["n_events"], 3);
        assert_eq!(content["pairs_written"], 2);
        assert_eq!(content["truncated_windows"], 1);
        assert_eq!(content["elapsed_secs"], 0.5);
    }
}
