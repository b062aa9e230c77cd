//! Event list (`seqID eventID` per line) reading, discovery and writing.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use growxcor_engine::EventEntry;
use tracing::{debug, info, instrument};

use crate::IoError;

/// Extension of upstream location records, used to discover event IDs.
const EVENT_EXTENSION: &str = "event";

/// Reads an event list file.
///
/// One `seqID eventID` pair per line, separated by whitespace. Blank lines
/// are ignored. Entries are returned sorted by `(seqID, eventID)` text.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::MalformedEventList`] | A line doesn't hold exactly two tokens |
/// | [`IoError::DuplicateEventId`] | Same event ID appears twice |
pub struct EventListReader {
    path: PathBuf,
}

impl EventListReader {
    /// Create a new reader for the given event list path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the event list.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Vec<EventEntry>, IoError> {
        let content = fs::read_to_string(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        let mut entries = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (i, raw) in content.lines().enumerate() {
            let line = i + 1;
            let tokens: Vec<&str> = raw.split_whitespace().collect();
            match tokens.as_slice() {
                [] => continue,
                [seq_id, event_id] => {
                    if let Some(&first_line) = seen.get(*event_id) {
                        return Err(IoError::DuplicateEventId {
                            path: self.path.clone(),
                            event_id: (*event_id).to_string(),
                            first_line,
                            second_line: line,
                        });
                    }
                    seen.insert((*event_id).to_string(), line);
                    entries.push(EventEntry::new(*seq_id, *event_id));
                }
                _ => {
                    return Err(IoError::MalformedEventList {
                        path: self.path.clone(),
                        line,
                        content: raw.to_string(),
                    });
                }
            }
        }

        entries.sort();
        info!(n_events = entries.len(), "event list loaded");
        Ok(entries)
    }
}

/// Collect the stems of every `*.event` file below `runs_path`, sorted.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::ReadDir`] | A directory cannot be listed |
/// | [`IoError::NoEventFiles`] | No event files were found |
#[instrument(skip_all, fields(runs_path = %runs_path.display()))]
pub fn discover_event_ids(runs_path: &Path) -> Result<Vec<String>, IoError> {
    let mut ids = Vec::new();
    collect_event_stems(runs_path, &mut ids)?;
    if ids.is_empty() {
        return Err(IoError::NoEventFiles {
            path: runs_path.to_path_buf(),
        });
    }
    ids.sort();
    info!(n_events = ids.len(), "event files discovered");
    Ok(ids)
}

fn collect_event_stems(dir: &Path, ids: &mut Vec<String>) -> Result<(), IoError> {
    let read_dir_error = |e| IoError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    };
    for entry in fs::read_dir(dir).map_err(read_dir_error)? {
        let path = entry.map_err(read_dir_error)?.path();
        if path.is_dir() {
            collect_event_stems(&path, ids)?;
        } else if path.extension().is_some_and(|ext| ext == EVENT_EXTENSION)
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            debug!(path = %path.display(), "event file");
            ids.push(stem.to_string());
        }
    }
    Ok(())
}

/// Writes an event list, numbering events from `0000001`.
pub struct EventListWriter {
    path: PathBuf,
}

impl EventListWriter {
    /// Create a writer targeting `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Assign sequential IDs in the given order and write `seqID eventID`
    /// lines joined by newlines. Returns the written entries.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::OutputDirCreate`] | The parent directory cannot be created |
    /// | [`IoError::WriteFile`] | The file cannot be written |
    #[instrument(skip_all, fields(path = %self.path.display(), n_events = event_ids.len()))]
    pub fn write(&self, event_ids: &[String]) -> Result<Vec<EventEntry>, IoError> {
        let entries: Vec<EventEntry> = event_ids
            .iter()
            .enumerate()
            .map(|(i, id)| EventEntry::new(format!("{:07}", i + 1), id.as_str()))
            .collect();
        let text = entries
            .iter()
            .map(|e| format!("{} {}", e.seq_id, e.event_id))
            .collect::<Vec<_>>()
            .join("\n");

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| IoError::OutputDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(&self.path, text).map_err(|e| IoError::WriteFile {
            path: self.path.clone(),
            source: e,
        })?;

        info!("event list written");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_list(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_and_sorts_entries() {
        let f = write_list("0000002 20230106010000_b\n\n0000001 20230106000000_a\n");
        let entries = EventListReader::new(f.path()).read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq_id.as_str(), "0000001");
        assert_eq!(entries[0].event_id.as_str(), "20230106000000_a");
        assert_eq!(entries[1].seq_id.as_str(), "0000002");
    }

    #[test]
    fn tolerates_missing_trailing_newline_and_extra_spaces() {
        let f = write_list("0000001   ev_a\n0000002\tev_b");
        let entries = EventListReader::new(f.path()).read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].event_id.as_str(), "ev_b");
    }

    #[test]
    fn malformed_line_reports_number() {
        let f = write_list("0000001 ev_a\n0000002 ev_b extra\n");
        let err = EventListReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::MalformedEventList { line: 2, .. }));
    }

    #[test]
    fn duplicate_event_is_rejected() {
        let f = write_list("0000001 ev_a\n0000002 ev_a\n");
        let err = EventListReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::DuplicateEventId { first_line: 1, second_line: 2, .. }
        ));
    }

    #[test]
    fn missing_file() {
        let err = EventListReader::new(Path::new("/nonexistent/evID.txt"))
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::FileNotFound { .. }));
    }

    #[test]
    fn discovers_event_files_recursively() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("run_1/locate/events");
        let b = dir.path().join("run_2/locate/events");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(b.join("20230106030000_x.event"), "").unwrap();
        fs::write(a.join("20230106010000_y.event"), "").unwrap();
        fs::write(a.join("20230106010000_y.picks"), "").unwrap();

        let ids = discover_event_ids(dir.path()).unwrap();
        assert_eq!(ids, vec!["20230106010000_y", "20230106030000_x"]);
    }

    #[test]
    fn discovery_without_events_fails() {
        let dir = TempDir::new().unwrap();
        let err = discover_event_ids(dir.path()).unwrap_err();
        assert!(matches!(err, IoError::NoEventFiles { .. }));
    }

    #[test]
    fn writes_numbered_lines_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/evID.txt");
        let ids = vec!["ev_a".to_string(), "ev_b".to_string()];
        let written = EventListWriter::new(&path).write(&ids).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "0000001 ev_a\n0000002 ev_b"
        );
        let read = EventListReader::new(&path).read().unwrap();
        assert_eq!(read, written);
    }
}
