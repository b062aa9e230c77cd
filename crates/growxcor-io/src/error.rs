//! I/O error types for growxcor-io.

use std::path::PathBuf;

use growxcor_engine::EngineError;

/// Errors from the run archive, tabular inputs, configuration, and output files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when an input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a directory cannot be listed.
    #[error("cannot list directory {path}")]
    ReadDir {
        /// Directory that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when a required CSV column is absent from the header.
    #[error("missing column \"{column}\" in {path}")]
    MissingColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// Name of the absent column.
        column: &'static str,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a timestamp cell cannot be parsed.
    #[error("invalid timestamp in {path}: row {row_index}, raw value \"{raw}\"")]
    InvalidTimestamp {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when an event list line is not exactly `seqID eventID`.
    #[error("malformed event list line {line} in {path}: \"{content}\"")]
    MalformedEventList {
        /// Path to the event list.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// Returned when an event identifier appears twice in the event list.
    #[error("duplicate event ID \"{event_id}\" in {path}: lines {first_line} and {second_line}")]
    DuplicateEventId {
        /// Path to the event list.
        path: PathBuf,
        /// The duplicated event identifier.
        event_id: String,
        /// One-based line of the first occurrence.
        first_line: usize,
        /// One-based line of the second occurrence.
        second_line: usize,
    },

    /// Returned when no `*.event` files exist below the runs directory.
    #[error("no event files found under {path}")]
    NoEventFiles {
        /// Runs directory that was searched.
        path: PathBuf,
    },

    /// Returned when an event identifier does not start with a
    /// `%Y%m%d%H%M%S` timestamp.
    #[error("event ID \"{event_id}\" does not start with a YYYYmmddHHMMSS timestamp")]
    InvalidEventId {
        /// The offending event identifier.
        event_id: String,
    },

    /// Returned when the chunk size is not positive.
    #[error("chunk_size_secs must be positive, got {secs}")]
    InvalidChunkSize {
        /// The rejected chunk size.
        secs: i64,
    },

    /// Returned when no run directory covers an event's time chunk.
    #[error("event {event_id}: no run directory for chunk starting {chunk_start}")]
    RunDirNotFound {
        /// Event identifier.
        event_id: String,
        /// Chunk start formatted as `%Y%m%d%H%M%S`.
        chunk_start: String,
    },

    /// Returned when one or more of an event's artifact files are absent.
    #[error("event {event_id} missing files: {}", display_paths(.paths))]
    MissingArtifacts {
        /// Event identifier.
        event_id: String,
        /// Every missing path.
        paths: Vec<PathBuf>,
    },

    /// Returned when a miniSEED file cannot be decoded.
    #[error("invalid miniSEED file {path}")]
    MiniSeed {
        /// Path to the miniSEED file.
        path: PathBuf,
        /// Underlying decode error.
        source: MseedError,
    },

    /// Returned when the configuration file is not valid JSON for the
    /// expected schema.
    #[error("cannot parse configuration {path}")]
    ConfigParse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Returned when a configuration value is well-formed JSON but unusable.
    #[error("invalid configuration value for {key} in {path}: {reason}")]
    ConfigValue {
        /// Path to the configuration file.
        path: PathBuf,
        /// Offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Returned when the configuration fails engine validation.
    #[error("invalid configuration {path}")]
    InvalidConfig {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying engine validation error.
        source: EngineError,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when an output file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors from decoding miniSEED 2 records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MseedError {
    /// Returned when a record is shorter than its declared or minimum length.
    #[error("record at byte {offset} is truncated")]
    Truncated {
        /// Byte offset of the record.
        offset: usize,
    },

    /// Returned when a record header holds values outside the SEED format.
    #[error("record at byte {offset}: {reason}")]
    InvalidHeader {
        /// Byte offset of the record.
        offset: usize,
        /// What is wrong with the header.
        reason: String,
    },

    /// Returned when a record has no blockette 1000.
    #[error("record at byte {offset} has no blockette 1000")]
    MissingBlockette1000 {
        /// Byte offset of the record.
        offset: usize,
    },

    /// Returned when the data encoding is not supported.
    #[error("record at byte {offset}: unsupported data encoding {encoding}")]
    UnsupportedEncoding {
        /// Byte offset of the record.
        offset: usize,
        /// SEED encoding code.
        encoding: u8,
    },

    /// Returned when compressed frames hold fewer samples than the header declares.
    #[error("record at byte {offset}: frames hold {decoded} samples, header declares {expected}")]
    SampleCountMismatch {
        /// Byte offset of the record.
        offset: usize,
        /// Samples declared in the fixed header.
        expected: usize,
        /// Samples found in the data frames.
        decoded: usize,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
