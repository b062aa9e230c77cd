//! Error types for configuration, feature building, and pairwise dispatch.

use growxcor_signal::SignalError;

/// Errors from engine configuration and computation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Returned when the travel-time differential convention is not recognized.
    #[error(
        "invalid tdiff_convention \"{value}\": expected first_minus_second (12) or second_minus_first (21)"
    )]
    InvalidConvention {
        /// The rejected value.
        value: String,
    },

    /// Returned when a policy option holds an unknown value.
    #[error("invalid {key} \"{value}\": expected one of {expected}")]
    InvalidPolicy {
        /// Configuration key of the policy.
        key: &'static str,
        /// The rejected value.
        value: String,
        /// Accepted values, comma separated.
        expected: &'static str,
    },

    /// Returned when the channel to phase table is empty.
    #[error("channel_phases must map at least one channel to a phase")]
    EmptyChannelTable,

    /// Returned when a phase used by the channel table has no window offsets.
    #[error("phase_windows has no entry for phase {phase}")]
    MissingPhaseWindow {
        /// The phase lacking a window.
        phase: String,
    },

    /// Returned when a phase window's lower offset exceeds its upper offset.
    #[error("phase_windows entry for phase {phase} is inverted: lower {lower} > upper {upper}")]
    InvalidPhaseWindow {
        /// The phase of the offending window.
        phase: String,
        /// Lower sample offset.
        lower: i64,
        /// Upper sample offset.
        upper: i64,
    },

    /// Returned when a decimal precision exceeds the supported maximum.
    #[error("precision.{key} must be at most {max}, got {digits}")]
    InvalidPrecision {
        /// Name of the precision field.
        key: &'static str,
        /// The rejected number of digits.
        digits: usize,
        /// Largest accepted number of digits.
        max: usize,
    },

    /// Returned when the progress interval is zero.
    #[error("progress_every must be at least 1")]
    InvalidProgressInterval,

    /// Returned when the worker count is zero.
    #[error("workers must be at least 1")]
    InvalidWorkerCount,

    /// Returned when the worker pool cannot be created.
    #[error("cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Returned when the event list is empty.
    #[error("no events to process")]
    NoEvents,

    /// Returned when a trace's channel has no entry in the channel to phase table.
    #[error("event {event}: channel {channel} at station {station} is not defined in channel_phases")]
    UnmappedChannel {
        /// Event identifier.
        event: String,
        /// Station code of the trace.
        station: String,
        /// The unmapped channel code.
        channel: String,
    },

    /// Returned under the `fail` edge policy when a similarity window reaches
    /// past either end of its trace.
    #[error(
        "event {event}: {phase} window [{start}, {end}] on {station}.{channel} exceeds trace of {len} samples"
    )]
    TruncatedWindow {
        /// Event identifier.
        event: String,
        /// Station code.
        station: String,
        /// Channel code.
        channel: String,
        /// Phase label.
        phase: String,
        /// Requested first sample index.
        start: i64,
        /// Requested last sample index (inclusive).
        end: i64,
        /// Number of samples in the trace.
        len: usize,
    },

    /// Returned when a similarity window holds non-finite samples.
    #[error("event {event}: invalid samples on {station}.{channel}")]
    InvalidSamples {
        /// Event identifier.
        event: String,
        /// Station code.
        station: String,
        /// Channel code.
        channel: String,
        /// Underlying window validation error.
        source: SignalError,
    },

    /// Returned under the `fail` degenerate policy when a window is flat.
    #[error(
        "events {first}/{second}: flat {phase} window of event {event} on {station}.{channel} cannot be correlated"
    )]
    DegenerateWindow {
        /// Identifier of the event whose window is flat.
        event: String,
        /// Sequential ID of the first event.
        first: String,
        /// Sequential ID of the second event.
        second: String,
        /// Station code.
        station: String,
        /// Channel code.
        channel: String,
        /// Phase label.
        phase: String,
    },

    /// Returned by [`InMemoryProvider`](crate::InMemoryProvider) for an unknown event.
    #[error("event {event_id} is not available")]
    UnknownEvent {
        /// The requested event identifier.
        event_id: String,
    },

    /// Wraps a provider failure while loading one event.
    #[error("cannot load event {event_id}")]
    Provider {
        /// Event identifier that failed to load.
        event_id: String,
        /// Underlying provider error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
