//! Pairwise differential-time and waveform-similarity engine.
//!
//! Builds per-event station/phase features from picks and waveform cuts,
//! correlates every event pair on a dedicated rayon pool, and formats the
//! results as GrowClust `xcordata` blocks. File layouts are kept out of this
//! crate: events arrive through the [`EventProvider`] capability.

mod config;
mod dispatch;
mod error;
mod feature;
mod format;
mod model;
mod pair;
mod provider;

pub use config::{
    DegeneratePolicy, EdgePolicy, EngineConfig, PhaseWindow, Precision, TdiffConvention,
};
pub use dispatch::{Dispatcher, PairwiseOutcome, ProgressRecord};
pub use error::EngineError;
pub use feature::{ChannelWindow, EventFeature, FeatureBuilder, StationPhase};
pub use format::XcorFormatter;
pub use model::{
    Channel, Event, EventId, Phase, Pick, PickTime, SeqId, Station, WaveformTrace,
    seconds_between,
};
pub use pair::{MatchLine, PairCounters, PairResult, correlate_pair};
pub use provider::{EventEntry, EventProvider, InMemoryProvider, load_events};
