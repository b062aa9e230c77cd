//! Per-event feature building: station/phase keyed travel times and
//! similarity windows.

use std::collections::BTreeMap;

use growxcor_signal::Window;
use tracing::{debug, instrument, warn};

use crate::config::{EdgePolicy, EngineConfig};
use crate::error::EngineError;
use crate::model::{Channel, Event, EventId, Phase, PickTime, SeqId, Station, seconds_between};

/// Explicit (phase, station) key. Orders by phase first, then station.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StationPhase {
    /// Phase label.
    pub phase: Phase,
    /// Station code.
    pub station: Station,
}

impl StationPhase {
    /// Create a key.
    pub fn new(station: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            phase: Phase::new(phase),
            station: Station::new(station),
        }
    }
}

/// Travel time and similarity window of one channel at a station/phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelWindow {
    /// Channel the window was cut from.
    pub channel: Channel,
    /// Pick time minus event origin time, in seconds.
    pub travel_time: f64,
    /// Samples around the pick.
    pub window: Window,
    /// Offset of the window's first sample from the pick sample. Equals the
    /// phase's lower offset unless the start was clipped.
    pub lead: i64,
    /// True when the window was clipped by a trace boundary.
    pub truncated: bool,
}

/// Read-only lookup of an event's correlatable station/phase observations.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFeature {
    seq_id: SeqId,
    event_id: EventId,
    entries: BTreeMap<StationPhase, Vec<ChannelWindow>>,
}

impl EventFeature {
    /// Create an empty feature set for an event.
    #[must_use]
    pub fn new(seq_id: SeqId, event_id: EventId) -> Self {
        Self {
            seq_id,
            event_id,
            entries: BTreeMap::new(),
        }
    }

    /// Add a channel window under `key`. A second window for the same channel
    /// is ignored and `false` is returned.
    pub fn insert(&mut self, key: StationPhase, window: ChannelWindow) -> bool {
        let slot = self.entries.entry(key).or_default();
        if slot.iter().any(|w| w.channel == window.channel) {
            return false;
        }
        slot.push(window);
        true
    }

    /// Return the sequential ID of the event.
    #[must_use]
    pub fn seq_id(&self) -> &SeqId {
        &self.seq_id
    }

    /// Return the event identifier.
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Return the channel windows stored under `key`.
    #[must_use]
    pub fn get(&self, key: &StationPhase) -> Option<&[ChannelWindow]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Iterate keys and their windows in (phase, station) order.
    pub fn iter(&self) -> impl Iterator<Item = (&StationPhase, &[ChannelWindow])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Return the number of station/phase keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return true if the event has no correlatable observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the total number of channel windows.
    #[must_use]
    pub fn n_windows(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Return the number of windows clipped by a trace boundary.
    #[must_use]
    pub fn n_truncated(&self) -> usize {
        self.entries
            .values()
            .flatten()
            .filter(|w| w.truncated)
            .count()
    }
}

/// Builds [`EventFeature`]s from loaded events.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder<'a> {
    config: &'a EngineConfig,
}

impl<'a> FeatureBuilder<'a> {
    /// Create a builder using the given configuration.
    #[must_use]
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Build the feature lookup of one event.
    ///
    /// Each trace's channel is mapped to a phase, matched with the first pick
    /// of the same station and phase, and a window of samples around the pick
    /// is cut. Traces without a usable pick are skipped.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`EngineError::UnmappedChannel`] | A trace channel is not in the channel table |
    /// | [`EngineError::MissingPhaseWindow`] | The mapped phase has no window offsets |
    /// | [`EngineError::TruncatedWindow`] | A window is clipped under [`EdgePolicy::Fail`] |
    /// | [`EngineError::InvalidSamples`] | A window contains non-finite samples |
    #[instrument(skip_all, fields(event = %event.id, n_traces = event.traces.len()))]
    pub fn build(&self, event: &Event) -> Result<EventFeature, EngineError> {
        let mut feature = EventFeature::new(event.seq_id.clone(), event.id.clone());

        for trace in &event.traces {
            let phase = self.config.phase_for(&trace.channel).ok_or_else(|| {
                EngineError::UnmappedChannel {
                    event: event.id.to_string(),
                    station: trace.station.to_string(),
                    channel: trace.channel.to_string(),
                }
            })?;

            let pick = event
                .picks
                .iter()
                .find(|p| p.station == trace.station && &p.phase == phase);
            let pick_time = match pick.map(|p| p.time) {
                Some(PickTime::At(time)) => time,
                Some(PickTime::Unavailable) | None => {
                    debug!(trace = %trace.nslc(), %phase, "no usable pick, trace skipped");
                    continue;
                }
            };

            let offsets = self
                .config
                .window_for(phase)
                .ok_or_else(|| EngineError::MissingPhaseWindow {
                    phase: phase.to_string(),
                })?;

            let index = trace.sample_index(pick_time);
            let start = index + offsets.lower();
            let end = index + offsets.upper();
            let last = trace.samples.len() as i64 - 1;
            let clipped_start = start.max(0);
            let clipped_end = end.min(last);
            let truncated = clipped_start != start || clipped_end != end;

            if truncated {
                let outside = clipped_start > clipped_end;
                match self.config.edge_policy() {
                    EdgePolicy::Fail => {
                        return Err(EngineError::TruncatedWindow {
                            event: event.id.to_string(),
                            station: trace.station.to_string(),
                            channel: trace.channel.to_string(),
                            phase: phase.to_string(),
                            start,
                            end,
                            len: trace.samples.len(),
                        });
                    }
                    EdgePolicy::Exclude => {
                        warn!(trace = %trace.nslc(), %phase, start, end, len = trace.samples.len(), "window exceeds trace, excluded");
                        continue;
                    }
                    EdgePolicy::Keep if outside => {
                        warn!(trace = %trace.nslc(), %phase, start, end, len = trace.samples.len(), "window lies outside trace, excluded");
                        continue;
                    }
                    EdgePolicy::Keep => {
                        warn!(trace = %trace.nslc(), %phase, start, end, len = trace.samples.len(), "window exceeds trace, clipped");
                    }
                }
            }

            let samples = &trace.samples[clipped_start as usize..=clipped_end as usize];
            let window =
                Window::from_slice(samples).map_err(|source| EngineError::InvalidSamples {
                    event: event.id.to_string(),
                    station: trace.station.to_string(),
                    channel: trace.channel.to_string(),
                    source,
                })?;

            let key = StationPhase {
                phase: phase.clone(),
                station: trace.station.clone(),
            };
            let inserted = feature.insert(
                key,
                ChannelWindow {
                    channel: trace.channel.clone(),
                    travel_time: seconds_between(pick_time, event.origin),
                    window,
                    lead: clipped_start - index,
                    truncated,
                },
            );
            if !inserted {
                warn!(trace = %trace.nslc(), "duplicate channel segment ignored");
            }
        }

        debug!(
            n_keys = feature.len(),
            n_windows = feature.n_windows(),
            "features built"
        );
        Ok(feature)
    }
}
