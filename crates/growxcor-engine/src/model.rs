//! Domain types: events, picks, and waveform traces.

use std::fmt;

use chrono::{DateTime, Utc};

macro_rules! code_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Wrap a code string.
            pub fn new(code: impl Into<String>) -> Self {
                Self(code.into())
            }

            /// Return the code as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(code: &str) -> Self {
                Self::new(code)
            }
        }
    };
}

code_newtype!(
    /// Station code, e.g. `A1`.
    Station
);
code_newtype!(
    /// Channel code, e.g. `GPZ`.
    Channel
);
code_newtype!(
    /// Phase label, e.g. `P` or `S`. Ordered lexicographically.
    Phase
);
code_newtype!(
    /// Upstream event identifier. The first 14 characters encode the
    /// detection time as `%Y%m%d%H%M%S`.
    EventId
);
code_newtype!(
    /// Sequential event ID as written in the event list, e.g. `0000001`.
    /// Zero-padded, so text order matches numeric order.
    SeqId
);

/// Arrival time of a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickTime {
    /// The phase was picked at this time.
    At(DateTime<Utc>),
    /// The pick table carries the "unavailable" sentinel for this phase.
    Unavailable,
}

/// A phase-arrival observation at a station.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    /// Station code.
    pub station: Station,
    /// Phase label.
    pub phase: Phase,
    /// Pick time, or the unavailable marker.
    pub time: PickTime,
}

/// A recorded waveform segment for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformTrace {
    /// Network code.
    pub network: String,
    /// Station code.
    pub station: Station,
    /// Location code.
    pub location: String,
    /// Channel code.
    pub channel: Channel,
    /// Time of the first sample.
    pub start: DateTime<Utc>,
    /// Sampling rate in Hz.
    pub sampling_rate: f64,
    /// Amplitude samples.
    pub samples: Vec<f64>,
}

impl WaveformTrace {
    /// Return the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Return true if the trace has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample index of `time` relative to the trace start:
    /// `round((time - start) * sampling_rate)`. May be negative or beyond the
    /// last sample.
    #[must_use]
    pub fn sample_index(&self, time: DateTime<Utc>) -> i64 {
        (seconds_between(time, self.start) * self.sampling_rate).round() as i64
    }

    /// Return the dotted `NET.STA.LOC.CHA` identifier.
    #[must_use]
    pub fn nslc(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// A located seismic event with its picks and cut waveforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Upstream event identifier.
    pub id: EventId,
    /// Sequential ID from the event list.
    pub seq_id: SeqId,
    /// Origin time.
    pub origin: DateTime<Utc>,
    /// Picks in table order.
    pub picks: Vec<Pick>,
    /// Traces in file order.
    pub traces: Vec<WaveformTrace>,
}

/// Signed difference `later - earlier` in seconds, at nanosecond resolution.
#[must_use]
pub fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, nanos).unwrap()
    }

    #[test]
    fn seconds_between_is_signed() {
        let a = at(100, 0);
        let b = at(101, 50_000_000);
        assert!((seconds_between(b, a) - 1.05).abs() < 1e-12);
        assert!((seconds_between(a, b) + 1.05).abs() < 1e-12);
    }

    #[test]
    fn sample_index_rounds_to_nearest() {
        let trace = WaveformTrace {
            network: "XX".into(),
            station: Station::new("A1"),
            location: String::new(),
            channel: Channel::new("GPZ"),
            start: at(0, 0),
            sampling_rate: 1000.0,
            samples: vec![0.0; 10],
        };
        assert_eq!(trace.sample_index(at(0, 2_400_000)), 2);
        assert_eq!(trace.sample_index(at(0, 2_600_000)), 3);
        assert_eq!(trace.sample_index(at(-1, 999_000_000)), -1);
    }

    #[test]
    fn codes_order_lexicographically() {
        assert!(Phase::new("P") < Phase::new("S"));
        assert!(SeqId::new("0000009") < SeqId::new("0000010"));
        assert_eq!(Station::from("A1").to_string(), "A1");
    }

    #[test]
    fn nslc_joins_codes() {
        let trace = WaveformTrace {
            network: "XX".into(),
            station: Station::new("A1"),
            location: "00".into(),
            channel: Channel::new("GP1"),
            start: at(0, 0),
            sampling_rate: 100.0,
            samples: vec![],
        };
        assert_eq!(trace.nslc(), "XX.A1.00.GP1");
        assert!(trace.is_empty());
    }
}
