//! Engine configuration: channel/phase tables, window offsets, output
//! conventions, and anomaly policies.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::str::FromStr;

use crate::error::EngineError;
use crate::model::{Channel, Phase};

/// Largest number of decimal digits accepted for either output column.
const MAX_DIGITS: usize = 12;

/// Inclusive sample offsets of a similarity window around a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseWindow {
    lower: i64,
    upper: i64,
}

impl PhaseWindow {
    /// Create a window spanning `[pick + lower, pick + upper]`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`EngineError::InvalidPhaseWindow`] | `lower > upper` |
    pub fn new(phase: &Phase, lower: i64, upper: i64) -> Result<Self, EngineError> {
        if lower > upper {
            return Err(EngineError::InvalidPhaseWindow {
                phase: phase.to_string(),
                lower,
                upper,
            });
        }
        Ok(Self { lower, upper })
    }

    /// Offset of the first sample relative to the pick.
    #[must_use]
    pub fn lower(&self) -> i64 {
        self.lower
    }

    /// Offset of the last sample relative to the pick.
    #[must_use]
    pub fn upper(&self) -> i64 {
        self.upper
    }

    /// Number of samples in an unclipped window.
    #[must_use]
    pub fn len(&self) -> usize {
        (self.upper - self.lower + 1) as usize
    }

    /// Always false; a window holds at least one sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Sign convention of the travel-time differential, uniform for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TdiffConvention {
    /// `t_first - t_second`.
    #[default]
    FirstMinusSecond,
    /// `t_second - t_first`.
    SecondMinusFirst,
}

impl TdiffConvention {
    /// Apply the convention to the travel times of the two events.
    #[must_use]
    pub fn apply(self, first: f64, second: f64) -> f64 {
        match self {
            Self::FirstMinusSecond => first - second,
            Self::SecondMinusFirst => second - first,
        }
    }
}

impl FromStr for TdiffConvention {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_minus_second" | "12" => Ok(Self::FirstMinusSecond),
            "second_minus_first" | "21" => Ok(Self::SecondMinusFirst),
            other => Err(EngineError::InvalidConvention {
                value: other.to_string(),
            }),
        }
    }
}

/// Decimal digits of the two numeric output columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    tdiff_digits: usize,
    score_digits: usize,
}

impl Precision {
    /// Create a precision setting.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`EngineError::InvalidPrecision`] | Either value exceeds 12 digits |
    pub fn new(tdiff_digits: usize, score_digits: usize) -> Result<Self, EngineError> {
        for (key, digits) in [("tdiff_digits", tdiff_digits), ("score_digits", score_digits)] {
            if digits > MAX_DIGITS {
                return Err(EngineError::InvalidPrecision {
                    key,
                    digits,
                    max: MAX_DIGITS,
                });
            }
        }
        Ok(Self {
            tdiff_digits,
            score_digits,
        })
    }

    /// Decimal digits of the travel-time differential.
    #[must_use]
    pub fn tdiff_digits(&self) -> usize {
        self.tdiff_digits
    }

    /// Field width of the travel-time differential (`digits + 3`).
    #[must_use]
    pub fn tdiff_width(&self) -> usize {
        self.tdiff_digits + 3
    }

    /// Decimal digits of the similarity score.
    #[must_use]
    pub fn score_digits(&self) -> usize {
        self.score_digits
    }

    /// Field width of the similarity score (`digits + 2`).
    #[must_use]
    pub fn score_width(&self) -> usize {
        self.score_digits + 2
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            tdiff_digits: 5,
            score_digits: 4,
        }
    }
}

/// What to do with a match whose window has zero variance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DegeneratePolicy {
    /// Score the match as NaN, written as `nan`. Logged and counted.
    #[default]
    Propagate,
    /// Drop the match from its group.
    Skip,
    /// Score the match as zero.
    Zero,
    /// Abort the batch.
    Fail,
}

impl FromStr for DegeneratePolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "propagate" => Ok(Self::Propagate),
            "skip" => Ok(Self::Skip),
            "zero" => Ok(Self::Zero),
            "fail" => Ok(Self::Fail),
            other => Err(EngineError::InvalidPolicy {
                key: "degenerate_windows",
                value: other.to_string(),
                expected: "propagate, skip, zero, fail",
            }),
        }
    }
}

/// What to do with a similarity window that reaches past a trace end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgePolicy {
    /// Keep the clipped window and log a warning.
    #[default]
    Keep,
    /// Drop the window and log a warning.
    Exclude,
    /// Abort the batch.
    Fail,
}

impl FromStr for EdgePolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Self::Keep),
            "exclude" => Ok(Self::Exclude),
            "fail" => Ok(Self::Fail),
            other => Err(EngineError::InvalidPolicy {
                key: "truncated_windows",
                value: other.to_string(),
                expected: "keep, exclude, fail",
            }),
        }
    }
}

/// Configuration for feature building and pairwise correlation.
///
/// Construct via [`EngineConfig::new`], then chain `with_*` methods to override defaults.
///
/// # Defaults
///
/// | Parameter          | Default                           |
/// |--------------------|-----------------------------------|
/// | `convention`       | `TdiffConvention::FirstMinusSecond` |
/// | `precision`        | 5 tdiff digits, 4 score digits    |
/// | `progress_every`   | 100                               |
/// | `workers`          | available parallelism             |
/// | `degenerate`       | `DegeneratePolicy::Propagate`     |
/// | `edges`            | `EdgePolicy::Keep`                |
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub(crate) channel_phases: BTreeMap<Channel, Phase>,
    pub(crate) phase_windows: BTreeMap<Phase, PhaseWindow>,
    pub(crate) convention: TdiffConvention,
    pub(crate) precision: Precision,
    pub(crate) progress_every: usize,
    pub(crate) workers: usize,
    pub(crate) degenerate: DegeneratePolicy,
    pub(crate) edges: EdgePolicy,
}

impl EngineConfig {
    /// Create a configuration from the channel to phase table and the
    /// per-phase window offsets.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`EngineError::EmptyChannelTable`] | `channel_phases` is empty |
    /// | [`EngineError::MissingPhaseWindow`] | A mapped phase has no window |
    pub fn new(
        channel_phases: BTreeMap<Channel, Phase>,
        phase_windows: BTreeMap<Phase, PhaseWindow>,
    ) -> Result<Self, EngineError> {
        if channel_phases.is_empty() {
            return Err(EngineError::EmptyChannelTable);
        }
        if let Some(phase) = channel_phases
            .values()
            .find(|phase| !phase_windows.contains_key(*phase))
        {
            return Err(EngineError::MissingPhaseWindow {
                phase: phase.to_string(),
            });
        }
        Ok(Self {
            channel_phases,
            phase_windows,
            convention: TdiffConvention::default(),
            precision: Precision::default(),
            progress_every: 100,
            workers: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            degenerate: DegeneratePolicy::default(),
            edges: EdgePolicy::default(),
        })
    }

    /// Set the travel-time differential sign convention.
    #[must_use]
    pub fn with_convention(mut self, convention: TdiffConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Set the decimal precision of the output columns.
    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Log progress after every `progress_every`-th outer event index.
    #[must_use]
    pub fn with_progress_every(mut self, progress_every: usize) -> Self {
        self.progress_every = progress_every;
        self
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the policy for zero-variance windows.
    #[must_use]
    pub fn with_degenerate_policy(mut self, degenerate: DegeneratePolicy) -> Self {
        self.degenerate = degenerate;
        self
    }

    /// Set the policy for windows clipped by trace boundaries.
    #[must_use]
    pub fn with_edge_policy(mut self, edges: EdgePolicy) -> Self {
        self.edges = edges;
        self
    }

    /// Return the phase a channel maps to, if any.
    #[must_use]
    pub fn phase_for(&self, channel: &Channel) -> Option<&Phase> {
        self.channel_phases.get(channel)
    }

    /// Return the window offsets of a phase, if any.
    #[must_use]
    pub fn window_for(&self, phase: &Phase) -> Option<PhaseWindow> {
        self.phase_windows.get(phase).copied()
    }

    /// Return the sign convention.
    #[must_use]
    pub fn convention(&self) -> TdiffConvention {
        self.convention
    }

    /// Return the output precision.
    #[must_use]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Return the progress interval.
    #[must_use]
    pub fn progress_every(&self) -> usize {
        self.progress_every
    }

    /// Return the number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Return the zero-variance window policy.
    #[must_use]
    pub fn degenerate_policy(&self) -> DegeneratePolicy {
        self.degenerate
    }

    /// Return the clipped window policy.
    #[must_use]
    pub fn edge_policy(&self) -> EdgePolicy {
        self.edges
    }
}
