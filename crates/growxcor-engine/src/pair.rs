//! Correlation of one event pair: travel-time differentials and grouped
//! similarity scores per shared station/phase.

use std::borrow::Cow;
use std::ops::{AddAssign, Range};

use growxcor_signal::{SignalError, Window, similarity};
use serde::Serialize;
use tracing::warn;

use crate::config::{DegeneratePolicy, EngineConfig};
use crate::error::EngineError;
use crate::feature::{ChannelWindow, EventFeature, StationPhase};
use crate::model::{Phase, SeqId, Station};

/// One output line of a pair block.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchLine {
    /// Phase label.
    pub phase: Phase,
    /// Station code.
    pub station: Station,
    /// Travel-time differential in seconds under the configured convention.
    pub tdiff: f64,
    /// Mean similarity of the group's channel matches. NaN when a degenerate
    /// window was propagated.
    pub score: f64,
}

/// Correlation result of one event pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairResult {
    /// Sequential ID of the first event.
    pub first: SeqId,
    /// Sequential ID of the second event.
    pub second: SeqId,
    /// Lines in ascending (phase, station) order. Never empty.
    pub lines: Vec<MatchLine>,
}

/// Tallies collected while correlating pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairCounters {
    /// Event pairs examined.
    pub pairs_evaluated: usize,
    /// Event pairs that produced at least one line.
    pub pairs_matched: usize,
    /// Channel matches examined, degenerate ones included.
    pub matches: usize,
    /// Channel matches involving a zero-variance window.
    pub degenerate_matches: usize,
}

impl AddAssign for PairCounters {
    fn add_assign(&mut self, other: Self) {
        self.pairs_evaluated += other.pairs_evaluated;
        self.pairs_matched += other.pairs_matched;
        self.matches += other.matches;
        self.degenerate_matches += other.degenerate_matches;
    }
}

/// Correlate two events.
///
/// For every station/phase key shared by `first` and `second`, each channel
/// window of `first` is matched with the window of `second` on the same
/// channel. Both windows are cut to the pick-relative offsets they share, so
/// a window clipped at a trace edge is compared with the same span of its
/// partner. A group's line carries the first match's differential and the
/// mean of its scores. Returns `None` when no line survives.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`EngineError::DegenerateWindow`] | A window is flat under [`DegeneratePolicy::Fail`] |
/// | [`EngineError::InvalidSamples`] | A window cannot be normalized for another reason |
pub fn correlate_pair(
    first: &EventFeature,
    second: &EventFeature,
    config: &EngineConfig,
) -> Result<Option<PairResult>, EngineError> {
    let mut counters = PairCounters::default();
    correlate_pair_counted(first, second, config, &mut counters)
}

pub(crate) fn correlate_pair_counted(
    first: &EventFeature,
    second: &EventFeature,
    config: &EngineConfig,
    counters: &mut PairCounters,
) -> Result<Option<PairResult>, EngineError> {
    counters.pairs_evaluated += 1;
    let mut lines = Vec::new();

    for (key, windows_a) in first.iter() {
        let Some(windows_b) = second.get(key) else {
            continue;
        };

        let mut matches: Vec<(f64, f64)> = Vec::new();
        for a in windows_a {
            let Some(b) = windows_b.iter().find(|b| b.channel == a.channel) else {
                continue;
            };
            counters.matches += 1;
            let tdiff = config.convention().apply(a.travel_time, b.travel_time);
            if let Some(score) = score_match(first, second, key, a, b, config, counters)? {
                matches.push((tdiff, score));
            }
        }

        if let Some(line) = group_line(key, &matches) {
            lines.push(line);
        }
    }

    if lines.is_empty() {
        return Ok(None);
    }
    counters.pairs_matched += 1;
    Ok(Some(PairResult {
        first: first.seq_id().clone(),
        second: second.seq_id().clone(),
        lines,
    }))
}

/// Score one channel match, applying the degenerate-window policy.
/// `None` drops the match.
fn score_match(
    first: &EventFeature,
    second: &EventFeature,
    key: &StationPhase,
    a: &ChannelWindow,
    b: &ChannelWindow,
    config: &EngineConfig,
    counters: &mut PairCounters,
) -> Result<Option<f64>, EngineError> {
    let Some((span_a, span_b)) = shared_span(a, b) else {
        warn!(
            first = %first.seq_id(),
            second = %second.seq_id(),
            station = %key.station,
            channel = %a.channel,
            phase = %key.phase,
            "clipped windows share no samples, match dropped"
        );
        return Ok(None);
    };
    let wa = restrict(first, key, a, span_a)?;
    let wb = restrict(second, key, b, span_b)?;

    let owner = || if wa.is_flat() { first } else { second };
    match similarity(&wa, &wb) {
        Ok(score) => Ok(Some(score.value())),
        Err(SignalError::ZeroVariance { .. }) => {
            counters.degenerate_matches += 1;
            let event = owner().event_id();
            let policy = config.degenerate_policy();
            if policy == DegeneratePolicy::Fail {
                return Err(EngineError::DegenerateWindow {
                    event: event.to_string(),
                    first: first.seq_id().to_string(),
                    second: second.seq_id().to_string(),
                    station: key.station.to_string(),
                    channel: a.channel.to_string(),
                    phase: key.phase.to_string(),
                });
            }
            warn!(
                first = %first.seq_id(),
                second = %second.seq_id(),
                %event,
                station = %key.station,
                channel = %a.channel,
                phase = %key.phase,
                ?policy,
                "flat window"
            );
            Ok(match policy {
                DegeneratePolicy::Skip => None,
                DegeneratePolicy::Zero => Some(0.0),
                _ => Some(f64::NAN),
            })
        }
        Err(source) => Err(EngineError::InvalidSamples {
            event: owner().event_id().to_string(),
            station: key.station.to_string(),
            channel: a.channel.to_string(),
            source,
        }),
    }
}

/// Index ranges of `a` and `b` covering the pick-relative offsets both
/// windows hold, or `None` when they share none.
fn shared_span(a: &ChannelWindow, b: &ChannelWindow) -> Option<(Range<usize>, Range<usize>)> {
    let start = a.lead.max(b.lead);
    let end = (a.lead + a.window.len() as i64).min(b.lead + b.window.len() as i64);
    if start >= end {
        return None;
    }
    let span = |w: &ChannelWindow| (start - w.lead) as usize..(end - w.lead) as usize;
    Some((span(a), span(b)))
}

/// Borrow the window when `span` covers all of it, otherwise copy the span.
fn restrict<'w>(
    owner: &EventFeature,
    key: &StationPhase,
    cw: &'w ChannelWindow,
    span: Range<usize>,
) -> Result<Cow<'w, Window>, EngineError> {
    if span.len() == cw.window.len() {
        return Ok(Cow::Borrowed(&cw.window));
    }
    Window::from_slice(&cw.window.as_slice()[span])
        .map(Cow::Owned)
        .map_err(|source| EngineError::InvalidSamples {
            event: owner.event_id().to_string(),
            station: key.station.to_string(),
            channel: cw.channel.to_string(),
            source,
        })
}

/// Collapse a group's `(tdiff, score)` matches into one line.
fn group_line(key: &StationPhase, matches: &[(f64, f64)]) -> Option<MatchLine> {
    let (tdiff, _) = *matches.first()?;
    let score = matches.iter().map(|(_, s)| s).sum::<f64>() / matches.len() as f64;
    Some(MatchLine {
        phase: key.phase.clone(),
        station: key.station.clone(),
        tdiff,
        score,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use growxcor_signal::Window;

    use super::*;
    use crate::config::{PhaseWindow, TdiffConvention};
    use crate::model::{Channel, EventId};

    fn config() -> EngineConfig {
        let p = Phase::new("P");
        EngineConfig::new(
            BTreeMap::from([(Channel::new("GPZ"), p.clone())]),
            BTreeMap::from([(p.clone(), PhaseWindow::new(&p, -1, 1).unwrap())]),
        )
        .unwrap()
    }

    fn cw(channel: &str, travel_time: f64, samples: &[f64]) -> ChannelWindow {
        cw_at(channel, travel_time, -1, samples)
    }

    fn cw_at(channel: &str, travel_time: f64, lead: i64, samples: &[f64]) -> ChannelWindow {
        ChannelWindow {
            channel: Channel::new(channel),
            travel_time,
            window: Window::from_slice(samples).unwrap(),
            lead,
            truncated: false,
        }
    }

    fn feature(seq: &str, entries: Vec<(StationPhase, ChannelWindow)>) -> EventFeature {
        let mut f = EventFeature::new(SeqId::new(seq), EventId::new(format!("ev{seq}")));
        for (k, w) in entries {
            f.insert(k, w);
        }
        f
    }

    const WAVE: [f64; 4] = [0.0, 1.0, 0.0, -1.0];

    #[test]
    fn group_averages_scores_and_keeps_first_tdiff() {
        let key = StationPhase::new("A1", "S");
        let line = group_line(&key, &[(0.12, 0.6), (0.30, 0.8)]).unwrap();
        assert!((line.score - 0.7).abs() < 1e-12);
        assert_eq!(line.tdiff, 0.12);
        assert_eq!(line.station.as_str(), "A1");
        assert_eq!(line.phase.as_str(), "S");
    }

    #[test]
    fn empty_group_has_no_line() {
        assert!(group_line(&StationPhase::new("A1", "P"), &[]).is_none());
    }

    #[test]
    fn identical_windows_score_one() {
        let cfg = config();
        let key = StationPhase::new("A1", "P");
        let a = feature("0000001", vec![(key.clone(), cw("GPZ", 1.0, &WAVE))]);
        let b = feature("0000002", vec![(key, cw("GPZ", 1.05, &WAVE))]);
        let result = correlate_pair(&a, &b, &cfg).unwrap().unwrap();
        assert_eq!(result.first.as_str(), "0000001");
        assert_eq!(result.second.as_str(), "0000002");
        assert_eq!(result.lines.len(), 1);
        assert!((result.lines[0].tdiff + 0.05).abs() < 1e-12);
        assert!((result.lines[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn convention_flips_sign() {
        let cfg = config().with_convention(TdiffConvention::SecondMinusFirst);
        let key = StationPhase::new("A1", "P");
        let a = feature("0000001", vec![(key.clone(), cw("GPZ", 1.0, &WAVE))]);
        let b = feature("0000002", vec![(key, cw("GPZ", 1.2, &WAVE))]);
        let result = correlate_pair(&a, &b, &cfg).unwrap().unwrap();
        assert!((result.lines[0].tdiff - 0.2).abs() < 1e-12);
    }

    #[test]
    fn no_shared_key_gives_no_result() {
        let cfg = config();
        let a = feature(
            "0000001",
            vec![(StationPhase::new("A1", "P"), cw("GPZ", 1.0, &WAVE))],
        );
        let b = feature(
            "0000002",
            vec![(StationPhase::new("B2", "P"), cw("GPZ", 1.0, &WAVE))],
        );
        let mut counters = PairCounters::default();
        let result = correlate_pair_counted(&a, &b, &cfg, &mut counters).unwrap();
        assert!(result.is_none());
        assert_eq!(counters.pairs_evaluated, 1);
        assert_eq!(counters.pairs_matched, 0);
        assert_eq!(counters.matches, 0);
    }

    #[test]
    fn channels_must_agree_within_a_key() {
        let cfg = config();
        let key = StationPhase::new("A1", "S");
        let a = feature("0000001", vec![(key.clone(), cw("GP1", 1.0, &WAVE))]);
        let b = feature("0000002", vec![(key, cw("GP2", 1.0, &WAVE))]);
        assert!(correlate_pair(&a, &b, &cfg).unwrap().is_none());
    }

    #[test]
    fn lines_follow_phase_then_station_order() {
        let cfg = config();
        let entries = || {
            vec![
                (StationPhase::new("B2", "S"), cw("GP1", 2.0, &WAVE)),
                (StationPhase::new("C3", "P"), cw("GPZ", 1.0, &WAVE)),
                (StationPhase::new("A1", "P"), cw("GPZ", 1.0, &WAVE)),
            ]
        };
        let a = feature("0000001", entries());
        let b = feature("0000002", entries());
        let result = correlate_pair(&a, &b, &cfg).unwrap().unwrap();
        let order: Vec<(&str, &str)> = result
            .lines
            .iter()
            .map(|l| (l.phase.as_str(), l.station.as_str()))
            .collect();
        assert_eq!(order, vec![("P", "A1"), ("P", "C3"), ("S", "B2")]);
    }

    fn degenerate_pair() -> (EventFeature, EventFeature) {
        let key = StationPhase::new("A1", "P");
        let a = feature("0000001", vec![(key.clone(), cw("GPZ", 1.0, &[2.0, 2.0, 2.0]))]);
        let b = feature("0000002", vec![(key, cw("GPZ", 1.1, &WAVE))]);
        (a, b)
    }

    #[test]
    fn degenerate_propagate_yields_nan() {
        let cfg = config();
        let (a, b) = degenerate_pair();
        let mut counters = PairCounters::default();
        let result = correlate_pair_counted(&a, &b, &cfg, &mut counters)
            .unwrap()
            .unwrap();
        assert!(result.lines[0].score.is_nan());
        assert_eq!(counters.degenerate_matches, 1);
    }

    #[test]
    fn degenerate_zero_and_skip() {
        let (a, b) = degenerate_pair();
        let zero = config().with_degenerate_policy(DegeneratePolicy::Zero);
        let result = correlate_pair(&a, &b, &zero).unwrap().unwrap();
        assert_eq!(result.lines[0].score, 0.0);

        let skip = config().with_degenerate_policy(DegeneratePolicy::Skip);
        assert!(correlate_pair(&a, &b, &skip).unwrap().is_none());
    }

    #[test]
    fn degenerate_fail_names_the_window() {
        let (a, b) = degenerate_pair();
        let cfg = config().with_degenerate_policy(DegeneratePolicy::Fail);
        let err = correlate_pair(&a, &b, &cfg).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DegenerateWindow { ref first, ref channel, .. }
                if first == "0000001" && channel == "GPZ"
        ));
    }

    #[test]
    fn flat_fractional_window_is_degenerate() {
        let cfg = config();
        let key = StationPhase::new("A1", "P");
        let a = feature("0000001", vec![(key.clone(), cw("GPZ", 1.0, &[0.1; 4]))]);
        let b = feature("0000002", vec![(key, cw("GPZ", 1.1, &WAVE))]);
        let mut counters = PairCounters::default();
        let result = correlate_pair_counted(&a, &b, &cfg, &mut counters)
            .unwrap()
            .unwrap();
        assert!(result.lines[0].score.is_nan());
        assert_eq!(counters.degenerate_matches, 1);
    }

    #[test]
    fn degenerate_error_names_the_owning_event() {
        let key = StationPhase::new("A1", "P");
        let a = feature("0000001", vec![(key.clone(), cw("GPZ", 1.0, &WAVE))]);
        let b = feature("0000002", vec![(key, cw("GPZ", 1.1, &[2.0, 2.0, 2.0, 2.0]))]);
        let cfg = config().with_degenerate_policy(DegeneratePolicy::Fail);
        let err = correlate_pair(&a, &b, &cfg).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DegenerateWindow { ref event, ref first, .. }
                if event == "ev0000002" && first == "0000001"
        ));
    }

    #[test]
    fn clipped_window_is_compared_over_shared_offsets() {
        let cfg = config();
        let key = StationPhase::new("A1", "P");
        // full window covers offsets -4..=4; the clipped one only -2..=4
        let full = [3.0, -1.0, 0.0, 2.0, 5.0, -3.0, 1.0, 4.0, -2.0];
        let a = feature("0000001", vec![(key.clone(), cw_at("GPZ", 1.0, -2, &full[2..]))]);
        let b = feature("0000002", vec![(key, cw_at("GPZ", 1.2, -4, &full))]);

        let result = correlate_pair(&a, &b, &cfg).unwrap().unwrap();
        assert!((result.lines[0].score - 1.0).abs() < 1e-12);

        let reversed = correlate_pair(&b, &a, &cfg).unwrap().unwrap();
        assert!((reversed.lines[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn clipped_windows_without_shared_offsets_are_dropped() {
        let cfg = config();
        let key = StationPhase::new("A1", "P");
        let a = feature("0000001", vec![(key.clone(), cw_at("GPZ", 1.0, -4, &WAVE))]);
        let b = feature("0000002", vec![(key, cw_at("GPZ", 1.1, 1, &WAVE))]);
        let mut counters = PairCounters::default();
        let result = correlate_pair_counted(&a, &b, &cfg, &mut counters).unwrap();
        assert!(result.is_none());
        assert_eq!(counters.matches, 1);
    }

    #[test]
    fn two_channels_on_one_key_form_one_line() {
        let cfg = config();
        let key = StationPhase::new("A1", "S");
        let other = [1.0, 0.5, -2.0, 0.0];
        let a = feature(
            "0000001",
            vec![
                (key.clone(), cw("GP1", 1.00, &WAVE)),
                (key.clone(), cw("GP2", 1.01, &WAVE)),
            ],
        );
        let b = feature(
            "0000002",
            vec![
                (key.clone(), cw("GP1", 1.10, &WAVE)),
                (key, cw("GP2", 1.20, &other)),
            ],
        );
        let expected = similarity(
            &Window::from_slice(&WAVE).unwrap(),
            &Window::from_slice(&other).unwrap(),
        )
        .unwrap()
        .value();

        let result = correlate_pair(&a, &b, &cfg).unwrap().unwrap();
        assert_eq!(result.lines.len(), 1);
        let line = &result.lines[0];
        assert_eq!(line.station.as_str(), "A1");
        assert_eq!(line.phase.as_str(), "S");
        assert!((line.tdiff + 0.10).abs() < 1e-12, "tdiff {}", line.tdiff);
        assert!((line.score - (1.0 + expected) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn counters_accumulate() {
        let mut total = PairCounters::default();
        total += PairCounters {
            pairs_evaluated: 2,
            pairs_matched: 1,
            matches: 3,
            degenerate_matches: 0,
        };
        total += PairCounters {
            pairs_evaluated: 1,
            pairs_matched: 1,
            matches: 1,
            degenerate_matches: 1,
        };
        assert_eq!(total.pairs_evaluated, 3);
        assert_eq!(total.matches, 4);
        assert_eq!(total.degenerate_matches, 1);
    }
}
