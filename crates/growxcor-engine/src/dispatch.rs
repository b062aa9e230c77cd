//! Parallel dispatch of feature building and pairwise correlation over a
//! dedicated worker pool.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::feature::{EventFeature, FeatureBuilder};
use crate::model::Event;
use crate::pair::{PairCounters, PairResult, correlate_pair_counted};

/// Completion notice of one outer event index.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    /// 1-based number of the completed outer event.
    pub event: usize,
    /// Time since the dispatcher was created.
    pub elapsed: Duration,
    /// Wall-clock time of completion.
    pub timestamp: DateTime<Utc>,
}

impl ProgressRecord {
    /// Human-readable progress line.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Event {} complete, {:.2} minutes elapsed",
            self.event,
            self.elapsed.as_secs_f64() / 60.0
        )
    }
}

/// Everything a pairwise run produced.
#[derive(Debug, Clone, Default)]
pub struct PairwiseOutcome {
    /// Matched pairs, ascending by first then second event index.
    pub pairs: Vec<PairResult>,
    /// Progress notices sorted by event number.
    pub progress: Vec<ProgressRecord>,
    /// Totals over all evaluated pairs.
    pub counters: PairCounters,
}

/// Runs feature building and the upper-triangular pair loop on a
/// fixed-size thread pool.
///
/// Outer index `i` forms one task that evaluates `(i, j)` for every `j > i`.
/// Results come back in submission order regardless of worker count.
pub struct Dispatcher<'a> {
    config: &'a EngineConfig,
    pool: rayon::ThreadPool,
    started: Instant,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher with `config.workers()` threads. Elapsed times in
    /// progress records are measured from this call.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`EngineError::InvalidProgressInterval`] | `progress_every == 0` |
    /// | [`EngineError::InvalidWorkerCount`] | `workers == 0` |
    /// | [`EngineError::ThreadPool`] | The pool cannot be spawned |
    pub fn new(config: &'a EngineConfig) -> Result<Self, EngineError> {
        if config.progress_every() == 0 {
            return Err(EngineError::InvalidProgressInterval);
        }
        if config.workers() == 0 {
            return Err(EngineError::InvalidWorkerCount);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers())
            .thread_name(|i| format!("growxcor-worker-{i}"))
            .build()?;
        Ok(Self {
            config,
            pool,
            started: Instant::now(),
        })
    }

    /// Return the number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Return the time since the dispatcher was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Build the features of every event, one task per event, order
    /// preserved.
    ///
    /// # Errors
    ///
    /// Returns the first [`FeatureBuilder::build`] error.
    #[instrument(skip_all, fields(n_events = events.len()))]
    pub fn build_features(&self, events: &[Event]) -> Result<Vec<EventFeature>, EngineError> {
        let builder = FeatureBuilder::new(self.config);
        let features: Vec<EventFeature> = self.pool.install(|| {
            events
                .par_iter()
                .map(|event| builder.build(event))
                .collect::<Result<_, _>>()
        })?;

        let n_windows: usize = features.iter().map(EventFeature::n_windows).sum();
        let n_truncated: usize = features.iter().map(EventFeature::n_truncated).sum();
        info!(n_windows, n_truncated, "features built");
        Ok(features)
    }

    /// Correlate every event pair `(i, j)` with `i < j`.
    ///
    /// # Errors
    ///
    /// Returns the first pair error; no partial result is returned.
    #[instrument(skip_all, fields(n_events = features.len(), workers = self.workers()))]
    pub fn run(&self, features: &[EventFeature]) -> Result<PairwiseOutcome, EngineError> {
        let n = features.len();
        let progress_every = self.config.progress_every();
        let (tx, rx) = mpsc::channel::<ProgressRecord>();

        let per_event: Vec<(Vec<PairResult>, PairCounters)> = self.pool.install(|| {
            (0..n.saturating_sub(1))
                .into_par_iter()
                .map_with(tx, |tx, i| -> Result<_, EngineError> {
                    let mut counters = PairCounters::default();
                    let mut pairs = Vec::new();
                    for j in (i + 1)..n {
                        if let Some(pair) = correlate_pair_counted(
                            &features[i],
                            &features[j],
                            self.config,
                            &mut counters,
                        )? {
                            pairs.push(pair);
                        }
                    }
                    if (i + 1) % progress_every == 0 {
                        // The receiver outlives every task.
                        let _ = tx.send(ProgressRecord {
                            event: i + 1,
                            elapsed: self.started.elapsed(),
                            timestamp: Utc::now(),
                        });
                    }
                    Ok((pairs, counters))
                })
                .collect::<Result<_, _>>()
        })?;

        let mut progress: Vec<ProgressRecord> = rx.try_iter().collect();
        progress.sort_by_key(|p| p.event);
        for record in &progress {
            info!(event = record.event, timestamp = %record.timestamp, "{}", record.message());
        }

        let mut outcome = PairwiseOutcome {
            progress,
            ..PairwiseOutcome::default()
        };
        for (pairs, counters) in per_event {
            outcome.pairs.extend(pairs);
            outcome.counters += counters;
        }
        info!(
            pairs_evaluated = outcome.counters.pairs_evaluated,
            pairs_matched = outcome.counters.pairs_matched,
            degenerate_matches = outcome.counters.degenerate_matches,
            "pairwise correlation complete"
        );
        Ok(outcome)
    }
}
