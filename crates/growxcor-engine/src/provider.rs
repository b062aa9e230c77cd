//! Event provider capability and batch loading.

use std::collections::HashMap;

use tracing::{info, instrument};

use crate::error::EngineError;
use crate::model::{Event, EventId, SeqId};

/// One line of the event list: a sequential ID and its event identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventEntry {
    /// Sequential ID.
    pub seq_id: SeqId,
    /// Upstream event identifier.
    pub event_id: EventId,
}

impl EventEntry {
    /// Create an entry.
    pub fn new(seq_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            seq_id: SeqId::new(seq_id),
            event_id: EventId::new(event_id),
        }
    }
}

/// Source of fully-loaded events, decoupling the engine from any on-disk layout.
pub trait EventProvider {
    /// Error raised when an event cannot be resolved or read.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the event named by `entry`, with picks and traces.
    fn load(&self, entry: &EventEntry) -> Result<Event, Self::Error>;
}

/// Provider over events already held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProvider {
    events: HashMap<EventId, Event>,
}

impl InMemoryProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event, replacing any event with the same identifier.
    pub fn insert(&mut self, event: Event) {
        self.events.insert(event.id.clone(), event);
    }

    /// Return the number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Return true if no events are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl FromIterator<Event> for InMemoryProvider {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let mut provider = Self::new();
        for event in iter {
            provider.insert(event);
        }
        provider
    }
}

impl EventProvider for InMemoryProvider {
    type Error = EngineError;

    fn load(&self, entry: &EventEntry) -> Result<Event, Self::Error> {
        let mut event = self
            .events
            .get(&entry.event_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEvent {
                event_id: entry.event_id.to_string(),
            })?;
        event.seq_id = entry.seq_id.clone();
        Ok(event)
    }
}

/// Load every entry through `provider`, preserving order.
///
/// Any unresolvable event aborts the whole batch.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`EngineError::NoEvents`] | `entries` is empty |
/// | [`EngineError::Provider`] | The provider failed for an entry |
#[instrument(skip_all, fields(n_entries = entries.len()))]
pub fn load_events<P: EventProvider>(
    provider: &P,
    entries: &[EventEntry],
) -> Result<Vec<Event>, EngineError> {
    if entries.is_empty() {
        return Err(EngineError::NoEvents);
    }

    let events = entries
        .iter()
        .map(|entry| {
            provider.load(entry).map_err(|e| EngineError::Provider {
                event_id: entry.event_id.to_string(),
                source: Box::new(e),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        n_events = events.len(),
        n_traces = events.iter().map(|e| e.traces.len()).sum::<usize>(),
        "events loaded"
    );
    Ok(events)
}
