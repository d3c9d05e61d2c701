//! In-memory event store implementation for testing.
//!
//! This module provides [`Store`], a thread-safe in-memory implementation of
//! [`EventStore`](super::EventStore) suitable for unit tests, examples and
//! single-process deployments.
//!
//! # Example
//!
//! ```
//! use scorebook_core::store::inmemory;
//!
//! let store = inmemory::Store::new();
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use nonempty::NonEmpty;

use crate::{
    concurrency::ConcurrencyConflict,
    roster::MatchId,
    store::{AppendError, AppendOutcome, EventStore, StoredEvent},
};

/// In-memory event store that keeps one log per match in a hash map.
///
/// Cloning is cheap and every clone shares the same logs.
#[derive(Clone, Debug, Default)]
pub struct Store {
    inner: Arc<RwLock<HashMap<MatchId, Vec<StoredEvent>>>>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Error type for in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryError {
    #[error("event {found} does not continue the log (next is {expected})")]
    OutOfSequence { expected: u64, found: u64 },
    #[error("event {found} belongs to match {found_match}, not {expected_match}")]
    WrongMatch {
        expected_match: MatchId,
        found_match: MatchId,
        found: u64,
    },
    #[error("event {0} is not in the log")]
    NoSuchEvent(u64),
}

fn last_sequence(log: Option<&Vec<StoredEvent>>) -> Option<u64> {
    log.and_then(|events| events.last().map(|e| e.sequence))
}

fn check_version(
    match_id: MatchId,
    current: Option<u64>,
    expected: Option<u64>,
) -> Result<(), ConcurrencyConflict> {
    match expected {
        Some(expected) if current != Some(expected) => {
            tracing::debug!(expected, ?current, "version mismatch, rejecting write");
            Err(ConcurrencyConflict::Moved {
                match_id,
                expected,
                actual: current,
            })
        }
        _ => Ok(()),
    }
}

/// Append `events` after `log`, refusing anything that would leave a gap.
fn extend(
    match_id: MatchId,
    log: &mut Vec<StoredEvent>,
    events: NonEmpty<StoredEvent>,
) -> AppendOutcome<InMemoryError> {
    let mut next = last_sequence(Some(log)).map_or(0, |s| s + 1);
    for event in &events {
        if event.match_id != match_id {
            return Err(AppendError::store(InMemoryError::WrongMatch {
                expected_match: match_id,
                found_match: event.match_id,
                found: event.sequence,
            }));
        }
        if event.sequence != next {
            return Err(AppendError::store(InMemoryError::OutOfSequence {
                expected: next,
                found: event.sequence,
            }));
        }
        next += 1;
    }
    let last = events.last().sequence;
    log.extend(events);
    Ok(last)
}

impl EventStore for Store {
    type Error = InMemoryError;

    #[tracing::instrument(skip(self))]
    fn stream_version<'a>(
        &'a self,
        match_id: MatchId,
    ) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + 'a {
        let version = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            last_sequence(inner.get(&match_id))
        };
        tracing::trace!(?version, "retrieved stream version");
        std::future::ready(Ok(version))
    }

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    fn append<'a>(
        &'a self,
        match_id: MatchId,
        expected_version: Option<u64>,
        events: NonEmpty<StoredEvent>,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a {
        let result = (|| -> AppendOutcome<InMemoryError> {
            let mut inner = self.inner.write().expect("in-memory store lock poisoned");
            check_version(match_id, last_sequence(inner.get(&match_id)), expected_version)?;
            let last = extend(match_id, inner.entry(match_id).or_default(), events)?;
            drop(inner);
            tracing::debug!(last_sequence = last, "events appended to log");
            Ok(last)
        })();
        std::future::ready(result)
    }

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    fn append_expecting_new<'a>(
        &'a self,
        match_id: MatchId,
        events: NonEmpty<StoredEvent>,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a {
        let result = (|| -> AppendOutcome<InMemoryError> {
            let mut inner = self.inner.write().expect("in-memory store lock poisoned");
            if let Some(actual) = last_sequence(inner.get(&match_id)) {
                tracing::debug!(actual, "log already exists, rejecting write");
                return Err(ConcurrencyConflict::AlreadyStarted { match_id, actual }.into());
            }
            let last = extend(match_id, inner.entry(match_id).or_default(), events)?;
            drop(inner);
            tracing::debug!(last_sequence = last, "log created");
            Ok(last)
        })();
        std::future::ready(result)
    }

    #[tracing::instrument(skip(self))]
    fn load_events<'a>(
        &'a self,
        match_id: MatchId,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let events = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            inner.get(&match_id).cloned().unwrap_or_default()
        };
        tracing::debug!(events_loaded = events.len(), "loaded events from store");
        std::future::ready(Ok(events))
    }

    #[tracing::instrument(skip(self))]
    fn truncate_from<'a>(
        &'a self,
        match_id: MatchId,
        sequence: u64,
        expected_version: Option<u64>,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, AppendError<Self::Error>>> + Send + 'a {
        let result = (|| -> Result<Vec<StoredEvent>, AppendError<InMemoryError>> {
            let mut inner = self.inner.write().expect("in-memory store lock poisoned");
            check_version(match_id, last_sequence(inner.get(&match_id)), expected_version)?;
            let log = inner
                .get_mut(&match_id)
                .filter(|log| log.last().is_some_and(|e| e.sequence >= sequence))
                .ok_or(AppendError::store(InMemoryError::NoSuchEvent(sequence)))?;
            let at = log
                .iter()
                .position(|e| e.sequence == sequence)
                .ok_or(AppendError::store(InMemoryError::NoSuchEvent(sequence)))?;
            let removed = log.split_off(at);
            drop(inner);
            tracing::debug!(events_removed = removed.len(), "log truncated");
            Ok(removed)
        })();
        std::future::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const MATCH: MatchId = MatchId(7);

    fn event(sequence: u64) -> StoredEvent {
        StoredEvent {
            match_id: MATCH,
            kind: "fault".to_string(),
            sequence,
            data: json!({ "sequence": sequence }),
        }
    }

    fn batch(range: std::ops::Range<u64>) -> NonEmpty<StoredEvent> {
        NonEmpty::from_vec(range.map(event).collect()).unwrap()
    }

    #[test]
    fn error_display_out_of_sequence() {
        let err = InMemoryError::OutOfSequence {
            expected: 2,
            found: 4,
        };
        assert_eq!(err.to_string(), "event 4 does not continue the log (next is 2)");
    }

    #[tokio::test]
    async fn version_returns_none_for_new_log() {
        let store = Store::new();
        assert_eq!(store.stream_version(MATCH).await.unwrap(), None);
        assert!(store.load_events(MATCH).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn version_returns_last_sequence_after_append() {
        let store = Store::new();
        let last = store.append_expecting_new(MATCH, batch(0..3)).await.unwrap();
        assert_eq!(last, 2);
        assert_eq!(store.stream_version(MATCH).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn append_with_wrong_version_returns_conflict() {
        let store = Store::new();
        store.append_expecting_new(MATCH, batch(0..2)).await.unwrap();
        let result = store.append(MATCH, Some(0), batch(2..3)).await;
        assert!(matches!(
            result,
            Err(AppendError::Conflict(ConcurrencyConflict::Moved {
                match_id: MATCH,
                expected: 0,
                actual: Some(1),
            }))
        ));
    }

    #[tokio::test]
    async fn append_new_fails_if_log_exists() {
        let store = Store::new();
        store.append_expecting_new(MATCH, batch(0..1)).await.unwrap();
        let result = store.append_expecting_new(MATCH, batch(1..2)).await;
        assert!(matches!(
            result,
            Err(AppendError::Conflict(ConcurrencyConflict::AlreadyStarted {
                match_id: MATCH,
                actual: 0,
            }))
        ));
    }

    #[tokio::test]
    async fn append_rejects_gaps() {
        let store = Store::new();
        store.append_expecting_new(MATCH, batch(0..1)).await.unwrap();
        let result = store.append(MATCH, None, batch(2..3)).await;
        assert!(matches!(
            result,
            Err(AppendError::Store(InMemoryError::OutOfSequence {
                expected: 1,
                found: 2
            }))
        ));
    }

    #[tokio::test]
    async fn truncate_returns_removed_suffix() {
        let store = Store::new();
        store.append_expecting_new(MATCH, batch(0..5)).await.unwrap();
        let removed = store.truncate_from(MATCH, 3, Some(4)).await.unwrap();
        assert_eq!(
            removed.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            [3, 4]
        );
        assert_eq!(store.stream_version(MATCH).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn truncate_checks_version_and_range() {
        let store = Store::new();
        store.append_expecting_new(MATCH, batch(0..2)).await.unwrap();
        assert!(matches!(
            store.truncate_from(MATCH, 0, Some(0)).await,
            Err(AppendError::Conflict(_))
        ));
        assert!(matches!(
            store.truncate_from(MATCH, 5, None).await,
            Err(AppendError::Store(InMemoryError::NoSuchEvent(5)))
        ));
    }

    #[tokio::test]
    async fn clones_share_logs() {
        let store = Store::new();
        let other = store.clone();
        store.append_expecting_new(MATCH, batch(0..1)).await.unwrap();
        assert_eq!(other.load_events(MATCH).await.unwrap(), vec![event(0)]);
    }
}
