//! Persistence layer abstractions.
//!
//! This module describes the storage contract for match logs
//! ([`EventStore`]), the wire form of an entry ([`StoredEvent`]) and a
//! reference in-memory implementation. A store knows nothing about handball:
//! it keeps an ordered, append-only list of tagged JSON documents per match
//! and can cut a list back to a given sequence number.

use std::future::Future;

pub use nonempty::NonEmpty;
use thiserror::Error;

use crate::{concurrency::ConcurrencyConflict, roster::MatchId};

pub mod inmemory;

/// One log entry as persisted.
///
/// `kind` is one of [`MatchEvent::EVENT_KINDS`](crate::event::MatchEvent::EVENT_KINDS)
/// and `data` is the JSON envelope produced by
/// [`RecordedEvent::to_stored`](crate::event::RecordedEvent::to_stored).
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEvent {
    pub match_id: MatchId,
    pub kind: String,
    /// Position in the match stream, starting at 0 with no gaps.
    pub sequence: u64,
    pub data: serde_json::Value,
}

/// Error from write operations with version checking.
#[derive(Debug, Error)]
pub enum AppendError<StoreError>
where
    StoreError: std::error::Error,
{
    /// Another writer modified the log.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError: std::error::Error> AppendError<StoreError> {
    /// Create a store error variant.
    pub const fn store(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Convenience alias for append outcomes. The value is the sequence number of
/// the last event written.
pub type AppendOutcome<Err> = Result<u64, AppendError<Err>>;

/// Abstraction over the persistence layer for match logs.
///
/// Versions are the sequence number of the last stored event, `None` for an
/// empty log.
// ANCHOR: event_store_trait
pub trait EventStore: Send + Sync {
    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Get the sequence number of the latest event of a match.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn stream_version<'a>(
        &'a self,
        match_id: MatchId,
    ) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + 'a;

    /// Append events with optional version checking.
    ///
    /// If `expected_version` is `Some`, the append fails with a concurrency
    /// conflict if the latest stored sequence doesn't match. If it is `None`,
    /// no version checking is performed.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] if the version doesn't match, or
    /// [`AppendError::Store`] if the batch does not continue the log or
    /// persistence fails.
    fn append<'a>(
        &'a self,
        match_id: MatchId,
        expected_version: Option<u64>,
        events: NonEmpty<StoredEvent>,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a;

    /// Append events expecting an empty log.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] if the log already has events,
    /// or [`AppendError::Store`] if persistence fails.
    fn append_expecting_new<'a>(
        &'a self,
        match_id: MatchId,
        events: NonEmpty<StoredEvent>,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a;

    /// Load the full log of a match in sequence order.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn load_events<'a>(
        &'a self,
        match_id: MatchId,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a;

    /// Delete every event with a sequence number of `sequence` or later,
    /// returning them in order.
    ///
    /// `expected_version` is checked the same way as for
    /// [`append`](Self::append).
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] if the version doesn't match, or
    /// [`AppendError::Store`] if `sequence` is not in the log.
    fn truncate_from<'a>(
        &'a self,
        match_id: MatchId,
        sequence: u64,
        expected_version: Option<u64>,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, AppendError<Self::Error>>> + Send + 'a;
}
// ANCHOR_END: event_store_trait

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn store_error_wraps_source() {
        let err: AppendError<DiskFull> = AppendError::store(DiskFull);
        assert_eq!(err.to_string(), "store error: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn conflict_is_transparent() {
        let err: AppendError<DiskFull> = ConcurrencyConflict::Moved {
            match_id: MatchId(1),
            expected: 1,
            actual: Some(2),
        }
        .into();
        assert!(err.to_string().starts_with("concurrency conflict"));
    }
}
