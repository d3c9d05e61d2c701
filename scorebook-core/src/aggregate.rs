//! Command-side domain primitives.
//!
//! This module defines the building blocks for state reconstruction: the
//! envelope-level fold ([`Aggregate`]) and one handler per payload
//! ([`Apply`]). Commands are recorded against the aggregate through
//! [`Match::execute`](crate::projection::Match::execute).

use crate::{event::RecordedEvent, projection::ReplayError};

/// Entities rebuilt by folding logged events.
///
/// Aggregates dispatch each event to a payload handler ([`Apply<E>`]).
/// Replay is fallible: an event that contradicts the state it is folded into
/// is an integrity violation and aborts the fold.
pub trait Aggregate: Sized {
    type Event;

    /// Apply an event to update aggregate state.
    ///
    /// This is called both while replaying history and for every event a
    /// command produces, so the two paths cannot drift apart.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError`] if the event is inconsistent with the state.
    fn apply(&mut self, event: &Self::Event) -> Result<(), ReplayError>;
}

/// Fold one payload type into an aggregate.
///
/// `envelope` is the log entry the payload came from, giving handlers access
/// to the sequence number, timestamp, serve linkage and court snapshot.
///
/// ```ignore
/// impl Apply<TimeoutEnded> for Match {
///     fn apply(&mut self, _: &TimeoutEnded, _: &RecordedEvent) -> Result<(), ReplayError> {
///         self.state.timeout = None;
///         Ok(())
///     }
/// }
/// ```
pub trait Apply<E> {
    /// # Errors
    ///
    /// Returns [`ReplayError`] if the payload references players or teams the
    /// aggregate does not know about.
    fn apply(&mut self, event: &E, envelope: &RecordedEvent) -> Result<(), ReplayError>;
}
