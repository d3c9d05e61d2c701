//! Write-conflict detection for match logs.
//!
//! Every append names the log version the caller built its events against.
//! Under [`Optimistic`] checking the store refuses the write when the log has
//! moved on since then. [`Unchecked`] skips the comparison for single-writer
//! deployments.
//!
//! ```ignore
//! // Default: version checked
//! let keeper = Scorekeeper::new(store);
//!
//! // Single scorer per match, last writer wins
//! let keeper = Scorekeeper::new(store).without_concurrency_checking();
//! ```

use thiserror::Error;

use crate::roster::MatchId;

/// No version checking: last writer wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

/// Version checked on every write.
///
/// This is the default for [`Scorekeeper`](crate::repository::Scorekeeper).
/// A write built against a stale view of the log fails with
/// [`ConcurrencyConflict`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Optimistic;

/// Sealed marker for the concurrency strategy of a
/// [`Scorekeeper`](crate::repository::Scorekeeper).
pub trait ConcurrencyStrategy: private::Sealed + Default + Send + Sync {
    /// Whether writes carry the version they were built against.
    const CHECK_VERSION: bool;
}

impl ConcurrencyStrategy for Unchecked {
    const CHECK_VERSION: bool = false;
}

impl ConcurrencyStrategy for Optimistic {
    const CHECK_VERSION: bool = true;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Unchecked {}
    impl Sealed for super::Optimistic {}
}

/// The match log changed between reading it and writing to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConcurrencyConflict {
    /// The writer expected to start the log, but it already holds events.
    #[error(
        "concurrency conflict on match {match_id}: expected empty log, found event {actual} \
         (hint: another scorer started this match; reload and retry)"
    )]
    AlreadyStarted { match_id: MatchId, actual: u64 },
    /// The last stored event is not the one the writer built against.
    #[error(
        "concurrency conflict on match {match_id}: expected last event {expected}, found {} \
         (hint: the log was modified; reload and retry)",
        describe(.actual.as_ref())
    )]
    Moved {
        match_id: MatchId,
        expected: u64,
        /// `None` when the log was cut back to nothing.
        actual: Option<u64>,
    },
}

impl ConcurrencyConflict {
    /// Match whose log was modified.
    #[must_use]
    pub const fn match_id(&self) -> MatchId {
        match self {
            Self::AlreadyStarted { match_id, .. } | Self::Moved { match_id, .. } => *match_id,
        }
    }
}

fn describe(actual: Option<&u64>) -> String {
    actual.map_or_else(|| "an empty log".to_string(), |sequence| format!("event {sequence}"))
}
