//! Event-sourced live scorekeeping for two-team handball matches.
//!
//! Every call an official makes is appended to a per-match log. Scores,
//! serve rotation, card suspensions, statistics and the result are derived
//! by replaying that log, which makes undo and resynchronisation a matter of
//! cutting the log and folding it again.
//!
//! ```
//! use scorebook::{
//!     NewMatch, Roster, Scorekeeper, TeamSide,
//!     command::{ScorePoint, StartMatch},
//!     roster::{PlayerId, TeamId, TournamentId},
//!     store::inmemory,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let keeper = Scorekeeper::new(inmemory::Store::new());
//! let record = keeper
//!     .create_match(NewMatch::new(
//!         TournamentId(1),
//!         Roster::pair(TeamId(1), PlayerId(1), PlayerId(2)),
//!         Roster::pair(TeamId(2), PlayerId(3), PlayerId(4)),
//!     ))
//!     .unwrap();
//!
//! keeper.execute(record.id, &StartMatch::new()).await.unwrap();
//! keeper
//!     .execute(record.id, &ScorePoint::new(TeamSide::Two, PlayerId(3)))
//!     .await
//!     .unwrap();
//!
//! let state = keeper.state(record.id).await.unwrap();
//! assert_eq!(state.team_two.score, 1);
//! # });
//! ```

#[cfg(feature = "test-util")]
pub use scorebook_core::test;
pub use scorebook_core::{
    aggregate,
    aggregate::{Aggregate, Apply},
    command,
    command::{Command, CommandError, InvalidArgument, InvalidState},
    concurrency,
    concurrency::{ConcurrencyConflict, Optimistic, Unchecked},
    court, elo, event,
    event::{EventDecodeError, MatchEvent, RecordedEvent},
    projection,
    projection::{Match, ReplayError, project},
    repository,
    repository::{Scorekeeper, ScorekeeperError},
    roster,
    roster::{MatchRecord, NewMatch, Roster, TeamSide},
    ruleset,
    ruleset::Ruleset,
    state,
    state::{MatchState, PlayerMatchStats},
};

pub mod store {
    pub use scorebook_core::store::{EventStore, NonEmpty, StoredEvent};

    // Re-export low-level append types for EventStore implementors only.
    // Most users should interact with the Scorekeeper API instead.
    #[doc(hidden)]
    pub use scorebook_core::store::{AppendError, AppendOutcome};

    pub use scorebook_core::store::inmemory;
}
