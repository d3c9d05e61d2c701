//! Application service orchestration.
//!
//! [`Scorekeeper`] owns the event store, the match records and a cached
//! aggregate per match. It coordinates drafting commands against the cache,
//! appending the resulting events, and rebuilding the cache for undo and
//! resync.
//!
//! All writes to one match are serialised by a per-match async mutex. The
//! store additionally checks the version every append was built against, so
//! a second writer that bypasses this scorekeeper cannot fork the log.

use std::{
    collections::HashMap,
    marker::PhantomData,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::Utc;
use nonempty::NonEmpty;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    command::{Command, CommandError, InvalidArgument, InvalidState},
    concurrency::{ConcurrencyConflict, ConcurrencyStrategy, Optimistic, Unchecked},
    event::RecordedEvent,
    projection::{Match, ReplayError},
    roster::{MatchId, MatchRecord, NewMatch},
    state::MatchState,
    store::{AppendError, EventStore, StoredEvent, inmemory},
};

/// Error type for scorekeeper operations.
#[derive(Debug, Error)]
pub enum ScorekeeperError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    #[error(transparent)]
    InvalidState(#[from] InvalidState),
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    #[error("integrity violation: {0}")]
    Integrity(#[source] ReplayError),
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyConflict),
    #[error("failed to encode events: {0}")]
    Codec(#[source] serde_json::Error),
    #[error("failed to persist events: {0}")]
    Store(#[source] StoreError),
}

impl<E: std::error::Error + 'static> From<CommandError> for ScorekeeperError<E> {
    fn from(error: CommandError) -> Self {
        match error {
            CommandError::InvalidState(e) => Self::InvalidState(e),
            CommandError::InvalidArgument(e) => Self::InvalidArgument(e),
            CommandError::Integrity(e) => Self::Integrity(e),
        }
    }
}

impl<E: std::error::Error + 'static> From<ReplayError> for ScorekeeperError<E> {
    fn from(error: ReplayError) -> Self {
        Self::Integrity(error)
    }
}

impl<E: std::error::Error + 'static> From<AppendError<E>> for ScorekeeperError<E> {
    fn from(error: AppendError<E>) -> Self {
        match error {
            AppendError::Conflict(c) => Self::Concurrency(c),
            AppendError::Store(e) => Self::Store(e),
        }
    }
}

/// Result alias for scorekeeper operations against store `S`.
pub type ScorekeeperResult<T, S> = Result<T, ScorekeeperError<<S as EventStore>::Error>>;

#[derive(Debug)]
struct MatchSlot {
    record: MatchRecord,
    cached: Mutex<Match>,
}

/// Runs matches against an event store.
///
/// The concurrency strategy `C` defaults to [`Optimistic`]. Use
/// [`without_concurrency_checking`](Scorekeeper::without_concurrency_checking)
/// when this scorekeeper is the only writer.
#[derive(Debug)]
pub struct Scorekeeper<S = inmemory::Store, C = Optimistic> {
    store: S,
    matches: RwLock<HashMap<MatchId, Arc<MatchSlot>>>,
    next_id: AtomicU64,
    _concurrency: PhantomData<C>,
}

impl<S> Scorekeeper<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            matches: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            _concurrency: PhantomData,
        }
    }

    /// Append without checking the log version.
    #[must_use]
    pub fn without_concurrency_checking(self) -> Scorekeeper<S, Unchecked> {
        Scorekeeper {
            store: self.store,
            matches: self.matches,
            next_id: self.next_id,
            _concurrency: PhantomData,
        }
    }
}

impl Default for Scorekeeper {
    fn default() -> Self {
        Self::new(inmemory::Store::new())
    }
}

fn decode(stored: &[StoredEvent]) -> Result<Vec<RecordedEvent>, ReplayError> {
    stored
        .iter()
        .map(|s| {
            RecordedEvent::from_stored(s).map_err(|source| ReplayError::Decode {
                sequence: s.sequence,
                source,
            })
        })
        .collect()
}

impl<S, C> Scorekeeper<S, C>
where
    S: EventStore,
    C: ConcurrencyStrategy,
{
    pub const fn store(&self) -> &S {
        &self.store
    }

    fn slot(&self, id: MatchId) -> Result<Arc<MatchSlot>, InvalidState> {
        self.matches
            .read()
            .expect("match table lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(InvalidState::UnknownMatch(id))
    }

    fn register(&self, record: MatchRecord, aggregate: Match) {
        let slot = Arc::new(MatchSlot {
            cached: Mutex::new(aggregate),
            record: record.clone(),
        });
        self.matches
            .write()
            .expect("match table lock poisoned")
            .insert(record.id, slot);
    }

    const fn expected(version: Option<u64>) -> Option<u64> {
        if C::CHECK_VERSION { version } else { None }
    }

    /// Register a new match with an empty log.
    ///
    /// # Errors
    ///
    /// Returns [`ScorekeeperError::InvalidArgument`] if the rosters are not
    /// valid for a match.
    #[tracing::instrument(skip(self, new))]
    pub fn create_match(&self, new: NewMatch) -> ScorekeeperResult<MatchRecord, S> {
        let id = MatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = MatchRecord::new(id, new).map_err(InvalidArgument::from)?;
        self.register(record.clone(), Match::new(record.clone()));
        tracing::debug!(match_id = %id, ranked = record.ranked, "match created");
        Ok(record)
    }

    /// Register a match whose log may already be in the store and rebuild its
    /// state from that log.
    ///
    /// # Errors
    ///
    /// Returns [`ScorekeeperError::Integrity`] if the stored log does not
    /// replay, or [`ScorekeeperError::Store`] if it cannot be loaded. The
    /// match is not registered in either case.
    #[tracing::instrument(skip(self, record), fields(match_id = %record.id))]
    pub async fn load_match(&self, record: MatchRecord) -> ScorekeeperResult<MatchState, S> {
        let stored = self
            .store
            .load_events(record.id)
            .await
            .map_err(ScorekeeperError::Store)?;
        let aggregate = Match::replay_stored(record.clone(), &stored)?;
        let state = aggregate.state().clone();
        self.next_id.fetch_max(record.id.0 + 1, Ordering::Relaxed);
        self.register(record, aggregate);
        tracing::debug!(events = stored.len(), "match loaded");
        Ok(state)
    }

    /// The non-derived record of a match.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidState::UnknownMatch`] for unregistered ids.
    pub fn record(&self, id: MatchId) -> Result<MatchRecord, InvalidState> {
        self.slot(id).map(|slot| slot.record.clone())
    }

    /// Execute a command and append its events.
    ///
    /// Returns the events that were appended. On any error nothing is
    /// appended and the cached state is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ScorekeeperError::Concurrency`] if the log changed behind
    /// this scorekeeper's back. Other variants cover command validation,
    /// encoding and persistence.
    #[tracing::instrument(skip(self, command))]
    pub async fn execute<Cmd>(
        &self,
        id: MatchId,
        command: &Cmd,
    ) -> ScorekeeperResult<Vec<RecordedEvent>, S>
    where
        Cmd: Command + Sync,
    {
        let slot = self.slot(id)?;
        let mut cached = slot.cached.lock().await;

        let (scratch, events) = cached.execute(command, Utc::now())?.into_parts();
        let stored = events
            .iter()
            .map(|e| e.to_stored(id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ScorekeeperError::Codec)?;
        let Some(batch) = NonEmpty::from_vec(stored) else {
            return Ok(events);
        };

        let version = cached.version();
        let last = match (C::CHECK_VERSION, version) {
            (true, None) => self.store.append_expecting_new(id, batch).await?,
            (_, version) => {
                self.store
                    .append(id, Self::expected(version), batch)
                    .await?
            }
        };
        *cached = scratch;
        tracing::debug!(?command, last_sequence = last, events = events.len(), "command committed");
        Ok(events)
    }

    /// Remove the most recent undoable event and everything after it.
    ///
    /// Timeout ends, notes, votes, protests, resolutions and penalty points
    /// are skipped when looking for the event to remove, but are removed with
    /// it when they follow it. Returns the removed events.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidState::NothingToUndo`] if the log holds no undoable
    /// event. The log and cached state are unchanged on any error.
    #[tracing::instrument(skip(self))]
    pub async fn undo(&self, id: MatchId) -> ScorekeeperResult<Vec<RecordedEvent>, S> {
        let slot = self.slot(id)?;
        let mut cached = slot.cached.lock().await;

        let stored = self
            .store
            .load_events(id)
            .await
            .map_err(ScorekeeperError::Store)?;
        let mut events = decode(&stored)?;
        let cut = events
            .iter()
            .rposition(|e| e.event.is_undoable())
            .ok_or(InvalidState::NothingToUndo)?;
        let rebuilt = Match::replay(slot.record.clone(), &events[..cut])?;

        let version = stored.last().map(|e| e.sequence);
        self.store
            .truncate_from(id, events[cut].sequence, Self::expected(version))
            .await?;
        *cached = rebuilt;

        let removed = events.split_off(cut);
        tracing::debug!(
            sequence = removed[0].sequence,
            kind = removed[0].kind(),
            events_removed = removed.len(),
            "undo committed"
        );
        Ok(removed)
    }

    /// Rebuild the cached state of a match from its stored log.
    ///
    /// # Errors
    ///
    /// Returns [`ScorekeeperError::Integrity`] if the log does not replay; the
    /// cached state is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn resync(&self, id: MatchId) -> ScorekeeperResult<MatchState, S> {
        let slot = self.slot(id)?;
        let mut cached = slot.cached.lock().await;
        let stored = self
            .store
            .load_events(id)
            .await
            .map_err(ScorekeeperError::Store)?;
        *cached = Match::replay_stored(slot.record.clone(), &stored)?;
        tracing::debug!(events = stored.len(), "match resynced");
        Ok(cached.state().clone())
    }

    /// Snapshot of the cached state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidState::UnknownMatch`] for unregistered ids.
    pub async fn state(&self, id: MatchId) -> ScorekeeperResult<MatchState, S> {
        let slot = self.slot(id)?;
        let cached = slot.cached.lock().await;
        Ok(cached.state().clone())
    }

    /// The stored log of a match, decoded.
    ///
    /// # Errors
    ///
    /// Returns [`ScorekeeperError::Integrity`] for entries that do not decode.
    pub async fn events(&self, id: MatchId) -> ScorekeeperResult<Vec<RecordedEvent>, S> {
        self.slot(id)?;
        let stored = self
            .store
            .load_events(id)
            .await
            .map_err(ScorekeeperError::Store)?;
        Ok(decode(&stored)?)
    }
}

impl<S> Scorekeeper<S, Optimistic>
where
    S: EventStore,
{
    /// Execute a command, resyncing and retrying after each concurrency
    /// conflict.
    ///
    /// # Errors
    ///
    /// Returns the last error if all retries are exhausted, or a
    /// non-concurrency error immediately.
    pub async fn execute_with_retry<Cmd>(
        &self,
        id: MatchId,
        command: &Cmd,
        max_retries: usize,
    ) -> ScorekeeperResult<Vec<RecordedEvent>, S>
    where
        Cmd: Command + Sync,
    {
        let mut attempt = 0;
        loop {
            match self.execute(id, command).await {
                Err(ScorekeeperError::Concurrency(conflict)) if attempt < max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, %conflict, "retrying after conflict");
                    self.resync(id).await?;
                }
                result => return result,
            }
        }
    }
}
