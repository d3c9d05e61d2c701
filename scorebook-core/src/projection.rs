//! The replay engine.
//!
//! [`Match`] folds [`RecordedEvent`]s into [`MatchState`], one [`Apply`]
//! implementation per payload. The same fold is used for incremental updates
//! and full replays, so rebuilding a match from its log always reproduces the
//! state that was built live.

use thiserror::Error;

use crate::{
    aggregate::{Aggregate, Apply},
    court::{Court, CourtSide, Serve, ServeContext},
    elo,
    event::{
        CardColor, CardIssued, EventDecodeError, EventKind, FaultCalled, MatchAbandoned,
        MatchEnded, MatchEvent, MatchStarted, MeritAwarded, NotesRecorded, PlayerSubstituted,
        PointScored, ProtestLodged, ProtestResolved, RecordedEvent, ScoreNote, TeamForfeited,
        TimeoutCalled, TimeoutEnded, VotesCast,
    },
    roster::{MatchRecord, PlayerId, TeamSide},
    state::{ActiveTimeout, AdminStatus, MatchState, PlayerMatchStats, Rally, Suspension},
    store::StoredEvent,
};

/// Integrity violations found while folding a log.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("event {found} is out of sequence, expected {expected}")]
    OutOfSequence { expected: u64, found: u64 },
    #[error("event {sequence} (`{kind}`) references player {player}, who is not rostered for {team}")]
    UnknownPlayer {
        sequence: u64,
        kind: &'static str,
        player: PlayerId,
        team: TeamSide,
    },
    #[error("event {sequence} (`{kind}`) {reason}")]
    Unexpected {
        sequence: u64,
        kind: &'static str,
        reason: &'static str,
    },
    #[error("event {sequence} could not be decoded: {source}")]
    Decode {
        sequence: u64,
        #[source]
        source: EventDecodeError,
    },
}

/// Linkage of the most recent event, inherited by the next one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tail {
    pub sequence: u64,
    pub serve: ServeContext,
    pub court: Court,
}

/// The match aggregate: roster, rules and everything derived from the log.
#[derive(Clone, Debug)]
pub struct Match {
    record: MatchRecord,
    state: MatchState,
    tail: Option<Tail>,
    /// Side each team was last assigned to serve from.
    last_service_side: [Option<CourtSide>; 2],
}

impl Match {
    /// A match with no events.
    #[must_use]
    pub fn new(record: MatchRecord) -> Self {
        let state = MatchState::new(&record);
        Self {
            record,
            state,
            tail: None,
            last_service_side: [None, None],
        }
    }

    /// Rebuild a match by folding `events` in order from the empty state.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReplayError`] encountered; nothing partial is
    /// returned.
    pub fn replay<'a>(
        record: MatchRecord,
        events: impl IntoIterator<Item = &'a RecordedEvent>,
    ) -> Result<Self, ReplayError> {
        let mut aggregate = Self::new(record);
        for event in events {
            Aggregate::apply(&mut aggregate, event).inspect_err(|error| {
                tracing::error!(match_id = %aggregate.record.id, %error, "replay aborted");
            })?;
        }
        Ok(aggregate)
    }

    /// Decode and fold stored events.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Decode`] for unknown kinds or malformed data,
    /// and any other [`ReplayError`] raised by the fold.
    pub fn replay_stored(record: MatchRecord, stored: &[StoredEvent]) -> Result<Self, ReplayError> {
        let events = stored
            .iter()
            .map(|s| {
                RecordedEvent::from_stored(s).map_err(|source| ReplayError::Decode {
                    sequence: s.sequence,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|error| {
                tracing::error!(match_id = %record.id, %error, "replay aborted");
            })?;
        Self::replay(record, &events)
    }

    #[must_use]
    pub const fn record(&self) -> &MatchRecord {
        &self.record
    }

    #[must_use]
    pub const fn state(&self) -> &MatchState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> MatchState {
        self.state
    }

    #[must_use]
    pub const fn tail(&self) -> Option<&Tail> {
        self.tail.as_ref()
    }

    /// Sequence number of the latest event, `None` before the first.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.tail.map(|t| t.sequence)
    }

    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.tail.map_or(0, |t| t.sequence + 1)
    }

    /// Side `team` was most recently assigned to serve from.
    #[must_use]
    pub const fn last_service_side(&self, team: TeamSide) -> Option<CourtSide> {
        self.last_service_side[team.index()]
    }

    fn check_player(
        &self,
        envelope: &RecordedEvent,
        team: TeamSide,
        player: PlayerId,
    ) -> Result<(), ReplayError> {
        if self.record.roster(team).contains(player) {
            Ok(())
        } else {
            Err(ReplayError::UnknownPlayer {
                sequence: envelope.sequence,
                kind: envelope.kind(),
                player,
                team,
            })
        }
    }

    fn stats_mut(
        &mut self,
        envelope: &RecordedEvent,
        team: TeamSide,
        player: PlayerId,
    ) -> Result<&mut PlayerMatchStats, ReplayError> {
        self.check_player(envelope, team, player)?;
        self.state
            .players
            .iter_mut()
            .find(|p| p.player == player)
            .ok_or_else(|| ReplayError::UnknownPlayer {
                sequence: envelope.sequence,
                kind: envelope.kind(),
                player,
                team,
            })
    }

    fn check_court(&self, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        for team in TeamSide::BOTH {
            for player in envelope.court.pair(team).players() {
                self.check_player(envelope, team, player)?;
            }
        }
        Ok(())
    }

    /// Court before `envelope` was applied.
    fn court_before(&self, envelope: &RecordedEvent) -> Court {
        self.tail.map_or(envelope.court, |t| t.court)
    }

    /// Non-serving player facing the serve, or the first one not carded.
    fn receiver(&self, court: &Court, served: Serve) -> Option<PlayerId> {
        let pair = court.pair(served.team.opponent());
        let clear = |player: &PlayerId| {
            self.state
                .player(*player)
                .is_some_and(|p| !p.suspension.is_carded())
        };
        let facing = pair.get(served.side);
        if clear(&facing) {
            Some(facing)
        } else {
            pair.players().into_iter().find(|p| clear(p))
        }
    }

    fn credit_rounds(&mut self, court: &Court) {
        for player in court.players() {
            if let Some(stats) = self.state.player_mut(player) {
                if stats.suspension.is_carded() {
                    stats.rounds_carded += 1;
                    stats.suspension = stats.suspension.tick();
                } else {
                    stats.rounds_on_court += 1;
                }
            }
        }
    }

    fn add_point(&mut self, team: TeamSide) {
        self.state.team_mut(team).score += 1;
        self.state.last_scorer = Some(team);
        self.state.last_rally = Some(Rally::Score);
        let rules = &self.record.ruleset;
        if rules.is_decided(self.state.team_one.score, self.state.team_two.score) {
            self.state.someone_has_won = true;
        }
    }

    fn decide_winner(&self, coin_toss: Option<TeamSide>) -> Option<TeamSide> {
        if let Some(forfeiter) = self.state.forfeited_by {
            return Some(forfeiter.opponent());
        }
        if self.state.high_score() < self.record.ruleset.min_decisive_score && coin_toss.is_some()
        {
            return coin_toss;
        }
        match self.state.team_one.score.cmp(&self.state.team_two.score) {
            std::cmp::Ordering::Greater => Some(TeamSide::One),
            std::cmp::Ordering::Less => Some(TeamSide::Two),
            std::cmp::Ordering::Equal => self.state.last_scorer.map(TeamSide::opponent),
        }
    }

    fn rate_players(&mut self, coin_toss: Option<TeamSide>) {
        for p in &mut self.state.players {
            p.elo_delta = 0.0;
        }
        let Some(winner) = self.state.winner else {
            return;
        };
        let record = &self.record;
        let eligible = record.ranked
            && !record.is_final
            && coin_toss.is_none()
            && TeamSide::BOTH
                .into_iter()
                .all(|side| record.roster(side).non_captain.is_some());
        if !eligible {
            return;
        }

        let forfeit = self.state.forfeited_by.is_some();
        let playing = |p: &PlayerMatchStats| forfeit || p.rounds_played() > 0;
        let team_elo = |side: TeamSide| {
            elo::average(
                self.state
                    .team_players(side)
                    .filter(|p| playing(p))
                    .map(|p| p.initial_elo),
            )
        };
        let ratings = [team_elo(TeamSide::One), team_elo(TeamSide::Two)];
        for p in &mut self.state.players {
            if playing(&*p) {
                let mine = ratings[p.team.index()];
                let theirs = ratings[p.team.opponent().index()];
                p.elo_delta = elo::delta(mine, theirs, p.team == winner);
            }
        }
    }

    fn low_rating_threshold(&self) -> i32 {
        self.record.ruleset.low_rating_threshold
    }

    /// Carry the envelope's linkage into the aggregate.
    fn finish(&mut self, envelope: &RecordedEvent) {
        let to_serve = envelope.serve.to_serve;
        self.tail = Some(Tail {
            sequence: envelope.sequence,
            serve: envelope.serve,
            court: envelope.court,
        });
        self.state.server = Some(to_serve);
        self.last_service_side[to_serve.team.index()] = Some(to_serve.side);
        for stats in &mut self.state.players {
            stats.side = envelope.court.position_of(stats.player);
        }
    }
}

impl Aggregate for Match {
    type Event = RecordedEvent;

    fn apply(&mut self, event: &RecordedEvent) -> Result<(), ReplayError> {
        let expected = self.next_sequence();
        if event.sequence != expected {
            return Err(ReplayError::OutOfSequence {
                expected,
                found: event.sequence,
            });
        }
        let started = self.state.started;
        match &event.event {
            MatchEvent::Start(e) => Apply::apply(self, e, event),
            _ if !started => Err(ReplayError::Unexpected {
                sequence: event.sequence,
                kind: event.kind(),
                reason: "precedes the start of the match",
            }),
            MatchEvent::Score(e) => Apply::apply(self, e, event),
            MatchEvent::Fault(e) => Apply::apply(self, e, event),
            MatchEvent::Timeout(e) => Apply::apply(self, e, event),
            MatchEvent::EndTimeout(e) => Apply::apply(self, e, event),
            MatchEvent::Forfeit(e) => Apply::apply(self, e, event),
            MatchEvent::Card(e) => Apply::apply(self, e, event),
            MatchEvent::Substitute(e) => Apply::apply(self, e, event),
            MatchEvent::Notes(e) => Apply::apply(self, e, event),
            MatchEvent::Protest(e) => Apply::apply(self, e, event),
            MatchEvent::Resolve(e) => Apply::apply(self, e, event),
            MatchEvent::Votes(e) => Apply::apply(self, e, event),
            MatchEvent::Merit(e) => Apply::apply(self, e, event),
            MatchEvent::Abandon(e) => Apply::apply(self, e, event),
            MatchEvent::EndGame(e) => Apply::apply(self, e, event),
        }?;
        self.finish(event);
        tracing::trace!(
            match_id = %self.record.id,
            sequence = event.sequence,
            kind = event.kind(),
            "event applied"
        );
        Ok(())
    }
}

impl Apply<MatchStarted> for Match {
    fn apply(&mut self, _: &MatchStarted, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        if self.state.started {
            return Err(ReplayError::Unexpected {
                sequence: envelope.sequence,
                kind: envelope.kind(),
                reason: "restarts a match that is already under way",
            });
        }
        self.check_court(envelope)?;
        self.state.started = true;
        self.state.started_at = Some(envelope.recorded_at);
        self.state.admin_status = AdminStatus::InProgress;
        for stats in &mut self.state.players {
            stats.starting_side = envelope.court.position_of(stats.player);
        }
        Ok(())
    }
}

impl Apply<PointScored> for Match {
    fn apply(&mut self, event: &PointScored, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        let court = self.court_before(envelope);
        let served = envelope.serve.served;

        if let Some(player) = event.player {
            let won_on_serve = served.team == event.team;
            let ace = matches!(event.note, ScoreNote::Ace);

            let scorer = self.stats_mut(envelope, event.team, player)?;
            scorer.points_scored += 1;
            if ace {
                scorer.aces += 1;
            }

            let server = self.stats_mut(envelope, served.team, served.player)?;
            server.served_points += 1;
            if won_on_serve {
                server.served_points_won += 1;
                server.serve_streak += 1;
                server.best_serve_streak = server.best_serve_streak.max(server.serve_streak);
                if ace {
                    server.ace_streak += 1;
                    server.best_ace_streak = server.best_ace_streak.max(server.ace_streak);
                } else {
                    server.ace_streak = 0;
                }
            } else {
                server.serve_streak = 0;
                server.ace_streak = 0;
            }

            if let Some(receiver) = self.receiver(&court, served) {
                if let Some(stats) = self.state.player_mut(receiver) {
                    stats.serves_received += 1;
                    if !ace {
                        stats.serves_returned += 1;
                    }
                }
            }
        } else if !event.is_penalty() {
            tracing::warn!(
                match_id = %self.record.id,
                sequence = envelope.sequence,
                "point without a player; crediting the score only"
            );
            self.add_point(event.team);
            return Ok(());
        }

        self.add_point(event.team);
        self.credit_rounds(&court);
        Ok(())
    }
}

impl Apply<FaultCalled> for Match {
    fn apply(&mut self, event: &FaultCalled, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        let double = self.state.last_rally == Some(Rally::Fault);
        let server = self.stats_mut(envelope, event.team, event.player)?;
        server.faults += 1;
        server.served_points += 1;
        if double {
            server.double_faults += 1;
        }
        self.state.last_rally = Some(Rally::Fault);
        Ok(())
    }
}

impl Apply<TimeoutCalled> for Match {
    fn apply(&mut self, event: &TimeoutCalled, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        if let Some(team) = event.team {
            self.state.team_mut(team).timeouts += 1;
        }
        self.state.timeout = Some(ActiveTimeout {
            team: event.team,
            started_at: envelope.recorded_at,
            expires_at: envelope.recorded_at + self.record.ruleset.timeout_duration(),
        });
        Ok(())
    }
}

impl Apply<TimeoutEnded> for Match {
    fn apply(&mut self, _: &TimeoutEnded, _: &RecordedEvent) -> Result<(), ReplayError> {
        self.state.timeout = None;
        Ok(())
    }
}

impl Apply<TeamForfeited> for Match {
    fn apply(&mut self, event: &TeamForfeited, _: &RecordedEvent) -> Result<(), ReplayError> {
        let ceiling = self
            .record
            .ruleset
            .award_ceiling(self.state.score(event.team));
        let opponent = self.state.team_mut(event.team.opponent());
        opponent.score = opponent.score.max(ceiling);
        self.state.someone_has_won = true;
        self.state.forfeited_by = Some(event.team);
        Ok(())
    }
}

impl Apply<CardIssued> for Match {
    fn apply(&mut self, event: &CardIssued, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        let stats = self.stats_mut(envelope, event.team, event.player)?;
        match event.color {
            CardColor::Warning => stats.warnings += 1,
            CardColor::Green => stats.green_cards += 1,
            CardColor::Yellow => stats.yellow_cards += 1,
            CardColor::Red => stats.red_cards += 1,
        }
        if stats.suspension != Suspension::SentOff {
            match u32::try_from(event.duration) {
                Ok(0) => {}
                Ok(points) => {
                    stats.suspension = stats.suspension.extend(points);
                    stats.card_time = stats.suspension.remaining(0);
                }
                Err(_) => stats.suspension = Suspension::SentOff,
            }
        }
        Ok(())
    }
}

impl Apply<PlayerSubstituted> for Match {
    fn apply(
        &mut self,
        event: &PlayerSubstituted,
        envelope: &RecordedEvent,
    ) -> Result<(), ReplayError> {
        self.check_player(envelope, event.team, event.outgoing)?;
        self.check_player(envelope, event.team, event.incoming)?;
        if !envelope.court.is_on_court(event.incoming) {
            return Err(ReplayError::Unexpected {
                sequence: envelope.sequence,
                kind: envelope.kind(),
                reason: "brings on a player missing from its court snapshot",
            });
        }
        Ok(())
    }
}

impl Apply<NotesRecorded> for Match {
    fn apply(&mut self, event: &NotesRecorded, _: &RecordedEvent) -> Result<(), ReplayError> {
        let team = self.state.team_mut(event.team);
        team.rating = Some(event.rating);
        team.notes = Some(event.notes.clone());
        for stats in &mut self.state.players {
            if stats.team == event.team {
                stats.rating = Some(event.rating);
            }
        }
        let threshold = self.low_rating_threshold();
        self.state.refresh_admin_status(threshold);
        Ok(())
    }
}

impl Apply<ProtestLodged> for Match {
    fn apply(&mut self, event: &ProtestLodged, _: &RecordedEvent) -> Result<(), ReplayError> {
        self.state.protested = true;
        self.state.team_mut(event.team).protest = Some(event.reason.clone());
        let threshold = self.low_rating_threshold();
        self.state.refresh_admin_status(threshold);
        Ok(())
    }
}

impl Apply<ProtestResolved> for Match {
    fn apply(&mut self, _: &ProtestResolved, _: &RecordedEvent) -> Result<(), ReplayError> {
        self.state.resolved = true;
        let threshold = self.low_rating_threshold();
        self.state.refresh_admin_status(threshold);
        Ok(())
    }
}

impl Apply<VotesCast> for Match {
    fn apply(&mut self, event: &VotesCast, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        self.stats_mut(envelope, event.team, event.player)?.votes += event.votes;
        Ok(())
    }
}

impl Apply<MeritAwarded> for Match {
    fn apply(&mut self, event: &MeritAwarded, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        self.stats_mut(envelope, event.team, event.player)?.merits += 1;
        Ok(())
    }
}

impl Apply<MatchAbandoned> for Match {
    fn apply(&mut self, _: &MatchAbandoned, _: &RecordedEvent) -> Result<(), ReplayError> {
        self.state.abandoned = true;
        self.state.someone_has_won = true;
        Ok(())
    }
}

impl Apply<MatchEnded> for Match {
    fn apply(&mut self, event: &MatchEnded, envelope: &RecordedEvent) -> Result<(), ReplayError> {
        if let Some(best) = event.best_player {
            if self.record.side_of(best).is_none() {
                return Err(ReplayError::Unexpected {
                    sequence: envelope.sequence,
                    kind: envelope.kind(),
                    reason: "names a best player who is not rostered",
                });
            }
        }
        let state = &mut self.state;
        state.ended = true;
        state.ended_at = Some(envelope.recorded_at);
        state.timeout = None;
        state.best_player = event.best_player;
        state.notes = Some(event.notes.clone());
        state.marked_for_review = event.marked_for_review;
        for stats in &mut state.players {
            stats.is_best_player = Some(stats.player) == event.best_player;
        }
        self.state.winner = self.decide_winner(event.coin_toss);
        self.rate_players(event.coin_toss);
        let threshold = self.low_rating_threshold();
        self.state.refresh_admin_status(threshold);
        Ok(())
    }
}

/// Fold a complete log into match state.
///
/// # Errors
///
/// Returns the first [`ReplayError`] in the log.
pub fn project(record: &MatchRecord, events: &[RecordedEvent]) -> Result<MatchState, ReplayError> {
    Match::replay(record.clone(), events).map(Match::into_state)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        court::{Pair, Position},
        roster::{MatchId, NewMatch, Roster, TeamId, TournamentId},
    };

    fn record() -> MatchRecord {
        let new = NewMatch::new(
            TournamentId(1),
            Roster::pair(TeamId(1), PlayerId(1), PlayerId(2)).with_substitute(PlayerId(5)),
            Roster::pair(TeamId(2), PlayerId(3), PlayerId(4)),
        );
        MatchRecord::new(MatchId(1), new).unwrap()
    }

    fn court() -> Court {
        Court {
            team_one: Pair::new(PlayerId(1), PlayerId(2)),
            team_two: Pair::new(PlayerId(3), PlayerId(4)),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn opening() -> ServeContext {
        ServeContext::opening(Serve {
            team: TeamSide::One,
            player: PlayerId(1),
            side: CourtSide::Left,
        })
    }

    fn entry(sequence: u64, serve: ServeContext, event: impl Into<MatchEvent>) -> RecordedEvent {
        RecordedEvent {
            sequence,
            recorded_at: at(i64::try_from(sequence).unwrap()),
            serve,
            court: court(),
            event: event.into(),
        }
    }

    fn started() -> Vec<RecordedEvent> {
        vec![entry(
            0,
            opening(),
            MatchStarted {
                swap_service: false,
            },
        )]
    }

    #[test]
    fn start_assigns_starting_sides() {
        let state = project(&record(), &started()).unwrap();
        assert!(state.started);
        assert_eq!(state.admin_status, AdminStatus::InProgress);
        assert_eq!(state.player(PlayerId(2)).unwrap().starting_side, Position::Right);
        assert_eq!(state.player(PlayerId(5)).unwrap().side, Position::Substitute);
        assert_eq!(state.server.unwrap().player, PlayerId(1));
    }

    #[test]
    fn rally_point_credits_scorer_server_and_receiver() {
        let mut events = started();
        events.push(entry(
            1,
            opening(),
            PointScored {
                team: TeamSide::One,
                player: Some(PlayerId(2)),
                note: ScoreNote::Rally(None),
            },
        ));
        let state = project(&record(), &events).unwrap();
        assert_eq!(state.team_one.score, 1);
        let scorer = state.player(PlayerId(2)).unwrap();
        assert_eq!(scorer.points_scored, 1);
        let server = state.player(PlayerId(1)).unwrap();
        assert_eq!((server.served_points, server.served_points_won), (1, 1));
        assert_eq!(server.best_serve_streak, 1);
        let receiver = state.player(PlayerId(3)).unwrap();
        assert_eq!((receiver.serves_received, receiver.serves_returned), (1, 1));
        assert_eq!(receiver.rounds_on_court, 1);
        assert_eq!(state.player(PlayerId(5)).unwrap().rounds_played(), 0);
    }

    #[test]
    fn ace_is_received_but_not_returned() {
        let mut events = started();
        events.push(entry(
            1,
            opening(),
            PointScored {
                team: TeamSide::One,
                player: Some(PlayerId(1)),
                note: ScoreNote::Ace,
            },
        ));
        let state = project(&record(), &events).unwrap();
        let server = state.player(PlayerId(1)).unwrap();
        assert_eq!((server.aces, server.best_ace_streak), (1, 1));
        let receiver = state.player(PlayerId(3)).unwrap();
        assert_eq!((receiver.serves_received, receiver.serves_returned), (1, 0));
    }

    #[test]
    fn second_fault_in_a_row_is_a_double() {
        let mut events = started();
        let fault = FaultCalled {
            team: TeamSide::One,
            player: PlayerId(1),
        };
        events.push(entry(1, opening(), fault.clone()));
        events.push(entry(2, opening(), fault));
        let state = project(&record(), &events).unwrap();
        let server = state.player(PlayerId(1)).unwrap();
        assert_eq!((server.faults, server.double_faults), (2, 1));
        assert_eq!(server.served_points, 2);
    }

    #[test]
    fn forfeit_never_lowers_a_score() {
        let mut events = started();
        events.push(entry(1, opening(), TeamForfeited { team: TeamSide::Two }));
        let state = project(&record(), &events).unwrap();
        assert_eq!(state.team_one.score, 11);
        assert!(state.someone_has_won);
        assert_eq!(state.forfeited_by, Some(TeamSide::Two));
    }

    #[test]
    fn sent_off_player_ignores_later_cards() {
        let mut events = started();
        let card = |color, duration| CardIssued {
            team: TeamSide::Two,
            player: PlayerId(3),
            color,
            duration,
            reason: String::new(),
        };
        events.push(entry(1, opening(), card(CardColor::Red, -1)));
        events.push(entry(2, opening(), card(CardColor::Yellow, 6)));
        let state = project(&record(), &events).unwrap();
        let stats = state.player(PlayerId(3)).unwrap();
        assert_eq!(stats.suspension, Suspension::SentOff);
        assert_eq!((stats.red_cards, stats.yellow_cards), (1, 1));
    }

    #[test]
    fn timeout_window_uses_ruleset_duration() {
        let mut events = started();
        events.push(entry(1, opening(), TimeoutCalled { team: Some(TeamSide::Two) }));
        let state = project(&record(), &events).unwrap();
        let timeout = state.timeout.unwrap();
        assert_eq!(timeout.expires_at - timeout.started_at, chrono::Duration::seconds(30));
        assert_eq!(state.team_two.timeouts, 1);

        events.push(entry(2, opening(), TimeoutEnded {}));
        assert!(project(&record(), &events).unwrap().timeout.is_none());
    }

    #[test]
    fn unknown_player_aborts_replay() {
        let mut events = started();
        events.push(entry(
            1,
            opening(),
            MeritAwarded {
                team: TeamSide::One,
                player: PlayerId(3),
                reason: None,
            },
        ));
        let err = project(&record(), &events).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::UnknownPlayer {
                sequence: 1,
                player: PlayerId(3),
                ..
            }
        ));
    }

    #[test]
    fn events_before_start_are_rejected() {
        let events = vec![entry(0, opening(), TimeoutEnded {})];
        assert!(matches!(
            project(&record(), &events),
            Err(ReplayError::Unexpected { sequence: 0, .. })
        ));
    }

    #[test]
    fn gaps_in_sequence_are_rejected() {
        let mut events = started();
        events.push(entry(2, opening(), TimeoutEnded {}));
        assert!(matches!(
            project(&record(), &events),
            Err(ReplayError::OutOfSequence {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn projecting_twice_is_deterministic() {
        let mut events = started();
        events.push(entry(
            1,
            opening(),
            PointScored {
                team: TeamSide::Two,
                player: Some(PlayerId(4)),
                note: ScoreNote::Rally(None),
            },
        ));
        assert_eq!(
            project(&record(), &events).unwrap(),
            project(&record(), &events).unwrap()
        );
    }
}
