//! Commands and the draft they are recorded on.
//!
//! A command never touches the match it is aimed at. It is recorded on a
//! [`Draft`]: a scratch copy of the aggregate onto which every synthesised
//! event is applied as soon as it is built. Each event therefore inherits
//! its serve linkage and court snapshot from the one before it, including
//! events produced earlier in the same batch. When the command succeeds the
//! caller takes both the events and the scratch copy; when it fails the draft
//! is dropped.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    aggregate::Aggregate,
    court::{Court, CourtSide, Pair, Serve, ServeContext},
    event::{
        CardColor, CardIssued, FaultCalled, MatchAbandoned, MatchEnded, MatchEvent, MatchStarted,
        MeritAwarded, NotesRecorded, PlayerSubstituted, PointScored, ProtestLodged,
        ProtestResolved, RecordedEvent, ScoreMethod, ScoreNote, TeamForfeited, TimeoutCalled,
        TimeoutEnded, UnknownName, VotesCast,
    },
    projection::{Match, ReplayError, Tail},
    roster::{MatchId, MatchRecord, PlayerId, RosterError, TeamSide},
    state::{MatchState, Rally},
};

/// The match is not in a state that accepts the operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidState {
    #[error("the match has not started")]
    NotStarted,
    #[error("the match has already started")]
    AlreadyStarted,
    #[error("the match has ended")]
    Ended,
    #[error("the match has not ended")]
    NotEnded,
    #[error("the match has already been decided")]
    Decided,
    #[error("nobody has won the match yet")]
    NotDecided,
    #[error("the match has already been resolved")]
    AlreadyResolved,
    #[error("a timeout is already running")]
    TimeoutRunning,
    #[error("there is nothing to undo")]
    NothingToUndo,
    #[error("match {0} does not exist")]
    UnknownMatch(MatchId),
}

/// A command argument was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidArgument {
    #[error(transparent)]
    UnknownName(#[from] UnknownName),
    #[error("player {0} is not rostered for this match")]
    NotRostered(PlayerId),
    #[error("player {player} is not rostered for {team}")]
    NotOnTeam { player: PlayerId, team: TeamSide },
    #[error("player {0} is not on court")]
    NotOnCourt(PlayerId),
    #[error("{0} has no substitute available")]
    NoSubstitute(TeamSide),
    #[error("invalid lineup for {team}: {reason}")]
    BadLineup { team: TeamSide, reason: &'static str },
    #[error("a {color} cannot last {duration} points")]
    BadDuration { color: CardColor, duration: i32 },
    #[error("a best player must be named")]
    MissingBestPlayer,
    #[error(transparent)]
    Roster(#[from] RosterError),
}

/// Error returned when a command is rejected.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    InvalidState(#[from] InvalidState),
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    /// A synthesised event could not be applied. This is a bug or a corrupt
    /// log, never bad input.
    #[error("integrity violation: {0}")]
    Integrity(#[from] ReplayError),
}

impl From<UnknownName> for CommandError {
    fn from(error: UnknownName) -> Self {
        Self::InvalidArgument(error.into())
    }
}

/// Names a player either directly or by the court slot they occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerSelector {
    Slot(CourtSide),
    Player(PlayerId),
}

impl From<PlayerId> for PlayerSelector {
    fn from(player: PlayerId) -> Self {
        Self::Player(player)
    }
}

impl From<CourtSide> for PlayerSelector {
    fn from(side: CourtSide) -> Self {
        Self::Slot(side)
    }
}

/// A request that records events on a [`Draft`].
pub trait Command: fmt::Debug {
    /// Validate against the draft and push the resulting events.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the command does not apply to the match as
    /// it stands.
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError>;
}

/// Scratch copy of a match that commands record events on.
#[derive(Debug)]
pub struct Draft {
    scratch: Match,
    events: Vec<RecordedEvent>,
    now: DateTime<Utc>,
}

impl Draft {
    fn new(base: &Match, now: DateTime<Utc>) -> Self {
        Self {
            scratch: base.clone(),
            events: Vec::new(),
            now,
        }
    }

    /// State with every event recorded so far applied.
    #[must_use]
    pub const fn state(&self) -> &MatchState {
        self.scratch.state()
    }

    #[must_use]
    pub const fn record(&self) -> &MatchRecord {
        self.scratch.record()
    }

    #[must_use]
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// The updated aggregate and the events that produced it.
    #[must_use]
    pub fn into_parts(self) -> (Match, Vec<RecordedEvent>) {
        (self.scratch, self.events)
    }

    #[must_use]
    pub fn into_events(self) -> Vec<RecordedEvent> {
        self.events
    }

    fn tail(&self) -> Result<Tail, InvalidState> {
        self.scratch.tail().copied().ok_or(InvalidState::NotStarted)
    }

    fn live(&self) -> Result<(), InvalidState> {
        let state = self.state();
        if state.is_live() {
            Ok(())
        } else if state.started {
            Err(InvalidState::Ended)
        } else {
            Err(InvalidState::NotStarted)
        }
    }

    /// Resolve `selector` to a player currently in `team`'s court pair.
    fn on_court(&self, team: TeamSide, selector: PlayerSelector) -> Result<PlayerId, CommandError> {
        let player = self.resolve(team, selector)?;
        if self.tail()?.court.pair(team).side_of(player).is_none() {
            return Err(InvalidArgument::NotOnCourt(player).into());
        }
        Ok(player)
    }

    fn undecided(&self) -> Result<(), InvalidState> {
        if self.state().someone_has_won {
            Err(InvalidState::Decided)
        } else {
            Ok(())
        }
    }

    fn resolve(&self, team: TeamSide, selector: PlayerSelector) -> Result<PlayerId, CommandError> {
        match selector {
            PlayerSelector::Slot(side) => Ok(self.tail()?.court.pair(team).get(side)),
            PlayerSelector::Player(player) if self.record().roster(team).contains(player) => {
                Ok(player)
            }
            PlayerSelector::Player(player) => {
                Err(InvalidArgument::NotOnTeam { player, team }.into())
            }
        }
    }

    /// Record an event with explicit linkage and apply it to the scratch copy.
    fn push_with(
        &mut self,
        event: impl Into<MatchEvent>,
        serve: ServeContext,
        court: Court,
    ) -> Result<(), CommandError> {
        let recorded = RecordedEvent {
            sequence: self.scratch.next_sequence(),
            recorded_at: self.now,
            serve,
            court,
            event: event.into(),
        };
        self.scratch.apply(&recorded)?;
        self.events.push(recorded);
        Ok(())
    }

    /// Record an event that inherits the tail's linkage unchanged.
    fn push(&mut self, event: impl Into<MatchEvent>) -> Result<(), CommandError> {
        let tail = self.tail()?;
        self.push_with(event, tail.serve.carried(), tail.court)
    }

    /// Record a point, deciding who serves next.
    fn score(
        &mut self,
        team: TeamSide,
        player: Option<PlayerId>,
        note: ScoreNote,
    ) -> Result<(), CommandError> {
        let tail = self.tail()?;
        let badminton = self.record().ruleset.badminton_serves;
        let previous = tail.serve.to_serve;
        let mut court = tail.court;

        let to_serve = if previous.team == team {
            if badminton {
                let pair = court.pair_mut(team);
                *pair = pair.swapped();
                Serve {
                    side: previous.side.flip(),
                    ..previous
                }
            } else {
                previous
            }
        } else {
            let default = if badminton {
                CourtSide::Left
            } else {
                CourtSide::Right
            };
            let side = self
                .scratch
                .last_service_side(team)
                .unwrap_or(default)
                .flip();
            Serve {
                team,
                player: court.pair(team).get(side),
                side,
            }
        };

        let serve = ServeContext {
            served: previous,
            to_serve,
        };
        self.push_with(PointScored { team, player, note }, serve, court)
    }

    fn penalty(&mut self, team: TeamSide) -> Result<(), CommandError> {
        self.score(team, None, ScoreNote::Penalty)
    }
}

impl Match {
    /// Record `command` on a draft of this match.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the command is rejected; the match itself
    /// is never modified.
    pub fn execute<C: Command + ?Sized>(
        &self,
        command: &C,
        now: DateTime<Utc>,
    ) -> Result<Draft, CommandError> {
        let mut draft = Draft::new(self, now);
        command.record(&mut draft).inspect_err(|error| {
            tracing::warn!(match_id = %self.record().id, ?command, %error, "command rejected");
        })?;
        Ok(draft)
    }
}

/// Start the match with the given lineups.
///
/// A lineup lists players left, right, then substitute. Without one the
/// roster order is used. A lineup of one fills both court slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartMatch {
    /// Team two serves first.
    pub swap_service: bool,
    pub team_one: Option<Vec<PlayerId>>,
    pub team_two: Option<Vec<PlayerId>>,
}

impl StartMatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn swap_service(mut self) -> Self {
        self.swap_service = true;
        self
    }

    #[must_use]
    pub fn with_lineup(mut self, team: TeamSide, lineup: Vec<PlayerId>) -> Self {
        match team {
            TeamSide::One => self.team_one = Some(lineup),
            TeamSide::Two => self.team_two = Some(lineup),
        }
        self
    }

    fn pair(&self, record: &MatchRecord, team: TeamSide) -> Result<Pair, InvalidArgument> {
        let roster = record.roster(team);
        let lineup = match team {
            TeamSide::One => self.team_one.as_ref(),
            TeamSide::Two => self.team_two.as_ref(),
        }
        .cloned()
        .unwrap_or_else(|| roster.players().collect());

        let bad = |reason| InvalidArgument::BadLineup { team, reason };
        if lineup.len() > 3 {
            return Err(bad("more than three players"));
        }
        for (i, player) in lineup.iter().enumerate() {
            if !roster.contains(*player) {
                return Err(InvalidArgument::NotOnTeam {
                    player: *player,
                    team,
                });
            }
            if lineup[..i].contains(player) {
                return Err(bad("a player is listed twice"));
            }
        }
        let Some(&left) = lineup.first() else {
            return Err(bad("no players"));
        };
        let right = lineup.get(1).copied().unwrap_or(left);
        Ok(Pair::new(left, right))
    }
}

impl Command for StartMatch {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        if draft.state().started {
            return Err(InvalidState::AlreadyStarted.into());
        }
        let court = Court {
            team_one: self.pair(draft.record(), TeamSide::One)?,
            team_two: self.pair(draft.record(), TeamSide::Two)?,
        };
        let team = if self.swap_service {
            TeamSide::Two
        } else {
            TeamSide::One
        };
        let serve = Serve {
            team,
            player: court.pair(team).left,
            side: CourtSide::Left,
        };
        draft.push_with(
            MatchStarted {
                swap_service: self.swap_service,
            },
            ServeContext::opening(serve),
            court,
        )
    }
}

/// A rally point for `team`, credited to `player`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScorePoint {
    pub team: TeamSide,
    pub player: PlayerSelector,
    pub method: Option<ScoreMethod>,
}

impl ScorePoint {
    #[must_use]
    pub fn new(team: TeamSide, player: impl Into<PlayerSelector>) -> Self {
        Self {
            team,
            player: player.into(),
            method: None,
        }
    }

    #[must_use]
    pub const fn with_method(mut self, method: ScoreMethod) -> Self {
        self.method = Some(method);
        self
    }
}

impl Command for ScorePoint {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        draft.undecided()?;
        let player = draft.on_court(self.team, self.player)?;
        draft.score(self.team, Some(player), ScoreNote::Rally(self.method))
    }
}

/// A point won directly off the serve by the current server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ace;

impl Command for Ace {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        draft.undecided()?;
        let server = draft.tail()?.serve.to_serve;
        draft.score(server.team, Some(server.player), ScoreNote::Ace)
    }
}

/// A fault by the current server. A second fault in a row also gives the
/// receiving team a penalty point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fault;

impl Command for Fault {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        draft.undecided()?;
        let server = draft.tail()?.serve.to_serve;
        let double = draft.state().last_rally == Some(Rally::Fault);
        draft.push(FaultCalled {
            team: server.team,
            player: server.player,
        })?;
        if double {
            draft.penalty(server.team.opponent())?;
        }
        Ok(())
    }
}

/// Open a timeout. `team` is `None` for an official's timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallTimeout {
    pub team: Option<TeamSide>,
}

impl Command for CallTimeout {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        if draft
            .state()
            .timeout
            .is_some_and(|running| !running.has_expired(draft.now))
        {
            return Err(InvalidState::TimeoutRunning.into());
        }
        draft.push(TimeoutCalled { team: self.team })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EndTimeout;

impl Command for EndTimeout {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        draft.push(TimeoutEnded {})
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Forfeit {
    pub team: TeamSide,
}

impl Command for Forfeit {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        draft.undecided()?;
        draft.push(TeamForfeited { team: self.team })
    }
}

/// Swap `outgoing` for the team's first rostered player not on court.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Substitute {
    pub team: TeamSide,
    pub outgoing: PlayerSelector,
}

impl Command for Substitute {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        let outgoing = draft.on_court(self.team, self.outgoing)?;
        let tail = draft.tail()?;
        let incoming = draft
            .record()
            .roster(self.team)
            .players()
            .find(|p| !tail.court.is_on_court(*p))
            .ok_or(InvalidArgument::NoSubstitute(self.team))?;

        let mut court = tail.court;
        let pair = court.pair_mut(self.team);
        for side in [CourtSide::Left, CourtSide::Right] {
            if pair.get(side) == outgoing {
                pair.set(side, incoming);
            }
        }
        let mut serve = tail.serve.carried();
        if serve.to_serve.player == outgoing {
            serve.to_serve.player = incoming;
        }
        draft.push_with(
            PlayerSubstituted {
                team: self.team,
                outgoing,
                incoming,
            },
            serve,
            court,
        )
    }
}

/// Show a card. Red cards always send off and warnings never suspend,
/// whatever `duration` says.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueCard {
    pub team: TeamSide,
    pub player: PlayerSelector,
    pub color: CardColor,
    /// Suspension in points for green and yellow cards.
    pub duration: i32,
    pub reason: String,
}

impl IssueCard {
    #[must_use]
    pub fn new(
        team: TeamSide,
        player: impl Into<PlayerSelector>,
        color: CardColor,
        duration: i32,
    ) -> Self {
        Self {
            team,
            player: player.into(),
            color,
            duration,
            reason: String::new(),
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    fn effective_duration(&self) -> Result<i32, InvalidArgument> {
        match self.color {
            CardColor::Warning => Ok(0),
            CardColor::Red => Ok(-1),
            color if self.duration < 0 => Err(InvalidArgument::BadDuration {
                color,
                duration: self.duration,
            }),
            _ => Ok(self.duration),
        }
    }
}

impl Command for IssueCard {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        let player = draft.resolve(self.team, self.player)?;
        let duration = self.effective_duration()?;
        draft.push(CardIssued {
            team: self.team,
            player,
            color: self.color,
            duration,
            reason: self.reason.clone(),
        })?;

        let state = draft.state();
        if state.someone_has_won {
            return Ok(());
        }
        let rules = &draft.record().ruleset;
        let on_court = draft.tail()?.court.pair(self.team).players();
        let solo = on_court.len() == 1;
        let owed = on_court
            .iter()
            .map(|p| {
                state
                    .player(*p)
                    .map_or(0, |s| s.suspension.remaining(rules.score_to_force_win))
            })
            .min()
            .unwrap_or(0);
        if owed == 0 && !solo {
            return Ok(());
        }

        let points = if solo {
            u32::try_from(duration).unwrap_or(rules.score_to_force_win)
        } else {
            owed
        };
        let opponent = self.team.opponent();
        let cap = rules
            .award_ceiling(state.score(self.team))
            .saturating_sub(state.score(opponent));
        for _ in 0..points.min(cap) {
            draft.penalty(opponent)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AwardMerit {
    pub team: TeamSide,
    pub player: PlayerSelector,
    pub reason: Option<String>,
}

impl Command for AwardMerit {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        let player = draft.resolve(self.team, self.player)?;
        draft.push(MeritAwarded {
            team: self.team,
            player,
            reason: self.reason.clone(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AbandonMatch {
    pub reason: Option<String>,
}

impl Command for AbandonMatch {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        draft.live()?;
        draft.undecided()?;
        draft.push(MatchAbandoned {
            reason: self.reason.clone(),
        })
    }
}

/// What the official reports about one team when closing a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamReport {
    pub rating: i32,
    pub notes: String,
    /// Lodges a protest when present and non-empty.
    pub protest: Option<String>,
}

impl TeamReport {
    #[must_use]
    pub const fn new(rating: i32) -> Self {
        Self {
            rating,
            notes: String::new(),
            protest: None,
        }
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    #[must_use]
    pub fn with_protest(mut self, reason: impl Into<String>) -> Self {
        self.protest = Some(reason.into());
        self
    }
}

/// Close a decided match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndMatch {
    /// Best players in order; the first two receive two votes and one vote.
    pub best_players: Vec<PlayerId>,
    pub notes: String,
    pub marked_for_review: bool,
    pub team_one: TeamReport,
    pub team_two: TeamReport,
    /// Outcome to record if a toss is needed. Drawn at random when absent.
    pub coin_toss: Option<TeamSide>,
}

impl EndMatch {
    #[must_use]
    pub fn new(team_one: TeamReport, team_two: TeamReport) -> Self {
        Self {
            best_players: Vec::new(),
            notes: String::new(),
            marked_for_review: false,
            team_one,
            team_two,
            coin_toss: None,
        }
    }

    #[must_use]
    pub fn with_best_players(mut self, players: impl IntoIterator<Item = PlayerId>) -> Self {
        self.best_players = players.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    #[must_use]
    pub const fn marked_for_review(mut self) -> Self {
        self.marked_for_review = true;
        self
    }

    #[must_use]
    pub const fn with_coin_toss(mut self, team: TeamSide) -> Self {
        self.coin_toss = Some(team);
        self
    }

    const fn report(&self, team: TeamSide) -> &TeamReport {
        match team {
            TeamSide::One => &self.team_one,
            TeamSide::Two => &self.team_two,
        }
    }
}

impl Command for EndMatch {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        let state = draft.state();
        if !state.started {
            return Err(InvalidState::NotStarted.into());
        }
        if state.ended {
            return Err(InvalidState::Ended.into());
        }
        if !state.someone_has_won {
            return Err(InvalidState::NotDecided.into());
        }

        let record = draft.record();
        let best: Vec<(TeamSide, PlayerId)> = self
            .best_players
            .iter()
            .take(2)
            .map(|p| {
                record
                    .side_of(*p)
                    .map(|team| (team, *p))
                    .ok_or(InvalidArgument::NotRostered(*p))
            })
            .collect::<Result<_, _>>()?;
        let short_handed = TeamSide::BOTH
            .into_iter()
            .any(|side| record.roster(side).player_count() < 2);
        if best.is_empty() && state.forfeited_by.is_none() && !short_handed {
            return Err(InvalidArgument::MissingBestPlayer.into());
        }

        let needs_toss = state.forfeited_by.is_none()
            && state.high_score() < record.ruleset.min_decisive_score;
        let coin_toss = needs_toss.then(|| {
            self.coin_toss.unwrap_or_else(|| {
                if rand::random::<bool>() {
                    TeamSide::One
                } else {
                    TeamSide::Two
                }
            })
        });

        draft.push(MatchEnded {
            best_player: best.first().map(|(_, p)| *p),
            notes: self.notes.clone(),
            marked_for_review: self.marked_for_review,
            coin_toss,
        })?;
        for team in TeamSide::BOTH {
            if let Some(reason) = self.report(team).protest.as_ref().filter(|r| !r.is_empty()) {
                draft.push(ProtestLodged {
                    team,
                    reason: reason.clone(),
                })?;
            }
        }
        for team in TeamSide::BOTH {
            let report = self.report(team);
            draft.push(NotesRecorded {
                team,
                rating: report.rating,
                notes: report.notes.clone(),
            })?;
        }
        for ((team, player), votes) in best.into_iter().zip([2, 1]) {
            draft.push(VotesCast {
                team,
                player,
                votes,
            })?;
        }
        Ok(())
    }
}

/// Mark an ended match as resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveMatch {
    pub notes: Option<String>,
}

impl Command for ResolveMatch {
    fn record(&self, draft: &mut Draft) -> Result<(), CommandError> {
        let state = draft.state();
        if !state.ended {
            return Err(InvalidState::NotEnded.into());
        }
        if state.resolved {
            return Err(InvalidState::AlreadyResolved.into());
        }
        draft.push(ProtestResolved {
            notes: self.notes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        court::Position,
        roster::{MatchId, NewMatch, Roster, TeamId, TournamentId},
        ruleset::Ruleset,
        state::Suspension,
        test::TestFramework,
    };

    const A1: PlayerId = PlayerId(1);
    const A2: PlayerId = PlayerId(2);
    const A3: PlayerId = PlayerId(5);
    const B1: PlayerId = PlayerId(3);
    const B2: PlayerId = PlayerId(4);

    fn record_with(ruleset: Ruleset) -> MatchRecord {
        let new = NewMatch::new(
            TournamentId(1),
            Roster::pair(TeamId(1), A1, A2).with_substitute(A3),
            Roster::pair(TeamId(2), B1, B2),
        )
        .with_ruleset(ruleset);
        MatchRecord::new(MatchId(1), new).unwrap()
    }

    fn started() -> TestFramework {
        TestFramework::for_match(record_with(Ruleset::default())).given(&StartMatch::new())
    }

    fn point(team: TeamSide, player: PlayerId) -> ScorePoint {
        ScorePoint::new(team, player)
    }

    #[test]
    fn commands_before_start_are_rejected() {
        TestFramework::for_match(record_with(Ruleset::default()))
            .when(&Ace)
            .then_expect_error_message("has not started");
    }

    #[test]
    fn start_twice_is_rejected() {
        started()
            .when(&StartMatch::new())
            .then_expect_error_message("already started");
    }

    #[test]
    fn lineup_must_come_from_the_roster() {
        TestFramework::for_match(record_with(Ruleset::default()))
            .when(&StartMatch::new().with_lineup(TeamSide::One, vec![A1, B1]))
            .then_expect_error_message("not rostered for team one");
    }

    #[test]
    fn start_puts_roster_order_on_court() {
        TestFramework::for_match(record_with(Ruleset::default()))
            .when(&StartMatch::new().swap_service())
            .then_expect_state(|state| {
                let server = state.server.unwrap();
                assert_eq!((server.team, server.player), (TeamSide::Two, B1));
                assert_eq!(state.player(A3).unwrap().side, Position::Substitute);
                assert_eq!(state.player(B2).unwrap().side, Position::Right);
            });
    }

    #[test]
    fn score_records_rally_method() {
        started()
            .when(&point(TeamSide::One, A2).with_method(ScoreMethod::Straight))
            .then_expect_events(&[PointScored {
                team: TeamSide::One,
                player: Some(A2),
                note: ScoreNote::Rally(Some(ScoreMethod::Straight)),
            }
            .into()]);
    }

    #[test]
    fn serve_moves_to_the_left_player_of_the_receiving_team() {
        let events = started().when(&point(TeamSide::Two, B2)).events();
        let serve = events[0].serve;
        assert_eq!(serve.served.player, A1);
        assert_eq!(
            serve.to_serve,
            Serve {
                team: TeamSide::Two,
                player: B1,
                side: CourtSide::Left,
            }
        );
    }

    #[test]
    fn serve_alternates_sides_when_it_comes_back() {
        started()
            .given(&point(TeamSide::Two, B1))
            .when(&point(TeamSide::One, A1))
            .then_expect_state(|state| {
                let server = state.server.unwrap();
                assert_eq!(server.side, CourtSide::Right);
                assert_eq!(server.player, A2);
            });
    }

    #[test]
    fn badminton_serving_team_swaps_on_each_point() {
        let events = TestFramework::for_match(record_with(Ruleset::default().with_badminton_serves()))
            .given(&StartMatch::new())
            .when(&point(TeamSide::One, A2))
            .events();
        let scored = &events[0];
        assert_eq!(scored.court.team_one, Pair::new(A2, A1));
        assert_eq!(scored.serve.to_serve.player, A1);
        assert_eq!(scored.serve.to_serve.side, CourtSide::Right);
    }

    #[test]
    fn badminton_receiving_team_serves_from_the_right() {
        TestFramework::for_match(record_with(Ruleset::default().with_badminton_serves()))
            .given(&StartMatch::new())
            .when(&point(TeamSide::Two, B1))
            .then_expect_state(|state| {
                let server = state.server.unwrap();
                assert_eq!((server.player, server.side), (B2, CourtSide::Right));
            });
    }

    #[test]
    fn ace_is_credited_to_the_server() {
        started()
            .when(&Ace)
            .then_expect_events(&[PointScored {
                team: TeamSide::One,
                player: Some(A1),
                note: ScoreNote::Ace,
            }
            .into()]);
    }

    #[test]
    fn single_fault_gives_no_point() {
        started()
            .when(&Fault)
            .then_expect_events(&[FaultCalled {
                team: TeamSide::One,
                player: A1,
            }
            .into()]);
    }

    #[test]
    fn double_fault_appends_one_penalty_point() {
        started()
            .given(&Fault)
            .when(&Fault)
            .then_expect_events(&[
                FaultCalled {
                    team: TeamSide::One,
                    player: A1,
                }
                .into(),
                PointScored::penalty(TeamSide::Two).into(),
            ]);
    }

    #[test]
    fn fault_after_a_point_is_not_a_double() {
        started()
            .given(&Fault)
            .given(&point(TeamSide::One, A1))
            .when(&Fault)
            .then_expect_state(|state| {
                assert_eq!(state.team_two.score, 0);
                assert_eq!(state.player(A1).unwrap().double_faults, 0);
            });
    }

    #[test]
    fn timeout_only_counts_for_a_team() {
        started()
            .given(&CallTimeout {
                team: Some(TeamSide::One),
            })
            .given(&EndTimeout)
            .when(&CallTimeout { team: None })
            .then_expect_state(|state| {
                assert_eq!(state.team_one.timeouts, 1);
                assert_eq!(state.team_two.timeouts, 0);
                assert!(state.timeout.is_some_and(|t| t.team.is_none()));
            });
    }

    #[test]
    fn decided_match_rejects_points() {
        started()
            .given(&Forfeit { team: TeamSide::One })
            .when(&point(TeamSide::One, A1))
            .then_expect_error_message("already been decided");
    }

    #[test]
    fn substitute_takes_the_outgoing_slot_and_serve() {
        started()
            .when(&Substitute {
                team: TeamSide::One,
                outgoing: CourtSide::Left.into(),
            })
            .then_expect_state(|state| {
                assert_eq!(state.player(A3).unwrap().side, Position::Left);
                assert_eq!(state.player(A1).unwrap().side, Position::Substitute);
                assert_eq!(state.server.unwrap().player, A3);
            });
    }

    #[test]
    fn bench_player_cannot_score() {
        started()
            .when(&point(TeamSide::One, A3))
            .then_expect_error_message("player 5 is not on court");
    }

    #[test]
    fn substituted_player_scores_once_on_court() {
        started()
            .given(&Substitute {
                team: TeamSide::One,
                outgoing: A2.into(),
            })
            .when(&point(TeamSide::One, A3))
            .then_expect_state(|state| {
                assert_eq!(state.team_one.score, 1);
                assert_eq!(state.player(A3).unwrap().points_scored, 1);
            });
    }

    #[test]
    fn bench_player_cannot_be_substituted_out() {
        started()
            .when(&Substitute {
                team: TeamSide::One,
                outgoing: A3.into(),
            })
            .then_expect_error_message("not on court");
    }

    #[test]
    fn second_timeout_waits_for_the_first_to_end() {
        started()
            .given(&CallTimeout {
                team: Some(TeamSide::One),
            })
            .when(&CallTimeout {
                team: Some(TeamSide::Two),
            })
            .then_expect_error_message("timeout is already running");
    }

    #[test]
    fn merit_is_credited_without_scoring() {
        started()
            .when(&AwardMerit {
                team: TeamSide::Two,
                player: B2.into(),
                reason: Some("helped the umpire".to_string()),
            })
            .then_expect_state(|state| {
                assert_eq!(state.player(B2).unwrap().merits, 1);
                assert_eq!(state.team_two.score, 0);
            });
    }

    #[test]
    fn substitute_needs_a_bench_player() {
        started()
            .when(&Substitute {
                team: TeamSide::Two,
                outgoing: B1.into(),
            })
            .then_expect_error_message("no substitute");
    }

    #[test]
    fn green_card_suspends_without_penalty_while_partner_plays() {
        started()
            .when(&IssueCard::new(TeamSide::Two, B1, CardColor::Green, 2))
            .then_expect_state(|state| {
                let b1 = state.player(B1).unwrap();
                assert_eq!(b1.suspension, Suspension::Serving(2));
                assert_eq!(b1.card_time, 2);
                assert_eq!(state.team_one.score, 0);
            });
    }

    #[test]
    fn carding_both_players_awards_the_shorter_suspension() {
        let framework = started()
            .given(&IssueCard::new(TeamSide::Two, B1, CardColor::Yellow, 6))
            .when(&IssueCard::new(TeamSide::Two, B2, CardColor::Green, 3));
        let events = framework.events();
        let penalties = events
            .iter()
            .filter(|e| matches!(&e.event, MatchEvent::Score(s) if s.is_penalty()))
            .count();
        assert_eq!(penalties, 3);
    }

    #[test]
    fn penalty_points_stop_at_the_award_ceiling() {
        started()
            .given(&IssueCard::new(TeamSide::Two, B1, CardColor::Red, 0))
            .when(&IssueCard::new(TeamSide::Two, B2, CardColor::Red, 0))
            .then_expect_state(|state| {
                assert_eq!(state.team_one.score, 11);
                assert!(state.someone_has_won);
            });
    }

    #[test]
    fn negative_green_card_is_rejected() {
        started()
            .when(&IssueCard::new(TeamSide::Two, B1, CardColor::Green, -1))
            .then_expect_error_message("cannot last -1 points");
    }

    #[test]
    fn end_requires_a_decided_match() {
        started()
            .when(&EndMatch::new(TeamReport::new(3), TeamReport::new(3)).with_best_players([A1]))
            .then_expect_error_message("nobody has won");
    }

    #[test]
    fn end_requires_a_best_player() {
        started()
            .given(&AbandonMatch::default())
            .when(&EndMatch::new(TeamReport::new(3), TeamReport::new(3)))
            .then_expect_error_message("best player");
    }

    #[test]
    fn end_appends_protests_notes_and_votes() {
        let events = started()
            .given(&Forfeit { team: TeamSide::Two })
            .when(
                &EndMatch::new(
                    TeamReport::new(4),
                    TeamReport::new(2).with_protest("bad call"),
                )
                .with_best_players([A2, B1]),
            )
            .events();
        let kinds: Vec<_> = events.iter().map(RecordedEvent::kind).collect();
        assert_eq!(
            kinds,
            ["end-game", "protest", "notes", "notes", "votes", "votes"]
        );
    }

    #[test]
    fn resolve_needs_an_ended_match() {
        started()
            .when(&ResolveMatch::default())
            .then_expect_error_message("has not ended");
    }
}
