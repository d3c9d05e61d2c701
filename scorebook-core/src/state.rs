//! Derived match and player state.
//!
//! Nothing in here is stored. Every value is rebuilt by folding the event log
//! through the projector, so these types only describe what the fold produces.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    court::{Position, Serve},
    roster::{MatchRecord, PlayerId, RosterEntry, TeamSide},
};

/// Card suspension a player is under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Suspension {
    #[default]
    Clear,
    /// Off court for this many more points.
    Serving(u32),
    /// Excluded for the rest of the match.
    SentOff,
}

impl Suspension {
    #[must_use]
    pub const fn from_points(points: u32) -> Self {
        if points == 0 {
            Self::Clear
        } else {
            Self::Serving(points)
        }
    }

    #[must_use]
    pub const fn is_carded(self) -> bool {
        !matches!(self, Self::Clear)
    }

    /// Points still owed, counting a send-off as `sent_off_points`.
    #[must_use]
    pub const fn remaining(self, sent_off_points: u32) -> u32 {
        match self {
            Self::Clear => 0,
            Self::Serving(points) => points,
            Self::SentOff => sent_off_points,
        }
    }

    /// Count one point served.
    #[must_use]
    pub const fn tick(self) -> Self {
        match self {
            Self::Serving(points) => Self::from_points(points - 1),
            other => other,
        }
    }

    /// Add a timed suspension. Send-offs are never shortened or extended.
    #[must_use]
    pub const fn extend(self, points: u32) -> Self {
        match self {
            Self::Clear => Self::from_points(points),
            Self::Serving(current) => Self::Serving(current.saturating_add(points)),
            Self::SentOff => Self::SentOff,
        }
    }
}

/// Administrative standing of a match.
///
/// Variants after [`AdminStatus::Official`] are listed from least to most
/// severe; [`MatchState`] picks the most severe that applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminStatus {
    #[default]
    WaitingForStart,
    InProgress,
    Official,
    Forfeit,
    Unsporting,
    YellowCard,
    MarkedForReview,
    Protested,
    RedCard,
    Resolved,
}

impl fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WaitingForStart => "Waiting For Start",
            Self::InProgress => "In Progress",
            Self::Official => "Official",
            Self::Forfeit => "Forfeit",
            Self::Unsporting => "Unsporting Conduct",
            Self::YellowCard => "Yellow Card",
            Self::MarkedForReview => "Marked for Review",
            Self::Protested => "Protested",
            Self::RedCard => "Red Card",
            Self::Resolved => "Resolved",
        })
    }
}

/// Running timeout window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTimeout {
    /// `None` for an official's timeout.
    pub team: Option<TeamSide>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ActiveTimeout {
    #[must_use]
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Per-team totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamState {
    pub score: u32,
    pub timeouts: u32,
    /// Post-match rating given by the official.
    pub rating: Option<i32>,
    pub notes: Option<String>,
    pub protest: Option<String>,
}

/// Derived statistics for one rostered player in one match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerMatchStats {
    pub player: PlayerId,
    pub team: TeamSide,
    pub points_scored: u32,
    pub aces: u32,
    pub faults: u32,
    pub double_faults: u32,
    pub served_points: u32,
    pub served_points_won: u32,
    pub serves_received: u32,
    pub serves_returned: u32,
    pub warnings: u32,
    pub green_cards: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    /// Length of the most recent timed suspension.
    pub card_time: u32,
    pub suspension: Suspension,
    pub rounds_on_court: u32,
    pub rounds_carded: u32,
    /// Consecutive points won on this player's serve, current run.
    pub serve_streak: u32,
    pub best_serve_streak: u32,
    /// Consecutive aces on this player's serve, current run.
    pub ace_streak: u32,
    pub best_ace_streak: u32,
    pub votes: u32,
    pub merits: u32,
    pub rating: Option<i32>,
    pub starting_side: Position,
    pub side: Position,
    pub is_best_player: bool,
    pub initial_elo: f64,
    pub elo_delta: f64,
}

impl PlayerMatchStats {
    /// Blank stats for a roster entry, with any card time carried in.
    #[must_use]
    pub fn new(team: TeamSide, entry: &RosterEntry) -> Self {
        Self {
            player: entry.player,
            team,
            points_scored: 0,
            aces: 0,
            faults: 0,
            double_faults: 0,
            served_points: 0,
            served_points_won: 0,
            serves_received: 0,
            serves_returned: 0,
            warnings: 0,
            green_cards: 0,
            yellow_cards: 0,
            red_cards: 0,
            card_time: entry.carried_card_time,
            suspension: Suspension::from_points(entry.carried_card_time),
            rounds_on_court: 0,
            rounds_carded: 0,
            serve_streak: 0,
            best_serve_streak: 0,
            ace_streak: 0,
            best_ace_streak: 0,
            votes: 0,
            merits: 0,
            rating: None,
            starting_side: Position::Substitute,
            side: Position::Substitute,
            is_best_player: false,
            initial_elo: entry.initial_elo,
            elo_delta: 0.0,
        }
    }

    #[must_use]
    pub const fn rounds_played(&self) -> u32 {
        self.rounds_on_court + self.rounds_carded
    }
}

/// Which kind of event most recently finished or interrupted a rally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rally {
    Fault,
    Score,
}

/// Everything derived about one match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    pub team_one: TeamState,
    pub team_two: TeamState,
    pub started: bool,
    pub ended: bool,
    pub someone_has_won: bool,
    pub protested: bool,
    pub resolved: bool,
    pub abandoned: bool,
    pub forfeited_by: Option<TeamSide>,
    /// Next serve, once the match has started.
    pub server: Option<Serve>,
    pub winner: Option<TeamSide>,
    pub best_player: Option<PlayerId>,
    pub notes: Option<String>,
    pub marked_for_review: bool,
    pub admin_status: AdminStatus,
    pub timeout: Option<ActiveTimeout>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Team that won the most recent point.
    pub last_scorer: Option<TeamSide>,
    pub last_rally: Option<Rally>,
    /// Stats in roster order, team one first.
    pub players: Vec<PlayerMatchStats>,
}

impl MatchState {
    /// State before any event, seeded from the rosters.
    #[must_use]
    pub fn new(record: &MatchRecord) -> Self {
        Self {
            team_one: TeamState::default(),
            team_two: TeamState::default(),
            started: false,
            ended: false,
            someone_has_won: false,
            protested: false,
            resolved: false,
            abandoned: false,
            forfeited_by: None,
            server: None,
            winner: None,
            best_player: None,
            notes: None,
            marked_for_review: false,
            admin_status: AdminStatus::WaitingForStart,
            timeout: None,
            started_at: None,
            ended_at: None,
            last_scorer: None,
            last_rally: None,
            players: record
                .entries()
                .map(|(team, entry)| PlayerMatchStats::new(team, entry))
                .collect(),
        }
    }

    #[must_use]
    pub const fn team(&self, side: TeamSide) -> &TeamState {
        match side {
            TeamSide::One => &self.team_one,
            TeamSide::Two => &self.team_two,
        }
    }

    pub const fn team_mut(&mut self, side: TeamSide) -> &mut TeamState {
        match side {
            TeamSide::One => &mut self.team_one,
            TeamSide::Two => &mut self.team_two,
        }
    }

    #[must_use]
    pub const fn score(&self, side: TeamSide) -> u32 {
        self.team(side).score
    }

    #[must_use]
    pub fn high_score(&self) -> u32 {
        self.team_one.score.max(self.team_two.score)
    }

    #[must_use]
    pub fn player(&self, player: PlayerId) -> Option<&PlayerMatchStats> {
        self.players.iter().find(|p| p.player == player)
    }

    pub fn player_mut(&mut self, player: PlayerId) -> Option<&mut PlayerMatchStats> {
        self.players.iter_mut().find(|p| p.player == player)
    }

    pub fn team_players(&self, side: TeamSide) -> impl Iterator<Item = &PlayerMatchStats> {
        self.players.iter().filter(move |p| p.team == side)
    }

    /// Whether the match accepts live commands.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.started && !self.ended
    }

    /// Recompute the administrative status of an ended match.
    pub(crate) fn refresh_admin_status(&mut self, low_rating_threshold: i32) {
        if !self.ended {
            return;
        }
        let has_card = |color_count: fn(&PlayerMatchStats) -> u32| {
            self.players.iter().any(|p| color_count(p) > 0)
        };
        let unsporting = TeamSide::BOTH.into_iter().any(|side| {
            self.team(side)
                .rating
                .is_some_and(|rating| rating <= low_rating_threshold)
        });
        let status = if self.resolved {
            AdminStatus::Resolved
        } else if has_card(|p| p.red_cards) {
            AdminStatus::RedCard
        } else if self.protested {
            AdminStatus::Protested
        } else if self.marked_for_review {
            AdminStatus::MarkedForReview
        } else if has_card(|p| p.yellow_cards) {
            AdminStatus::YellowCard
        } else if unsporting {
            AdminStatus::Unsporting
        } else if self.forfeited_by.is_some() {
            AdminStatus::Forfeit
        } else {
            AdminStatus::Official
        };
        self.admin_status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{MatchId, NewMatch, Roster, TeamId, TournamentId};

    fn record() -> MatchRecord {
        let new = NewMatch::new(
            TournamentId(1),
            Roster::pair(
                TeamId(1),
                RosterEntry::new(PlayerId(1)).with_carried_card_time(2),
                PlayerId(2),
            ),
            Roster::solo(TeamId(2), PlayerId(3)),
        );
        MatchRecord::new(MatchId(1), new).unwrap()
    }

    #[test]
    fn suspension_ticks_down_to_clear() {
        let s = Suspension::from_points(2);
        assert_eq!(s.tick(), Suspension::Serving(1));
        assert_eq!(s.tick().tick(), Suspension::Clear);
        assert_eq!(Suspension::Clear.tick(), Suspension::Clear);
        assert_eq!(Suspension::SentOff.tick(), Suspension::SentOff);
    }

    #[test]
    fn send_off_is_never_extended() {
        assert_eq!(Suspension::SentOff.extend(3), Suspension::SentOff);
        assert_eq!(Suspension::Serving(2).extend(3), Suspension::Serving(5));
        assert_eq!(Suspension::SentOff.remaining(18), 18);
    }

    #[test]
    fn long_suspension_saturates_instead_of_overflowing() {
        let s = Suspension::Serving(u32::MAX - 1).extend(5);
        assert_eq!(s, Suspension::Serving(u32::MAX));
    }

    #[test]
    fn new_state_seeds_carried_card_time() {
        let state = MatchState::new(&record());
        assert_eq!(state.players.len(), 3);
        let p1 = state.player(PlayerId(1)).unwrap();
        assert_eq!(p1.suspension, Suspension::Serving(2));
        assert_eq!(state.team_players(TeamSide::Two).count(), 1);
        assert_eq!(state.admin_status, AdminStatus::WaitingForStart);
    }

    #[test]
    fn admin_status_prefers_red_over_protest() {
        let mut state = MatchState::new(&record());
        state.ended = true;
        state.protested = true;
        state.refresh_admin_status(1);
        assert_eq!(state.admin_status, AdminStatus::Protested);

        state.player_mut(PlayerId(3)).unwrap().red_cards = 1;
        state.refresh_admin_status(1);
        assert_eq!(state.admin_status, AdminStatus::RedCard);

        state.resolved = true;
        state.refresh_admin_status(1);
        assert_eq!(state.admin_status, AdminStatus::Resolved);
    }

    #[test]
    fn low_rating_marks_unsporting_below_yellow() {
        let mut state = MatchState::new(&record());
        state.ended = true;
        state.forfeited_by = Some(TeamSide::Two);
        state.refresh_admin_status(1);
        assert_eq!(state.admin_status, AdminStatus::Forfeit);

        state.team_two.rating = Some(1);
        state.refresh_admin_status(1);
        assert_eq!(state.admin_status, AdminStatus::Unsporting);

        state.player_mut(PlayerId(2)).unwrap().yellow_cards = 1;
        state.refresh_admin_status(1);
        assert_eq!(state.admin_status, AdminStatus::YellowCard);
    }
}
