//! Identifiers, team rosters, and the non-derived match record.
//!
//! A [`MatchRecord`] is what the fixture side of the system hands to the core:
//! the two rosters, the ruleset and some scheduling details. It is the only
//! match data that is *not* derived from the event log.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ruleset::Ruleset;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of a match (the event stream key).
    MatchId
);
id_type!(
    /// Identifier of a team.
    TeamId
);
id_type!(
    /// Identifier of a person playing in a match.
    PlayerId
);
id_type!(
    /// Identifier of a tournament.
    TournamentId
);
id_type!(
    /// Identifier of an official.
    OfficialId
);

/// Which of the two teams in a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeamSide {
    One,
    Two,
}

impl TeamSide {
    /// The other team.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }

    pub(crate) const BOTH: [Self; 2] = [Self::One, Self::Two];
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => f.write_str("team one"),
            Self::Two => f.write_str("team two"),
        }
    }
}

/// A rostered player together with what they bring into the match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub player: PlayerId,
    /// Card time still owed from an earlier match in the same tournament.
    #[serde(default)]
    pub carried_card_time: u32,
    /// Rating going into the match.
    #[serde(default = "default_elo")]
    pub initial_elo: f64,
}

const fn default_elo() -> f64 {
    crate::elo::INITIAL_ELO
}

impl RosterEntry {
    #[must_use]
    pub const fn new(player: PlayerId) -> Self {
        Self {
            player,
            carried_card_time: 0,
            initial_elo: crate::elo::INITIAL_ELO,
        }
    }

    #[must_use]
    pub const fn with_carried_card_time(mut self, points: u32) -> Self {
        self.carried_card_time = points;
        self
    }

    #[must_use]
    pub const fn with_elo(mut self, elo: f64) -> Self {
        self.initial_elo = elo;
        self
    }
}

impl From<PlayerId> for RosterEntry {
    fn from(player: PlayerId) -> Self {
        Self::new(player)
    }
}

/// Up to three players: captain, non-captain and substitute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    pub team: TeamId,
    pub captain: RosterEntry,
    #[serde(default)]
    pub non_captain: Option<RosterEntry>,
    #[serde(default)]
    pub substitute: Option<RosterEntry>,
}

impl Roster {
    /// A team of one.
    #[must_use]
    pub fn solo(team: TeamId, captain: impl Into<RosterEntry>) -> Self {
        Self {
            team,
            captain: captain.into(),
            non_captain: None,
            substitute: None,
        }
    }

    /// A team of two.
    #[must_use]
    pub fn pair(
        team: TeamId,
        captain: impl Into<RosterEntry>,
        non_captain: impl Into<RosterEntry>,
    ) -> Self {
        Self {
            team,
            captain: captain.into(),
            non_captain: Some(non_captain.into()),
            substitute: None,
        }
    }

    #[must_use]
    pub fn with_substitute(mut self, substitute: impl Into<RosterEntry>) -> Self {
        self.substitute = Some(substitute.into());
        self
    }

    /// Entries in roster order (captain, non-captain, substitute).
    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        std::iter::once(&self.captain)
            .chain(self.non_captain.as_ref())
            .chain(self.substitute.as_ref())
    }

    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.entries().map(|entry| entry.player)
    }

    #[must_use]
    pub fn contains(&self, player: PlayerId) -> bool {
        self.players().any(|p| p == player)
    }

    /// Named players, counting the captain. Never zero.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.entries().count()
    }
}

/// Everything a caller supplies to create a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewMatch {
    pub tournament: TournamentId,
    pub team_one: Roster,
    pub team_two: Roster,
    #[serde(default)]
    pub official: Option<OfficialId>,
    #[serde(default)]
    pub court: u32,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub ruleset: Ruleset,
}

impl NewMatch {
    #[must_use]
    pub fn new(tournament: TournamentId, team_one: Roster, team_two: Roster) -> Self {
        Self {
            tournament,
            team_one,
            team_two,
            official: None,
            court: 0,
            round: 0,
            is_final: false,
            ruleset: Ruleset::default(),
        }
    }

    #[must_use]
    pub fn with_ruleset(mut self, ruleset: Ruleset) -> Self {
        self.ruleset = ruleset;
        self
    }

    #[must_use]
    pub const fn final_match(mut self) -> Self {
        self.is_final = true;
        self
    }
}

/// Reasons a roster pairing is rejected at creation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("{0} appears more than once across the two rosters")]
    DuplicatePlayer(PlayerId),
    #[error("a team cannot play itself (team {0})")]
    SameTeam(TeamId),
}

/// The persisted, non-derived description of a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub tournament: TournamentId,
    pub team_one: Roster,
    pub team_two: Roster,
    pub official: Option<OfficialId>,
    pub court: u32,
    pub round: u32,
    pub is_final: bool,
    /// Whether the result counts towards player ratings.
    pub ranked: bool,
    pub ruleset: Ruleset,
}

impl MatchRecord {
    /// Validate the rosters and build the record.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError`] if both sides are the same team or a player is
    /// listed twice.
    pub fn new(id: MatchId, new: NewMatch) -> Result<Self, RosterError> {
        if new.team_one.team == new.team_two.team {
            return Err(RosterError::SameTeam(new.team_one.team));
        }
        let mut seen = Vec::with_capacity(6);
        for player in new.team_one.players().chain(new.team_two.players()) {
            if seen.contains(&player) {
                return Err(RosterError::DuplicatePlayer(player));
            }
            seen.push(player);
        }
        let ranked = new.ruleset.ranked;
        Ok(Self {
            id,
            tournament: new.tournament,
            team_one: new.team_one,
            team_two: new.team_two,
            official: new.official,
            court: new.court,
            round: new.round,
            is_final: new.is_final,
            ranked,
            ruleset: new.ruleset,
        })
    }

    #[must_use]
    pub const fn roster(&self, side: TeamSide) -> &Roster {
        match side {
            TeamSide::One => &self.team_one,
            TeamSide::Two => &self.team_two,
        }
    }

    /// Which side a player is rostered on, if any.
    #[must_use]
    pub fn side_of(&self, player: PlayerId) -> Option<TeamSide> {
        TeamSide::BOTH
            .into_iter()
            .find(|side| self.roster(*side).contains(player))
    }

    pub fn entries(&self) -> impl Iterator<Item = (TeamSide, &RosterEntry)> {
        self.team_one
            .entries()
            .map(|e| (TeamSide::One, e))
            .chain(self.team_two.entries().map(|e| (TeamSide::Two, e)))
    }
}
