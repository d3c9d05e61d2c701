//! Court positions and serve linkage.
//!
//! Every recorded event carries a [`Court`] snapshot and a [`ServeContext`],
//! copied forward from its predecessor unless the event itself moves players
//! or the serve. Reading the latest event is therefore enough to know who is
//! where and who serves next.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::roster::{PlayerId, TeamSide};

/// Half of the court a player stands on or a serve is taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CourtSide {
    Left,
    Right,
}

impl CourtSide {
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Where a player currently is, from the scoresheet's point of view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Left,
    Right,
    #[default]
    Substitute,
}

impl From<CourtSide> for Position {
    fn from(side: CourtSide) -> Self {
        match side {
            CourtSide::Left => Self::Left,
            CourtSide::Right => Self::Right,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Substitute => "Substitute",
        })
    }
}

/// The two players one team has on court. A solo team occupies both slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub left: PlayerId,
    pub right: PlayerId,
}

impl Pair {
    #[must_use]
    pub const fn new(left: PlayerId, right: PlayerId) -> Self {
        Self { left, right }
    }

    #[must_use]
    pub const fn get(&self, side: CourtSide) -> PlayerId {
        match side {
            CourtSide::Left => self.left,
            CourtSide::Right => self.right,
        }
    }

    pub fn set(&mut self, side: CourtSide, player: PlayerId) {
        match side {
            CourtSide::Left => self.left = player,
            CourtSide::Right => self.right = player,
        }
    }

    #[must_use]
    pub const fn swapped(self) -> Self {
        Self {
            left: self.right,
            right: self.left,
        }
    }

    /// Distinct players in left-to-right order.
    #[must_use]
    pub fn players(&self) -> Vec<PlayerId> {
        if self.left == self.right {
            vec![self.left]
        } else {
            vec![self.left, self.right]
        }
    }

    /// The slot a player occupies, preferring left for a solo team.
    #[must_use]
    pub fn side_of(&self, player: PlayerId) -> Option<CourtSide> {
        if self.left == player {
            Some(CourtSide::Left)
        } else if self.right == player {
            Some(CourtSide::Right)
        } else {
            None
        }
    }
}

/// Occupants of the four court slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub team_one: Pair,
    pub team_two: Pair,
}

impl Court {
    #[must_use]
    pub const fn pair(&self, team: TeamSide) -> &Pair {
        match team {
            TeamSide::One => &self.team_one,
            TeamSide::Two => &self.team_two,
        }
    }

    pub const fn pair_mut(&mut self, team: TeamSide) -> &mut Pair {
        match team {
            TeamSide::One => &mut self.team_one,
            TeamSide::Two => &mut self.team_two,
        }
    }

    /// Position label for a player according to this snapshot.
    #[must_use]
    pub fn position_of(&self, player: PlayerId) -> Position {
        self.team_one
            .side_of(player)
            .or_else(|| self.team_two.side_of(player))
            .map_or(Position::Substitute, Position::from)
    }

    #[must_use]
    pub fn is_on_court(&self, player: PlayerId) -> bool {
        self.position_of(player) != Position::Substitute
    }

    /// Every distinct player on court, team one first, left to right.
    #[must_use]
    pub fn players(&self) -> Vec<PlayerId> {
        let mut players = self.team_one.players();
        players.extend(self.team_two.players());
        players
    }
}

/// One serve: who took it and from which side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Serve {
    pub team: TeamSide,
    pub player: PlayerId,
    pub side: CourtSide,
}

/// Serve linkage recorded on every event.
///
/// `served` is the serve in play when the event happened (the previous
/// event's `to_serve`); `to_serve` is the assignment for the next rally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeContext {
    pub served: Serve,
    pub to_serve: Serve,
}

impl ServeContext {
    /// Context for the first event of a match.
    #[must_use]
    pub const fn opening(serve: Serve) -> Self {
        Self {
            served: serve,
            to_serve: serve,
        }
    }

    /// Context inherited by the event after this one.
    #[must_use]
    pub const fn carried(&self) -> Self {
        Self {
            served: self.to_serve,
            to_serve: self.to_serve,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn court() -> Court {
        Court {
            team_one: Pair::new(PlayerId(1), PlayerId(2)),
            team_two: Pair::new(PlayerId(3), PlayerId(3)),
        }
    }

    #[test]
    fn solo_pair_lists_one_player() {
        assert_eq!(court().team_two.players(), vec![PlayerId(3)]);
        assert_eq!(court().players(), vec![PlayerId(1), PlayerId(2), PlayerId(3)]);
    }

    #[test]
    fn position_of_unknown_player_is_substitute() {
        let court = court();
        assert_eq!(court.position_of(PlayerId(2)), Position::Right);
        assert_eq!(court.position_of(PlayerId(3)), Position::Left);
        assert_eq!(court.position_of(PlayerId(9)), Position::Substitute);
    }

    #[test]
    fn carried_context_moves_to_serve_into_served() {
        let first = Serve {
            team: TeamSide::One,
            player: PlayerId(1),
            side: CourtSide::Left,
        };
        let next = Serve {
            team: TeamSide::Two,
            player: PlayerId(3),
            side: CourtSide::Left,
        };
        let ctx = ServeContext {
            served: first,
            to_serve: next,
        };
        assert_eq!(ctx.carried(), ServeContext::opening(next));
    }
}
