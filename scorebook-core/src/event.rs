//! Match events and their stored form.
//!
//! Each occurrence is a plain payload struct implementing [`DomainEvent`].
//! [`MatchEvent`] is the closed sum of all of them, and [`RecordedEvent`]
//! wraps one with the sequence number, timestamp, serve linkage, and court
//! snapshot that every entry in the log carries.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    court::{Court, ServeContext},
    roster::{MatchId, PlayerId, TeamSide},
    store::StoredEvent,
};

/// Error returned when a stored event cannot be turned back into a
/// [`RecordedEvent`].
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The event kind was not recognized.
    #[error("unknown event kind `{kind}`, expected one of {expected:?}")]
    UnknownKind {
        kind: String,
        expected: &'static [&'static str],
    },
    /// The payload or envelope did not match the kind's shape.
    #[error("malformed `{kind}` event: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A name that does not match any known score method or card colour.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown {what} `{name}`")]
pub struct UnknownName {
    pub what: &'static str,
    pub name: String,
}

/// Marker trait for event payloads with a fixed kind string.
///
/// The kind is what the store keeps next to the payload so the log can be
/// decoded back into the right variant.
pub trait DomainEvent {
    const KIND: &'static str;
}

/// Instance access to an event's kind string.
pub trait EventKind {
    fn kind(&self) -> &'static str;
}

impl<T: DomainEvent> EventKind for T {
    fn kind(&self) -> &'static str {
        T::KIND
    }
}

fn normalise(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '-' | '_' => ' ',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// How a rally was won.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreMethod {
    DoubleBounce,
    Straight,
    OutOfCourt,
    DoubleTouch,
    Grabs,
    IllegalBodyPart,
    Obstruction,
}

impl ScoreMethod {
    pub const ALL: [Self; 7] = [
        Self::DoubleBounce,
        Self::Straight,
        Self::OutOfCourt,
        Self::DoubleTouch,
        Self::Grabs,
        Self::IllegalBodyPart,
        Self::Obstruction,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DoubleBounce => "Double Bounce",
            Self::Straight => "Straight",
            Self::OutOfCourt => "Out of Court",
            Self::DoubleTouch => "Double Touch",
            Self::Grabs => "Grabs",
            Self::IllegalBodyPart => "Illegal Body Part",
            Self::Obstruction => "Obstruction",
        }
    }
}

impl fmt::Display for ScoreMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoreMethod {
    type Err = UnknownName;

    /// Accepts the display name or its kebab-case form, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalise(s);
        Self::ALL
            .into_iter()
            .find(|method| normalise(method.name()) == wanted)
            .ok_or_else(|| UnknownName {
                what: "score method",
                name: s.to_string(),
            })
    }
}

/// Note attached to a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreNote {
    /// Won in a rally, optionally with the way it was won.
    Rally(Option<ScoreMethod>),
    /// Won directly off the serve.
    Ace,
    /// Awarded for an opponent's double fault or card.
    Penalty,
}

/// Card colours, ordered by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CardColor {
    Warning,
    Green,
    Yellow,
    Red,
}

impl CardColor {
    /// The stored event kind for a card of this colour.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Green => "green-card",
            Self::Yellow => "yellow-card",
            Self::Red => "red-card",
        }
    }

    fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "warning" => Some(Self::Warning),
            "green-card" => Some(Self::Green),
            "yellow-card" => Some(Self::Yellow),
            "red-card" => Some(Self::Red),
            _ => None,
        }
    }
}

impl fmt::Display for CardColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "Warning",
            Self::Green => "Green Card",
            Self::Yellow => "Yellow Card",
            Self::Red => "Red Card",
        })
    }
}

impl FromStr for CardColor {
    type Err = UnknownName;

    /// Accepts `Warning`, `Green`, `Green Card`, `green-card` and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalise(s);
        let colour = wanted.strip_suffix(" card").unwrap_or(&wanted);
        match colour {
            "warning" => Ok(Self::Warning),
            "green" => Ok(Self::Green),
            "yellow" => Ok(Self::Yellow),
            "red" => Ok(Self::Red),
            _ => Err(UnknownName {
                what: "card colour",
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStarted {
    /// Team two served first.
    pub swap_service: bool,
}

impl DomainEvent for MatchStarted {
    const KIND: &'static str = "start";
}

/// A point for `team`. `player` is `None` for penalty and administrative
/// points, which carry no player statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointScored {
    pub team: TeamSide,
    pub player: Option<PlayerId>,
    pub note: ScoreNote,
}

impl PointScored {
    #[must_use]
    pub const fn penalty(team: TeamSide) -> Self {
        Self {
            team,
            player: None,
            note: ScoreNote::Penalty,
        }
    }

    #[must_use]
    pub const fn is_penalty(&self) -> bool {
        matches!(self.note, ScoreNote::Penalty)
    }
}

impl DomainEvent for PointScored {
    const KIND: &'static str = "score";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCalled {
    pub team: TeamSide,
    pub player: PlayerId,
}

impl DomainEvent for FaultCalled {
    const KIND: &'static str = "fault";
}

/// `team` is `None` for an official's timeout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutCalled {
    pub team: Option<TeamSide>,
}

impl DomainEvent for TimeoutCalled {
    const KIND: &'static str = "timeout";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutEnded {}

impl DomainEvent for TimeoutEnded {
    const KIND: &'static str = "end-timeout";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamForfeited {
    pub team: TeamSide,
}

impl DomainEvent for TeamForfeited {
    const KIND: &'static str = "forfeit";
}

/// A card of any colour. The stored kind is taken from [`CardColor::kind`].
///
/// `duration` is in points: positive for a timed suspension, zero for none,
/// negative for a send-off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardIssued {
    pub team: TeamSide,
    pub player: PlayerId,
    pub color: CardColor,
    pub duration: i32,
    pub reason: String,
}

impl EventKind for CardIssued {
    fn kind(&self) -> &'static str {
        self.color.kind()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSubstituted {
    pub team: TeamSide,
    pub outgoing: PlayerId,
    pub incoming: PlayerId,
}

impl DomainEvent for PlayerSubstituted {
    const KIND: &'static str = "substitute";
}

/// Post-match rating and notes for one team.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesRecorded {
    pub team: TeamSide,
    pub rating: i32,
    pub notes: String,
}

impl DomainEvent for NotesRecorded {
    const KIND: &'static str = "notes";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtestLodged {
    pub team: TeamSide,
    pub reason: String,
}

impl DomainEvent for ProtestLodged {
    const KIND: &'static str = "protest";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtestResolved {
    pub notes: Option<String>,
}

impl DomainEvent for ProtestResolved {
    const KIND: &'static str = "resolve";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotesCast {
    pub team: TeamSide,
    pub player: PlayerId,
    pub votes: u32,
}

impl DomainEvent for VotesCast {
    const KIND: &'static str = "votes";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeritAwarded {
    pub team: TeamSide,
    pub player: PlayerId,
    pub reason: Option<String>,
}

impl DomainEvent for MeritAwarded {
    const KIND: &'static str = "merit";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchAbandoned {
    pub reason: Option<String>,
}

impl DomainEvent for MatchAbandoned {
    const KIND: &'static str = "abandon";
}

/// Closes the match. `coin_toss` is drawn when the match ends below the
/// minimum decisive score, so replay never needs randomness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEnded {
    pub best_player: Option<PlayerId>,
    pub notes: String,
    pub marked_for_review: bool,
    pub coin_toss: Option<TeamSide>,
}

impl DomainEvent for MatchEnded {
    const KIND: &'static str = "end-game";
}

/// Every kind of event a match log may hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchEvent {
    Start(MatchStarted),
    Score(PointScored),
    Fault(FaultCalled),
    Timeout(TimeoutCalled),
    EndTimeout(TimeoutEnded),
    Forfeit(TeamForfeited),
    Card(CardIssued),
    Substitute(PlayerSubstituted),
    Notes(NotesRecorded),
    Protest(ProtestLodged),
    Resolve(ProtestResolved),
    Votes(VotesCast),
    Merit(MeritAwarded),
    Abandon(MatchAbandoned),
    EndGame(MatchEnded),
}

impl MatchEvent {
    /// Every kind string this enum decodes.
    pub const EVENT_KINDS: &'static [&'static str] = &[
        MatchStarted::KIND,
        PointScored::KIND,
        FaultCalled::KIND,
        TimeoutCalled::KIND,
        TimeoutEnded::KIND,
        TeamForfeited::KIND,
        "warning",
        "green-card",
        "yellow-card",
        "red-card",
        PlayerSubstituted::KIND,
        NotesRecorded::KIND,
        ProtestLodged::KIND,
        ProtestResolved::KIND,
        VotesCast::KIND,
        MeritAwarded::KIND,
        MatchAbandoned::KIND,
        MatchEnded::KIND,
    ];

    /// Kinds that undo steps over.
    pub const IGNORED_BY_UNDO: &'static [&'static str] = &[
        NotesRecorded::KIND,
        TimeoutEnded::KIND,
        VotesCast::KIND,
        ProtestLodged::KIND,
        ProtestResolved::KIND,
    ];

    /// Whether undo may remove this event.
    #[must_use]
    pub fn is_undoable(&self) -> bool {
        if let Self::Score(score) = self {
            return !score.is_penalty();
        }
        !Self::IGNORED_BY_UNDO.contains(&self.kind())
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Start(e) => serde_json::to_value(e),
            Self::Score(e) => serde_json::to_value(e),
            Self::Fault(e) => serde_json::to_value(e),
            Self::Timeout(e) => serde_json::to_value(e),
            Self::EndTimeout(e) => serde_json::to_value(e),
            Self::Forfeit(e) => serde_json::to_value(e),
            Self::Card(e) => serde_json::to_value(e),
            Self::Substitute(e) => serde_json::to_value(e),
            Self::Notes(e) => serde_json::to_value(e),
            Self::Protest(e) => serde_json::to_value(e),
            Self::Resolve(e) => serde_json::to_value(e),
            Self::Votes(e) => serde_json::to_value(e),
            Self::Merit(e) => serde_json::to_value(e),
            Self::Abandon(e) => serde_json::to_value(e),
            Self::EndGame(e) => serde_json::to_value(e),
        }
    }

    /// Decode a payload stored under `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError::UnknownKind`] for unrecognised kinds and
    /// [`EventDecodeError::Payload`] when the payload has the wrong shape.
    pub fn from_payload(kind: &str, payload: serde_json::Value) -> Result<Self, EventDecodeError> {
        fn decode<T: DeserializeOwned>(
            kind: &str,
            payload: serde_json::Value,
        ) -> Result<T, EventDecodeError> {
            serde_json::from_value(payload).map_err(|source| EventDecodeError::Payload {
                kind: kind.to_string(),
                source,
            })
        }

        if let Some(color) = CardColor::from_kind(kind) {
            let mut card: CardIssued = decode(kind, payload)?;
            card.color = color;
            return Ok(Self::Card(card));
        }

        Ok(match kind {
            MatchStarted::KIND => Self::Start(decode(kind, payload)?),
            PointScored::KIND => Self::Score(decode(kind, payload)?),
            FaultCalled::KIND => Self::Fault(decode(kind, payload)?),
            TimeoutCalled::KIND => Self::Timeout(decode(kind, payload)?),
            TimeoutEnded::KIND => Self::EndTimeout(decode(kind, payload)?),
            TeamForfeited::KIND => Self::Forfeit(decode(kind, payload)?),
            PlayerSubstituted::KIND => Self::Substitute(decode(kind, payload)?),
            NotesRecorded::KIND => Self::Notes(decode(kind, payload)?),
            ProtestLodged::KIND => Self::Protest(decode(kind, payload)?),
            ProtestResolved::KIND => Self::Resolve(decode(kind, payload)?),
            VotesCast::KIND => Self::Votes(decode(kind, payload)?),
            MeritAwarded::KIND => Self::Merit(decode(kind, payload)?),
            MatchAbandoned::KIND => Self::Abandon(decode(kind, payload)?),
            MatchEnded::KIND => Self::EndGame(decode(kind, payload)?),
            other => {
                return Err(EventDecodeError::UnknownKind {
                    kind: other.to_string(),
                    expected: Self::EVENT_KINDS,
                });
            }
        })
    }
}

impl EventKind for MatchEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Start(e) => e.kind(),
            Self::Score(e) => e.kind(),
            Self::Fault(e) => e.kind(),
            Self::Timeout(e) => e.kind(),
            Self::EndTimeout(e) => e.kind(),
            Self::Forfeit(e) => e.kind(),
            Self::Card(e) => e.kind(),
            Self::Substitute(e) => e.kind(),
            Self::Notes(e) => e.kind(),
            Self::Protest(e) => e.kind(),
            Self::Resolve(e) => e.kind(),
            Self::Votes(e) => e.kind(),
            Self::Merit(e) => e.kind(),
            Self::Abandon(e) => e.kind(),
            Self::EndGame(e) => e.kind(),
        }
    }
}

macro_rules! impl_from_payload {
    ($($variant:ident($payload:ty)),* $(,)?) => {
        $(
            impl From<$payload> for MatchEvent {
                fn from(event: $payload) -> Self {
                    Self::$variant(event)
                }
            }
        )*
    };
}

impl_from_payload!(
    Start(MatchStarted),
    Score(PointScored),
    Fault(FaultCalled),
    Timeout(TimeoutCalled),
    EndTimeout(TimeoutEnded),
    Forfeit(TeamForfeited),
    Card(CardIssued),
    Substitute(PlayerSubstituted),
    Notes(NotesRecorded),
    Protest(ProtestLodged),
    Resolve(ProtestResolved),
    Votes(VotesCast),
    Merit(MeritAwarded),
    Abandon(MatchAbandoned),
    EndGame(MatchEnded),
);

/// One entry of a match log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Position in the match stream, starting at 0.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub serve: ServeContext,
    pub court: Court,
    pub event: MatchEvent,
}

/// JSON shape of [`StoredEvent::data`].
#[derive(Serialize, Deserialize)]
struct Envelope {
    recorded_at: DateTime<Utc>,
    serve: ServeContext,
    court: Court,
    payload: serde_json::Value,
}

impl RecordedEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }

    /// Serialise into the store's representation.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if a payload fails to serialise.
    pub fn to_stored(&self, match_id: MatchId) -> Result<StoredEvent, serde_json::Error> {
        let envelope = Envelope {
            recorded_at: self.recorded_at,
            serve: self.serve,
            court: self.court,
            payload: self.event.to_payload()?,
        };
        Ok(StoredEvent {
            match_id,
            kind: self.kind().to_string(),
            sequence: self.sequence,
            data: serde_json::to_value(envelope)?,
        })
    }

    /// Rebuild an entry from the store's representation.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError`] for unknown kinds or malformed data.
    pub fn from_stored(stored: &StoredEvent) -> Result<Self, EventDecodeError> {
        let envelope: Envelope =
            serde_json::from_value(stored.data.clone()).map_err(|source| {
                EventDecodeError::Payload {
                    kind: stored.kind.clone(),
                    source,
                }
            })?;
        let event = MatchEvent::from_payload(&stored.kind, envelope.payload)?;
        Ok(Self {
            sequence: stored.sequence,
            recorded_at: envelope.recorded_at,
            serve: envelope.serve,
            court: envelope.court,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::court::{CourtSide, Pair, Serve};

    fn recorded(event: MatchEvent) -> RecordedEvent {
        let serve = Serve {
            team: TeamSide::One,
            player: PlayerId(1),
            side: CourtSide::Left,
        };
        RecordedEvent {
            sequence: 3,
            recorded_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            serve: ServeContext::opening(serve),
            court: Court {
                team_one: Pair::new(PlayerId(1), PlayerId(2)),
                team_two: Pair::new(PlayerId(3), PlayerId(4)),
            },
            event,
        }
    }

    #[test]
    fn score_method_parses_display_and_kebab_names() {
        assert_eq!(
            "Out of Court".parse::<ScoreMethod>(),
            Ok(ScoreMethod::OutOfCourt)
        );
        assert_eq!(
            "illegal-body-part".parse::<ScoreMethod>(),
            Ok(ScoreMethod::IllegalBodyPart)
        );
        let err = "Lob".parse::<ScoreMethod>().unwrap_err();
        assert_eq!(err.to_string(), "unknown score method `Lob`");
    }

    #[test]
    fn card_colour_accepts_suffixed_names() {
        assert_eq!("Green Card".parse::<CardColor>(), Ok(CardColor::Green));
        assert_eq!("red".parse::<CardColor>(), Ok(CardColor::Red));
        assert_eq!("warning".parse::<CardColor>(), Ok(CardColor::Warning));
        assert!("Blue Card".parse::<CardColor>().is_err());
    }

    #[test]
    fn card_kind_follows_colour() {
        let card = MatchEvent::Card(CardIssued {
            team: TeamSide::Two,
            player: PlayerId(3),
            color: CardColor::Yellow,
            duration: 6,
            reason: "dissent".into(),
        });
        assert_eq!(card.kind(), "yellow-card");
        assert!(MatchEvent::EVENT_KINDS.contains(&card.kind()));
    }

    #[test]
    fn stored_card_takes_colour_from_kind() {
        let event = recorded(MatchEvent::Card(CardIssued {
            team: TeamSide::Two,
            player: PlayerId(3),
            color: CardColor::Green,
            duration: 3,
            reason: "delay".into(),
        }));
        let mut stored = event.to_stored(MatchId(1)).unwrap();
        assert_eq!(stored.kind, "green-card");
        stored.kind = "red-card".into();
        let decoded = RecordedEvent::from_stored(&stored).unwrap();
        let MatchEvent::Card(card) = decoded.event else {
            panic!("expected a card");
        };
        assert_eq!(card.color, CardColor::Red);
    }

    #[test]
    fn stored_event_decodes_back() {
        let event = recorded(
            PointScored {
                team: TeamSide::One,
                player: Some(PlayerId(2)),
                note: ScoreNote::Rally(Some(ScoreMethod::Grabs)),
            }
            .into(),
        );
        let stored = event.to_stored(MatchId(9)).unwrap();
        assert_eq!(stored.sequence, 3);
        assert_eq!(stored.data["payload"]["note"]["rally"], "grabs");
        assert_eq!(RecordedEvent::from_stored(&stored).unwrap(), event);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut stored = recorded(MatchAbandoned { reason: None }.into())
            .to_stored(MatchId(1))
            .unwrap();
        stored.kind = "replay".into();
        let err = RecordedEvent::from_stored(&stored).unwrap_err();
        assert!(matches!(err, EventDecodeError::UnknownKind { ref kind, .. } if kind == "replay"));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let mut stored = recorded(TeamForfeited { team: TeamSide::One }.into())
            .to_stored(MatchId(1))
            .unwrap();
        stored.data["payload"] = serde_json::json!({ "team": "three" });
        assert!(matches!(
            RecordedEvent::from_stored(&stored),
            Err(EventDecodeError::Payload { .. })
        ));
    }

    #[test]
    fn undo_skips_bookkeeping_and_penalties() {
        assert!(!MatchEvent::from(PointScored::penalty(TeamSide::One)).is_undoable());
        assert!(!MatchEvent::from(TimeoutEnded {}).is_undoable());
        assert!(MatchEvent::from(TimeoutCalled { team: None }).is_undoable());
        assert!(
            MatchEvent::from(MatchEnded {
                best_player: None,
                notes: String::new(),
                marked_for_review: false,
                coin_toss: None,
            })
            .is_undoable()
        );
    }
}
