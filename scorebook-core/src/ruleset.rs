//! Per-tournament match rules.
//!
//! The ruleset travels with each [`MatchRecord`](crate::roster::MatchRecord)
//! and is passed to the projector and the command handlers; nothing reads it
//! from process-wide state.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Scoring and serving rules for a match.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use scorebook_core::ruleset::Ruleset;
///
/// let rules = Ruleset::from_json(r#"{ "badminton_serves": true }"#).unwrap();
/// assert!(rules.badminton_serves);
/// assert_eq!(rules.score_to_win, 11);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ruleset {
    /// Score a team needs, with a two point lead, to win.
    pub score_to_win: u32,
    /// Score that wins regardless of the lead.
    pub score_to_force_win: u32,
    /// Serving team swaps left/right occupants on each point won on serve.
    pub badminton_serves: bool,
    /// Below this high score, an ended match is decided by the recorded coin
    /// toss.
    pub min_decisive_score: u32,
    /// How long a called timeout lasts.
    pub timeout_secs: u32,
    /// Whether results feed player ratings.
    pub ranked: bool,
    /// A post-match team rating at or below this marks unsporting conduct.
    pub low_rating_threshold: i32,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            score_to_win: 11,
            score_to_force_win: 18,
            badminton_serves: false,
            min_decisive_score: 5,
            timeout_secs: 30,
            ranked: true,
            low_rating_threshold: 1,
        }
    }
}

impl Ruleset {
    /// Parse a ruleset from JSON, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub const fn with_badminton_serves(mut self) -> Self {
        self.badminton_serves = true;
        self
    }

    #[must_use]
    pub const fn unranked(mut self) -> Self {
        self.ranked = false;
        self
    }

    #[must_use]
    pub const fn with_scores(mut self, score_to_win: u32, score_to_force_win: u32) -> Self {
        self.score_to_win = score_to_win;
        self.score_to_force_win = score_to_force_win;
        self
    }

    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.timeout_secs))
    }

    /// Whether a scoreline decides the match.
    #[must_use]
    pub const fn is_decided(&self, a: u32, b: u32) -> bool {
        let high = if a > b { a } else { b };
        high >= self.score_to_win && (a.abs_diff(b) >= 2 || high >= self.score_to_force_win)
    }

    /// Highest score an opponent may be awarded over a trailing team without a
    /// rally being played.
    #[must_use]
    pub fn award_ceiling(&self, trailing: u32) -> u32 {
        (trailing + 2)
            .max(self.score_to_win)
            .min(self.score_to_force_win)
    }
}
