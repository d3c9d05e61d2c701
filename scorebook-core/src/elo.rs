//! Rating changes for ranked matches.

/// Rating every player starts with.
pub const INITIAL_ELO: f64 = 1500.0;

const K: f64 = 40.0;
const D: f64 = 3000.0;

/// Expected score of a side rated `mine` against one rated `opponent`.
#[must_use]
pub fn probability(mine: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(K * (opponent - mine) / D))
}

/// Rating change for a side rated `mine` after playing one rated `opponent`.
#[must_use]
pub fn delta(mine: f64, opponent: f64, won: bool) -> f64 {
    let expected = probability(mine, opponent);
    if won {
        K * (1.0 - expected)
    } else {
        -K * expected
    }
}

/// Mean of the given ratings, or [`INITIAL_ELO`] for none.
#[must_use]
pub fn average(ratings: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = ratings
        .into_iter()
        .fold((0.0, 0u32), |(sum, count), r| (sum + r, count + 1));
    if count == 0 {
        INITIAL_ELO
    } else {
        sum / f64::from(count)
    }
}
