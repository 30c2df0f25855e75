//! Result validation for best-of-five score lines.
//!
//! Token layout is `[home_sets, away_sets, h1, a1, h2, a2, ...]`. Every result runs
//! through [`check_result`] before it may enter the canonical dataset.

use thiserror::Error;

pub const SETS_TO_WIN: u32 = 3;
pub const MAX_SETS: u32 = 5;
pub const REGULAR_SET_FLOOR: u32 = 25;
pub const DECIDING_SET_FLOOR: u32 = 15;
pub const DECIDING_SET: usize = 5;
pub const MIN_MARGIN: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidResult {
    #[error("expected set counts, found {found} score tokens")]
    MissingSetCounts { found: usize },
    #[error("set count {home}-{away} exceeds five sets")]
    TooManySets { home: u32, away: u32 },
    #[error("set count {home}-{away} gives one side more than three sets")]
    SetCountAboveThree { home: u32, away: u32 },
    #[error("set count {home}-{away} has no winner")]
    NoWinner { home: u32, away: u32 },
    #[error("set {set} score {home}-{away} is below the {floor}-point floor")]
    BelowPointFloor {
        set: usize,
        home: u32,
        away: u32,
        floor: u32,
    },
    #[error("set {set} score {home}-{away} is not won by two clear points")]
    MarginTooSmall { set: usize, home: u32, away: u32 },
}

/// Checks a score token line against the volleyball rules.
///
/// Set counts are unsigned, so the non-negative rule holds by construction. A tied point
/// pair is tolerated because the source fills unplayed sets with `0 0`, and the declared set
/// count is not cross-checked against the number of point pairs.
pub fn check_result(tokens: &[u32]) -> Result<(), InvalidResult> {
    let [home, away, points @ ..] = tokens else {
        return Err(InvalidResult::MissingSetCounts {
            found: tokens.len(),
        });
    };
    let (home, away) = (*home, *away);

    if home.saturating_add(away) > MAX_SETS {
        return Err(InvalidResult::TooManySets { home, away });
    }
    if home > SETS_TO_WIN || away > SETS_TO_WIN {
        return Err(InvalidResult::SetCountAboveThree { home, away });
    }
    if home != SETS_TO_WIN && away != SETS_TO_WIN {
        return Err(InvalidResult::NoWinner { home, away });
    }

    for (idx, pair) in points.chunks_exact(2).enumerate() {
        check_set(idx + 1, pair[0], pair[1])?;
    }
    Ok(())
}

pub fn is_valid_result(tokens: &[u32]) -> bool {
    check_result(tokens).is_ok()
}

fn check_set(set: usize, home: u32, away: u32) -> Result<(), InvalidResult> {
    let floor = if set == DECIDING_SET {
        DECIDING_SET_FLOOR
    } else {
        REGULAR_SET_FLOOR
    };
    let (winner, loser) = match home.cmp(&away) {
        std::cmp::Ordering::Equal => return Ok(()),
        std::cmp::Ordering::Greater => (home, away),
        std::cmp::Ordering::Less => (away, home),
    };
    if winner < floor {
        return Err(InvalidResult::BelowPointFloor {
            set,
            home,
            away,
            floor,
        });
    }
    if winner - loser < MIN_MARGIN {
        return Err(InvalidResult::MarginTooSmall { set, home, away });
    }
    Ok(())
}
