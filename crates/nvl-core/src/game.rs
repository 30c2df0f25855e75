//! Game entity, identity key, canonical ordering and season derivation.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel for placeholder or unrecognized source values.
pub const UNKNOWN: &str = "unknown";

/// A best-of-five match has at most five sets; point lines always carry five slots.
pub const SET_SLOTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {field} value {value:?}")]
pub struct ParseFieldError {
    pub field: &'static str,
    pub value: String,
}

impl ParseFieldError {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Division {
    #[serde(rename = "superleague")]
    Superleague,
    #[serde(rename = "division_1")]
    Division1,
    #[serde(rename = "division_2")]
    Division2,
    #[serde(rename = "division_3")]
    Division3,
    #[serde(rename = "cup")]
    Cup,
    #[serde(rename = "shield")]
    Shield,
    #[serde(rename = "playoffs")]
    Playoffs,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Division {
    pub const ALL: [Division; 8] = [
        Division::Superleague,
        Division::Division1,
        Division::Division2,
        Division::Division3,
        Division::Cup,
        Division::Shield,
        Division::Playoffs,
        Division::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Division::Superleague => "superleague",
            Division::Division1 => "division_1",
            Division::Division2 => "division_2",
            Division::Division3 => "division_3",
            Division::Cup => "cup",
            Division::Shield => "shield",
            Division::Playoffs => "playoffs",
            Division::Unknown => UNKNOWN,
        }
    }

    pub fn is_known(self) -> bool {
        self != Division::Unknown
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Division {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Division::ALL
            .into_iter()
            .find(|d| d.as_str() == s.trim())
            .ok_or_else(|| ParseFieldError::new("division", s))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Men,
    Women,
    #[default]
    Unknown,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Men => "men",
            Category::Women => "women",
            Category::Unknown => UNKNOWN,
        }
    }

    pub fn is_known(self) -> bool {
        self != Category::Unknown
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "men" => Ok(Category::Men),
            "women" => Ok(Category::Women),
            UNKNOWN => Ok(Category::Unknown),
            other => Err(ParseFieldError::new("category", other)),
        }
    }
}

/// One slot of a point line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetScore {
    Played(u16),
    #[default]
    NotPlayed,
}

impl SetScore {
    pub fn points(self) -> Option<u16> {
        match self {
            SetScore::Played(points) => Some(points),
            SetScore::NotPlayed => None,
        }
    }
}

impl fmt::Display for SetScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetScore::Played(points) => write!(f, "{points}"),
            SetScore::NotPlayed => f.write_str("-"),
        }
    }
}

impl FromStr for SetScore {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "-" => Ok(SetScore::NotPlayed),
            digits => digits
                .parse()
                .map(SetScore::Played)
                .map_err(|_| ParseFieldError::new("set score", digits)),
        }
    }
}

/// Per-set points for one side. Always exactly [`SET_SLOTS`] slots, built fresh by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SetPoints([SetScore; SET_SLOTS]);

impl SetPoints {
    pub fn not_played() -> Self {
        Self::default()
    }

    /// Fills slots in order, padding with [`SetScore::NotPlayed`] and dropping anything past the fifth set.
    pub fn from_scores(scores: impl IntoIterator<Item = u16>) -> Self {
        let mut slots = [SetScore::NotPlayed; SET_SLOTS];
        for (slot, points) in slots.iter_mut().zip(scores) {
            *slot = SetScore::Played(points);
        }
        Self(slots)
    }

    pub fn slots(&self) -> &[SetScore; SET_SLOTS] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|slot| *slot == SetScore::NotPlayed)
    }
}

impl fmt::Display for SetPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{slot}")?;
        }
        Ok(())
    }
}

impl FromStr for SetPoints {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = s.split_whitespace().collect::<Vec<_>>();
        if tokens.len() > SET_SLOTS {
            return Err(ParseFieldError::new("set points", s));
        }
        let mut slots = [SetScore::NotPlayed; SET_SLOTS];
        for (slot, token) in slots.iter_mut().zip(tokens) {
            *slot = token.parse()?;
        }
        Ok(Self(slots))
    }
}

/// Set counts and point lines, always replaced as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatchResult {
    pub home_sets: u8,
    pub away_sets: u8,
    pub home_points: SetPoints,
    pub away_points: SetPoints,
}

impl MatchResult {
    /// Splits a score token line: `[home_sets, away_sets, h1, a1, h2, a2, ...]`.
    ///
    /// An unpaired trailing token is ignored; point pairs beyond the fifth set are dropped.
    pub fn from_tokens(tokens: &[u32]) -> Self {
        let sets = |idx: usize| {
            tokens
                .get(idx)
                .map(|v| u8::try_from(*v).unwrap_or(u8::MAX))
                .unwrap_or(0)
        };
        let points = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
        let pairs = tokens.get(2..).unwrap_or_default().chunks_exact(2);
        Self {
            home_sets: sets(0),
            away_sets: sets(1),
            home_points: SetPoints::from_scores(pairs.clone().map(|pair| points(pair[0]))),
            away_points: SetPoints::from_scores(pairs.map(|pair| points(pair[1]))),
        }
    }

    pub fn has_data(&self) -> bool {
        self.home_sets != 0
            || self.away_sets != 0
            || !self.home_points.is_empty()
            || !self.away_points.is_empty()
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} ({} / {})",
            self.home_sets, self.away_sets, self.home_points, self.away_points
        )
    }
}

/// What makes two scraped snapshots "the same match".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub division: Division,
    pub date: NaiveDate,
    pub home: String,
    pub away: String,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} v {}", self.division, self.date, self.home, self.away)
    }
}

/// One scheduled or played match.
///
/// `PartialEq` is strict field equality; "same match" is [`Game::identity_key`] equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub division: Division,
    pub category: Category,
    pub home: String,
    pub away: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub number: String,
    pub result: MatchResult,
    pub venue: String,
    pub r1: String,
    pub r2: String,
}

impl Game {
    pub fn new(home: impl Into<String>, away: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            division: Division::Unknown,
            category: Category::Unknown,
            home: home.into(),
            away: away.into(),
            date,
            time: None,
            number: String::new(),
            result: MatchResult::default(),
            venue: String::new(),
            r1: String::new(),
            r2: String::new(),
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            division: self.division,
            date: self.date,
            home: self.home.clone(),
            away: self.away.clone(),
        }
    }

    /// Sort key. An unknown kick-off time sorts as midnight.
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time.unwrap_or(NaiveTime::MIN))
    }

    pub fn season(&self) -> String {
        season_for(self.date)
    }

    pub fn kickoff(&self) -> String {
        self.time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default()
    }

    pub fn has_result(&self) -> bool {
        self.result.has_data()
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {:5} | {:8} | {} vs {} | {} {} | {} | {} | {}",
            self.date,
            self.kickoff(),
            self.number,
            self.home,
            self.away,
            self.division,
            self.category,
            self.venue,
            self.r1,
            self.r2
        )
    }
}

/// League year running 1 August to 31 July, e.g. `"2024-2025"`.
pub fn season_for(date: NaiveDate) -> String {
    let start = if date.month() >= 8 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{}", start, start + 1)
}

/// Stable ascending sort by scheduled timestamp; ties keep their input order.
pub fn sort_games(games: &mut [Game]) {
    games.sort_by_key(Game::scheduled_at);
}

pub fn games_in_season<'a>(games: &'a [Game], season: &'a str) -> impl Iterator<Item = &'a Game> {
    games.iter().filter(move |g| g.season() == season)
}
