//! Core domain model for NVL: games, identity, validation, normalization and merging.

pub mod game;
pub mod merge;
pub mod normalize;
pub mod observe;
pub mod validate;

pub use game::{
    games_in_season, season_for, sort_games, Category, Division, Game, IdentityKey, MatchResult,
    ParseFieldError, SetPoints, SetScore, SET_SLOTS, UNKNOWN,
};
pub use merge::merge;
pub use normalize::{
    category_from_label, clean_match_number, clean_official, clean_venue, competition_label,
    division_from_label, is_division_label, is_placeholder, parse_date, parse_kickoff,
    placeholder_or_value, DateFormat, DateParseError, COMPETITIONS, DIVISION_KEYWORDS,
    PLACEHOLDER_TOKENS,
};
pub use observe::{EventKind, EventLog, IngestEvent, IngestObserver, LabelField, TracingObserver};
pub use validate::{check_result, is_valid_result, InvalidResult};

pub const CRATE_NAME: &str = "nvl-core";
