//! Maps raw label text from match cards onto canonical values.
//!
//! The keyword rules below are order-sensitive and must keep classifying historical rows
//! exactly as before.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::game::{Category, Division, UNKNOWN};
use crate::observe::{IngestEvent, IngestObserver, LabelField};

/// Values the source emits while an assignment is pending.
pub const PLACEHOLDER_TOKENS: [&str; 6] = ["TBC", "110308", "119979", "116921", "119791", ""];

/// Any of these in a label marks it as a division/category label.
pub const DIVISION_KEYWORDS: [&str; 5] = ["Division", "Super", "Playoffs", "Cup", "Shield"];

const PENDING_QUALIFIER: &str = "(Pending)";
const LIVE_STREAM_SUFFIX: &str = " - Super League Live";

/// Competition ids used by the fixtures/results selector on the source site.
pub const COMPETITIONS: [(&str, &str); 18] = [
    ("195838", "Super League Women"),
    ("196047", "Super League Men"),
    ("196048", "Division 1 Men"),
    ("196049", "Division 1 Women"),
    ("196050", "Division 2 South Men"),
    ("196051", "Division 2 North Men"),
    ("196052", "Division 2 Central Men"),
    ("196053", "Division 2 North Women"),
    ("196054", "Division 2 West Women"),
    ("196055", "Division 2 East Women"),
    ("196056", "Division 3 North Central Men"),
    ("196057", "Division 3 South East Men"),
    ("196058", "Division 3 South West Men"),
    ("196059", "Division 3 North West Men"),
    ("196061", "Division 3 Central Women"),
    ("196062", "Division 3 North Women"),
    ("196063", "Division 3 South East Women"),
    ("196064", "Division 3 South West Women"),
];

pub fn competition_label(id: &str) -> Option<&'static str> {
    COMPETITIONS
        .iter()
        .find(|(cid, _)| *cid == id.trim())
        .map(|(_, label)| *label)
}

pub fn is_placeholder(token: &str) -> bool {
    PLACEHOLDER_TOKENS.contains(&token)
}

/// Trimmed token, or the `unknown` sentinel for missing and placeholder values.
pub fn placeholder_or_value(token: Option<&str>) -> String {
    match token.map(str::trim) {
        Some(token) if !is_placeholder(token) => token.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Value part of a `"Label: value"` text, up to the next colon.
fn label_value(text: &str) -> Option<&str> {
    text.split(':').nth(1)
}

/// `"Referee 1: Jane Doe (Pending)"` → `"Jane Doe"`.
pub fn clean_official(text: &str) -> String {
    let value = label_value(text).map(|v| v.replace(PENDING_QUALIFIER, ""));
    placeholder_or_value(value.as_deref())
}

/// `"Venue: Sports Hall, Leeds"` → `"Sports Hall Leeds"`.
pub fn clean_venue(text: &str) -> String {
    let value = label_value(text).map(|v| v.trim().replace(',', ""));
    placeholder_or_value(value.as_deref())
}

pub fn clean_match_number(text: &str) -> String {
    placeholder_or_value(Some(&text.replace(LIVE_STREAM_SUFFIX, "")))
}

pub fn is_division_label(text: &str) -> bool {
    DIVISION_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// "Women" is tested first: every women's label also contains "men".
pub fn category_from_label(text: &str, observer: &dyn IngestObserver) -> Category {
    if text.contains("Women") {
        Category::Women
    } else if text.contains("Men") {
        Category::Men
    } else {
        observer.observe(IngestEvent::UnknownLabel {
            field: LabelField::Category,
            text: text.to_string(),
        });
        Category::Unknown
    }
}

/// First matching rule wins: cup, shield, super, division 1/2/3, playoff.
pub fn division_from_label(text: &str, observer: &dyn IngestObserver) -> Division {
    const RULES: [(&str, Division); 7] = [
        ("cup", Division::Cup),
        ("shield", Division::Shield),
        ("super", Division::Superleague),
        ("division 1", Division::Division1),
        ("division 2", Division::Division2),
        ("division 3", Division::Division3),
        ("playoff", Division::Playoffs),
    ];
    let lower = text.to_lowercase();
    if let Some((_, division)) = RULES.iter().find(|(needle, _)| lower.contains(needle)) {
        return *division;
    }
    observer.observe(IngestEvent::UnknownLabel {
        field: LabelField::Division,
        text: text.to_string(),
    });
    Division::Unknown
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `"Mon 02nd September 2024"`, as published on match cards.
    LongForm,
    /// `"2024-09-02"`, as stored in the dataset.
    Iso,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {value:?} as a {format:?} date")]
pub struct DateParseError {
    pub value: String,
    pub format: DateFormat,
    #[source]
    pub source: chrono::ParseError,
}

/// Parses a date in the caller-selected format; there is no auto-detection.
pub fn parse_date(text: &str, format: DateFormat) -> Result<NaiveDate, DateParseError> {
    let parsed = match format {
        DateFormat::Iso => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d"),
        DateFormat::LongForm => NaiveDate::parse_from_str(&strip_long_form(text), "%d %B %Y"),
    };
    parsed.map_err(|source| DateParseError {
        value: text.to_string(),
        format,
        source,
    })
}

/// Drops the weekday and any ordinal suffix glued to the day number.
fn strip_long_form(text: &str) -> String {
    let mut tokens = text.split_whitespace().peekable();
    if tokens
        .peek()
        .is_some_and(|t| t.chars().all(|c| c.is_ascii_alphabetic()))
    {
        tokens.next();
    }
    tokens
        .map(|token| {
            let digits = token.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            let suffix = &token[digits.len()..];
            let is_ordinal = !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
                && ["st", "nd", "rd", "th"].contains(&suffix.to_ascii_lowercase().as_str());
            if is_ordinal {
                digits
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_kickoff(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{EventKind, EventLog};

    #[test]
    fn super_league_women_label() {
        let log = EventLog::new();
        let text = "Super League Women";
        assert_eq!(category_from_label(text, &log), Category::Women);
        assert_eq!(division_from_label(text, &log), Division::Superleague);
        assert!(log.events().is_empty());
    }

    #[test]
    fn division_rules_apply_in_order() {
        let log = EventLog::new();
        assert_eq!(division_from_label("National Cup Men", &log), Division::Cup);
        assert_eq!(
            division_from_label("Super League Playoffs Men", &log),
            Division::Superleague
        );
        assert_eq!(
            division_from_label("Division 2 North Women", &log),
            Division::Division2
        );
        assert_eq!(
            division_from_label("DIVISION 3 South West Men", &log),
            Division::Division3
        );
        assert_eq!(
            division_from_label("Division 1 Playoffs", &log),
            Division::Division1
        );
        assert_eq!(division_from_label("Playoffs", &log), Division::Playoffs);
        assert_eq!(
            division_from_label("National Shield Women", &log),
            Division::Shield
        );
    }

    #[test]
    fn unrecognized_labels_fall_back_to_unknown_and_are_reported() {
        let log = EventLog::new();
        assert_eq!(division_from_label("Beach Tour", &log), Division::Unknown);
        assert_eq!(category_from_label("Junior Cup", &log), Category::Unknown);
        assert_eq!(log.count(EventKind::UnknownLabel), 2);
    }

    #[test]
    fn men_label_is_men() {
        let log = EventLog::new();
        assert_eq!(category_from_label("Division 1 Men", &log), Category::Men);
    }

    #[test]
    fn placeholders_map_to_unknown() {
        assert_eq!(clean_official("Referee 1: TBC"), UNKNOWN);
        assert_eq!(clean_official("Referee 2: 119979 (Pending)"), UNKNOWN);
        assert_eq!(clean_official("Referee 2:"), UNKNOWN);
        assert_eq!(clean_official("Referee 2"), UNKNOWN);
        assert_eq!(placeholder_or_value(None), UNKNOWN);
    }

    #[test]
    fn officials_lose_pending_qualifier() {
        assert_eq!(clean_official("Referee 1: Jane Doe (Pending)"), "Jane Doe");
        assert_eq!(clean_official("Referee 1:  John Smith "), "John Smith");
    }

    #[test]
    fn venue_loses_commas() {
        assert_eq!(
            clean_venue("Venue: Sports Hall, Leeds, LS1 "),
            "Sports Hall Leeds LS1"
        );
        assert_eq!(clean_venue("Venue: TBC"), UNKNOWN);
    }

    #[test]
    fn match_number_drops_stream_suffix() {
        assert_eq!(clean_match_number(" SLW-014 - Super League Live"), "SLW-014");
        assert_eq!(clean_match_number("TBC"), UNKNOWN);
    }

    #[test]
    fn long_form_dates_strip_weekday_and_ordinals() {
        let expected = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        assert_eq!(
            parse_date("Mon 02nd September 2024", DateFormat::LongForm).unwrap(),
            expected
        );
        assert_eq!(
            parse_date("Sat 31st August 2024", DateFormat::LongForm).unwrap(),
            NaiveDate::from_ymd_opt(2024, 8, 31).unwrap()
        );
        assert_eq!(
            parse_date("Thu 23rd January 2025", DateFormat::LongForm).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 23).unwrap()
        );
    }

    #[test]
    fn date_format_is_never_guessed() {
        assert!(parse_date("2024-09-02", DateFormat::LongForm).is_err());
        assert!(parse_date("Mon 02nd September 2024", DateFormat::Iso).is_err());
        assert_eq!(
            parse_date("2024-09-02", DateFormat::Iso).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
        );
    }

    #[test]
    fn kickoff_times_parse_as_hours_and_minutes() {
        assert_eq!(parse_kickoff(" 18:30 "), NaiveTime::from_hms_opt(18, 30, 0));
        assert_eq!(parse_kickoff("TBC"), None);
    }

    #[test]
    fn competition_ids_resolve_to_labels() {
        assert_eq!(competition_label("196049"), Some("Division 1 Women"));
        assert_eq!(competition_label("196511"), None);
    }
}
