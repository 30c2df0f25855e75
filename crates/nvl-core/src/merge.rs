//! Merge algebra for two records describing the same match.

use std::fmt::Display;

use crate::game::{Category, Division, Game, IdentityKey, UNKNOWN};
use crate::observe::{IngestEvent, IngestObserver};

/// Combines `existing` with the more recently scraped `incoming` record.
///
/// Each field is resolved on its own: a value present on one side only is kept, and when
/// both sides disagree the incoming value wins and the conflict is reported. The result
/// (set counts and point lines) is replaced as a unit whenever `incoming` carries one, so
/// score lines from two scrape passes are never mixed. Not commutative.
pub fn merge(existing: &Game, incoming: &Game, observer: &dyn IngestObserver) -> Game {
    let key = existing.identity_key();
    let fields = FieldMerger {
        key: &key,
        observer,
    };

    let result = if incoming.result.has_data() {
        if existing.result.has_data() && existing.result != incoming.result {
            observer.observe(IngestEvent::ResultReplaced {
                key: key.clone(),
                existing: existing.result.to_string(),
                incoming: incoming.result.to_string(),
            });
        }
        incoming.result
    } else {
        existing.result
    };

    Game {
        division: fields
            .pick("division", known_division(existing), known_division(incoming))
            .unwrap_or(existing.division),
        category: fields
            .pick("category", known_category(existing), known_category(incoming))
            .unwrap_or(existing.category),
        home: fields.text("home", &existing.home, &incoming.home),
        away: fields.text("away", &existing.away, &incoming.away),
        date: fields
            .pick("date", Some(existing.date), Some(incoming.date))
            .unwrap_or(existing.date),
        time: fields.pick("time", existing.time, incoming.time),
        number: fields.text("number", &existing.number, &incoming.number),
        result,
        venue: fields.text("venue", &existing.venue, &incoming.venue),
        r1: fields.text("r1", &existing.r1, &incoming.r1),
        r2: fields.text("r2", &existing.r2, &incoming.r2),
    }
}

struct FieldMerger<'a> {
    key: &'a IdentityKey,
    observer: &'a dyn IngestObserver,
}

impl FieldMerger<'_> {
    fn pick<T: PartialEq + Display>(
        &self,
        field: &'static str,
        existing: Option<T>,
        incoming: Option<T>,
    ) -> Option<T> {
        match (existing, incoming) {
            (Some(existing), Some(incoming)) => {
                if existing != incoming {
                    self.observer.observe(IngestEvent::FieldConflict {
                        key: self.key.clone(),
                        field,
                        existing: existing.to_string(),
                        incoming: incoming.to_string(),
                    });
                }
                Some(incoming)
            }
            (Some(existing), None) => Some(existing),
            (None, Some(incoming)) => Some(incoming),
            (None, None) => {
                self.observer.observe(IngestEvent::FieldUnset {
                    key: self.key.clone(),
                    field,
                });
                None
            }
        }
    }

    /// The `unknown` sentinel counts as empty, so a real value always displaces it.
    fn text(&self, field: &'static str, existing: &str, incoming: &str) -> String {
        self.pick(field, present(existing), present(incoming))
            .unwrap_or(existing)
            .to_string()
    }
}

/// Emptiness is judged on the trimmed text; the stored value is returned untouched.
fn present(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty() && trimmed != UNKNOWN).then_some(value)
}

fn known_division(game: &Game) -> Option<Division> {
    game.division.is_known().then_some(game.division)
}

fn known_category(game: &Game) -> Option<Category> {
    game.category.is_known().then_some(game.category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::MatchResult;
    use crate::observe::{EventKind, EventLog};
    use chrono::{NaiveDate, NaiveTime};

    fn fixture() -> Game {
        let mut game = Game::new(
            "Leeds Gryphons",
            "Sheffield Hallam",
            NaiveDate::from_ymd_opt(2024, 10, 5).unwrap(),
        );
        game.division = Division::Division1;
        game.category = Category::Women;
        game.time = NaiveTime::from_hms_opt(18, 30, 0);
        game.number = "D1W-022".into();
        game.venue = "Edge Sports Centre".into();
        game.r1 = UNKNOWN.into();
        game
    }

    fn result_of(game: &Game, tokens: &[u32]) -> Game {
        let mut played = game.clone();
        played.time = None;
        played.number = String::new();
        played.result = MatchResult::from_tokens(tokens);
        played
    }

    #[test]
    fn merge_is_idempotent() {
        let log = EventLog::new();
        let mut game = fixture();
        game.r1 = "Jane Doe".into();
        game.r2 = "John Smith".into();
        game.result = MatchResult::from_tokens(&[3, 1, 25, 20, 20, 25, 25, 18, 25, 23]);

        assert_eq!(merge(&game, &game, &log), game);
        assert_eq!(log.count(EventKind::FieldConflict), 0);
        assert_eq!(log.count(EventKind::ResultReplaced), 0);
    }

    #[test]
    fn merge_keeps_surrounding_whitespace_of_loaded_values() {
        let log = EventLog::new();
        let mut game = fixture();
        game.venue = "Edge Sports Centre ".into();
        game.r2 = " John Smith".into();

        let merged = merge(&game, &game, &log);
        assert_eq!(merged.venue, "Edge Sports Centre ");
        assert_eq!(merged, game);
        assert_eq!(log.count(EventKind::FieldConflict), 0);
    }

    #[test]
    fn fixture_is_enriched_by_result() {
        let log = EventLog::new();
        let fixture = fixture();
        let mut result = result_of(&fixture, &[3, 0, 25, 20, 25, 22, 25, 18]);
        result.r1 = "Jane Doe".into();

        let merged = merge(&fixture, &result, &log);
        assert_eq!(merged.result, result.result);
        assert_eq!(merged.time, fixture.time);
        assert_eq!(merged.number, "D1W-022");
        assert_eq!(merged.venue, "Edge Sports Centre");
        assert_eq!(merged.r1, "Jane Doe");
        assert_eq!(log.count(EventKind::FieldConflict), 0);
    }

    #[test]
    fn incoming_without_result_keeps_existing_result() {
        let log = EventLog::new();
        let played = result_of(&fixture(), &[3, 0, 25, 20, 25, 22, 25, 18]);
        let merged = merge(&played, &fixture(), &log);
        assert_eq!(merged.result, played.result);
    }

    #[test]
    fn merge_is_not_commutative() {
        let log = EventLog::new();
        let a = result_of(&fixture(), &[3, 0, 25, 20, 25, 22, 25, 18]);
        let mut b = result_of(&fixture(), &[3, 1, 25, 20, 22, 25, 25, 18, 25, 16]);
        b.venue = "Carnegie Sports Hall".into();

        let ab = merge(&a, &b, &log);
        let ba = merge(&b, &a, &log);
        assert_eq!(ab.result, b.result);
        assert_eq!(ba.result, a.result);
        assert_eq!(ab.venue, "Carnegie Sports Hall");
        assert_eq!(ba.venue, "Edge Sports Centre");
        assert_ne!(ab, ba);
        assert_eq!(log.count(EventKind::ResultReplaced), 2);
        assert_eq!(log.count(EventKind::FieldConflict), 2);
    }

    #[test]
    fn conflicting_values_take_incoming_and_are_reported() {
        let log = EventLog::new();
        let existing = fixture();
        let mut incoming = fixture();
        incoming.r1 = "Jane Doe".into();
        incoming.venue = "Carnegie Sports Hall".into();

        let merged = merge(&existing, &incoming, &log);
        assert_eq!(merged.venue, "Carnegie Sports Hall");
        let conflicts = log
            .events()
            .into_iter()
            .filter_map(|e| match e {
                IngestEvent::FieldConflict {
                    field,
                    existing,
                    incoming,
                    ..
                } => Some((field, existing, incoming)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            conflicts,
            vec![(
                "venue",
                "Edge Sports Centre".to_string(),
                "Carnegie Sports Hall".to_string()
            )]
        );
    }

    #[test]
    fn unknown_sentinel_never_overwrites_a_real_value() {
        let log = EventLog::new();
        let mut existing = fixture();
        existing.r1 = "Jane Doe".into();
        let incoming = fixture();

        let merged = merge(&existing, &incoming, &log);
        assert_eq!(merged.r1, "Jane Doe");
        assert_eq!(log.count(EventKind::FieldConflict), 0);
    }

    #[test]
    fn fields_empty_on_both_sides_are_noted() {
        let log = EventLog::new();
        let game = fixture();
        let merged = merge(&game, &game, &log);
        assert_eq!(merged.r1, UNKNOWN);
        assert_eq!(merged.r2, "");
        assert_eq!(log.count(EventKind::FieldUnset), 2);
    }

    #[test]
    fn known_division_displaces_unknown() {
        let log = EventLog::new();
        let mut existing = fixture();
        existing.division = Division::Unknown;
        existing.category = Category::Unknown;
        let merged = merge(&existing, &fixture(), &log);
        assert_eq!(merged.division, Division::Division1);
        assert_eq!(merged.category, Category::Women);
    }
}
