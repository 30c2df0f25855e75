//! Reconciliation of extracted batches into the canonical dataset.
//!
//! Records are never deleted. An incoming record either matches an existing one (direct
//! identity lookup, then the match-number or team fallback) and is merged into it, or it is
//! appended. Every non-trivial decision is reported to the observer and, where a person may
//! want to double-check it, queued as a [`ReviewItem`].

use std::collections::HashMap;

use nvl_core::{
    merge, sort_games, Division, Game, IdentityKey, IngestEvent, IngestObserver, UNKNOWN,
};
use serde::Serialize;
use strsim::jaro_winkler;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct ReconcileConfig {
    /// Minimum Jaro-Winkler score for a review suggestion.
    pub suggestion_threshold: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            suggestion_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    UnmatchedUpdate,
    DateChanged,
    AmbiguousMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub key: IdentityKey,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub kind: ReviewKind,
    pub key: IdentityKey,
    pub detail: String,
    /// Closest existing record; never applied automatically.
    pub suggestion: Option<Suggestion>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileOutcome {
    pub appended: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub date_changed: usize,
    pub ambiguous: usize,
    pub review: Vec<ReviewItem>,
}

/// Games keyed by identity. Insertion order is kept until [`CanonicalDataset::into_sorted`].
#[derive(Debug, Clone, Default)]
pub struct CanonicalDataset {
    games: Vec<Game>,
    index: HashMap<IdentityKey, usize>,
}

impl CanonicalDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes a loaded dataset. Rows sharing an identity key are all kept; lookups resolve
    /// to the first of them.
    pub fn from_games(games: Vec<Game>) -> Self {
        let mut index = HashMap::with_capacity(games.len());
        for (idx, game) in games.iter().enumerate() {
            let key = game.identity_key();
            if index.contains_key(&key) {
                warn!(%key, "duplicate identity key in stored dataset");
                continue;
            }
            index.insert(key, idx);
        }
        Self { games, index }
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&Game> {
        self.index.get(key).map(|&idx| &self.games[idx])
    }

    /// Canonical order for persistence: ascending scheduled time, stable.
    pub fn into_sorted(self) -> Vec<Game> {
        let mut games = self.games;
        sort_games(&mut games);
        games
    }

    fn push(&mut self, game: Game) {
        self.index
            .entry(game.identity_key())
            .or_insert(self.games.len());
        self.games.push(game);
    }

    fn replace(&mut self, idx: usize, game: Game) {
        let old_key = self.games[idx].identity_key();
        let new_key = game.identity_key();
        if old_key != new_key {
            if self.index.get(&old_key) == Some(&idx) {
                self.index.remove(&old_key);
            }
            self.index.entry(new_key).or_insert(idx);
        }
        self.games[idx] = game;
    }

    /// Fallback candidates within one league year. A match moved across 1 August lands in
    /// the next season and is not found here; it is appended and flagged for review.
    fn positions(&self, season: &str, matches: impl Fn(&Game) -> bool) -> Vec<usize> {
        self.games
            .iter()
            .enumerate()
            .filter(|(_, g)| matches(g) && g.season() == season)
            .map(|(idx, _)| idx)
            .collect()
    }
}

pub struct ReconcileEngine<'a> {
    config: ReconcileConfig,
    observer: &'a dyn IngestObserver,
}

impl<'a> ReconcileEngine<'a> {
    pub fn new(config: ReconcileConfig, observer: &'a dyn IngestObserver) -> Self {
        Self { config, observer }
    }

    /// Folds `batch` into `canonical` in batch order; later records win field conflicts.
    pub fn reconcile(&self, canonical: &mut CanonicalDataset, batch: Vec<Game>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        for incoming in batch {
            self.reconcile_one(canonical, incoming, &mut outcome);
        }
        debug!(
            appended = outcome.appended,
            merged = outcome.merged,
            unchanged = outcome.unchanged,
            review = outcome.review.len(),
            "batch reconciled"
        );
        outcome
    }

    fn reconcile_one(
        &self,
        canonical: &mut CanonicalDataset,
        incoming: Game,
        outcome: &mut ReconcileOutcome,
    ) {
        let key = incoming.identity_key();

        if let Some(&idx) = canonical.index.get(&key) {
            if canonical.games[idx] == incoming {
                outcome.unchanged += 1;
                return;
            }
            self.observer
                .observe(IngestEvent::UnmatchedUpdate { key: key.clone() });
            let merged = merge(&canonical.games[idx], &incoming, self.observer);
            canonical.replace(idx, merged);
            outcome.merged += 1;
            outcome.review.push(ReviewItem {
                kind: ReviewKind::UnmatchedUpdate,
                key,
                detail: "merged into the stored record".to_string(),
                suggestion: None,
            });
            return;
        }

        let season = incoming.season();
        if has_usable_number(&incoming) {
            let hits = canonical.positions(&season, |g| g.number == incoming.number);
            match hits.as_slice() {
                [] => {}
                [idx] => {
                    self.merge_fallback(canonical, *idx, incoming, "match number", outcome);
                    return;
                }
                _ => {
                    let detail = format!(
                        "match number {} is shared by {} records",
                        incoming.number,
                        hits.len()
                    );
                    self.append_ambiguous(canonical, incoming, hits.len(), detail, outcome);
                    return;
                }
            }
        }

        let hits = canonical.positions(&season, |g| {
            g.home == incoming.home && g.away == incoming.away && g.division == incoming.division
        });
        match hits.as_slice() {
            [idx] => self.merge_fallback(canonical, *idx, incoming, "teams and division", outcome),
            _ => {
                let detail = if has_usable_number(&incoming) {
                    format!(
                        "no record with match number {}; {} records share teams and division this season",
                        incoming.number,
                        hits.len()
                    )
                } else {
                    format!("{} records share teams and division this season", hits.len())
                };
                self.append_ambiguous(canonical, incoming, hits.len(), detail, outcome);
            }
        }
    }

    fn merge_fallback(
        &self,
        canonical: &mut CanonicalDataset,
        idx: usize,
        incoming: Game,
        matched_on: &str,
        outcome: &mut ReconcileOutcome,
    ) {
        let existing = &canonical.games[idx];
        let key = existing.identity_key();
        let kind = if existing.date != incoming.date {
            self.observer.observe(IngestEvent::DateChanged {
                key: key.clone(),
                from: existing.date,
                to: incoming.date,
            });
            outcome.date_changed += 1;
            ReviewKind::DateChanged
        } else {
            self.observer
                .observe(IngestEvent::UnmatchedUpdate { key: key.clone() });
            ReviewKind::UnmatchedUpdate
        };

        let merged = merge(existing, &incoming, self.observer);
        let detail = format!("matched on {matched_on}; now {}", merged.identity_key());
        canonical.replace(idx, merged);
        outcome.merged += 1;
        outcome.review.push(ReviewItem {
            kind,
            key,
            detail,
            suggestion: None,
        });
    }

    fn append_ambiguous(
        &self,
        canonical: &mut CanonicalDataset,
        incoming: Game,
        candidates: usize,
        detail: String,
        outcome: &mut ReconcileOutcome,
    ) {
        let key = incoming.identity_key();
        self.observer.observe(IngestEvent::AmbiguousMatch {
            key: key.clone(),
            candidates,
        });
        let suggestion = self.suggest(canonical, &incoming);
        canonical.push(incoming);
        outcome.appended += 1;
        outcome.ambiguous += 1;
        outcome.review.push(ReviewItem {
            kind: ReviewKind::AmbiguousMatch,
            key,
            detail,
            suggestion,
        });
    }

    /// Closest record on the same date and division, compared on `"home v away"`.
    fn suggest(&self, canonical: &CanonicalDataset, incoming: &Game) -> Option<Suggestion> {
        let wanted = fixture_label(incoming);
        canonical
            .games
            .iter()
            .filter(|g| g.date == incoming.date && same_division(g.division, incoming.division))
            .map(|g| (jaro_winkler(&wanted, &fixture_label(g)), g))
            .filter(|(score, _)| *score >= self.config.suggestion_threshold)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(score, g)| Suggestion {
                key: g.identity_key(),
                score,
            })
    }
}

fn has_usable_number(game: &Game) -> bool {
    let number = game.number.trim();
    !number.is_empty() && number != UNKNOWN
}

fn fixture_label(game: &Game) -> String {
    format!("{} v {}", game.home, game.away).to_lowercase()
}

fn same_division(a: Division, b: Division) -> bool {
    a == b || !a.is_known() || !b.is_known()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use nvl_core::{Category, EventKind, EventLog, MatchResult};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, d).unwrap()
    }

    fn fixture(home: &str, away: &str, day: u32, number: &str) -> Game {
        let mut game = Game::new(home, away, date(day));
        game.division = Division::Superleague;
        game.category = Category::Women;
        game.time = NaiveTime::from_hms_opt(18, 30, 0);
        game.number = number.into();
        game.venue = "Edge Sports Centre".into();
        game
    }

    fn result(home: &str, away: &str, day: u32) -> Game {
        let mut game = Game::new(home, away, date(day));
        game.division = Division::Superleague;
        game.category = Category::Women;
        game.result = MatchResult::from_tokens(&[3, 0, 25, 20, 25, 22, 25, 18]);
        game.r1 = "Jane Doe".into();
        game
    }

    fn engine(log: &EventLog) -> ReconcileEngine<'_> {
        ReconcileEngine::new(ReconcileConfig::default(), log)
    }

    #[test]
    fn fixture_then_result_yields_one_record_with_the_result() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::new();
        let outcome = engine(&log).reconcile(
            &mut canonical,
            vec![fixture("Leeds", "Hull", 5, "SLW-014"), result("Leeds", "Hull", 5)],
        );

        assert_eq!(canonical.len(), 1);
        let game = &canonical.games()[0];
        assert_eq!(game.result.home_sets, 3);
        assert_eq!(game.number, "SLW-014");
        assert_eq!(game.time, NaiveTime::from_hms_opt(18, 30, 0));
        assert_eq!(game.r1, "Jane Doe");
        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.merged, 1);
        assert_eq!(log.count(EventKind::UnmatchedUpdate), 1);
    }

    #[test]
    fn identical_record_is_a_no_op() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::from_games(vec![fixture("Leeds", "Hull", 5, "SLW-014")]);
        let outcome = engine(&log).reconcile(&mut canonical, vec![fixture("Leeds", "Hull", 5, "SLW-014")]);
        assert_eq!(outcome.unchanged, 1);
        assert!(outcome.review.is_empty());
        assert!(log.events().is_empty());
    }

    #[test]
    fn records_absent_from_the_batch_are_kept() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::from_games(vec![
            fixture("Leeds", "Hull", 5, "SLW-014"),
            fixture("York", "Durham", 6, "SLW-015"),
        ]);
        engine(&log).reconcile(&mut canonical, vec![result("Leeds", "Hull", 5)]);
        assert_eq!(canonical.len(), 2);
        assert!(canonical
            .get(&fixture("York", "Durham", 6, "").identity_key())
            .is_some());
    }

    #[test]
    fn rescheduled_fixture_is_found_by_match_number() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::from_games(vec![fixture("Leeds", "Hull", 5, "SLW-014")]);
        let moved = fixture("Leeds", "Hull", 12, "SLW-014");
        let outcome = engine(&log).reconcile(&mut canonical, vec![moved.clone()]);

        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical.games()[0].date, date(12));
        assert!(canonical.get(&moved.identity_key()).is_some());
        assert_eq!(outcome.date_changed, 1);
        assert_eq!(outcome.review[0].kind, ReviewKind::DateChanged);
        assert_eq!(log.count(EventKind::DateChanged), 1);
    }

    #[test]
    fn unseen_match_number_is_appended_and_flagged() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::from_games(vec![fixture("Leeds", "Hull", 5, "SLW-014")]);
        let outcome =
            engine(&log).reconcile(&mut canonical, vec![fixture("York", "Durham", 6, "SLW-015")]);
        assert_eq!(canonical.len(), 2);
        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.ambiguous, 1);
        assert_eq!(outcome.review[0].kind, ReviewKind::AmbiguousMatch);
        assert!(outcome.review[0].detail.contains("SLW-015"));
        assert_eq!(log.count(EventKind::AmbiguousMatch), 1);
    }

    #[test]
    fn unseen_match_number_falls_back_to_teams() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::from_games(vec![result("Leeds", "Hull", 5)]);
        let moved = fixture("Leeds", "Hull", 12, "SLW-014");
        let outcome = engine(&log).reconcile(&mut canonical, vec![moved.clone()]);

        assert_eq!(canonical.len(), 1);
        let game = &canonical.games()[0];
        assert_eq!(game.date, date(12));
        assert_eq!(game.number, "SLW-014");
        assert!(game.has_result());
        assert!(canonical.get(&moved.identity_key()).is_some());
        assert_eq!(outcome.appended, 0);
        assert_eq!(outcome.date_changed, 1);
        assert_eq!(outcome.review[0].kind, ReviewKind::DateChanged);
        assert_eq!(log.count(EventKind::AmbiguousMatch), 0);
    }

    #[test]
    fn shared_match_number_is_ambiguous() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::from_games(vec![
            fixture("Leeds", "Hull", 5, "SLW-014"),
            fixture("York", "Durham", 6, "SLW-014"),
        ]);
        let outcome =
            engine(&log).reconcile(&mut canonical, vec![fixture("Bath", "Exeter", 7, "SLW-014")]);
        assert_eq!(canonical.len(), 3);
        assert_eq!(outcome.ambiguous, 1);
        assert_eq!(log.count(EventKind::AmbiguousMatch), 1);
    }

    #[test]
    fn result_without_number_falls_back_to_teams() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::from_games(vec![fixture("Leeds", "Hull", 5, "SLW-014")]);
        let outcome = engine(&log).reconcile(&mut canonical, vec![result("Leeds", "Hull", 6)]);

        assert_eq!(canonical.len(), 1);
        let game = &canonical.games()[0];
        assert_eq!(game.date, date(6));
        assert!(game.has_result());
        assert_eq!(game.number, "SLW-014");
        assert_eq!(outcome.date_changed, 1);
    }

    #[test]
    fn team_fallback_ignores_other_seasons() {
        let log = EventLog::new();
        let mut last_season = fixture("Leeds", "Hull", 5, "");
        last_season.date = NaiveDate::from_ymd_opt(2023, 10, 5).unwrap();
        let mut canonical = CanonicalDataset::from_games(vec![last_season]);

        let outcome = engine(&log).reconcile(&mut canonical, vec![result("Leeds", "Hull", 6)]);
        assert_eq!(canonical.len(), 2);
        assert_eq!(outcome.ambiguous, 1);
    }

    #[test]
    fn unmatched_record_gets_a_suggestion_but_is_not_merged() {
        let log = EventLog::new();
        let mut canonical =
            CanonicalDataset::from_games(vec![fixture("Leeds Gryphons", "Hull Lions", 5, "")]);
        let outcome = engine(&log).reconcile(
            &mut canonical,
            vec![result("Leeds Gryphon", "Hull Lions", 5)],
        );

        assert_eq!(canonical.len(), 2);
        assert_eq!(log.count(EventKind::AmbiguousMatch), 1);
        let item = &outcome.review[0];
        assert_eq!(item.kind, ReviewKind::AmbiguousMatch);
        let suggestion = item.suggestion.as_ref().expect("suggestion");
        assert_eq!(suggestion.key.home, "Leeds Gryphons");
        assert!(suggestion.score >= 0.85);
    }

    #[test]
    fn sorted_output_orders_by_kickoff() {
        let log = EventLog::new();
        let mut canonical = CanonicalDataset::new();
        engine(&log).reconcile(
            &mut canonical,
            vec![
                fixture("York", "Durham", 6, "SLW-015"),
                fixture("Leeds", "Hull", 5, "SLW-014"),
            ],
        );
        let homes = canonical
            .into_sorted()
            .into_iter()
            .map(|g| g.home)
            .collect::<Vec<_>>();
        assert_eq!(homes, vec!["Leeds", "York"]);
    }
}
