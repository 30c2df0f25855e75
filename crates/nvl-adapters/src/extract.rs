use nvl_core::{
    category_from_label, check_result, clean_match_number, clean_official, clean_venue,
    division_from_label, is_division_label, parse_date, parse_kickoff, DateFormat,
    DateParseError, Game, IngestEvent, IngestObserver, InvalidResult, MatchResult,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::fragment::{match_cards, parse_page};
use crate::{MatchFragment, SnapshotKind, AWAY_ATTR, DATE_ATTR, HOME_ATTR};

const REFEREE_1_LABEL: &str = "Referee 1";
const REFEREE_2_LABEL: &str = "Referee 2";
const VENUE_LABEL: &str = "Venue";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("match card has no {0} attribute")]
    MissingAttribute(&'static str),
    #[error(transparent)]
    Date(#[from] DateParseError),
    #[error("invalid selector: {0}")]
    Selector(String),
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub kind: SnapshotKind,
    /// Division/category label applied when a card carries none of its own,
    /// typically the competition the page was fetched for.
    pub default_label: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub fragments: usize,
    pub extracted: usize,
    pub discarded: usize,
    pub malformed: usize,
}

impl ExtractionStats {
    pub fn discard_rate(&self) -> f64 {
        if self.fragments == 0 {
            0.0
        } else {
            self.discarded as f64 / self.fragments as f64
        }
    }

    pub fn absorb(&mut self, other: &ExtractionStats) {
        self.fragments += other.fragments;
        self.extracted += other.extracted;
        self.discarded += other.discarded;
        self.malformed += other.malformed;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub games: Vec<Game>,
    pub stats: ExtractionStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardOutcome {
    Accepted(Game),
    /// The card parsed but its score line breaks the volleyball rules.
    Rejected { game: Game, reason: InvalidResult },
}

pub struct RecordExtractor<'a> {
    options: ExtractOptions,
    observer: &'a dyn IngestObserver,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(options: ExtractOptions, observer: &'a dyn IngestObserver) -> Self {
        Self { options, observer }
    }

    /// Builds one [`Game`] from a match card.
    ///
    /// Container attributes are authoritative for teams and date. Inline spans are classified
    /// by their own text, never by position, since the card layout shifts between pages.
    pub fn extract_card(&self, card: &impl MatchFragment) -> Result<CardOutcome, ExtractError> {
        let home = card
            .attr(HOME_ATTR)
            .ok_or(ExtractError::MissingAttribute(HOME_ATTR))?;
        let away = card
            .attr(AWAY_ATTR)
            .ok_or(ExtractError::MissingAttribute(AWAY_ATTR))?;
        let raw_date = card
            .attr(DATE_ATTR)
            .ok_or(ExtractError::MissingAttribute(DATE_ATTR))?;
        let date = parse_date(&raw_date, DateFormat::LongForm)?;

        let mut game = Game::new(home.trim(), away.trim(), date);
        let mut tokens = Vec::new();
        let mut labelled = false;

        for span in card.find_all("span") {
            if span.has_attributes {
                continue;
            }
            let text = span.text.trim();
            if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(token) = text.parse::<u32>() {
                    tokens.push(token);
                }
                continue;
            }
            if text.contains(REFEREE_1_LABEL) {
                game.r1 = clean_official(text);
            }
            if text.contains(REFEREE_2_LABEL) {
                game.r2 = clean_official(text);
            }
            if text.contains(VENUE_LABEL) {
                game.venue = clean_venue(text);
            }
            if is_division_label(text) {
                self.apply_label(&mut game, text);
                labelled = true;
            }
        }

        if !labelled {
            if let Some(label) = self.options.default_label.as_deref() {
                self.apply_label(&mut game, label);
            }
        }

        if let Some(item) = card.find_all("li").into_iter().find(|li| li.has_line_break) {
            if let Some(kickoff) = item.segments.first() {
                game.time = parse_kickoff(kickoff);
            }
            if let Some(number) = item.segments.get(1) {
                game.number = clean_match_number(number);
            }
        }

        let scheduled_only = self.options.kind == SnapshotKind::Fixtures && tokens.is_empty();
        if !scheduled_only {
            if let Err(reason) = check_result(&tokens) {
                return Ok(CardOutcome::Rejected { game, reason });
            }
            game.result = MatchResult::from_tokens(&tokens);
        }

        debug!(%game, ?tokens, "match card parsed");
        Ok(CardOutcome::Accepted(game))
    }

    /// Runs every card of one batch. Neither a rejected result nor a malformed card halts
    /// the batch; both are counted and reported to the observer.
    pub fn extract_all<F: MatchFragment>(
        &self,
        cards: impl IntoIterator<Item = F>,
    ) -> Extraction {
        let mut extraction = Extraction::default();
        for card in cards {
            extraction.stats.fragments += 1;
            match self.extract_card(&card) {
                Ok(CardOutcome::Accepted(game)) => {
                    extraction.stats.extracted += 1;
                    extraction.games.push(game);
                }
                Ok(CardOutcome::Rejected { game, reason }) => {
                    extraction.stats.discarded += 1;
                    self.observer.observe(IngestEvent::Discarded {
                        home: game.home,
                        away: game.away,
                        date: game.date,
                        reason: reason.to_string(),
                    });
                }
                Err(err) => {
                    extraction.stats.malformed += 1;
                    self.observer.observe(IngestEvent::MalformedFragment {
                        reason: err.to_string(),
                    });
                }
            }
        }

        let stats = extraction.stats;
        info!(
            extracted = stats.extracted,
            malformed = stats.malformed,
            "discarded {} out of {} fragments ({:.1}%)",
            stats.discarded,
            stats.fragments,
            stats.discard_rate() * 100.0
        );
        extraction
    }

    pub fn extract_html(&self, html: &str) -> Result<Extraction, ExtractError> {
        let page = parse_page(html);
        let cards = match_cards(&page)?;
        Ok(self.extract_all(cards))
    }

    fn apply_label(&self, game: &mut Game, text: &str) {
        game.category = category_from_label(text, self.observer);
        game.division = division_from_label(text, self.observer);
    }
}
