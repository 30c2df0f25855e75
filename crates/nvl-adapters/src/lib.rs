//! Match-card extraction from scraped fixtures/results snapshots.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod extract;
mod fragment;

pub use extract::{
    CardOutcome, ExtractError, ExtractOptions, Extraction, ExtractionStats, RecordExtractor,
};
pub use fragment::{match_cards, parse_page};

pub const CRATE_NAME: &str = "nvl-adapters";

/// Selector for one match card on a fixtures or results page.
pub const MATCH_CARD_SELECTOR: &str = "div.col-12.mb-4.resultContents";
pub const HOME_ATTR: &str = "data-home-team";
pub const AWAY_ATTR: &str = "data-away-team";
pub const DATE_ATTR: &str = "data-date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Scheduled matches; cards without score tokens are accepted as fixtures.
    Fixtures,
    /// Played matches; every card must carry a valid result.
    #[default]
    Results,
}

/// One inline element of a match card, as seen by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineNode {
    /// All descendant text, concatenated.
    pub text: String,
    /// Non-empty text runs separated by `<br>`.
    pub segments: Vec<String>,
    pub has_attributes: bool,
    pub has_line_break: bool,
}

/// The only contract with the HTML parser: named attributes plus find-all-by-tag.
pub trait MatchFragment {
    fn attr(&self, name: &str) -> Option<String>;
    fn find_all(&self, tag: &str) -> Vec<InlineNode>;
}

/// A raw page loaded from disk, ready for extraction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub source_id: String,
    pub kind: SnapshotKind,
    pub path: PathBuf,
    pub html: String,
}

impl Snapshot {
    /// Stable across runs for the same source and path.
    pub fn snapshot_id(&self) -> Uuid {
        let name = format!("{}:{}", self.source_id, self.path.display());
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
    }
}

pub fn load_snapshot(
    source_id: &str,
    kind: SnapshotKind,
    path: impl AsRef<Path>,
) -> Result<Snapshot> {
    let path = path.as_ref();
    let html = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Snapshot {
        source_id: source_id.to_string(),
        kind,
        path: path.to_path_buf(),
        html,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_ids_are_deterministic() {
        let snapshot = |path: &str| Snapshot {
            source_id: "superleague-women".into(),
            kind: SnapshotKind::Results,
            path: PathBuf::from(path),
            html: String::new(),
        };
        assert_eq!(
            snapshot("results-a.html").snapshot_id(),
            snapshot("results-a.html").snapshot_id()
        );
        assert_ne!(
            snapshot("results-a.html").snapshot_id(),
            snapshot("results-b.html").snapshot_id()
        );
    }
}
