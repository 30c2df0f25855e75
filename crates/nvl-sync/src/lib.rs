//! Sync pipeline: snapshot registry, extraction, reconciliation and run reports.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{BooleanArray, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use nvl_adapters::{
    load_snapshot, ExtractOptions, Extraction, ExtractionStats, RecordExtractor, SnapshotKind,
};
use nvl_core::{competition_label, EventKind, EventLog, Game, IngestObserver};
use nvl_storage::{load_dataset, save_dataset, SnapshotArchive};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

mod reconcile;

pub use reconcile::{
    CanonicalDataset, ReconcileConfig, ReconcileEngine, ReconcileOutcome, ReviewItem, ReviewKind,
    Suggestion,
};

pub const CRATE_NAME: &str = "nvl-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub kind: SnapshotKind,
    #[serde(default)]
    pub competition_id: Option<String>,
    /// Snapshot files, relative to the registry file.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceConfig {
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            kind: self.kind,
            default_label: self
                .competition_id
                .as_deref()
                .and_then(competition_label)
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub dataset_path: PathBuf,
    pub archive_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub sources_path: PathBuf,
    pub suggestion_threshold: f64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let path = |name: &str, default: &str| {
            std::env::var(name)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(default))
        };
        Self {
            dataset_path: path("NVL_DATASET", "./data/games.csv"),
            archive_dir: path("NVL_ARCHIVE_DIR", "./archive"),
            reports_dir: path("NVL_REPORTS_DIR", "./reports"),
            sources_path: path("NVL_SOURCES", "./sources.yaml"),
            suggestion_threshold: std::env::var("NVL_FALLBACK_SUGGESTION_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(ReconcileConfig::default().suggestion_threshold),
        }
    }

    fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            suggestion_threshold: self.suggestion_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub kind: SnapshotKind,
    pub snapshots: usize,
    pub archived: usize,
    pub stats: ExtractionStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_sources: usize,
    pub snapshots: usize,
    pub stats: ExtractionStats,
    pub appended: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub review_items: usize,
    pub canonical_games: usize,
    pub events: BTreeMap<EventKind, usize>,
    pub dataset_path: String,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

#[derive(Debug, Clone, Serialize)]
struct RunReport<'a> {
    summary: &'a SyncRunSummary,
    sources: &'a [SourceReport],
    review: &'a [ReviewItem],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub struct SyncPipeline {
    config: SyncConfig,
    archive: SnapshotArchive,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Self {
        let archive = SnapshotArchive::new(config.archive_dir.clone());
        Self { config, archive }
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        self.run(run_id)
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    async fn run(&self, run_id: Uuid) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let registry = SourceRegistry::load(&self.config.sources_path).await?;
        let base = self
            .config
            .sources_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let enabled_sources: Vec<_> = registry.sources.into_iter().filter(|s| s.enabled).collect();

        let stored = load_dataset(&self.config.dataset_path)
            .await
            .with_context(|| format!("loading {}", self.config.dataset_path.display()))?;
        let mut canonical = CanonicalDataset::from_games(stored);
        let log = EventLog::new();

        let mut source_reports = Vec::new();
        let mut batch = Vec::new();
        for source in &enabled_sources {
            let report = self.extract_source(source, &base, &log, &mut batch).await?;
            source_reports.push(report);
        }

        let engine = ReconcileEngine::new(self.config.reconcile_config(), &log);
        let outcome = engine.reconcile(&mut canonical, batch);
        let games = canonical.into_sorted();
        save_dataset(&self.config.dataset_path, &games)
            .await
            .with_context(|| format!("saving {}", self.config.dataset_path.display()))?;

        let mut stats = ExtractionStats::default();
        for report in &source_reports {
            stats.absorb(&report.stats);
        }

        let reports_dir = self.config.reports_dir.join(run_id.to_string());
        let manifest_path = export_parquet_snapshots(&reports_dir, &games).await?;
        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            enabled_sources: enabled_sources.len(),
            snapshots: source_reports.iter().map(|r| r.snapshots).sum(),
            stats,
            appended: outcome.appended,
            merged: outcome.merged,
            unchanged: outcome.unchanged,
            review_items: outcome.review.len(),
            canonical_games: games.len(),
            events: log.counts(),
            dataset_path: self.config.dataset_path.display().to_string(),
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        };

        write_reports(&reports_dir, &summary, &source_reports, &outcome.review).await?;

        info!(
            games = summary.canonical_games,
            appended = summary.appended,
            merged = summary.merged,
            review = summary.review_items,
            "sync run complete"
        );
        Ok(summary)
    }

    async fn extract_source(
        &self,
        source: &SourceConfig,
        base: &Path,
        observer: &dyn IngestObserver,
        batch: &mut Vec<Game>,
    ) -> Result<SourceReport> {
        let extractor = RecordExtractor::new(source.extract_options(), observer);
        let mut report = SourceReport {
            source_id: source.source_id.clone(),
            kind: source.kind,
            snapshots: 0,
            archived: 0,
            stats: Default::default(),
        };

        for path in &source.paths {
            let path = base.join(path);
            let snapshot = load_snapshot(&source.source_id, source.kind, &path)?;
            let archived = self
                .archive
                .store(&source.source_id, snapshot.html.as_bytes())
                .await?;
            if !archived.deduplicated {
                report.archived += 1;
            }

            let span = info_span!(
                "snapshot",
                snapshot_id = %snapshot.snapshot_id(),
                path = %path.display()
            );
            let extraction = span
                .in_scope(|| extractor.extract_html(&snapshot.html))
                .with_context(|| format!("extracting {}", path.display()))?;
            report.snapshots += 1;
            report.stats.absorb(&extraction.stats);
            batch.extend(extraction.games);
        }
        Ok(report)
    }
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    SyncPipeline::new(SyncConfig::from_env()).run_once().await
}

/// Extracts standalone snapshot files of one kind, in the given order.
pub fn extract_files(
    paths: &[PathBuf],
    options: &ExtractOptions,
    observer: &dyn IngestObserver,
) -> Result<Extraction> {
    let extractor = RecordExtractor::new(options.clone(), observer);
    let mut total = Extraction::default();
    for path in paths {
        info!(path = %path.display(), "parsing snapshot");
        let snapshot = load_snapshot("local", options.kind, path)?;
        let extraction = extractor
            .extract_html(&snapshot.html)
            .with_context(|| format!("extracting {}", path.display()))?;
        total.stats.absorb(&extraction.stats);
        total.games.extend(extraction.games);
    }
    Ok(total)
}

async fn write_reports(
    reports_dir: &Path,
    summary: &SyncRunSummary,
    sources: &[SourceReport],
    review: &[ReviewItem],
) -> Result<()> {
    fs::create_dir_all(reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    let run_json = serde_json::to_vec_pretty(&RunReport {
        summary,
        sources,
        review,
    })
    .context("serializing run report")?;
    fs::write(reports_dir.join("run.json"), run_json)
        .await
        .context("writing run.json")?;

    fs::write(reports_dir.join("brief.md"), brief_markdown(summary, sources, review))
        .await
        .context("writing brief.md")?;
    Ok(())
}

fn brief_markdown(summary: &SyncRunSummary, sources: &[SourceReport], review: &[ReviewItem]) -> String {
    let mut lines = vec![
        "# NVL Sync Brief".to_string(),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Started: {}", summary.started_at),
        format!("- Finished: {}", summary.finished_at),
        format!(
            "- Fragments: {} ({} extracted, {} discarded, {} malformed)",
            summary.stats.fragments,
            summary.stats.extracted,
            summary.stats.discarded,
            summary.stats.malformed
        ),
        format!(
            "- Reconciled: {} appended, {} merged, {} unchanged",
            summary.appended, summary.merged, summary.unchanged
        ),
        format!("- Canonical games: {}", summary.canonical_games),
        String::new(),
        "## Sources".to_string(),
    ];
    for source in sources {
        lines.push(format!(
            "- {} ({:?}): {} snapshots, discarded {} out of {} fragments ({:.1}%)",
            source.source_id,
            source.kind,
            source.snapshots,
            source.stats.discarded,
            source.stats.fragments,
            source.stats.discard_rate() * 100.0
        ));
    }

    lines.push(String::new());
    lines.push("## Review".to_string());
    if review.is_empty() {
        lines.push("- nothing to review".to_string());
    }
    for item in review {
        let mut line = format!("- {:?} `{}`: {}", item.kind, item.key, item.detail);
        if let Some(suggestion) = &item.suggestion {
            line.push_str(&format!(
                " (closest: `{}`, {:.2})",
                suggestion.key, suggestion.score
            ));
        }
        lines.push(line);
    }
    lines.push(String::new());
    lines.join("\n")
}

async fn export_parquet_snapshots(reports_dir: &Path, games: &[Game]) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join("snapshots");
    fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let games_path = snapshot_dir.join("games.parquet");
    write_games_parquet(&games_path, games)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![manifest_entry("games", reports_dir, &games_path)?],
    };
    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn write_games_parquet(path: &Path, games: &[Game]) -> Result<()> {
    let text = |name: &str| ArrowField::new(name, DataType::Utf8, false);
    let count = |name: &str| ArrowField::new(name, DataType::UInt32, false);
    let schema = Arc::new(Schema::new(vec![
        text("season"),
        text("date"),
        text("time"),
        text("number"),
        text("home"),
        count("home_sets"),
        text("home_points"),
        text("away"),
        count("away_sets"),
        text("away_points"),
        text("division"),
        text("category"),
        text("venue"),
        text("r1"),
        text("r2"),
        ArrowField::new("has_result", DataType::Boolean, false),
    ]));

    let column = |f: fn(&Game) -> String| {
        Arc::new(StringArray::from(games.iter().map(f).collect::<Vec<_>>()))
    };
    let sets = |f: fn(&Game) -> u8| {
        Arc::new(UInt32Array::from(
            games.iter().map(|g| u32::from(f(g))).collect::<Vec<_>>(),
        ))
    };

    let batch = RecordBatch::try_new(
        schema,
        vec![
            column(|g| g.season()),
            column(|g| g.date.format("%Y-%m-%d").to_string()),
            column(|g| g.kickoff()),
            column(|g| g.number.clone()),
            column(|g| g.home.clone()),
            sets(|g| g.result.home_sets),
            column(|g| g.result.home_points.to_string()),
            column(|g| g.away.clone()),
            sets(|g| g.result.away_sets),
            column(|g| g.result.away_points.to_string()),
            column(|g| g.division.to_string()),
            column(|g| g.category.to_string()),
            column(|g| g.venue.clone()),
            column(|g| g.r1.clone()),
            column(|g| g.r2.clone()),
            Arc::new(BooleanArray::from(
                games.iter().map(Game::has_result).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building games record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}

/// Markdown overview of the most recent runs under `reports_dir`, newest first.
pub fn report_markdown(runs: usize, reports_dir: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_dir)
        .with_context(|| format!("reading {}", reports_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join("run.json").exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# NVL Sync Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let run_path = dir.path().join("run.json");
        let run: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&run_path)
                .with_context(|| format!("reading {}", run_path.display()))?,
        )
        .with_context(|| format!("parsing {}", run_path.display()))?;
        let summary = &run["summary"];
        let number = |field: &str| summary[field].as_u64().unwrap_or(0);
        let stats = &summary["stats"];

        lines.push(format!("## Run `{}`", dir.file_name().to_string_lossy()));
        lines.push(format!(
            "- finished: {}",
            summary["finished_at"].as_str().unwrap_or("unknown")
        ));
        lines.push(format!(
            "- discarded {} out of {} fragments",
            stats["discarded"].as_u64().unwrap_or(0),
            stats["fragments"].as_u64().unwrap_or(0)
        ));
        lines.push(format!(
            "- appended {}, merged {}, unchanged {}",
            number("appended"),
            number("merged"),
            number("unchanged")
        ));
        lines.push(format!("- review items: {}", number("review_items")));
        lines.push(format!("- canonical games: {}", number("canonical_games")));
        let brief = dir.path().join("brief.md");
        if brief.exists() {
            lines.push(format!("- brief: `{}`", brief.display()));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_parses_with_defaults() {
        let yaml = r#"
sources:
  - source_id: superleague-women-fixtures
    display_name: Super League Women fixtures
    enabled: true
    kind: fixtures
    competition_id: "195838"
    paths: [fixtures/fixtures/sample.html]
  - source_id: archive-2019
    display_name: Old results
    enabled: false
    kind: results
"#;
        let registry: SourceRegistry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(registry.sources.len(), 2);
        let options = registry.sources[0].extract_options();
        assert_eq!(options.kind, SnapshotKind::Fixtures);
        assert_eq!(options.default_label.as_deref(), Some("Super League Women"));
        assert!(registry.sources[1].paths.is_empty());
        assert_eq!(registry.sources[1].extract_options().default_label, None);
    }

    #[test]
    fn brief_lists_review_items_and_suggestions() {
        let key = Game::new(
            "Leeds Gryphon",
            "Hull Lions",
            chrono::NaiveDate::from_ymd_opt(2024, 10, 5).unwrap(),
        )
        .identity_key();
        let summary = SyncRunSummary {
            run_id: Uuid::nil(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            enabled_sources: 1,
            snapshots: 1,
            stats: Default::default(),
            appended: 1,
            merged: 0,
            unchanged: 0,
            review_items: 1,
            canonical_games: 2,
            events: BTreeMap::new(),
            dataset_path: "games.csv".into(),
            reports_dir: "reports".into(),
            parquet_manifest: "manifest.json".into(),
        };
        let review = vec![ReviewItem {
            kind: ReviewKind::AmbiguousMatch,
            key: key.clone(),
            detail: "0 records share teams and division this season".into(),
            suggestion: Some(Suggestion { key, score: 0.97 }),
        }];

        let brief = brief_markdown(&summary, &[], &review);
        assert!(brief.contains("AmbiguousMatch"));
        assert!(brief.contains("Leeds Gryphon v Hull Lions"));
        assert!(brief.contains("0.97"));
    }
}
