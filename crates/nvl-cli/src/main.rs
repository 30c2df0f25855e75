use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nvl_adapters::{ExtractOptions, SnapshotKind};
use nvl_core::{competition_label, games_in_season, Game, TracingObserver};
use nvl_storage::save_dataset;
use nvl_sync::{CanonicalDataset, ReconcileConfig, ReconcileEngine, SyncConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nvl-cli")]
#[command(about = "National Volleyball League results ledger")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every enabled source in the registry into the canonical dataset.
    Sync,
    /// Extract standalone snapshot files into a fresh CSV dataset.
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        dest: PathBuf,
        #[arg(long, value_enum, default_value_t = Kind::Results)]
        kind: Kind,
        /// Competition id supplying the label for cards without one.
        #[arg(long)]
        competition: Option<String>,
        /// Only write one league year, e.g. `2023-2024`.
        #[arg(long)]
        season: Option<String>,
    },
    /// Summarize the latest sync runs.
    Report {
        #[arg(long, default_value_t = 1)]
        runs: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Fixtures,
    Results,
}

impl From<Kind> for SnapshotKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Fixtures => SnapshotKind::Fixtures,
            Kind::Results => SnapshotKind::Results,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = nvl_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} sources={} games={} appended={} merged={} review={} reports={}",
                summary.run_id,
                summary.enabled_sources,
                summary.canonical_games,
                summary.appended,
                summary.merged,
                summary.review_items,
                summary.reports_dir
            );
        }
        Commands::Parse {
            files,
            dest,
            kind,
            competition,
            season,
        } => {
            let default_label = match competition.as_deref() {
                Some(id) => Some(
                    competition_label(id)
                        .with_context(|| format!("unknown competition id {id}"))?
                        .to_string(),
                ),
                None => None,
            };
            let options = ExtractOptions {
                kind: kind.into(),
                default_label,
            };
            let observer = TracingObserver;
            let extraction = nvl_sync::extract_files(&files, &options, &observer)?;
            let stats = extraction.stats;
            println!(
                "discarded {} out of {} fragments ({:.1}%)",
                stats.discarded,
                stats.fragments,
                stats.discard_rate() * 100.0
            );

            let mut canonical = CanonicalDataset::new();
            let outcome = ReconcileEngine::new(ReconcileConfig::default(), &observer)
                .reconcile(&mut canonical, extraction.games);
            if !outcome.review.is_empty() {
                println!("{} records need review", outcome.review.len());
            }
            let mut games = canonical.into_sorted();
            if let Some(season) = season.as_deref() {
                games = games_in_season(&games, season).cloned().collect::<Vec<Game>>();
            }

            save_dataset(&dest, &games)
                .await
                .with_context(|| format!("writing {}", dest.display()))?;
            println!("wrote {} games to {}", games.len(), dest.display());
        }
        Commands::Report { runs } => {
            let config = SyncConfig::from_env();
            println!("{}", nvl_sync::report_markdown(runs, &config.reports_dir)?);
        }
    }

    Ok(())
}
