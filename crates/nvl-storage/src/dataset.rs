//! Durable CSV form of the canonical dataset.
//!
//! Columns are fixed: `season,date,time,ID,home,home_sets,home_points,away,away_sets,
//! away_points,division,category,venue,r1,r2`. Point lines are five space-joined slots with
//! `-` for sets not played; an unknown kick-off time is an empty cell.

use std::io;
use std::path::{Path, PathBuf};

use nvl_core::{parse_date, parse_kickoff, DateFormat, Game, MatchResult, SetPoints};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::archive::write_atomic;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("cannot access dataset {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: {reason}")]
    InvalidRow { line: u64, reason: String },
    #[error("dataset is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GameRow {
    season: String,
    date: String,
    time: String,
    #[serde(rename = "ID")]
    number: String,
    home: String,
    home_sets: u8,
    home_points: String,
    away: String,
    away_sets: u8,
    away_points: String,
    division: String,
    category: String,
    venue: String,
    r1: String,
    r2: String,
}

impl From<&Game> for GameRow {
    fn from(game: &Game) -> Self {
        Self {
            season: game.season(),
            date: game.date.format("%Y-%m-%d").to_string(),
            time: game.kickoff(),
            number: game.number.clone(),
            home: game.home.clone(),
            home_sets: game.result.home_sets,
            home_points: game.result.home_points.to_string(),
            away: game.away.clone(),
            away_sets: game.result.away_sets,
            away_points: game.result.away_points.to_string(),
            division: game.division.to_string(),
            category: game.category.to_string(),
            venue: game.venue.clone(),
            r1: game.r1.clone(),
            r2: game.r2.clone(),
        }
    }
}

impl GameRow {
    /// The season column is derived from the date and not read back.
    fn into_game(self) -> Result<Game, String> {
        let date = parse_date(&self.date, DateFormat::Iso).map_err(|e| e.to_string())?;
        let time = match self.time.trim() {
            "" => None,
            raw => Some(parse_kickoff(raw).ok_or_else(|| format!("invalid time {raw:?}"))?),
        };
        let home_points: SetPoints = self.home_points.parse().map_err(|e| format!("{e}"))?;
        let away_points: SetPoints = self.away_points.parse().map_err(|e| format!("{e}"))?;

        let mut game = Game::new(self.home, self.away, date);
        game.time = time;
        game.number = self.number;
        game.result = MatchResult {
            home_sets: self.home_sets,
            away_sets: self.away_sets,
            home_points,
            away_points,
        };
        game.division = self.division.parse().map_err(|e| format!("{e}"))?;
        game.category = self.category.parse().map_err(|e| format!("{e}"))?;
        game.venue = self.venue;
        game.r1 = self.r1;
        game.r2 = self.r2;
        Ok(game)
    }
}

pub fn write_games<W: io::Write>(writer: W, games: &[Game]) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_writer(writer);
    for game in games {
        writer.serialize(GameRow::from(game))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_games<R: io::Read>(reader: R) -> Result<Vec<Game>, DatasetError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut games = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: GameRow = record
            .deserialize(Some(&headers))
            .map_err(|e| DatasetError::InvalidRow {
                line,
                reason: e.to_string(),
            })?;
        let game = row
            .into_game()
            .map_err(|reason| DatasetError::InvalidRow { line, reason })?;
        games.push(game);
    }
    Ok(games)
}

pub fn to_csv_string(games: &[Game]) -> Result<String, DatasetError> {
    let mut buf = Vec::new();
    write_games(&mut buf, games)?;
    Ok(String::from_utf8(buf)?)
}

/// Reads the canonical dataset. A missing file is an empty dataset (first run).
pub async fn load_dataset(path: &Path) -> Result<Vec<Game>, DatasetError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no dataset yet; starting empty");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(DatasetError::File {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let games = read_games(bytes.as_slice())?;
    debug!(path = %path.display(), games = games.len(), "dataset loaded");
    Ok(games)
}

/// Replaces the dataset file in one rename so readers never see a partial write.
pub async fn save_dataset(path: &Path, games: &[Game]) -> Result<(), DatasetError> {
    let csv = to_csv_string(games)?;
    write_atomic(path, csv.as_bytes())
        .await
        .map_err(|source| DatasetError::File {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), games = games.len(), "dataset saved");
    Ok(())
}
