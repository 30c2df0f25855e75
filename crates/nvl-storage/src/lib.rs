//! Dataset persistence and the raw snapshot archive.

mod archive;
mod dataset;

pub use archive::{ArchivedSnapshot, SnapshotArchive};
pub use dataset::{
    load_dataset, read_games, save_dataset, to_csv_string, write_games, DatasetError,
};

pub const CRATE_NAME: &str = "nvl-storage";
