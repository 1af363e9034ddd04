use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STATE_FILE_NAME: &str = "daily_pick.txt";

pub fn data_root() -> Result<PathBuf> {
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("espen"))
}

pub fn default_videos_dir() -> Result<PathBuf> {
    Ok(data_root()?.join("videos"))
}

pub fn default_database_path() -> Result<PathBuf> {
    Ok(data_root()?.join("espen.db"))
}

/// The text state file lives next to the videos it refers to.
pub fn default_state_file(videos_dir: &Path) -> PathBuf {
    videos_dir.join(STATE_FILE_NAME)
}
