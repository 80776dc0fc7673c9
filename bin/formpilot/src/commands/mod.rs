pub mod apply;
pub mod doctor;
pub mod init;
pub mod parse;
pub mod scrape;

use formpilot_core::{Config, Paths};
use std::path::{Path, PathBuf};

pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Paths::new().config_file())
}

/// Load the explicit config file, or the default one when it exists.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::load_or_default(&Paths::new())?),
    }
}
