pub mod config_cmd;
pub mod find;
pub mod match_cmd;
pub mod serve;
pub mod tools_cmd;

use selectorfinder_core::{Config, Paths};
use std::path::PathBuf;

/// Load the config from `explicit` if given, else from the default location.
pub fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<(Config, Paths)> {
    let paths = Paths::new();
    let config = match explicit {
        Some(path) => Config::load(&path)?,
        None => Config::load_or_default(&paths)?,
    };
    Ok((config, paths))
}
