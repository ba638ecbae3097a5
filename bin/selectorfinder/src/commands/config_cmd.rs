use selectorfinder_core::Config;
use std::path::PathBuf;

use super::load_config;

/// Print the effective configuration as JSON.
pub fn show(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _paths) = load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Write the default configuration file.
pub fn init(config_path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = match config_path {
        Some(p) => p,
        None => selectorfinder_core::Paths::new().config_file(),
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
