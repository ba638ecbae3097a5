use selectorfinder_core::Result;
use selectorfinder_tools::browser::SelectorResult;
use selectorfinder_tools::mcp::{FinderOptions, SelectorFinder};
use std::path::PathBuf;

use super::load_config;

/// Drive a `serve` child process through `SelectorFinder` and print the result.
pub async fn run(
    config_path: Option<PathBuf>,
    prompt: &str,
    url: Option<String>,
    headless: bool,
    retries: Option<u32>,
    timeout: Option<u64>,
) -> anyhow::Result<()> {
    let (config, _paths) = load_config(config_path.clone())?;
    let mut options = FinderOptions::from_config(&config);
    options.headless |= headless;
    if let Some(r) = retries {
        options.retries = r;
    }
    if let Some(t) = timeout {
        options.timeout_ms = t;
    }
    // the child must read the same config file
    if options.server_command.is_none() {
        if let Some(path) = config_path {
            options.server_command = Some(std::env::current_exe()?.to_string_lossy().into_owned());
            options.server_args = vec![
                "--config".to_string(),
                path.to_string_lossy().into_owned(),
                "serve".to_string(),
            ];
        }
    }

    let mut finder = SelectorFinder::new(options);
    finder.init().await?;

    let outcome = lookup(&finder, url.as_deref(), prompt).await;
    finder.close().await;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn lookup(finder: &SelectorFinder, url: Option<&str>, prompt: &str) -> Result<SelectorResult> {
    if let Some(url) = url {
        finder.navigate(url).await?;
    }
    finder.find_selector(prompt).await
}
