use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::paths::Paths;

/// How `get_selector` picks a node out of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// First node in pre-order whose name or role contains the prompt.
    #[default]
    FirstMatch,
    /// Node with the highest fraction of prompt tokens found in its name or role.
    TokenOverlap,
}

impl MatchStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FirstMatch => "first_match",
            Self::TokenOverlap => "token_overlap",
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "first_match" | "first" | "substring" => Ok(Self::FirstMatch),
            "token_overlap" | "tokens" | "scored" => Ok(Self::TokenOverlap),
            other => Err(Error::Validation(format!(
                "unknown match strategy '{}' (expected 'first_match' or 'token_overlap')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default)]
    pub headless: bool,
    /// Explicit browser binary; discovered on PATH when unset.
    #[serde(default)]
    pub executable_path: Option<String>,
    /// Persistent profile directory; a per-session directory under the base dir when unset.
    #[serde(default)]
    pub user_data_dir: Option<String>,
    #[serde(default = "default_navigation_wait_ms")]
    pub navigation_wait_ms: u64,
    #[serde(default = "default_action_wait_ms")]
    pub action_wait_ms: u64,
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
    #[serde(default = "default_window_size")]
    pub window_size: (u32, u32),
}

fn default_navigation_wait_ms() -> u64 {
    1500
}

fn default_action_wait_ms() -> u64 {
    500
}

fn default_launch_timeout_secs() -> u64 {
    15
}

fn default_window_size() -> (u32, u32) {
    (1280, 720)
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            executable_path: None,
            user_data_dir: None,
            navigation_wait_ms: default_navigation_wait_ms(),
            action_wait_ms: default_action_wait_ms(),
            launch_timeout_secs: default_launch_timeout_secs(),
            window_size: default_window_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherConfig {
    #[serde(default)]
    pub strategy: MatchStrategy,
    /// Prefix that turns a snapshot ref into a locator the resolver understands.
    #[serde(default = "default_selector_prefix")]
    pub selector_prefix: String,
}

fn default_selector_prefix() -> String {
    "aria-ref=".to_string()
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::default(),
            selector_prefix: default_selector_prefix(),
        }
    }
}

/// Options for the client side that drives a selector server over stdio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinderConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub debug: bool,
    /// Server command; the running executable with `serve` when unset.
    #[serde(default)]
    pub server_command: Option<String>,
    #[serde(default)]
    pub server_args: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            debug: false,
            server_command: None,
            server_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub finder: FinderConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_finder_options() {
        let cfg = Config::default();
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.finder.timeout_ms, 30_000);
        assert_eq!(cfg.finder.retries, 3);
        assert_eq!(cfg.finder.retry_delay_ms, 1000);
        assert!(!cfg.finder.debug);
        assert_eq!(cfg.matcher.selector_prefix, "aria-ref=");
        assert_eq!(cfg.matcher.strategy, MatchStrategy::FirstMatch);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let raw = r#"{ "browser": { "headless": true }, "matcher": { "strategy": "token_overlap" } }"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert!(cfg.browser.headless);
        assert_eq!(cfg.browser.navigation_wait_ms, 1500);
        assert_eq!(cfg.matcher.strategy, MatchStrategy::TokenOverlap);
        assert_eq!(cfg.matcher.selector_prefix, "aria-ref=");
        assert_eq!(cfg.finder.retries, 3);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut cfg = Config::default();
        cfg.finder.retries = 5;
        cfg.browser.executable_path = Some("/usr/bin/chromium".to_string());
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.finder.retries, 5);
        assert_eq!(loaded.browser.executable_path.as_deref(), Some("/usr/bin/chromium"));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        let cfg = Config::load_or_default(&paths).unwrap();
        assert_eq!(cfg.finder.timeout_ms, 30_000);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("first_match".parse::<MatchStrategy>().unwrap(), MatchStrategy::FirstMatch);
        assert_eq!("Token-Overlap".parse::<MatchStrategy>().unwrap(), MatchStrategy::TokenOverlap);
        assert!("fuzzy".parse::<MatchStrategy>().is_err());
        assert_eq!(MatchStrategy::TokenOverlap.name(), "token_overlap");
    }
}
