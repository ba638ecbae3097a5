pub mod browser;
pub mod mcp;
pub mod registry;

use async_trait::async_trait;
use selectorfinder_core::{Config, Paths, Result};
use serde_json::Value;
use std::path::PathBuf;

use browser::BrowserContext;

pub use registry::ToolRegistry;

/// Truncate a string to at most `max_chars` bytes, respecting UTF-8 char boundaries.
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    if s.len() <= max_chars {
        return s;
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[derive(Clone)]
pub struct ToolContext {
    pub workspace: PathBuf,
    pub config: Config,
    pub browser: BrowserContext,
}

impl ToolContext {
    /// Context with its own browser, named `session_name`.
    pub fn new(config: Config, paths: &Paths, session_name: &str) -> Self {
        let browser = BrowserContext::from_config(session_name, &config, paths);
        Self {
            workspace: paths.workspace(),
            config,
            browser,
        }
    }

    /// Where generated files (PDFs) are written.
    pub fn output_dir(&self) -> PathBuf {
        self.workspace.join("output")
    }
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    fn validate(&self, params: &Value) -> Result<()>;
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value>;
}
