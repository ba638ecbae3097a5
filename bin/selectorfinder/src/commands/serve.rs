use selectorfinder_tools::mcp::McpServer;
use selectorfinder_tools::{ToolContext, ToolRegistry};
use std::path::PathBuf;
use tracing::info;

use super::load_config;

/// Serve the browser tools over stdio until the client disconnects.
pub async fn run(
    config_path: Option<PathBuf>,
    headless: bool,
    session: &str,
    strategy: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, paths) = load_config(config_path)?;
    if headless {
        config.browser.headless = true;
    }
    if let Some(s) = strategy {
        config.matcher.strategy = s.parse()?;
    }
    paths.ensure_dirs()?;

    info!(
        session,
        headless = config.browser.headless,
        strategy = config.matcher.strategy.name(),
        "Starting MCP server"
    );

    let ctx = ToolContext::new(config, &paths, session);
    let server = McpServer::new(ToolRegistry::with_defaults(), ctx);
    server.serve_stdio().await?;
    Ok(())
}
