use selectorfinder_tools::{ToolContext, ToolRegistry};
use serde_json::Value;
use std::path::PathBuf;

use super::load_config;

/// List all registered tools.
pub fn list() {
    let registry = ToolRegistry::with_defaults();
    let schemas = registry.list_tool_schemas();

    println!();
    println!("Registered tools ({} total)", schemas.len());
    println!();
    for schema in &schemas {
        let name = schema["name"].as_str().unwrap_or("");
        let desc = schema["description"].as_str().unwrap_or("");
        let short_desc: String = desc.chars().take(60).collect();
        let ellipsis = if desc.chars().count() > 60 { "..." } else { "" };
        println!("  {:<22} {}{}", name, short_desc, ellipsis);
    }
    println!();
}

/// Show detailed info for a specific tool.
pub fn info(tool_name: &str) -> anyhow::Result<()> {
    let registry = ToolRegistry::with_defaults();
    let schemas = registry.list_tool_schemas();
    let schema = schemas
        .iter()
        .find(|s| s["name"].as_str() == Some(tool_name))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Tool '{}' not found. Use `selectorfinder tools list` to see all available tools.",
                tool_name
            )
        })?;

    println!();
    println!("{}", tool_name);
    println!();
    println!("  Description: {}", schema["description"].as_str().unwrap_or(""));
    println!();

    let params = &schema["inputSchema"];
    let required: Vec<&str> = params
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    match params.get("properties").and_then(|p| p.as_object()) {
        Some(props) if !props.is_empty() => {
            println!("  Parameters:");
            for (key, val) in props {
                let typ = val.get("type").and_then(|t| t.as_str()).unwrap_or("any");
                let req = if required.contains(&key.as_str()) { " (required)" } else { "" };
                let enum_str = val
                    .get("enum")
                    .and_then(|e| e.as_array())
                    .map(|arr| {
                        let vals: Vec<&str> = arr.iter().filter_map(|v| v.as_str()).collect();
                        format!(" [{}]", vals.join("|"))
                    })
                    .unwrap_or_default();
                println!("    {:<20} {:<8}{}{}", key, typ, req, enum_str);
                if let Some(desc) = val.get("description").and_then(|d| d.as_str()) {
                    println!("      {}", desc);
                }
            }
        }
        _ => println!("  Parameters: none"),
    }
    println!();
    Ok(())
}

/// Call a tool directly with JSON params, in a fresh browser context.
pub async fn test(config_path: Option<PathBuf>, tool_name: &str, params_json: &str) -> anyhow::Result<()> {
    let (config, paths) = load_config(config_path)?;
    let registry = ToolRegistry::with_defaults();

    let params: Value = serde_json::from_str(params_json)
        .map_err(|e| anyhow::anyhow!("Failed to parse JSON params: {}", e))?;

    let ctx = ToolContext::new(config, &paths, "cli:test");
    let browser = ctx.browser.clone();

    eprintln!("Executing {} ...", tool_name);
    let result = registry.execute(tool_name, ctx, params).await;
    browser.close().await;

    let value = result?;
    match value {
        Value::String(text) => println!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}
