use selectorfinder_core::MatchStrategy;
use selectorfinder_tools::browser::matcher::select;
use selectorfinder_tools::browser::snapshot::{assign_refs, parse_ax_tree};
use selectorfinder_tools::browser::AXNode;
use serde_json::Value;
use std::path::Path;
use std::path::PathBuf;

use super::load_config;

/// Build a tree from either a raw CDP `getFullAXTree` result (has `nodes`)
/// or a serialized `AXNode`. Nodes without refs get `s1e{n}` refs.
pub fn load_snapshot(raw: &Value) -> anyhow::Result<Option<AXNode>> {
    let mut root = if raw.get("nodes").is_some() {
        match parse_ax_tree(raw) {
            Some(root) => root,
            None => return Ok(None),
        }
    } else {
        serde_json::from_value::<AXNode>(raw.clone())?
    };
    if root.iter().all(|n| n.ref_id.is_none()) {
        assign_refs(&mut root, 1);
    }
    Ok(Some(root))
}

pub fn run(
    config_path: Option<PathBuf>,
    prompt: &str,
    file: &Path,
    strategy: Option<String>,
) -> anyhow::Result<()> {
    let (config, _paths) = load_config(config_path)?;
    let strategy: MatchStrategy = match strategy {
        Some(s) => s.parse()?,
        None => config.matcher.strategy,
    };

    let content = std::fs::read_to_string(file)?;
    let raw: Value = serde_json::from_str(&content)?;
    let root = load_snapshot(&raw)?;

    let result = select(root.as_ref(), prompt, strategy, &config.matcher.selector_prefix)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
