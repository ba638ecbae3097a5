use std::collections::HashMap;
use std::sync::Arc;
use selectorfinder_core::{Error, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{Tool, ToolContext};
use crate::browser::{
    ClickTool, CloseTool, DragTool, GetSelectorTool, GoBackTool, GoForwardTool, HoverTool,
    NavigateTool, PressKeyTool, SaveAsPdfTool, SnapshotTool, TypeTool, WaitTool,
};

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        // Navigation
        registry.register(Arc::new(NavigateTool));
        registry.register(Arc::new(GoBackTool));
        registry.register(Arc::new(GoForwardTool));

        // Page inspection
        registry.register(Arc::new(SnapshotTool));
        registry.register(Arc::new(GetSelectorTool));

        // Interaction by ref
        registry.register(Arc::new(ClickTool));
        registry.register(Arc::new(HoverTool));
        registry.register(Arc::new(TypeTool));
        registry.register(Arc::new(DragTool));
        registry.register(Arc::new(PressKeyTool));

        // Misc
        registry.register(Arc::new(WaitTool));
        registry.register(Arc::new(SaveAsPdfTool));
        registry.register(Arc::new(CloseTool));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Tool descriptors in `tools/list` form, sorted by name.
    pub fn list_tool_schemas(&self) -> Vec<Value> {
        let mut schemas: Vec<Value> = self
            .tools
            .values()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "name": schema.name,
                    "description": schema.description,
                    "inputSchema": schema.parameters
                })
            })
            .collect();
        schemas.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        schemas
    }

    /// Get all registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> Result<Value> {
        let tool = self.get(name).ok_or_else(|| {
            Error::Tool(format!("Unknown tool: {}", name))
        })?;

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "Tool validation failed");
            return Err(e);
        }

        debug!(tool = name, "Executing tool");
        tool.execute(ctx, params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
