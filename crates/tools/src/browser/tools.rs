//! Protocol-facing browser tools.
//!
//! Each tool is a unit struct implementing [`Tool`]. Tools that change the
//! page return a fresh snapshot so the caller always holds current refs.

use async_trait::async_trait;
use selectorfinder_core::{Error, MatchError, MatchStrategy, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::{Tool, ToolContext, ToolSchema};
use super::matcher::{select, SelectorResult};
use super::session::{BrowserSession, SnapshotProvider};
use super::snapshot::{render_tree, AXNode};

/// Upper bound for `browser_wait`, in seconds.
const MAX_WAIT_SECS: f64 = 10.0;

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Validation(format!("Missing required parameter: {}", key)))
}

fn element_params(params: &Value, element_key: &str, ref_key: &str) -> Result<()> {
    required_str(params, element_key)?;
    let r = required_str(params, ref_key)?;
    if r.trim().is_empty() {
        return Err(Error::Validation(format!("Parameter '{}' must not be empty", ref_key)));
    }
    Ok(())
}

fn element_schema(verb: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "element": {
                "type": "string",
                "description": format!("Human-readable element description used to obtain permission to {} the element", verb)
            },
            "ref": {
                "type": "string",
                "description": "Exact target element reference from the page snapshot"
            }
        },
        "required": ["element", "ref"]
    })
}

fn no_params_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Page header plus the rendered tree, the text every page-changing tool returns.
pub fn format_snapshot(url: &str, title: &str, root: Option<&AXNode>) -> String {
    let tree = match root {
        Some(root) => render_tree(root, true, None),
        None => "(no accessible content)\n".to_string(),
    };
    format!(
        "- Page URL: {}\n- Page Title: {}\n- Page Snapshot\n```yaml\n{}```",
        url, title, tree
    )
}

async fn snapshot_text(session: &mut BrowserSession) -> Result<String> {
    let root = session.capture_snapshot().await?;
    let url = match session.page_url().await {
        Ok(url) => url,
        Err(_) => session.current_url.clone().unwrap_or_default(),
    };
    let title = session.page_title().await.unwrap_or_default();
    Ok(format_snapshot(&url, &title, root.as_ref()))
}

/// Capture a fresh snapshot from `provider` and match `prompt` against it.
///
/// A blank prompt fails before the provider is touched.
pub async fn find_selector<P: SnapshotProvider + ?Sized>(
    provider: &mut P,
    prompt: &str,
    strategy: MatchStrategy,
    prefix: &str,
) -> Result<SelectorResult> {
    if prompt.trim().is_empty() {
        return Err(MatchError::EmptyPrompt.into());
    }
    let root = provider.capture().await?;
    let result = select(root.as_ref(), prompt, strategy, prefix)?;
    debug!(prompt, strategy = strategy.name(), selector = %result.selector, "Selector matched");
    Ok(result)
}

// ============ browser_navigate ============

pub struct NavigateTool;

#[async_trait]
impl Tool for NavigateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_navigate",
            description: "Navigate to a URL and return a snapshot of the resulting page.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "The URL to navigate to"}
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let raw = required_str(params, "url")?;
        url::Url::parse(raw).map_err(|e| Error::Validation(format!("Invalid url '{}': {}", raw, e)))?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let url = required_str(&params, "url")?;
        let mut session = ctx.browser.ensure_session().await?;
        info!(url, "Navigating");
        session.navigate(url).await?;
        let snapshot = snapshot_text(&mut session).await?;
        Ok(json!(format!("Navigated to {}\n\n{}", url, snapshot)))
    }
}

// ============ browser_go_back / browser_go_forward ============

pub struct GoBackTool;
pub struct GoForwardTool;

async fn go_history(ctx: ToolContext, delta: i64) -> Result<Value> {
    let mut session = ctx.browser.ensure_session().await?;
    let direction = if delta < 0 { "back" } else { "forward" };
    if !session.go_history(delta).await? {
        return Ok(json!(format!("No page to go {} to", direction)));
    }
    let snapshot = snapshot_text(&mut session).await?;
    Ok(json!(format!("Navigated {}\n\n{}", direction, snapshot)))
}

#[async_trait]
impl Tool for GoBackTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_go_back",
            description: "Go back to the previous page.",
            parameters: no_params_schema(),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        go_history(ctx, -1).await
    }
}

#[async_trait]
impl Tool for GoForwardTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_go_forward",
            description: "Go forward to the next page.",
            parameters: no_params_schema(),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        go_history(ctx, 1).await
    }
}

// ============ browser_snapshot ============

pub struct SnapshotTool;

#[async_trait]
impl Tool for SnapshotTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_snapshot",
            description: "Capture an accessibility snapshot of the current page. Element refs in the snapshot are valid until the next snapshot.",
            parameters: no_params_schema(),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        let mut session = ctx.browser.ensure_session().await?;
        Ok(json!(snapshot_text(&mut session).await?))
    }
}

// ============ browser_click / browser_hover ============

pub struct ClickTool;
pub struct HoverTool;

#[async_trait]
impl Tool for ClickTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_click",
            description: "Perform a click on an element identified by a snapshot ref.",
            parameters: element_schema("interact with"),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        element_params(params, "element", "ref")
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let element = required_str(&params, "element")?;
        let target = required_str(&params, "ref")?;
        let mut session = ctx.browser.ensure_session().await?;
        session.click(target).await?;
        let snapshot = snapshot_text(&mut session).await?;
        Ok(json!(format!("\"{}\" clicked\n\n{}", element, snapshot)))
    }
}

#[async_trait]
impl Tool for HoverTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_hover",
            description: "Hover the mouse over an element identified by a snapshot ref.",
            parameters: element_schema("hover over"),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        element_params(params, "element", "ref")
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let element = required_str(&params, "element")?;
        let target = required_str(&params, "ref")?;
        let mut session = ctx.browser.ensure_session().await?;
        session.hover(target).await?;
        let snapshot = snapshot_text(&mut session).await?;
        Ok(json!(format!("Hovered over \"{}\"\n\n{}", element, snapshot)))
    }
}

// ============ browser_type ============

pub struct TypeTool;

#[async_trait]
impl Tool for TypeTool {
    fn schema(&self) -> ToolSchema {
        let mut parameters = element_schema("type into");
        parameters["properties"]["text"] = json!({
            "type": "string",
            "description": "Text to type into the element"
        });
        parameters["properties"]["submit"] = json!({
            "type": "boolean",
            "description": "Whether to submit entered text (press Enter after)"
        });
        parameters["required"] = json!(["element", "ref", "text"]);
        ToolSchema {
            name: "browser_type",
            description: "Type text into an editable element.",
            parameters,
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        element_params(params, "element", "ref")?;
        required_str(params, "text")?;
        if let Some(submit) = params.get("submit") {
            if !submit.is_boolean() && !submit.is_null() {
                return Err(Error::Validation("Parameter 'submit' must be a boolean".to_string()));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let element = required_str(&params, "element")?;
        let target = required_str(&params, "ref")?;
        let text = required_str(&params, "text")?;
        let submit = params.get("submit").and_then(|v| v.as_bool()).unwrap_or(false);
        let mut session = ctx.browser.ensure_session().await?;
        session.type_text(target, text, submit).await?;
        let snapshot = snapshot_text(&mut session).await?;
        Ok(json!(format!("Typed \"{}\" into \"{}\"\n\n{}", text, element, snapshot)))
    }
}

// ============ browser_drag ============

pub struct DragTool;

#[async_trait]
impl Tool for DragTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_drag",
            description: "Perform drag and drop between two elements.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "startElement": {"type": "string", "description": "Human-readable source element description"},
                    "startRef": {"type": "string", "description": "Exact source element reference from the page snapshot"},
                    "endElement": {"type": "string", "description": "Human-readable target element description"},
                    "endRef": {"type": "string", "description": "Exact target element reference from the page snapshot"}
                },
                "required": ["startElement", "startRef", "endElement", "endRef"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        element_params(params, "startElement", "startRef")?;
        element_params(params, "endElement", "endRef")
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let start_element = required_str(&params, "startElement")?;
        let start_ref = required_str(&params, "startRef")?;
        let end_element = required_str(&params, "endElement")?;
        let end_ref = required_str(&params, "endRef")?;
        let mut session = ctx.browser.ensure_session().await?;
        session.drag(start_ref, end_ref).await?;
        let snapshot = snapshot_text(&mut session).await?;
        Ok(json!(format!(
            "Dragged \"{}\" to \"{}\"\n\n{}",
            start_element, end_element, snapshot
        )))
    }
}

// ============ browser_press_key ============

pub struct PressKeyTool;

#[async_trait]
impl Tool for PressKeyTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_press_key",
            description: "Press a key on the keyboard, e.g. 'ArrowLeft', 'a' or 'Ctrl+A'.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Name of the key to press or a character to generate"}
                },
                "required": ["key"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let key = required_str(params, "key")?;
        if key.is_empty() {
            return Err(Error::Validation("Parameter 'key' must not be empty".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let key = required_str(&params, "key")?;
        let mut session = ctx.browser.ensure_session().await?;
        session.press_key(key).await?;
        Ok(json!(format!("Pressed key {}", key)))
    }
}

// ============ browser_wait ============

pub struct WaitTool;

fn wait_secs(params: &Value) -> f64 {
    params
        .get("time")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, MAX_WAIT_SECS)
}

#[async_trait]
impl Tool for WaitTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_wait",
            description: "Wait for a specified time in seconds (at most 10).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "time": {"type": "number", "description": "The time to wait in seconds"}
                },
                "required": ["time"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let time = params
            .get("time")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| Error::Validation("Missing required parameter: time".to_string()))?;
        if !time.is_finite() || time < 0.0 {
            return Err(Error::Validation("Parameter 'time' must be a non-negative number".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let secs = wait_secs(&params);
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        Ok(json!(format!("Waited for {} seconds", secs)))
    }
}

// ============ browser_save_as_pdf ============

pub struct SaveAsPdfTool;

#[async_trait]
impl Tool for SaveAsPdfTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_save_as_pdf",
            description: "Save the current page as a PDF file.",
            parameters: no_params_schema(),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        let output_dir = ctx.output_dir();
        let mut session = ctx.browser.ensure_session().await?;
        let path = session.save_pdf(&output_dir).await?;
        info!(path = %path.display(), "Saved page as PDF");
        Ok(json!(format!("Saved as {}", path.display())))
    }
}

// ============ browser_close ============

pub struct CloseTool;

#[async_trait]
impl Tool for CloseTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_close",
            description: "Close the page and shut down the browser.",
            parameters: no_params_schema(),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        if !ctx.browser.close().await {
            debug!("browser_close called with no running browser");
        }
        Ok(json!("Page closed"))
    }
}

// ============ get_selector ============

pub struct GetSelectorTool;

impl GetSelectorTool {
    fn strategy(params: &Value, default: MatchStrategy) -> Result<MatchStrategy> {
        match params.get("strategy").and_then(|v| v.as_str()) {
            Some(s) => s.parse(),
            None => Ok(default),
        }
    }
}

#[async_trait]
impl Tool for GetSelectorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_selector",
            description: "Find the element on the current page that best matches a natural-language description and return a selector for it.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Natural-language description of the element, e.g. 'submit button'"
                    },
                    "strategy": {
                        "type": "string",
                        "enum": ["first_match", "token_overlap"],
                        "description": "Matching strategy: 'first_match' returns the first element whose name or role contains the prompt; 'token_overlap' scores elements by shared words"
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let prompt = required_str(params, "prompt")?;
        if prompt.trim().is_empty() {
            return Err(MatchError::EmptyPrompt.into());
        }
        Self::strategy(params, MatchStrategy::default())?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let prompt = required_str(&params, "prompt")?;
        let strategy = Self::strategy(&params, ctx.config.matcher.strategy)?;
        let mut session = ctx.browser.ensure_session().await?;
        let prefix = session.selector_prefix().to_string();
        let result = find_selector(&mut *session, prompt, strategy, &prefix).await?;
        Ok(serde_json::to_value(result)?)
    }
}
