//! MCP server: newline-delimited JSON-RPC over a byte stream (normally stdio).
//!
//! Requests are handled one at a time in arrival order. Tool failures are
//! reported inside the `tools/call` result with `isError: true`; JSON-RPC
//! errors are reserved for protocol problems.

use selectorfinder_core::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::{ToolContext, ToolRegistry};
use super::protocol::{
    text_result, JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};

pub const CONSOLE_RESOURCE_URI: &str = "browser://console";

pub struct McpServer {
    registry: ToolRegistry,
    ctx: ToolContext,
}

impl McpServer {
    pub fn new(registry: ToolRegistry, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Read one message per line from `reader`, write one response per line to
    /// `writer`. The browser is closed when the input ends.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        info!(tools = self.registry.tool_names().len(), "MCP server ready");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        debug!("MCP input closed, shutting down");
        self.ctx.browser.close().await;
        Ok(())
    }

    /// Handle one raw line. `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Unparseable MCP message");
                return Some(JsonRpcResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {}", e)));
            }
        };
        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::failure(id, INVALID_REQUEST, format!("Invalid request: {}", e))),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, id = ?request.id, "MCP ← request");

        let Some(id) = request.id.clone() else {
            // notifications/initialized and friends need no answer
            debug!(method = %request.method, "MCP notification");
            return None;
        };
        let params = request.params.unwrap_or_else(|| json!({}));

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(
                id,
                json!({"tools": self.registry.list_tool_schemas()}),
            ),
            "tools/call" => self.call_tool(id, &params).await,
            "resources/list" => JsonRpcResponse::success(
                id,
                json!({"resources": [{
                    "uri": CONSOLE_RESOURCE_URI,
                    "name": "Page console",
                    "description": "Console messages logged by the current page",
                    "mimeType": "text/plain"
                }]}),
            ),
            "resources/read" => self.read_resource(id, &params).await,
            other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        };
        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {}
            },
            "serverInfo": {
                "name": "selectorfinder",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    async fn call_tool(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing tool name");
        };
        if self.registry.get(name).is_none() {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, format!("Unknown tool: {}", name));
        }
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let result = match self.registry.execute(name, self.ctx.clone(), arguments).await {
            Ok(Value::String(text)) => text_result(&text, false),
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                text_result(&text, false)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool call failed");
                text_result(&e.to_string(), true)
            }
        };
        JsonRpcResponse::success(id, result)
    }

    async fn read_resource(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(uri) = params.get("uri").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing resource uri");
        };
        if uri != CONSOLE_RESOURCE_URI {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, format!("Resource not found: {}", uri));
        }
        let messages = self.ctx.browser.console_messages().await;
        JsonRpcResponse::success(
            id,
            json!({"contents": [{
                "uri": uri,
                "mimeType": "text/plain",
                "text": messages.join("\n")
            }]}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selectorfinder_core::{Config, Paths};
    use std::path::PathBuf;

    fn server() -> McpServer {
        let paths = Paths::with_base(PathBuf::from("/tmp/selectorfinder-test"));
        let ctx = ToolContext::new(Config::default(), &paths, "test");
        McpServer::new(ToolRegistry::with_defaults(), ctx)
    }

    async fn call(server: &McpServer, msg: Value) -> Value {
        let resp = server.handle_line(&msg.to_string()).await.unwrap();
        serde_json::to_value(resp).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let s = server();
        let resp = call(&s, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})).await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], "2024-11-05");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
        assert!(resp["result"]["capabilities"]["resources"].is_object());
        assert_eq!(resp["result"]["serverInfo"]["name"], "selectorfinder");
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let s = server();
        let line = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(s.handle_line(&line).await.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let s = server();
        let resp = call(&s, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        for expected in [
            "browser_navigate", "browser_go_back", "browser_go_forward", "browser_snapshot",
            "browser_click", "browser_hover", "browser_type", "browser_press_key",
            "browser_wait", "browser_save_as_pdf", "browser_close", "get_selector",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        for tool in tools {
            assert_eq!(tool["inputSchema"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let s = server();
        let resp = call(&s, json!({"jsonrpc": "2.0", "id": 3, "method": "sampling/create"})).await;
        assert_eq!(resp["error"]["code"], -32601);
        assert!(resp.get("result").is_none());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let s = server();
        let resp = s.handle_line("{not json").await.unwrap();
        let v = serde_json::to_value(resp).unwrap();
        assert_eq!(v["error"]["code"], -32700);
        assert_eq!(v["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_tool_error_is_in_band() {
        let s = server();
        let resp = call(&s, json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "get_selector", "arguments": {"prompt": ""}}
        })).await;
        assert!(resp.get("error").is_none());
        assert_eq!(resp["result"]["isError"], true);
        assert_eq!(resp["result"]["content"][0]["text"], "Prompt must not be empty");
    }

    #[tokio::test]
    async fn test_tools_call_bad_params() {
        let s = server();
        let resp = call(&s, json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {}})).await;
        assert_eq!(resp["error"]["code"], -32602);

        let resp = call(&s, json!({
            "jsonrpc": "2.0", "id": 6, "method": "tools/call",
            "params": {"name": "browser_teleport"}
        })).await;
        assert_eq!(resp["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_tools_call_success_text() {
        let s = server();
        let resp = call(&s, json!({
            "jsonrpc": "2.0", "id": 7, "method": "tools/call",
            "params": {"name": "browser_wait", "arguments": {"time": 0}}
        })).await;
        assert!(resp["result"].get("isError").is_none());
        assert_eq!(resp["result"]["content"][0]["text"], "Waited for 0 seconds");
    }

    #[tokio::test]
    async fn test_resources() {
        let s = server();
        let resp = call(&s, json!({"jsonrpc": "2.0", "id": 8, "method": "resources/list"})).await;
        assert_eq!(resp["result"]["resources"][0]["uri"], "browser://console");
        assert_eq!(resp["result"]["resources"][0]["mimeType"], "text/plain");

        let resp = call(&s, json!({
            "jsonrpc": "2.0", "id": 9, "method": "resources/read",
            "params": {"uri": "browser://console"}
        })).await;
        assert_eq!(resp["result"]["contents"][0]["text"], "");

        let resp = call(&s, json!({
            "jsonrpc": "2.0", "id": 10, "method": "resources/read",
            "params": {"uri": "browser://network"}
        })).await;
        assert_eq!(resp["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_serve_over_duplex() {
        let s = server();
        let input = format!(
            "{}\n\n{}\n{}\n",
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "nope"}),
        );
        let mut output = Vec::new();
        s.serve(input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["result"], json!({}));
        assert_eq!(lines[1]["error"]["code"], -32601);
    }
}
