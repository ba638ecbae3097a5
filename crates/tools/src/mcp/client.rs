use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use selectorfinder_core::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, warn};

use super::protocol::{joined_text, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};

#[derive(Debug, Clone, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// How long a server gets to exit on its own after its stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>>>;

/// Client side of an MCP server running as a child process.
pub struct McpClient {
    server_name: String,
    /// `None` once the client has closed the pipe.
    stdin: Mutex<Option<ChildStdin>>,
    next_id: AtomicU64,
    pending: PendingMap,
    tools: Mutex<Vec<McpTool>>,
    request_timeout: Duration,
    child: Mutex<Child>,
    reader: tokio::task::JoinHandle<()>,
}

impl McpClient {
    /// Launch the server and perform the initialize handshake.
    pub async fn start(
        server_name: &str,
        command: &str,
        args: &[String],
        request_timeout: Duration,
    ) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Tool(format!("MCP[{}]: failed to spawn '{}': {}", server_name, command, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Tool(format!("MCP[{}]: no stdin", server_name)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Tool(format!("MCP[{}]: no stdout", server_name)))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(Self::reader_task(stdout, pending.clone(), server_name.to_string()));

        let client = Self {
            server_name: server_name.to_string(),
            stdin: Mutex::new(Some(stdin)),
            next_id: AtomicU64::new(1),
            pending,
            tools: Mutex::new(Vec::new()),
            request_timeout,
            child: Mutex::new(child),
            reader,
        };

        client.initialize().await?;
        client.refresh_tools().await?;

        Ok(client)
    }

    async fn write_message(&self, message: &JsonRpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| Error::Tool(format!("MCP[{}]: client closed", self.server_name)))?;
        stdin.write_all(line.as_bytes()).await.map_err(|e| {
            Error::Tool(format!("MCP[{}]: write error: {}", self.server_name, e))
        })?;
        stdin.flush().await.map_err(|e| {
            Error::Tool(format!("MCP[{}]: flush error: {}", self.server_name, e))
        })
    }

    /// Send a JSON-RPC request and wait for the response.
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        debug!(server = %self.server_name, id, method, "MCP → request");
        if let Err(e) = self.write_message(&JsonRpcRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(payload)) => payload.map_err(|e| Error::Tool(format!("MCP[{}]: {}", self.server_name, e))),
            Ok(Err(_)) => Err(Error::Tool(format!("MCP[{}]: server closed", self.server_name))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout(format!(
                    "MCP[{}]: '{}' got no response within {}ms",
                    self.server_name,
                    method,
                    self.request_timeout.as_millis()
                )))
            }
        }
    }

    /// `initialize` followed by the `notifications/initialized` notification.
    async fn initialize(&self) -> Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "selectorfinder",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self.call("initialize", Some(params)).await?;
        debug!(server = %self.server_name, ?result, "MCP initialized");

        self.write_message(&JsonRpcRequest::notification("notifications/initialized"))
            .await
    }

    /// Fetch tools/list and cache them locally.
    pub async fn refresh_tools(&self) -> Result<()> {
        let result = self.call("tools/list", None).await?;
        let tools: Vec<McpTool> = serde_json::from_value(
            result.get("tools").cloned().unwrap_or(Value::Array(vec![])),
        )
        .map_err(|e| Error::Tool(format!("MCP[{}]: parse tools: {}", self.server_name, e)))?;
        debug!(server = %self.server_name, count = tools.len(), "MCP tools loaded");
        *self.tools.lock().await = tools;
        Ok(())
    }

    /// Return cached tool list.
    pub async fn list_tools(&self) -> Vec<McpTool> {
        self.tools.lock().await.clone()
    }

    /// Call tools/call; text content is joined into a single string.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        let params = json!({
            "name": tool_name,
            "arguments": arguments
        });
        let result = self.call("tools/call", Some(params)).await?;
        tool_call_output(result)
    }

    /// Close the server's stdin and let it shut down; kill it only if it is
    /// still running after [`SHUTDOWN_GRACE`].
    pub async fn close(&self) {
        drop(self.stdin.lock().await.take());

        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.server_name, %status, "MCP server exited");
            }
            Ok(Err(e)) => {
                warn!(server = %self.server_name, error = %e, "MCP: waiting for server failed");
                let _ = child.kill().await;
            }
            Err(_) => {
                warn!(server = %self.server_name, "MCP server ignored EOF, killing it");
                if let Err(e) = child.kill().await {
                    debug!(server = %self.server_name, error = %e, "MCP server already exited");
                }
            }
        }
        self.reader.abort();
    }

    /// Dispatches incoming JSON-RPC responses to waiting callers.
    async fn reader_task(stdout: ChildStdout, pending: PendingMap, server_name: String) {
        let mut lines = BufReader::new(stdout).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    debug!(server = %server_name, "MCP ← {}", crate::safe_truncate(&line, 200));
                    match serde_json::from_str::<JsonRpcResponse>(&line) {
                        Ok(resp) => {
                            let Some(id) = resp.id.as_u64() else {
                                continue;
                            };
                            if let Some(tx) = pending.lock().await.remove(&id) {
                                let payload = match resp.error {
                                    Some(err) => Err(format!("JSON-RPC error {}: {}", err.code, err.message)),
                                    None => Ok(resp.result.unwrap_or(Value::Null)),
                                };
                                let _ = tx.send(payload);
                            }
                        }
                        Err(e) => {
                            warn!(server = %server_name, "MCP: failed to parse response: {}", e);
                        }
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    error!(server = %server_name, "MCP: stdout closed");
                    fail_pending(&pending, "MCP server stdout closed").await;
                    break;
                }
                Err(e) => {
                    error!(server = %server_name, "MCP: read error: {}", e);
                    fail_pending(&pending, &format!("MCP read error: {}", e)).await;
                    break;
                }
            }
        }
    }
}

/// Answer every waiting caller with `reason`.
async fn fail_pending(pending: &PendingMap, reason: &str) {
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(Err(reason.to_string()));
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Interpret a `tools/call` result: `isError` becomes `Error::Tool`, text
/// blocks are joined into one string, anything else is passed through.
pub fn tool_call_output(result: Value) -> Result<Value> {
    if let Some(true) = result.get("isError").and_then(|v| v.as_bool()) {
        let msg = joined_text(&result).unwrap_or_else(|| "MCP tool returned an error".to_string());
        return Err(Error::Tool(msg));
    }
    match joined_text(&result) {
        Some(text) => Ok(Value::String(text)),
        None => Ok(result.get("content").cloned().unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_output_text() {
        let result = json!({"content": [{"type": "text", "text": "{\"selector\":\"aria-ref=s1e4\"}"}]});
        assert_eq!(
            tool_call_output(result).unwrap(),
            Value::String("{\"selector\":\"aria-ref=s1e4\"}".to_string())
        );
    }

    #[test]
    fn test_tool_call_output_error() {
        let result = json!({
            "content": [{"type": "text", "text": "No matching element found for: cart"}],
            "isError": true
        });
        let err = tool_call_output(result).unwrap_err();
        assert_eq!(err.to_string(), "Tool error: No matching element found for: cart");
    }

    #[test]
    fn test_tool_call_output_non_text() {
        let result = json!({"content": [{"type": "image", "data": "AAAA"}]});
        let out = tool_call_output(result).unwrap();
        assert_eq!(out[0]["type"], "image");
    }

    /// Answers the handshake, then runs `on_eof` once its stdin closes.
    #[cfg(unix)]
    fn handshake_server(on_eof: &str) -> Vec<String> {
        let script = format!(
            r#"read l; printf '%s\n' '{{"jsonrpc":"2.0","id":1,"result":{{}}}}'
read l
read l; printf '%s\n' '{{"jsonrpc":"2.0","id":2,"result":{{"tools":[]}}}}'
while read l; do :; done
{}"#,
            on_eof
        );
        vec!["-c".to_string(), script]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_lets_server_shut_down() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("shutdown");
        let args = handshake_server(&format!("touch '{}'", marker.display()));

        let client = McpClient::start("fake", "sh", &args, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(client.list_tools().await.is_empty());
        client.close().await;

        // close() returns only after the server has exited
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_calls_fail_after_close() {
        let args = handshake_server("exit 0");
        let client = McpClient::start("fake", "sh", &args, Duration::from_secs(5))
            .await
            .unwrap();
        client.close().await;

        let err = client.call_tool("get_selector", json!({"prompt": "x"})).await.unwrap_err();
        assert!(err.to_string().contains("client closed"));
    }

    #[tokio::test]
    async fn test_fail_pending_wakes_waiters() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(7, tx);

        fail_pending(&pending, "MCP read error: broken pipe").await;

        assert!(pending.lock().await.is_empty());
        assert_eq!(rx.await.unwrap(), Err("MCP read error: broken pipe".to_string()));
    }

    #[tokio::test]
    async fn test_start_missing_binary() {
        let err = McpClient::start(
            "missing",
            "/nonexistent/selectorfinder-server",
            &[],
            Duration::from_secs(1),
        )
        .await
        .err()
        .unwrap();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
