use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use super::protocol::{
    ClientCapabilities, ClientInfo, ContentBlock, InitializeParams, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, McpToolDefinition, ToolCallParams, ToolCallResult,
    PROTOCOL_VERSION,
};
use super::McpError;
use crate::errors::ToolError;
use crate::models::content::Content;
use crate::registry::ToolHandler;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Both halves of the pipe, locked together: a request is written and
/// its response consumed under one lock, so concurrent callers can
/// never read each other's responses off the shared stream.
struct Transport {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// An MCP server running as a child process, spoken to over
/// line-delimited JSON-RPC on stdin/stdout.
pub struct StdioMcpServer {
    name: String,
    next_id: AtomicU64,
    transport: Mutex<Transport>,
    child: Mutex<Option<Child>>,
}

impl StdioMcpServer {
    /// Spawn the server process and perform the initialize handshake.
    pub async fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        // Clear the inherited environment so host secrets do not leak
        // into the child; pass only the basics plus configured vars.
        cmd.env_clear();
        for key in &["PATH", "HOME", "USER", "LANG", "TERM"] {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stderr".into()))?;

        // The pipe must be drained or a chatty server fills it and
        // blocks mid-request.
        tokio::spawn(drain_stderr(name.to_string(), stderr));

        let server = Self {
            name: name.to_string(),
            next_id: AtomicU64::new(1),
            transport: Mutex::new(Transport {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            child: Mutex::new(Some(child)),
        };

        server.initialize().await?;

        Ok(server)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ClientCapabilities {},
            client_info: ClientInfo {
                name: "pagewright".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        let response = self
            .send_request("initialize", Some(serde_json::to_value(&params)?))
            .await?;
        debug!(server = %self.name, response = %response, "MCP server initialized");

        self.send_notification("notifications/initialized", None)
            .await
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        // One request on the wire at a time. The lock spans write and
        // read, so a response can only ever be consumed by the caller
        // whose request produced it.
        let mut transport = self.transport.lock().await;
        transport.stdin.write_all(line.as_bytes()).await?;
        transport.stdin.flush().await?;

        let response = tokio::time::timeout(
            REQUEST_TIMEOUT,
            Self::read_response(&self.name, &mut transport.stdout, id),
        )
        .await
        .map_err(|_| McpError::Timeout)??;

        response.into_result()
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let mut line = serde_json::to_string(&notification)?;
        line.push('\n');

        let mut transport = self.transport.lock().await;
        transport.stdin.write_all(line.as_bytes()).await?;
        transport.stdin.flush().await?;
        Ok(())
    }

    /// Read stdout lines until the response with the expected id shows
    /// up. Server-initiated notifications and log lines are skipped.
    async fn read_response(
        name: &str,
        stdout: &mut BufReader<ChildStdout>,
        expected_id: u64,
    ) -> Result<JsonRpcResponse, McpError> {
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = stdout.read_line(&mut buf).await?;
            if n == 0 {
                return Err(McpError::Transport("server closed stdout".into()));
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.id == Some(expected_id) => return Ok(response),
                Ok(response) => {
                    debug!(server = %name, id = ?response.id, "skipping non-matching message");
                }
                Err(_) => {
                    debug!(server = %name, line = trimmed, "ignoring non-JSON-RPC line");
                }
            }
        }
    }

    /// All tools this server advertises.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let result = self.send_request("tools/list", None).await?;

        let tools_value = result.get("tools").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(tools_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools list: {e}")))
    }

    /// Invoke one tool. An `isError` result comes back as `Err` so the
    /// registry reports it with the error flag set.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Vec<Content>, McpError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .send_request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;

        let call_result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("failed to parse tool result: {e}")))?;

        if call_result.is_error {
            let text = joined_text(&call_result.content);
            return Err(McpError::Protocol(format!("tool reported error: {text}")));
        }

        Ok(call_result
            .content
            .iter()
            .filter_map(block_to_content)
            .collect())
    }

    /// Kill the child process. Best effort; called on teardown.
    pub async fn shutdown(&self) {
        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

async fn drain_stderr(name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server = %name, line = %line, "server stderr");
    }
}

fn joined_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

fn block_to_content(block: &ContentBlock) -> Option<Content> {
    match block.content_type.as_str() {
        "text" => block.text.as_deref().map(Content::text),
        "image" => match (&block.data, &block.mime_type) {
            (Some(data), Some(mime_type)) => Some(Content::image(data, mime_type)),
            _ => None,
        },
        _ => None,
    }
}

/// Adapter that exposes one remote MCP tool as a registry handler.
pub struct McpToolHandler {
    server: Arc<StdioMcpServer>,
    tool_name: String,
}

impl McpToolHandler {
    pub fn new(server: Arc<StdioMcpServer>, tool_name: String) -> Self {
        Self { server, tool_name }
    }
}

#[async_trait]
impl ToolHandler for McpToolHandler {
    async fn call(&self, arguments: Value) -> Result<Vec<Content>, ToolError> {
        self.server
            .call_tool(&self.tool_name, arguments)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}
