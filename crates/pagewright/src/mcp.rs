//! MCP (Model Context Protocol) client support. Tools come from
//! external MCP servers spawned as child processes and spoken to over
//! stdin/stdout JSON-RPC; each remote tool is wrapped in a handler and
//! registered like any local tool.

use thiserror::Error;

pub mod client;
pub mod config;
pub mod protocol;

pub use client::{McpToolHandler, StdioMcpServer};
pub use config::{connect_servers, McpConfig, McpServerConfig};

/// Transport and protocol failures while talking to an MCP server.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP request timed out")]
    Timeout,
}

impl From<std::io::Error> for McpError {
    fn from(e: std::io::Error) -> Self {
        McpError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        McpError::Protocol(e.to_string())
    }
}
