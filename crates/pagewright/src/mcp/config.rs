use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::client::{McpToolHandler, StdioMcpServer};
use crate::errors::SetupError;
use crate::models::tool::Tool;
use crate::registry::ToolRegistry;

/// The standard `mcpServers` configuration file shape.
#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub servers: HashMap<String, McpServerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpConfig {
    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SetupError::McpConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| SetupError::McpConfig(format!("cannot parse {}: {e}", path.display())))
    }
}

/// Spawn every configured server, list its tools and register each one
/// in the registry. Any spawn, handshake or listing failure is fatal.
/// The returned handles keep the child processes alive; drop them (via
/// shutdown) when the submission is finished.
pub async fn connect_servers(
    config: &McpConfig,
    registry: &mut ToolRegistry,
) -> Result<Vec<Arc<StdioMcpServer>>, SetupError> {
    let mut handles = Vec::with_capacity(config.servers.len());

    for (name, server_config) in &config.servers {
        let server = StdioMcpServer::spawn(
            name,
            &server_config.command,
            &server_config.args,
            &server_config.env,
        )
        .await
        .map_err(|e| SetupError::McpServer {
            server: name.clone(),
            message: e.to_string(),
        })?;
        let server = Arc::new(server);

        let tools = server.list_tools().await.map_err(|e| SetupError::McpServer {
            server: name.clone(),
            message: e.to_string(),
        })?;
        info!(server = %name, tool_count = tools.len(), "connected MCP server");

        for definition in tools {
            let tool = Tool::new(
                definition.name.clone(),
                definition.description,
                definition.input_schema,
            );
            let handler = McpToolHandler::new(server.clone(), definition.name);
            registry.register(tool, Box::new(handler))?;
        }

        handles.push(server);
    }

    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_standard_config() {
        let raw = r#"{
            "mcpServers": {
                "browser": {
                    "command": "npx",
                    "args": ["-y", "@playwright/mcp@latest"],
                    "env": {"HEADLESS": "1"}
                },
                "search": {
                    "command": "uvx",
                    "args": ["mcp-server-fetch"]
                }
            }
        }"#;
        let config: McpConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers["browser"].command, "npx");
        assert_eq!(config.servers["browser"].env["HEADLESS"], "1");
        assert!(config.servers["search"].env.is_empty());
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = McpConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, SetupError::McpConfig(_)));
    }

    #[test]
    fn test_load_rejects_missing_file() {
        let err = McpConfig::load(Path::new("/nonexistent/mcp.json")).unwrap_err();
        assert!(matches!(err, SetupError::McpConfig(_)));
    }
}
