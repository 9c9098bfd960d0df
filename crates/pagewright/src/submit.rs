//! The submission façade: one call that takes a prompt and optional
//! documents and drives everything through to the final HTML.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::Agent;
use crate::assembler::assemble;
use crate::config::Config;
use crate::document::PdfRenderer;
use crate::errors::SubmitError;
use crate::mcp::{connect_servers, McpConfig};
use crate::providers::factory::get_provider;
use crate::registry::ToolRegistry;

/// Run one submission end to end. Preprocessing and registry setup
/// failures are fatal and reported before any model call is made.
pub async fn submit(
    prompt: &str,
    documents: &[PathBuf],
    config: &Config,
    cancel: &CancellationToken,
) -> Result<String, SubmitError> {
    let renderer = PdfRenderer::new(config.dpi).with_max_edge(config.max_page_edge);
    let mut rendered = Vec::with_capacity(documents.len());
    for path in documents {
        let pages = renderer.render(path).await?;
        info!(document = %path.display(), pages = pages.len(), "rendered document");
        rendered.push(pages);
    }

    // Built before any MCP server is spawned, so a provider failure
    // leaves no child processes behind.
    let provider = get_provider(config.provider.clone()).map_err(|e| {
        crate::errors::SetupError::Environment(format!("provider setup failed: {e}"))
    })?;

    let mut registry = ToolRegistry::new();
    let servers = match &config.mcp_config_path {
        Some(path) => {
            let mcp_config = McpConfig::load(path)?;
            connect_servers(&mcp_config, &mut registry).await?
        }
        None => Vec::new(),
    };
    info!(tool_count = registry.list().len(), "tool registry ready");

    let transcript = assemble(&config.system_prompt, prompt, &rendered);

    let agent = Agent::new(provider, Arc::new(registry), config.agent.clone());

    let result = agent.run(transcript, cancel).await;

    for server in &servers {
        server.shutdown().await;
    }

    let outcome = result?;
    info!(
        transcript_len = outcome.transcript.len(),
        html_len = outcome.html.len(),
        "submission complete"
    );
    Ok(outcome.html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FailureKind, SetupError};
    use crate::providers::configs::{AnthropicProviderConfig, ProviderConfig};

    fn test_config() -> Config {
        Config {
            provider: ProviderConfig::Anthropic(AnthropicProviderConfig {
                host: "http://127.0.0.1:1".into(),
                api_key: "test".into(),
                model: "claude-sonnet-4-20250514".into(),
                temperature: None,
                max_tokens: None,
            }),
            system_prompt: "You render HTML.".into(),
            mcp_config_path: None,
            dpi: 150,
            max_page_edge: 2048,
            agent: crate::agent::AgentConfig {
                max_retries: 0,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_unsupported_document_fails_before_any_model_call() {
        let err = submit(
            "make a page",
            &[PathBuf::from("notes.txt")],
            &test_config(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SubmitError::Document(_)));
    }

    #[tokio::test]
    async fn test_missing_mcp_config_fails_before_any_model_call() {
        let mut config = test_config();
        config.mcp_config_path = Some(PathBuf::from("/nonexistent/mcp.json"));

        let err = submit("make a page", &[], &config, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Setup(SetupError::McpConfig(_))));
    }

    #[tokio::test]
    async fn test_end_to_end_with_mcp_server_and_mock_model() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let model = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "<html>final</html>"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 1, "output_tokens": 1}
            })))
            .mount(&model)
            .await;

        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *initialize*) printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id" ;;
    *tools/list*) printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[]}}\n' "$id" ;;
  esac
done
"#;
        let mcp_config = json!({
            "mcpServers": {"scripted": {"command": "bash", "args": ["-c", script]}}
        });
        let config_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(config_file.path(), mcp_config.to_string()).unwrap();

        let mut config = test_config();
        let crate::providers::configs::ProviderConfig::Anthropic(anthropic) = &mut config.provider
        else {
            panic!("expected anthropic provider");
        };
        anthropic.host = model.uri();
        config.mcp_config_path = Some(config_file.path().to_path_buf());

        let html = submit("make a page", &[], &config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(html, "<html>final</html>");
    }

    #[tokio::test]
    async fn test_cancelled_submission_reports_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = submit("make a page", &[], &test_config(), &cancel)
            .await
            .unwrap_err();

        let SubmitError::Agent(failure) = err else {
            panic!("expected agent failure");
        };
        assert_eq!(failure.kind, FailureKind::Cancelled);
    }
}
