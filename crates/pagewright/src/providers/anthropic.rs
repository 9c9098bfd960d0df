use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, ProviderError, Usage};
use super::configs::AnthropicProviderConfig;
use super::util::{
    anthropic_response_to_message, messages_to_anthropic_spec, tools_to_anthropic_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = data.get("usage");
        let field = |name: &str| {
            usage
                .and_then(|u| u.get(name))
                .and_then(|v| v.as_i64())
                .map(|v| v as i32)
        };

        let input_tokens = field("input_tokens");
        let output_tokens = field("output_tokens");
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    async fn post(&self, payload: Value) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ProviderError::AuthenticationFailed)
            }
            status if status.as_u16() >= 500 => Err(ProviderError::Server(status.as_u16())),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(ProviderError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage), ProviderError> {
        let (system, messages_spec) = messages_to_anthropic_spec(messages);

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_spec,
            "max_tokens": self.config.max_tokens.unwrap_or(4096),
        });

        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_anthropic_spec(tools));
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }

        let response = self.post(payload).await?;

        let message = anthropic_response_to_message(&response)?;
        let usage = Self::get_usage(&response);

        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageContent;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(response_body: Value) -> (MockServer, AnthropicProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let config = AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: None,
            max_tokens: None,
        };

        let provider = AnthropicProvider::new(config).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() {
        let response_body = json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "<html></html>"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 15}
        });

        let (_server, provider) = setup_mock_server(response_body).await;

        let messages = vec![
            Message::system().with_text("You render HTML."),
            Message::user().with_text("Hello?"),
        ];
        let (message, usage) = provider.complete(&messages, &[]).await.unwrap();

        assert_eq!(message.text(), "<html></html>");
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(15));
        assert_eq!(usage.total_tokens, Some(27));
    }

    #[tokio::test]
    async fn test_complete_tool_use() {
        let response_body = json!({
            "content": [
                {"type": "text", "text": "Fetching the logo"},
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": "fetch_logo",
                    "input": {"name": "acme"}
                }
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 10}
        });

        let (_server, provider) = setup_mock_server(response_body).await;

        let tool = Tool::new(
            "fetch_logo",
            "Fetches a company logo",
            json!({"type": "object", "properties": {"name": {"type": "string"}}}),
        );
        let messages = vec![Message::user().with_text("Add the acme logo")];
        let (message, _usage) = provider.complete(&messages, &[tool]).await.unwrap();

        assert!(matches!(message.content[0], MessageContent::Text(_)));
        let requests = message.tool_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, "toolu_1");
        assert_eq!(requests[0].tool_call.as_ref().unwrap().name, "fetch_logo");
    }
}
