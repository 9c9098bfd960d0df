//! Conversions between the internal transcript model and the provider
//! wire formats. Both directions live here so the provider modules stay
//! thin transports.

use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::ToolError;
use crate::models::content::{Content, ImageContent};
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::ProviderError;

#[derive(Debug, Copy, Clone)]
pub enum ImageFormat {
    OpenAi,
    Anthropic,
}

/// Convert an image content into an image json based on format
pub fn convert_image(image: &ImageContent, image_format: ImageFormat) -> Value {
    match image_format {
        ImageFormat::OpenAi => json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", image.mime_type, image.data)
            }
        }),
        ImageFormat::Anthropic => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": image.mime_type,
                "data": image.data,
            }
        }),
    }
}

/// Convert the internal transcript to OpenAI's chat message spec.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                messages_spec.push(json!({
                    "role": "system",
                    "content": message.text(),
                }));
            }
            Role::User => {
                messages_spec.push(user_message_to_openai(message));
            }
            Role::Assistant => {
                messages_spec.push(assistant_message_to_openai(message));
            }
            Role::Tool => {
                // One wire message per tool response, correlated by id
                for content in &message.content {
                    if let MessageContent::ToolResponse(response) = content {
                        messages_spec.push(tool_response_to_openai(response.id.clone(), response));
                    }
                }
            }
        }
    }

    messages_spec
}

fn user_message_to_openai(message: &Message) -> Value {
    let has_images = message
        .content
        .iter()
        .any(|c| matches!(c, MessageContent::Image(_)));

    if !has_images {
        return json!({"role": "user", "content": message.text()});
    }

    let parts: Vec<Value> = message
        .content
        .iter()
        .filter_map(|content| match content {
            MessageContent::Text(text) => Some(json!({"type": "text", "text": text.text})),
            MessageContent::Image(image) => Some(convert_image(image, ImageFormat::OpenAi)),
            _ => None,
        })
        .collect();

    json!({"role": "user", "content": parts})
}

fn assistant_message_to_openai(message: &Message) -> Value {
    let mut converted = json!({"role": "assistant"});

    let text = message.text();
    if !text.is_empty() {
        converted["content"] = json!(text);
    }

    let mut tool_calls = Vec::new();
    for request in message.tool_requests() {
        // A request the model itself produced malformed has no wire
        // representation; its error travels in the tool response.
        if let Ok(tool_call) = &request.tool_call {
            tool_calls.push(json!({
                "id": request.id,
                "type": "function",
                "function": {
                    "name": sanitize_function_name(&tool_call.name),
                    "arguments": tool_call.arguments.to_string(),
                }
            }));
        }
    }
    if !tool_calls.is_empty() {
        converted["tool_calls"] = json!(tool_calls);
    }

    converted
}

fn tool_response_to_openai(id: String, response: &crate::models::message::ToolResponse) -> Value {
    let content = match &response.tool_result {
        Ok(contents) => flatten_text(contents),
        Err(e) => format!("The tool call returned the following error:\n{e}"),
    };
    json!({
        "role": "tool",
        "tool_call_id": id,
        "content": content,
    })
}

/// Convert internal Tool descriptors to OpenAI's function tool spec.
pub fn tools_to_openai_spec(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

/// Convert OpenAI's chat completion response into an assistant message.
pub fn openai_response_to_message(response: &Value) -> Result<Message, ProviderError> {
    let wire = response
        .pointer("/choices/0/message")
        .ok_or_else(|| ProviderError::MalformedResponse("response had no choices".into()))?;

    let mut message = Message::assistant();

    if let Some(text) = wire.get("content").and_then(|c| c.as_str()) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = wire.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = ensure_call_id(tool_call["id"].as_str());
            let name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            message = message.with_tool_request(id.clone(), parse_tool_call(&id, name, arguments));
        }
    }

    if message.content.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "assistant message had neither content nor tool calls".into(),
        ));
    }

    Ok(message)
}

/// Convert the internal transcript to Anthropic's messages spec. The
/// system prompt is not a message on this wire; it comes back as the
/// first element for the top-level `system` field.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> (String, Vec<Value>) {
    let mut system = String::new();
    let mut messages_spec = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&message.text());
            }
            Role::User => {
                let blocks: Vec<Value> = message
                    .content
                    .iter()
                    .filter_map(|content| match content {
                        MessageContent::Text(text) => {
                            Some(json!({"type": "text", "text": text.text}))
                        }
                        MessageContent::Image(image) => {
                            Some(convert_image(image, ImageFormat::Anthropic))
                        }
                        _ => None,
                    })
                    .collect();
                messages_spec.push(json!({"role": "user", "content": blocks}));
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                for content in &message.content {
                    match content {
                        MessageContent::Text(text) => {
                            blocks.push(json!({"type": "text", "text": text.text}));
                        }
                        MessageContent::ToolRequest(request) => {
                            if let Ok(tool_call) = &request.tool_call {
                                blocks.push(json!({
                                    "type": "tool_use",
                                    "id": request.id,
                                    "name": sanitize_function_name(&tool_call.name),
                                    "input": tool_call.arguments,
                                }));
                            }
                        }
                        _ => {}
                    }
                }
                messages_spec.push(json!({"role": "assistant", "content": blocks}));
            }
            Role::Tool => {
                // Anthropic carries tool results as user-role blocks
                let blocks: Vec<Value> = message
                    .content
                    .iter()
                    .filter_map(|content| content.as_tool_response())
                    .map(|response| match &response.tool_result {
                        Ok(contents) => json!({
                            "type": "tool_result",
                            "tool_use_id": response.id,
                            "content": contents_to_anthropic_blocks(contents),
                        }),
                        Err(e) => json!({
                            "type": "tool_result",
                            "tool_use_id": response.id,
                            "content": [{"type": "text", "text": e.to_string()}],
                            "is_error": true,
                        }),
                    })
                    .collect();
                messages_spec.push(json!({"role": "user", "content": blocks}));
            }
        }
    }

    (system, messages_spec)
}

fn contents_to_anthropic_blocks(contents: &[Content]) -> Vec<Value> {
    contents
        .iter()
        .map(|content| match content {
            Content::Text(text) => json!({"type": "text", "text": text.text}),
            Content::Image(image) => convert_image(image, ImageFormat::Anthropic),
        })
        .collect()
}

/// Convert internal Tool descriptors to Anthropic's tool spec.
pub fn tools_to_anthropic_spec(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
            })
        })
        .collect()
}

/// Convert an Anthropic messages response into an assistant message.
pub fn anthropic_response_to_message(response: &Value) -> Result<Message, ProviderError> {
    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| ProviderError::MalformedResponse("response had no content".into()))?;

    let mut message = Message::assistant();

    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    message = message.with_text(text);
                }
            }
            Some("tool_use") => {
                let id = ensure_call_id(block.get("id").and_then(|i| i.as_str()));
                let name = block.get("name").and_then(|n| n.as_str()).unwrap_or_default();
                let input = block.get("input").cloned().unwrap_or(json!({}));

                let call = if is_valid_function_name(name) {
                    Ok(ToolCall::new(name, input))
                } else {
                    Err(ToolError::NotFound(format!(
                        "invalid tool name '{name}', must match [a-zA-Z0-9_-]+"
                    )))
                };
                message = message.with_tool_request(id, call);
            }
            _ => {}
        }
    }

    if message.content.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "assistant message had neither content nor tool calls".into(),
        ));
    }

    Ok(message)
}

fn parse_tool_call(id: &str, name: &str, arguments: &str) -> Result<ToolCall, ToolError> {
    if !is_valid_function_name(name) {
        return Err(ToolError::NotFound(format!(
            "invalid tool name '{name}', must match [a-zA-Z0-9_-]+"
        )));
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(parsed) => Ok(ToolCall::new(name, parsed)),
        Err(e) => Err(ToolError::InvalidArguments(format!(
            "could not parse arguments for call {id}: {e}"
        ))),
    }
}

/// Some providers omit or blank the call id; every request still needs
/// one so its result can be correlated.
fn ensure_call_id(id: Option<&str>) -> String {
    match id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("call_{}", Uuid::new_v4().simple()),
    }
}

fn flatten_text(contents: &[Content]) -> String {
    contents
        .iter()
        .map(|content| match content {
            Content::Text(text) => text.text.clone(),
            Content::Image(_) => "[image omitted]".to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    re.is_match(name)
}

/// OpenAI reports context overflow as an error object with a code.
pub fn check_openai_context_length_error(error: &Value) -> Option<ProviderError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string();
        Some(ProviderError::ContextLengthExceeded(message))
    } else {
        None
    }
}
