//! The agent loop: drives the conversation with the model, dispatches
//! the tool calls it asks for, and converges on a final HTML answer.
//!
//! The loop is an explicit state machine. Terminal outcomes are values
//! (`AgentOutcome` or `Failure`), never panics: a failing tool is
//! reported back to the model inside the transcript, and only model
//! unavailability, the iteration ceiling or cancellation stop the loop.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Failure, ToolError};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::Tool;
use crate::providers::base::Provider;
use crate::registry::ToolRegistry;

/// Knobs for one loop invocation. Injected rather than hardcoded so
/// tests can shrink timeouts and ceilings to milliseconds.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Ceiling on model round-trips before the loop gives up
    pub max_iterations: usize,
    /// Retries per model call, on top of the first attempt
    pub max_retries: usize,
    /// First retry delay; doubles per attempt
    pub initial_backoff: Duration,
    /// Per-call timeout for the model provider
    pub model_timeout: Duration,
    /// Per-call timeout for a single tool invocation
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            model_timeout: Duration::from_secs(180),
            tool_timeout: Duration::from_secs(120),
        }
    }
}

/// Successful termination: the extracted HTML plus the full transcript
/// that produced it.
#[derive(Debug)]
pub struct AgentOutcome {
    pub html: String,
    pub transcript: Vec<Message>,
}

enum LoopState {
    AwaitingModel,
    AwaitingTools,
    Done(String),
    Failed(Failure),
}

/// One agent per submission; owns the provider, shares the registry.
pub struct Agent {
    provider: Box<dyn Provider>,
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(provider: Box<dyn Provider>, registry: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    /// Run the loop to completion over the given initial transcript.
    /// The cancellation token is observed at the start of every state
    /// transition; once it fires no further model call or tool
    /// invocation starts.
    pub async fn run(
        &self,
        transcript: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, Failure> {
        let tools = self.registry.list();
        let mut transcript = transcript;
        let mut state = LoopState::AwaitingModel;
        let mut iterations = 0usize;

        loop {
            state = match state {
                LoopState::Done(html) => {
                    return Ok(AgentOutcome { html, transcript });
                }
                LoopState::Failed(failure) => {
                    return Err(failure);
                }
                _ if cancel.is_cancelled() => LoopState::Failed(Failure::cancelled()),
                LoopState::AwaitingModel => {
                    if iterations >= self.config.max_iterations {
                        LoopState::Failed(Failure::max_iterations(self.config.max_iterations))
                    } else {
                        iterations += 1;
                        debug!(iteration = iterations, "requesting model completion");
                        match self.complete_with_retry(&transcript, &tools).await {
                            Ok(response) => {
                                let wants_tools = !response.tool_requests().is_empty();
                                transcript.push(response);
                                if wants_tools {
                                    LoopState::AwaitingTools
                                } else {
                                    // A tool-free response is the completion signal
                                    let text = transcript
                                        .last()
                                        .map(|m| m.text())
                                        .unwrap_or_default();
                                    LoopState::Done(extract_html(&text))
                                }
                            }
                            Err(failure) => LoopState::Failed(failure),
                        }
                    }
                }
                LoopState::AwaitingTools => {
                    let requests: Vec<ToolRequest> = transcript
                        .last()
                        .map(|m| m.tool_requests().into_iter().cloned().collect())
                        .unwrap_or_default();

                    // Dispatch in parallel; join_all yields outputs in
                    // request order regardless of completion order.
                    let dispatches = requests.iter().map(|request| self.dispatch(request));
                    let outputs = futures::future::join_all(dispatches).await;

                    let mut tool_message = Message::tool();
                    for (request, output) in requests.iter().zip(outputs) {
                        tool_message = tool_message.with_tool_response(request.id.clone(), output);
                    }
                    transcript.push(tool_message);

                    LoopState::AwaitingModel
                }
            };
        }
    }

    async fn complete_with_retry(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Message, Failure> {
        let mut backoff = self.config.initial_backoff;
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let call = self.provider.complete(messages, tools);
            match tokio::time::timeout(self.config.model_timeout, call).await {
                Ok(Ok((message, usage))) => {
                    debug!(
                        input_tokens = ?usage.input_tokens,
                        output_tokens = ?usage.output_tokens,
                        "model call succeeded"
                    );
                    return Ok(message);
                }
                Ok(Err(e)) if e.is_retryable() => {
                    warn!(attempt, error = %e, "model call failed, will retry");
                    last_error = e.to_string();
                }
                Ok(Err(e)) => {
                    return Err(Failure::model_unavailable(e.to_string()));
                }
                Err(_) => {
                    // A timeout counts as a retryable failure
                    warn!(attempt, "model call timed out, will retry");
                    last_error = format!(
                        "timed out after {}s",
                        self.config.model_timeout.as_secs()
                    );
                }
            }
        }

        Err(Failure::model_unavailable(format!(
            "retries exhausted: {last_error}"
        )))
    }

    async fn dispatch(&self, request: &ToolRequest) -> Result<Vec<Content>, ToolError> {
        // A request the model produced malformed is answered with the
        // error it already carries; nothing to invoke.
        let call = match &request.tool_call {
            Ok(call) => call.clone(),
            Err(e) => return Err(e.clone()),
        };

        let invoke = self.registry.invoke(&call.name, call.arguments);
        match tokio::time::timeout(self.config.tool_timeout, invoke).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::ExecutionFailed(format!(
                "tool '{}' timed out after {}s",
                call.name,
                self.config.tool_timeout.as_secs()
            ))),
        }
    }
}

/// Pull the HTML artifact out of the model's final answer: a fenced
/// ```html block wins, then a literal <html>..</html> span, then the
/// whole trimmed text.
pub fn extract_html(text: &str) -> String {
    let fence = Regex::new(r"(?s)```(?:html)?[ \t]*\n(.*?)```").unwrap();
    if let Some(caps) = fence.captures(text) {
        return caps[1].trim().to_string();
    }

    if let (Some(start), Some(end)) = (text.find("<html"), text.rfind("</html>")) {
        if start < end {
            return text[start..end + "</html>".len()].to_string();
        }
    }

    text.trim().to_string()
}
