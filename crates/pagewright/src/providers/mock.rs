use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, ProviderError, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
        }
    }

    /// A mock provider that repeats the same response forever
    pub fn repeating(response: Message) -> RepeatingMockProvider {
        RepeatingMockProvider {
            response,
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(Message, Usage), ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok((Message::assistant().with_text(""), Usage::default()))
        } else {
            Ok((responses.remove(0), Usage::default()))
        }
    }
}

/// Returns a clone of the same response on every call; used for
/// exercising the loop's iteration ceiling.
pub struct RepeatingMockProvider {
    response: Message,
    pub calls: Arc<Mutex<usize>>,
}

#[async_trait]
impl Provider for RepeatingMockProvider {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(Message, Usage), ProviderError> {
        *self.calls.lock().unwrap() += 1;
        Ok((self.response.clone(), Usage::default()))
    }
}

/// Fails every call with the given constructor; used for exercising
/// retry and backoff.
pub struct FailingProvider {
    make_error: fn() -> ProviderError,
    pub calls: Arc<Mutex<usize>>,
}

impl FailingProvider {
    pub fn new(make_error: fn() -> ProviderError) -> Self {
        Self {
            make_error,
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl Provider for FailingProvider {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(Message, Usage), ProviderError> {
        *self.calls.lock().unwrap() += 1;
        Err((self.make_error)())
    }
}
