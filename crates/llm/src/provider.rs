use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A single message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
}

/// Generation request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Generation response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub stop_reason: StopReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Error type for generation calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// Text-completion collaborator. Only renders prose around routing results;
/// never takes part in the routing decision itself.
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>>;
}

/// Mock provider for tests. Returns a fixed response or a fixed failure.
#[derive(Debug, Clone)]
pub struct MockProvider {
    pub response: Option<String>,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: Some(response.into()) }
    }

    /// A provider whose every call fails with `Unavailable`.
    pub fn unavailable() -> Self {
        Self { response: None }
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        let response = self.response.clone();
        Box::pin(async move {
            match response {
                Some(content) => Ok(CompletionResponse {
                    content,
                    stop_reason: StopReason::EndTurn,
                    input_tokens: 10,
                    output_tokens: 20,
                }),
                None => Err(LlmError::Unavailable("mock provider offline".into())),
            }
        })
    }
}
