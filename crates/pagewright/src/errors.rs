use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure of one tool invocation. These are recoverable: they are
/// folded into the transcript as an error-flagged tool response so the
/// model can see what went wrong and adapt, and they never terminate
/// the agent loop. Serializable because they travel inside messages.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Document preprocessing failures. Fatal: a missing or bad page would
/// silently corrupt the multimodal context downstream, so these surface
/// before the loop starts.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("document conversion failed: {0}")]
    Conversion(String),
}

/// Startup failures while building the tool registry. Fatal: the loop
/// never starts with a half-built registry.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("invalid configuration: {0}")]
    Environment(String),

    #[error("invalid MCP configuration: {0}")]
    McpConfig(String),

    #[error("MCP server '{server}' failed: {message}")]
    McpServer { server: String, message: String },
}

/// Why the agent loop stopped without a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ModelUnavailable,
    MaxIterationsExceeded,
    Cancelled,
}

/// Terminal failure of one agent loop invocation. Returned as a value,
/// never thrown through the stack.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new<S: Into<String>>(kind: FailureKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn model_unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::ModelUnavailable, message)
    }

    pub fn max_iterations(limit: usize) -> Self {
        Self::new(
            FailureKind::MaxIterationsExceeded,
            format!("no final answer after {limit} model round-trips"),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "submission was cancelled")
    }
}

/// Everything the submission façade can report to its caller.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Agent(#[from] Failure),
}
