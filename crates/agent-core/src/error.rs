//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Tool name absent from the registry snapshot
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Schema-declared required argument missing
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The tool session raised during `call_tool`
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Network/IO failure talking to the model backend
    #[error("Backend transport error: {0}")]
    BackendTransport(String),

    /// Backend answered with an unexpected shape
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Embedding model failed or produced an unusable vector
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Tool session transport/lifecycle error
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

/// Classification of failures that stay inside one tool exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    ExecutionFailure,
}

impl AgentError {
    /// Backend failures end the turn; everything tool-scoped does not.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            AgentError::BackendTransport(_) | AgentError::MalformedResponse(_)
        )
    }

    /// Kind used when the error is recorded as a `tool_error` message
    pub fn tool_error_kind(&self) -> ToolErrorKind {
        match self {
            AgentError::UnknownTool(_) => ToolErrorKind::UnknownTool,
            AgentError::InvalidArguments { .. } => ToolErrorKind::InvalidArguments,
            _ => ToolErrorKind::ExecutionFailure,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::BackendTransport(_) | AgentError::MalformedResponse(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            AgentError::UnknownTool(name) => format!("The tool '{name}' is not available."),
            AgentError::InvalidArguments { reason, .. } => format!("Invalid tool input: {reason}"),
            AgentError::ToolExecution(msg) => format!("Tool error: {msg}"),
            AgentError::Session(_) => "The tool server is not reachable.".into(),
            AgentError::Config(msg) => format!("Configuration problem: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
