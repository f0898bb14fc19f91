//! Model Adapter Strategy Pattern
//!
//! Two levels of abstraction:
//!
//! - [`ModelAdapter`] is what the orchestrator sees: `process` a conversation
//!   into an [`InteractionRecord`], list models, and carry a model id.
//! - [`ChatBackend`] is the wire-level seam each backend family implements.
//!   The shared turn algorithm in [`crate::reasoning`] drives any backend, so
//!   wire formats stay inside the backend types.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let adapter: Arc<dyn ModelAdapter> = factory.create(BackendFamily::LocalDaemon, "llama3.2")?;
//! let record = adapter.process(vec![Message::user("hi")], &registry, &session).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::{InteractionRecord, Message};
use crate::tool::{ToolCall, ToolDescriptor, ToolRegistry, ToolSession};

/// Backend family a model identifier belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFamily {
    /// Hosted chat-completions API (OpenAI style)
    HostedApi,
    /// Local inference daemon (Ollama style)
    LocalDaemon,
}

impl BackendFamily {
    /// Hosted when the model starts with one of `hosted_prefixes`.
    pub fn for_model<S: AsRef<str>>(model: &str, hosted_prefixes: &[S]) -> Self {
        if hosted_prefixes
            .iter()
            .any(|prefix| model.starts_with(prefix.as_ref()))
        {
            BackendFamily::HostedApi
        } else {
            BackendFamily::LocalDaemon
        }
    }
}

impl std::fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendFamily::HostedApi => write!(f, "OpenAI"),
            BackendFamily::LocalDaemon => write!(f, "Ollama"),
        }
    }
}

/// One completion as parsed from the backend's wire format
#[derive(Clone, Debug)]
pub struct BackendReply<W> {
    /// Assistant text (empty when the model only called tools)
    pub content: String,

    /// Requested tool calls in the order the model returned them
    pub tool_calls: Vec<ToolCall>,

    /// The assistant message to append to the working conversation
    pub echo: W,
}

/// Wire-level backend seam
///
/// Implement this for each backend family; [`crate::reasoning::run_turn`]
/// provides the `process` algorithm on top of it.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend-native message representation
    type Wire: Clone + Send + Sync;

    /// Translate tool descriptors into the backend's function-calling schema
    fn encode_tools(&self, tools: &[ToolDescriptor]) -> Vec<Value>;

    /// Translate a conversation message into the wire format
    fn encode_message(&self, message: &Message) -> Self::Wire;

    /// One completion; `tools` is `None` for the synthesis call
    async fn complete(
        &self,
        model: &str,
        messages: &[Self::Wire],
        tools: Option<&[Value]>,
    ) -> Result<BackendReply<Self::Wire>>;

    /// Message feeding a tool result (or `ERROR: ...` text) back to the model
    fn tool_feedback(&self, call: &ToolCall, content: &str) -> Self::Wire;
}

/// Backend-agnostic adapter contract used by the orchestrator
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Family this adapter speaks to
    fn family(&self) -> BackendFamily;

    /// Current model identifier
    fn model(&self) -> String;

    /// Replace the model identifier in place (same family only)
    fn set_model(&self, model: &str);

    /// Run one full turn: completion, tool dispatch, synthesis
    async fn process(
        &self,
        conversation: Vec<Message>,
        tools: &ToolRegistry,
        session: &dyn ToolSession,
    ) -> Result<InteractionRecord>;

    /// Best-effort model listing; never fails
    async fn list_models(&self) -> Vec<String>;
}

/// Builds adapters when the orchestrator switches backend family
pub trait AdapterFactory: Send + Sync {
    fn create(&self, family: BackendFamily, model: &str) -> Result<Arc<dyn ModelAdapter>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_prefix() {
        let prefixes = ["gpt"];
        assert_eq!(BackendFamily::for_model("gpt-4o", &prefixes), BackendFamily::HostedApi);
        assert_eq!(BackendFamily::for_model("llama3.2", &prefixes), BackendFamily::LocalDaemon);
        assert_eq!(
            BackendFamily::for_model("gpt-4o", &[] as &[&str]),
            BackendFamily::LocalDaemon
        );
    }

    #[test]
    fn test_family_display() {
        assert_eq!(BackendFamily::HostedApi.to_string(), "OpenAI");
        assert_eq!(BackendFamily::LocalDaemon.to_string(), "Ollama");
    }
}
