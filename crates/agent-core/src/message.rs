//! Conversation Messages
//!
//! Message format shared by conversations and interaction records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// First assistant reply of a turn (or a recalled past reply)
    Assistant,
    /// Successful tool exchange
    Tool,
    /// Failed tool exchange
    ToolError,
    /// Synthesized answer after tool results
    AssistantFinal,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
            Role::ToolError => write!(f, "tool_error"),
            Role::AssistantFinal => write!(f, "assistant_final"),
        }
    }
}

/// A single message in a conversation or interaction record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content (error text for `tool_error`)
    pub content: String,

    /// Tool name (tool and tool_error messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Decoded tool arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,

    /// Concatenated tool output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Whether the model asked for tools in this reply
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_tool_calls: bool,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            arguments: None,
            result: None,
            has_tool_calls: false,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_final(content: impl Into<String>) -> Self {
        Self::new(Role::AssistantFinal, content)
    }

    /// Record of a successful tool exchange
    pub fn tool(
        name: impl Into<String>,
        arguments: Map<String, Value>,
        result: impl Into<String>,
    ) -> Self {
        let result = result.into();
        let mut msg = Self::new(Role::Tool, result.clone());
        msg.name = Some(name.into());
        msg.arguments = Some(arguments);
        msg.result = Some(result);
        msg
    }

    /// Record of a failed tool exchange
    pub fn tool_error(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(Role::ToolError, error).with_name(name)
    }

    /// Add a name to the message
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Tag whether tool calls were requested
    pub fn with_tool_calls(mut self, requested: bool) -> Self {
        self.has_tool_calls = requested;
        self
    }
}

/// Content of the most recent user message, or empty
pub fn latest_user_message(conversation: &[Message]) -> &str {
    conversation
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map_or("", |m| m.content.as_str())
}

/// Full trace of one exchange, returned by every adapter
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Unique turn identifier
    pub id: Uuid,

    /// Model that served the turn
    pub model: String,

    /// Recorded messages in the order they happened
    pub messages: Vec<Message>,
}

impl InteractionRecord {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// First `assistant` message
    pub fn first_response(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::Assistant)
    }

    /// The synthesized `assistant_final` message, if tools ran
    pub fn final_response(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::AssistantFinal)
    }

    /// Number of tool exchanges, successful or not
    pub fn tool_exchanges(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, Role::Tool | Role::ToolError))
            .count()
    }

    /// The answer worth remembering: synthesis if present, else the first reply.
    pub fn answer(&self) -> &str {
        self.final_response()
            .or_else(|| self.first_response())
            .map_or("", |m| m.content.as_str())
    }

    /// Render the caller-facing reply text
    pub fn format_reply(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(2);
        if let Some(first) = self.first_response() {
            parts.push(&first.content);
        }
        if let Some(last) = self.final_response() {
            parts.push(&last.content);
        }
        parts.join("\n")
    }
}
