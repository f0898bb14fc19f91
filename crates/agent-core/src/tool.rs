//! Tool System
//!
//! Tools live in a separate process behind a [`ToolSession`]. The registry
//! caches what the session advertised at connect time and performs the
//! shallow argument validation done before every call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{AgentError, Result, ToolErrorKind};

/// Tool definition advertised by the session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the model)
    #[serde(default)]
    pub description: String,

    /// JSON-Schema-like input description
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Schema to hand to a backend; an empty object schema when none was given
    pub fn parameters(&self) -> Value {
        if self.input_schema.is_object() {
            self.input_schema.clone()
        } else {
            serde_json::json!({"type": "object", "properties": {}})
        }
    }

    /// Names listed under the schema's `required` array
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|req| req.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Arguments as the model sent them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArguments {
    /// JSON encoded inside a string (hosted API style)
    Text(String),
    /// Already-structured value (local daemon style)
    Structured(Value),
}

impl RawArguments {
    /// Decode into a mapping. Anything that is not a JSON object decodes to
    /// an empty mapping so the call still runs.
    pub fn decode(&self) -> Map<String, Value> {
        let value = match self {
            RawArguments::Text(text) if text.trim().is_empty() => return Map::new(),
            RawArguments::Text(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(error = %e, raw = %text, "Invalid JSON in tool arguments");
                    return Map::new();
                }
            },
            RawArguments::Structured(value) => value.clone(),
        };

        match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                tracing::warn!(raw = %other, "Tool arguments are not an object");
                Map::new()
            }
        }
    }
}

/// Tool call request from the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as received
    pub arguments: RawArguments,

    /// Opaque call ID for backends that thread it back
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: RawArguments) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Result of one tool exchange
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Success {
        arguments: Map<String, Value>,
        output: String,
    },
    Failure {
        kind: ToolErrorKind,
        detail: String,
    },
}

impl ToolOutcome {
    pub fn failure(err: &AgentError) -> Self {
        ToolOutcome::Failure {
            kind: err.tool_error_kind(),
            detail: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }
}

/// Channel to the tool-execution process
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Enumerate the tools the process exposes
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Execute a tool by name; returns the text segments of its output
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<Vec<String>>;
}

/// Session used when no tool server is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyToolSession;

#[async_trait]
impl ToolSession for EmptyToolSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(Vec::new())
    }

    async fn call_tool(&self, name: &str, _arguments: &Map<String, Value>) -> Result<Vec<String>> {
        Err(AgentError::UnknownTool(name.to_string()))
    }
}

/// Snapshot of the tools a session advertised
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from descriptors; later duplicates of a name replace earlier ones.
    pub fn from_descriptors(descriptors: Vec<ToolDescriptor>) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            match registry.by_name.get(&descriptor.name) {
                Some(&idx) => registry.tools[idx] = descriptor,
                None => {
                    registry.by_name.insert(descriptor.name.clone(), registry.tools.len());
                    registry.tools.push(descriptor);
                }
            }
        }
        registry
    }

    /// Fetch the tool list from a session
    pub async fn refresh(session: &dyn ToolSession) -> Result<Self> {
        let registry = Self::from_descriptors(session.list_tools().await?);
        tracing::info!(tools = ?registry.names(), "Available tools");
        Ok(registry)
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    /// Descriptors in advertised order
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check the call against the snapshot. Only required-field presence is
    /// checked; property types are not.
    pub fn validate(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let tool = self
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;

        if let Some(missing) = tool
            .required_fields()
            .into_iter()
            .find(|field| !arguments.contains_key(*field))
        {
            return Err(AgentError::InvalidArguments {
                tool: tool_name.to_string(),
                reason: format!("missing required argument '{missing}'"),
            });
        }

        Ok(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_tool() -> ToolDescriptor {
        ToolDescriptor::new(
            "add",
            "Add two numbers",
            json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }),
        )
    }

    #[test]
    fn test_tool_registry() {
        let registry = ToolRegistry::from_descriptors(vec![
            add_tool(),
            ToolDescriptor::new("status", "Server status", Value::Null),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["add", "status"]);
        assert!(registry.get("add").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_validate_required_fields() {
        let registry = ToolRegistry::from_descriptors(vec![add_tool()]);

        let ok = json!({"a": 2, "b": 3}).as_object().cloned().unwrap();
        assert!(registry.validate("add", ok).is_ok());

        let missing = json!({"a": 2}).as_object().cloned().unwrap();
        let err = registry.validate("add", missing).unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_validate_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.validate("nope", Map::new()).unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "nope"));
    }

    #[test]
    fn test_type_mismatch_is_not_checked() {
        let registry = ToolRegistry::from_descriptors(vec![add_tool()]);
        let args = json!({"a": "two", "b": null}).as_object().cloned().unwrap();
        assert!(registry.validate("add", args).is_ok());
    }

    #[test]
    fn test_argument_decoding() {
        let text = RawArguments::Text(r#"{"a": 2, "b": 3}"#.into());
        assert_eq!(text.decode().get("a"), Some(&json!(2)));

        let structured = RawArguments::Structured(json!({"a": 1}));
        assert_eq!(structured.decode().len(), 1);

        assert!(RawArguments::Text("add(a=2,b=3)".into()).decode().is_empty());
        assert!(RawArguments::Text(String::new()).decode().is_empty());
        assert!(RawArguments::Structured(json!([1, 2])).decode().is_empty());
    }

    #[test]
    fn test_descriptor_schema_fallback() {
        let bare = ToolDescriptor::new("status", "", Value::Null);
        assert_eq!(bare.parameters()["type"], "object");
        assert!(bare.required_fields().is_empty());

        let parsed: ToolDescriptor =
            serde_json::from_value(json!({"name": "add", "inputSchema": {"required": ["a"]}}))
                .unwrap();
        assert_eq!(parsed.required_fields(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_empty_session() {
        let session = EmptyToolSession;
        assert!(session.list_tools().await.unwrap().is_empty());
        let err = session.call_tool("add", &Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(_)));
    }
}
