//! OpenAI Adapter
//!
//! Hosted chat-completions family. Tool calls carry an id and string-encoded
//! arguments; the assistant message is echoed back with its `tool_calls` so
//! each `tool` result can reference the call it answers.

use std::sync::RwLock;

use agent_core::{
    error::{AgentError, Result},
    message::{InteractionRecord, Message, Role},
    provider::{BackendFamily, BackendReply, ChatBackend, ModelAdapter},
    reasoning::run_turn,
    tool::{RawArguments, ToolCall, ToolDescriptor, ToolRegistry, ToolSession},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ollama::http_client;

const FALLBACK_MODELS: &[&str] = &["gpt-4o", "gpt-4-turbo", "gpt-3.5-turbo"];

/// Hosted API configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,

    /// API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set; hosted models will be rejected");
        }

        Self {
            api_key,
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: std::env::var("OPENAI_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

/// Chat-completions message
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OpenAiToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,

    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,

    pub function: OpenAiFunctionCall,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,

    /// JSON-encoded string on the wire; kept as received for the echo
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [OpenAiMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// OpenAI model adapter
pub struct OpenAiAdapter {
    http: reqwest::Client,
    config: OpenAiConfig,
    model: RwLock<String>,
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            config,
            model: RwLock::new(model.into()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let response = self
            .authorized(self.http.get(self.endpoint("models")))
            .send()
            .await
            .map_err(|e| AgentError::BackendTransport(e.to_string()))?;
        let response = check_status(response).await?;
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        let mut models: Vec<String> = list
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| id.contains("gpt"))
            .collect();
        models.sort();
        Ok(models)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication failed",
        StatusCode::TOO_MANY_REQUESTS => "rate limited",
        _ => "request failed",
    };
    Err(AgentError::BackendTransport(format!(
        "OpenAI API {reason} ({status}): {body}"
    )))
}

#[async_trait]
impl ChatBackend for OpenAiAdapter {
    type Wire = OpenAiMessage;

    fn encode_tools(&self, tools: &[ToolDescriptor]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters(),
                    }
                })
            })
            .collect()
    }

    fn encode_message(&self, message: &Message) -> OpenAiMessage {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant | Role::AssistantFinal => "assistant",
            Role::Tool | Role::ToolError => "tool",
        };
        OpenAiMessage {
            role: role.into(),
            content: Some(message.content.clone()),
            ..OpenAiMessage::default()
        }
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[OpenAiMessage],
        tools: Option<&[Value]>,
    ) -> Result<BackendReply<OpenAiMessage>> {
        // The API rejects an empty tools array.
        let tools = tools.filter(|t| !t.is_empty());
        let request = CompletionRequest {
            model,
            messages,
            tools,
            tool_choice: tools.map(|_| "auto"),
        };

        tracing::debug!("OpenAI request: model={}, messages={}", model, messages.len());

        let response = self
            .authorized(self.http.post(self.endpoint("chat/completions")))
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::BackendTransport(e.to_string()))?;
        let response = check_status(response).await?;

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            AgentError::MalformedResponse(format!("Failed to parse OpenAI response: {e}"))
        })?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AgentError::MalformedResponse("response has no choices".into()))?;

        let tool_calls = message
            .tool_calls
            .iter()
            .map(|call| {
                let arguments = match &call.function.arguments {
                    Value::String(text) => RawArguments::Text(text.clone()),
                    other => RawArguments::Structured(other.clone()),
                };
                ToolCall::new(call.function.name.clone(), arguments).with_id(call.id.clone())
            })
            .collect();

        Ok(BackendReply {
            content: message.content.clone().unwrap_or_default(),
            tool_calls,
            echo: OpenAiMessage {
                role: "assistant".into(),
                ..message
            },
        })
    }

    fn tool_feedback(&self, call: &ToolCall, content: &str) -> OpenAiMessage {
        OpenAiMessage {
            role: "tool".into(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call.id.clone().unwrap_or_default()),
            name: Some(call.name.clone()),
        }
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::HostedApi
    }

    fn model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set_model(&self, model: &str) {
        *self
            .model
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = model.to_string();
    }

    async fn process(
        &self,
        conversation: Vec<Message>,
        tools: &ToolRegistry,
        session: &dyn ToolSession,
    ) -> Result<InteractionRecord> {
        let model = self.model();
        run_turn(self, &model, &conversation, tools, session).await
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) => models,
            Err(e) => {
                tracing::error!("Error listing models: {}", e);
                FALLBACK_MODELS.iter().map(ToString::to_string).collect()
            }
        }
    }
}
