//! Ollama Adapter
//!
//! Local-daemon backend family, driven through `ollama-rs`. Tool calls come
//! back with structured arguments and no call id; tool results are fed back
//! as `tool` messages in call order.

use std::sync::RwLock;
use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{InteractionRecord, Message, Role},
    provider::{BackendFamily, BackendReply, ChatBackend, ModelAdapter},
    reasoning::run_turn,
    tool::{RawArguments, ToolCall, ToolDescriptor, ToolRegistry, ToolSession},
};
use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    generation::{
        chat::{ChatMessage, MessageRole, request::ChatMessageRequest},
        tools::ToolInfo,
    },
};
use serde_json::Value;

/// Returned when the daemon cannot be asked for its models
const FALLBACK_MODELS: &[&str] = &["llama3.2", "mistral", "phi3"];

/// Ollama daemon configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout_secs: 300,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);
        let timeout_secs = std::env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(300);

        Self {
            host,
            port,
            timeout_secs,
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

/// Build an HTTP client for direct API calls
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))
}

/// Map a reqwest failure the way the daemon's users expect to read it
pub(crate) fn transport_error(e: &reqwest::Error, base_url: &str) -> AgentError {
    if e.is_timeout() {
        AgentError::BackendTransport(format!("request to {base_url} timed out"))
    } else if e.is_connect() {
        AgentError::BackendTransport(format!(
            "Cannot connect to Ollama at {base_url}. Is Ollama running?"
        ))
    } else {
        AgentError::BackendTransport(e.to_string())
    }
}

/// Ollama model adapter
pub struct OllamaAdapter {
    client: Ollama,
    config: OllamaConfig,
    model: RwLock<String>,
}

impl OllamaAdapter {
    pub fn new(config: OllamaConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Ollama::new(&config.host, config.port),
            config,
            model: RwLock::new(model.into()),
        })
    }

    /// Create with default localhost settings
    pub fn localhost(model: impl Into<String>) -> Result<Self> {
        Self::new(OllamaConfig::default(), model)
    }

    /// Check the daemon answers
    pub async fn health_check(&self) -> bool {
        match self.client.list_local_models().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                false
            }
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| AgentError::BackendTransport(e.to_string()))?;
        Ok(models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ChatBackend for OllamaAdapter {
    type Wire = ChatMessage;

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

    fn encode_message(&self, message: &Message) -> ChatMessage {
        let role = match message.role {
            Role::System => MessageRole::System,
            Role::User => MessageRole::User,
            Role::Assistant | Role::AssistantFinal => MessageRole::Assistant,
            Role::Tool | Role::ToolError => MessageRole::Tool,
        };
        ChatMessage::new(role, message.content.clone())
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<BackendReply<ChatMessage>> {
        let mut request = ChatMessageRequest::new(model.to_string(), messages.to_vec());
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let infos = tools
                .iter()
                .map(|t| serde_json::from_value::<ToolInfo>(t.clone()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            request = request.tools(infos);
        }

        tracing::debug!(
            "Ollama request: model={}, messages={}, total_chars={}",
            model,
            messages.len(),
            messages.iter().map(|m| m.content.len()).sum::<usize>()
        );

        let start = std::time::Instant::now();
        let response = self.client.send_chat_messages(request).await.map_err(|e| {
            AgentError::BackendTransport(format!(
                "Ollama chat at {} failed: {e}",
                self.config.base_url()
            ))
        })?;
        tracing::info!("Ollama response received in {:.1}s", start.elapsed().as_secs_f64());

        let tool_calls = response
            .message
            .tool_calls
            .iter()
            .map(|call| {
                let arguments = match &call.function.arguments {
                    Value::String(text) => RawArguments::Text(text.clone()),
                    other => RawArguments::Structured(other.clone()),
                };
                ToolCall::new(call.function.name.clone(), arguments)
            })
            .collect();

        Ok(BackendReply {
            content: response.message.content.clone(),
            tool_calls,
            echo: response.message,
        })
    }

    fn tool_feedback(&self, _call: &ToolCall, content: &str) -> ChatMessage {
        ChatMessage::new(MessageRole::Tool, content.to_string())
    }
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::LocalDaemon
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
            Ok(models) if !models.is_empty() => models,
            Ok(_) => FALLBACK_MODELS.iter().map(ToString::to_string).collect(),
            Err(e) => {
                tracing::error!("Error listing models: {}", e);
                FALLBACK_MODELS.iter().map(ToString::to_string).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use agent_core::tool::EmptyToolSession;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;

    fn adapter_for(server: &MockServer) -> OllamaAdapter {
        let uri = server.uri();
        let (host, port) = uri.rsplit_once(':').unwrap();
        let config = OllamaConfig {
            host: host.to_string(),
            port: port.parse().unwrap(),
            timeout_secs: 5,
        };
        OllamaAdapter::new(config, "llama3.2").unwrap()
    }

    fn chat_reply(message: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "created_at": "2024-07-01T00:00:00Z",
            "message": message,
            "done": true
        }))
    }

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_tool_schema_encoding() {
        let adapter = OllamaAdapter::localhost("llama3.2").unwrap();
        let tools = adapter.encode_tools(&[ToolDescriptor::new("status", "Server status", Value::Null)]);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "status");
        assert_eq!(tools[0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_message_roles() {
        let adapter = OllamaAdapter::localhost("llama3.2").unwrap();
        let wire = adapter.encode_message(&Message::assistant_final("done"));
        assert_eq!(wire.role, MessageRole::Assistant);
        assert_eq!(wire.content, "done");

        let call = ToolCall::new("add", RawArguments::Text("{}".into()));
        assert_eq!(adapter.tool_feedback(&call, "5").role, MessageRole::Tool);
    }

    #[test]
    fn test_set_model_in_place() {
        let adapter = OllamaAdapter::localhost("llama3.2").unwrap();
        adapter.set_model("mistral");
        assert_eq!(adapter.model(), "mistral");
        assert_eq!(adapter.family(), BackendFamily::LocalDaemon);
    }

    #[tokio::test]
    async fn test_plain_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "llama3.2"})))
            .respond_with(chat_reply(json!({"role": "assistant", "content": "4"})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let record = adapter
            .process(vec![Message::user("What is 2+2?")], &ToolRegistry::new(), &EmptyToolSession)
            .await
            .unwrap();

        assert_eq!(record.messages().len(), 1);
        assert_eq!(record.format_reply(), "4");
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        struct AddSession;

        #[async_trait]
        impl ToolSession for AddSession {
            async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
                Ok(vec![])
            }

            async fn call_tool(
                &self,
                name: &str,
                arguments: &serde_json::Map<String, Value>,
            ) -> Result<Vec<String>> {
                assert_eq!(name, "add");
                let sum = arguments["a"].as_i64().unwrap() + arguments["b"].as_i64().unwrap();
                Ok(vec![sum.to_string()])
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(|req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let messages = body["messages"].as_array().unwrap();
                if messages.len() == 1 {
                    assert_eq!(body["tools"][0]["function"]["name"], "add");
                    chat_reply(json!({
                        "role": "assistant",
                        "content": "",
                        "tool_calls": [{"function": {"name": "add", "arguments": {"a": 2, "b": 3}}}]
                    }))
                } else {
                    let last = messages.last().unwrap();
                    assert_eq!(last["role"], "tool");
                    assert_eq!(last["content"], "5");
                    chat_reply(json!({"role": "assistant", "content": "2 + 3 = 5"}))
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let registry = ToolRegistry::from_descriptors(vec![ToolDescriptor::new(
            "add",
            "Add",
            json!({"type": "object", "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}}, "required": ["a", "b"]}),
        )]);
        let record = adapter_for(&server)
            .process(vec![Message::user("add 2 and 3")], &registry, &AddSession)
            .await
            .unwrap();

        assert_eq!(record.messages()[1].result.as_deref(), Some("5"));
        assert_eq!(record.format_reply(), "\n2 + 3 = 5");
    }

    #[tokio::test]
    async fn test_server_error_is_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let err = adapter_for(&server)
            .process(vec![Message::user("hi")], &ToolRegistry::new(), &EmptyToolSession)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::BackendTransport(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let err = adapter_for(&server)
            .process(vec![Message::user("hi")], &ToolRegistry::new(), &EmptyToolSession)
            .await
            .unwrap_err();
        assert!(err.is_backend_failure());
    }

    #[tokio::test]
    async fn test_list_models_falls_back_when_unreachable() {
        let config = OllamaConfig {
            host: "http://127.0.0.1".into(),
            port: 9,
            timeout_secs: 1,
        };
        let models = OllamaAdapter::new(config, "llama3.2").unwrap().list_models().await;
        assert_eq!(models, vec!["llama3.2", "mistral", "phi3"]);
    }
}
