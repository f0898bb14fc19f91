//! MCP stdio tool session
//!
//! Launches the tool server as a child process and drives it through the
//! `rmcp` client. Tool listing follows pagination; each request is bounded
//! by the configured timeout.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    tool::{ToolDescriptor, ToolSession},
};
use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, RawContent};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex;

/// Tool server launch settings
#[derive(Clone, Debug)]
pub struct McpConfig {
    /// Server script path
    pub script: PathBuf,

    /// Interpreter override; inferred from the script extension when unset
    pub command: Option<String>,

    /// Per-request deadline
    pub request_timeout: Duration,
}

impl McpConfig {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            command: None,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// `MCP_SERVER_SCRIPT`, `MCP_SERVER_COMMAND`, `MCP_TIMEOUT_SECS`.
    /// `None` when no script is configured.
    pub fn from_env() -> Option<Self> {
        let script = std::env::var("MCP_SERVER_SCRIPT").ok().filter(|s| !s.is_empty())?;
        let mut config = Self::new(script);
        config.command = std::env::var("MCP_SERVER_COMMAND").ok().filter(|c| !c.is_empty());
        if let Some(secs) = std::env::var("MCP_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.request_timeout = Duration::from_secs(secs);
        }
        Some(config)
    }

    /// Program to run the script with
    pub fn launch_command(&self) -> Result<String> {
        if let Some(command) = &self.command {
            return Ok(command.clone());
        }
        match self.script.extension().and_then(|e| e.to_str()) {
            Some("py") => Ok("python".into()),
            Some("js") => Ok("node".into()),
            _ => Err(AgentError::Config(format!(
                "Server script must be a .py or .js file: {}",
                self.script.display()
            ))),
        }
    }
}

/// Connected MCP client
pub struct McpSession {
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
    timeout: Duration,
    server_name: Option<String>,
}

impl McpSession {
    /// Spawn the configured server and perform the handshake
    pub async fn spawn(config: &McpConfig) -> Result<Self> {
        let program = config.launch_command()?;
        tracing::info!("Connecting to MCP server: {} {}", program, config.script.display());

        let mut command = Command::new(&program);
        command.arg(&config.script).kill_on_drop(true);
        let transport = TokioChildProcess::new(command)
            .map_err(|e| AgentError::Session(format!("failed to launch '{program}': {e}")))?;

        Self::handshake(().serve(transport), config.request_timeout).await
    }

    /// Handshake over an already-open byte channel
    pub async fn connect<R, W>(reader: R, writer: W, timeout: Duration) -> Result<Self>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        Self::handshake(().serve((reader, writer)), timeout).await
    }

    async fn handshake<F, E>(serving: F, timeout: Duration) -> Result<Self>
    where
        F: Future<Output = std::result::Result<RunningService<RoleClient, ()>, E>>,
        E: std::fmt::Display,
    {
        let service = tokio::time::timeout(timeout, serving)
            .await
            .map_err(|_| AgentError::Session(format!("MCP handshake timed out after {timeout:?}")))?
            .map_err(|e| AgentError::Session(format!("MCP handshake failed: {e}")))?;

        let server_name = service.peer().peer_info().map(|info| info.server_info.name.clone());
        tracing::info!(server = ?server_name, "MCP session initialized");

        Ok(Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            timeout,
            server_name,
        })
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Stop the client and the server process it owns
    pub async fn shutdown(&self) {
        if let Some(service) = self.service.lock().await.take() {
            if let Err(e) = service.cancel().await {
                tracing::warn!("Failed to stop MCP session: {}", e);
            }
        }
    }
}

#[async_trait]
impl ToolSession for McpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = tokio::time::timeout(self.timeout, self.peer.list_all_tools())
            .await
            .map_err(|_| AgentError::Session("MCP tools/list timed out".into()))?
            .map_err(|e| AgentError::Session(format!("MCP tools/list failed: {e}")))?;

        Ok(tools
            .into_iter()
            .map(|tool| {
                ToolDescriptor::new(
                    tool.name.to_string(),
                    tool.description.map(|d| d.to_string()).unwrap_or_default(),
                    Value::Object((*tool.input_schema).clone()),
                )
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<Vec<String>> {
        let request = self.peer.call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(arguments.clone()),
        });
        let result = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AgentError::ToolExecution(format!("MCP tools/call '{name}' timed out")))?
            .map_err(|e| AgentError::ToolExecution(e.to_string()))?;

        let segments: Vec<String> = result
            .content
            .into_iter()
            .filter_map(|content| match content.raw {
                RawContent::Text(text) => Some(text.text),
                _ => {
                    tracing::debug!(tool = name, "Ignoring non-text content");
                    None
                }
            })
            .collect();

        if result.is_error.unwrap_or(false) {
            return Err(AgentError::ToolExecution(segments.concat()));
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex, split};

    use super::*;

    /// In-process server speaking newline-delimited JSON-RPC over a duplex pipe.
    async fn fake_server(stream: DuplexStream) {
        let (read, mut write) = split(stream);
        let mut lines = BufReader::new(read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = request.get("id").cloned() else {
                continue;
            };

            let reply = match request["method"].as_str().unwrap() {
                "initialize" => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "protocolVersion": request["params"]["protocolVersion"],
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "calc", "version": "1.0"}
                }}),
                "tools/list" if request["params"]["cursor"].as_str().is_none() => {
                    json!({"jsonrpc": "2.0", "id": id, "result": {
                        "tools": [{"name": "add", "description": "Add", "inputSchema": {"type": "object", "required": ["a", "b"]}}],
                        "nextCursor": "page2"
                    }})
                }
                "tools/list" => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "tools": [{"name": "status", "description": "Status", "inputSchema": {"type": "object"}}]
                }}),
                "tools/call" => match request["params"]["name"].as_str().unwrap() {
                    "add" => {
                        let args = &request["params"]["arguments"];
                        let sum = args["a"].as_i64().unwrap() + args["b"].as_i64().unwrap();
                        json!({"jsonrpc": "2.0", "id": id, "result": {
                            "content": [{"type": "text", "text": sum.to_string()}]
                        }})
                    }
                    "status" => json!({"jsonrpc": "2.0", "id": id, "result": {
                        "content": [
                            {"type": "text", "text": "status: "},
                            {"type": "image", "data": "", "mimeType": "image/png"},
                            {"type": "text", "text": "online"}
                        ]
                    }}),
                    "explode" => json!({"jsonrpc": "2.0", "id": id, "result": {
                        "content": [{"type": "text", "text": "kaboom"}],
                        "isError": true
                    }}),
                    _ => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32602, "message": "Unknown tool"}}),
                },
                _ => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}}),
            };

            let mut bytes = serde_json::to_vec(&reply).unwrap();
            bytes.push(b'\n');
            write.write_all(&bytes).await.unwrap();
        }
    }

    async fn connected() -> McpSession {
        let (client, server) = duplex(16 * 1024);
        tokio::spawn(fake_server(server));
        let (read, write) = split(client);
        McpSession::connect(read, write, Duration::from_secs(5)).await.unwrap()
    }

    #[test]
    fn test_launch_command_from_extension() {
        assert_eq!(McpConfig::new("server.py").launch_command().unwrap(), "python");
        assert_eq!(McpConfig::new("server.js").launch_command().unwrap(), "node");
        assert!(McpConfig::new("server.rb").launch_command().is_err());

        let mut config = McpConfig::new("server.rb");
        config.command = Some("ruby".into());
        assert_eq!(config.launch_command().unwrap(), "ruby");
    }

    #[tokio::test]
    async fn test_handshake_and_paged_listing() {
        let session = connected().await;
        assert_eq!(session.server_name(), Some("calc"));

        let tools = session.list_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["add", "status"]);
        assert_eq!(tools[0].required_fields(), vec!["a", "b"]);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_returns_text_segments() {
        let session = connected().await;

        let mut args = Map::new();
        args.insert("a".into(), json!(2));
        args.insert("b".into(), json!(3));
        assert_eq!(session.call_tool("add", &args).await.unwrap(), vec!["5"]);

        let segments = session.call_tool("status", &Map::new()).await.unwrap();
        assert_eq!(segments.concat(), "status: online");
    }

    #[tokio::test]
    async fn test_tool_errors_are_execution_failures() {
        let session = connected().await;

        let err = session.call_tool("explode", &Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(ref msg) if msg == "kaboom"));

        let err = session.call_tool("missing", &Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(ref msg) if msg.contains("Unknown tool")));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let (client, _server) = duplex(1024);
        let (read, write) = split(client);
        let result = McpSession::connect(read, write, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AgentError::Session(msg)) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_closed_server_is_session_error() {
        let (client, server) = duplex(1024);
        drop(server);
        let (read, write) = split(client);
        let result = McpSession::connect(read, write, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(AgentError::Session(_))));
    }
}
