//! # agent-runtime
//!
//! Concrete backends for the tool agent.
//!
//! ## Components
//!
//! - **OpenAI**: hosted chat-completions adapter
//! - **Ollama**: local daemon adapter over `ollama-rs`
//! - **Embedder**: daemon-backed text embeddings for memory
//! - **MCP**: stdio JSON-RPC tool session
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{McpConfig, McpSession, RuntimeAdapterFactory};
//!
//! let config = OrchestratorConfig::from_env()?;
//! let factory = Arc::new(RuntimeAdapterFactory::from_env(&config)?);
//! let session = Arc::new(McpSession::spawn(&McpConfig::new("server.py")).await?);
//! let orchestrator = Orchestrator::connect(config, factory, session).await?;
//! ```

pub mod embed;
pub mod factory;
pub mod mcp;
pub mod ollama;
pub mod openai;

pub use embed::OllamaEmbedder;
pub use factory::{RuntimeAdapterFactory, embedder_from_env};
pub use mcp::{McpConfig, McpSession};
pub use ollama::{OllamaAdapter, OllamaConfig};
pub use openai::{OpenAiAdapter, OpenAiConfig};

// Re-export core types for convenience
pub use agent_core::{
    AgentError, EmptyToolSession, Message, ModelAdapter, Orchestrator, OrchestratorConfig, Result, Role,
    ToolSession,
};
