//! # agent-core
//!
//! Tool-augmented orchestration engine with provider-agnostic model adapters,
//! a cached tool registry and an embedding memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                             │
//! │  ┌───────────────────┐   ┌──────────────┐   ┌─────────────────┐  │
//! │  │ RetrievalAdapter  │──▶│ ModelAdapter │──▶│  ChatBackend    │  │
//! │  │  (MemoryStore)    │   │  run_turn    │   │  (wire format)  │  │
//! │  └───────────────────┘   └──────┬───────┘   └─────────────────┘  │
//! │                                 │                                 │
//! │                   ┌─────────────▼──────────────┐                  │
//! │                   │ ToolRegistry ─ ToolSession │                  │
//! │                   └────────────────────────────┘                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ModelAdapter` trait lets the orchestrator switch between a hosted
//! chat-completions API and a local daemon without knowing either wire format.

pub mod config;
pub mod error;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod reasoning;
pub mod tool;

pub use config::OrchestratorConfig;
pub use error::{AgentError, Result, ToolErrorKind};
pub use memory::{Embedder, HashingEmbedder, MemoryStore, RetrievalAdapter};
pub use message::{InteractionRecord, Message, Role};
pub use orchestrator::Orchestrator;
pub use provider::{AdapterFactory, BackendFamily, BackendReply, ChatBackend, ModelAdapter};
pub use tool::{EmptyToolSession, RawArguments, ToolCall, ToolDescriptor, ToolOutcome, ToolRegistry, ToolSession};
