//! Orchestrator
//!
//! The explicit orchestration context: constructed once at startup, shared
//! by the front-ends, dropped at shutdown. Owns the active adapter, the tool
//! session and the registry snapshot taken from it.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::config::OrchestratorConfig;
use crate::error::{AgentError, Result};
use crate::message::{InteractionRecord, Message};
use crate::provider::{AdapterFactory, BackendFamily, ModelAdapter};
use crate::tool::{ToolDescriptor, ToolRegistry, ToolSession};

pub struct Orchestrator {
    config: OrchestratorConfig,
    factory: Arc<dyn AdapterFactory>,
    session: Arc<dyn ToolSession>,
    tools: RwLock<Arc<ToolRegistry>>,
    adapter: RwLock<Arc<dyn ModelAdapter>>,
    /// Serializes queries: one conversation thread per instance
    turn: Mutex<()>,
}

impl Orchestrator {
    /// Build the adapter for the configured model and list the session's tools
    pub async fn connect(
        config: OrchestratorConfig,
        factory: Arc<dyn AdapterFactory>,
        session: Arc<dyn ToolSession>,
    ) -> Result<Self> {
        let family = config.family_for(&config.model);
        let adapter = factory.create(family, &config.model)?;
        let tools = ToolRegistry::refresh(session.as_ref()).await?;

        tracing::info!(model = %config.model, api = %family, tools = tools.len(), "Orchestrator ready");

        Ok(Self {
            config,
            factory,
            session,
            tools: RwLock::new(Arc::new(tools)),
            adapter: RwLock::new(adapter),
            turn: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one query and return the full interaction record
    pub async fn run(&self, query: &str) -> Result<InteractionRecord> {
        let _turn = self.turn.lock().await;

        // Captured once: a concurrent `set_model` cannot affect this turn.
        let adapter = self.adapter.read().await.clone();
        let tools = self.tools.read().await.clone();

        adapter
            .process(vec![Message::user(query)], &tools, self.session.as_ref())
            .await
    }

    /// Run one query and format the reply; failures become displayable text.
    pub async fn handle(&self, query: &str) -> String {
        match self.run(query).await {
            Ok(record) => {
                tracing::debug!(
                    turn = %record.id,
                    messages = record.messages().len(),
                    tools = record.tool_exchanges(),
                    "Turn complete"
                );
                record.format_reply()
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing query");
                format!("Error processing your query: {}", e.user_message())
            }
        }
    }

    /// Switch models; the adapter is only rebuilt when the family changes.
    pub async fn set_model(&self, model: &str) -> Result<String> {
        let family = self.config.family_for(model);
        let mut adapter = self.adapter.write().await;

        if adapter.family() == family {
            adapter.set_model(model);
        } else {
            *adapter = self.factory.create(family, model)?;
        }

        let status = format!("Model changed to: {model} (API: {family})");
        tracing::info!("{status}");
        Ok(status)
    }

    pub async fn model(&self) -> String {
        self.adapter.read().await.model()
    }

    pub async fn family(&self) -> BackendFamily {
        self.adapter.read().await.family()
    }

    pub async fn list_models(&self) -> Vec<String> {
        let adapter = self.adapter.read().await.clone();
        adapter.list_models().await
    }

    /// All cached tools, or just `name`
    pub async fn tool_details(&self, name: Option<&str>) -> Result<Vec<ToolDescriptor>> {
        let tools = self.tools.read().await;
        match name {
            None => Ok(tools.descriptors().to_vec()),
            Some(name) => tools
                .get(name)
                .cloned()
                .map(|t| vec![t])
                .ok_or_else(|| AgentError::UnknownTool(name.to_string())),
        }
    }

    /// Re-list the session's tools (after a reconnect)
    pub async fn refresh_tools(&self) -> Result<usize> {
        let fresh = ToolRegistry::refresh(self.session.as_ref()).await?;
        let count = fresh.len();
        *self.tools.write().await = Arc::new(fresh);
        Ok(count)
    }
}
