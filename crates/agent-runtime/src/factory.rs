//! Adapter construction for the orchestrator

use std::sync::Arc;

use agent_core::{
    config::OrchestratorConfig,
    error::Result,
    memory::{Embedder, HashingEmbedder, MemoryStore, RetrievalAdapter},
    provider::{AdapterFactory, BackendFamily, ModelAdapter},
};

use crate::embed::OllamaEmbedder;
use crate::ollama::{OllamaAdapter, OllamaConfig};
use crate::openai::{OpenAiAdapter, OpenAiConfig};

/// Builds family adapters; wraps each with retrieval when memory is on.
///
/// The memory store lives here, so it outlives adapter swaps.
pub struct RuntimeAdapterFactory {
    ollama: OllamaConfig,
    openai: OpenAiConfig,
    memory: Option<Arc<MemoryStore>>,
}

impl RuntimeAdapterFactory {
    pub fn new(ollama: OllamaConfig, openai: OpenAiConfig, memory: Option<Arc<MemoryStore>>) -> Self {
        Self {
            ollama,
            openai,
            memory,
        }
    }

    /// Backend settings from the environment, memory per `config`
    pub fn from_env(config: &OrchestratorConfig) -> Result<Self> {
        let ollama = OllamaConfig::from_env();
        let memory = if config.memory_enabled {
            let embedder = embedder_from_env(config, &ollama)?;
            tracing::info!(model = embedder.model(), top_k = config.top_k, "Memory enabled");
            Some(Arc::new(MemoryStore::new(embedder, config.top_k)))
        } else {
            None
        };

        Ok(Self::new(ollama, OpenAiConfig::from_env(), memory))
    }

    pub fn memory(&self) -> Option<&Arc<MemoryStore>> {
        self.memory.as_ref()
    }
}

impl AdapterFactory for RuntimeAdapterFactory {
    fn create(&self, family: BackendFamily, model: &str) -> Result<Arc<dyn ModelAdapter>> {
        tracing::debug!(model, api = %family, "Building adapter");
        let base: Arc<dyn ModelAdapter> = match family {
            BackendFamily::HostedApi => Arc::new(OpenAiAdapter::new(self.openai.clone(), model)?),
            BackendFamily::LocalDaemon => Arc::new(OllamaAdapter::new(self.ollama.clone(), model)?),
        };

        Ok(match &self.memory {
            Some(memory) => Arc::new(RetrievalAdapter::new(base, memory.clone())),
            None => base,
        })
    }
}

/// `EMBEDDER=hashing` selects the offline embedder; otherwise the daemon's.
pub fn embedder_from_env(
    config: &OrchestratorConfig,
    ollama: &OllamaConfig,
) -> Result<Arc<dyn Embedder>> {
    match std::env::var("EMBEDDER").as_deref() {
        Ok("hashing") => Ok(Arc::new(HashingEmbedder::default())),
        _ => Ok(Arc::new(OllamaEmbedder::new(ollama, config.embed_model.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(memory: bool) -> RuntimeAdapterFactory {
        let store = memory.then(|| Arc::new(MemoryStore::new(Arc::new(HashingEmbedder::default()), 5)));
        RuntimeAdapterFactory::new(OllamaConfig::default(), OpenAiConfig::default(), store)
    }

    #[test]
    fn test_creates_each_family() {
        let factory = factory(false);
        let hosted = factory.create(BackendFamily::HostedApi, "gpt-4o").unwrap();
        assert_eq!(hosted.family(), BackendFamily::HostedApi);
        assert_eq!(hosted.model(), "gpt-4o");

        let local = factory.create(BackendFamily::LocalDaemon, "llama3.2").unwrap();
        assert_eq!(local.family(), BackendFamily::LocalDaemon);
    }

    #[test]
    fn test_memory_shared_across_adapters() {
        let factory = factory(true);
        let memory = factory.memory().unwrap().clone();
        let adapter = factory.create(BackendFamily::LocalDaemon, "llama3.2").unwrap();

        // Retrieval wrapper reports the inner adapter's identity.
        assert_eq!(adapter.family(), BackendFamily::LocalDaemon);
        assert_eq!(Arc::strong_count(&memory), 3);
    }
}
