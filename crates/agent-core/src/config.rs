//! Orchestrator configuration

use crate::error::{AgentError, Result};
use crate::provider::BackendFamily;

pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_EMBED_MODEL: &str = "all-minilm";
pub const DEFAULT_TOP_K: usize = 5;

/// Settings shared by every front-end
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Active model identifier
    pub model: String,

    /// Embedding model identifier
    pub embed_model: String,

    /// Past exchanges recalled per query
    pub top_k: usize,

    /// Wrap adapters with retrieval augmentation
    pub memory_enabled: bool,

    /// Model prefixes routed to the hosted API family
    pub hosted_prefixes: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            embed_model: DEFAULT_EMBED_MODEL.into(),
            top_k: DEFAULT_TOP_K,
            memory_enabled: true,
            hosted_prefixes: vec!["gpt".into()],
        }
    }
}

impl OrchestratorConfig {
    /// Read `AGENT_MODEL`, `EMBED_MODEL`, `MEMORY_TOP_K`, `MEMORY_ENABLED`
    /// and `HOSTED_MODEL_PREFIXES`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let top_k = match std::env::var("MEMORY_TOP_K") {
            Ok(raw) => parse_top_k(&raw)?,
            Err(_) => defaults.top_k,
        };

        let memory_enabled = std::env::var("MEMORY_ENABLED")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.memory_enabled);

        let hosted_prefixes = std::env::var("HOSTED_MODEL_PREFIXES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.hosted_prefixes);

        Ok(Self {
            model: std::env::var("AGENT_MODEL").unwrap_or(defaults.model),
            embed_model: std::env::var("EMBED_MODEL").unwrap_or(defaults.embed_model),
            top_k,
            memory_enabled,
            hosted_prefixes,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Backend family for `model` under this configuration
    pub fn family_for(&self, model: &str) -> BackendFamily {
        BackendFamily::for_model(model, &self.hosted_prefixes)
    }
}

fn parse_top_k(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(k) if k > 0 => Ok(k),
        _ => Err(AgentError::Config(format!(
            "MEMORY_TOP_K must be a positive integer, got '{raw}'"
        ))),
    }
}
