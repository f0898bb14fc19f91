//! Daemon-backed embedder

use agent_core::{
    error::{AgentError, Result},
    memory::Embedder,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ollama::{OllamaConfig, http_client, transport_error};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeds text through the daemon's `/api/embed` endpoint
pub struct OllamaEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: &OllamaConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            base_url: config.base_url(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| AgentError::Embedding(transport_error(&e, &self.base_url).to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Embedding(format!("embed failed ({status}): {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Embedding(format!("bad embed response: {e}")))?;

        parsed
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AgentError::Embedding("daemon returned no embedding".into()))
    }
}
