//! Embedding Memory
//!
//! Past (query, answer) pairs are embedded and kept in a flat L2 index.
//! Before a turn, the nearest pairs are prepended to the conversation,
//! oldest first; after it, the new pair is stored. The store only grows.
//!
//! ```text
//!   query ──embed──▶ FlatL2Index::search ──▶ [user, assistant]* ++ conversation
//!                                                        │
//!   store(query, answer) ◀── InteractionRecord::answer ◀─┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AgentError, Result};
use crate::message::{latest_user_message, InteractionRecord, Message};
use crate::provider::{BackendFamily, ModelAdapter};
use crate::tool::{ToolRegistry, ToolSession};

/// Text embedding model, fixed at construction
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding model identifier
    fn model(&self) -> &str;

    /// Deterministic embedding of `text`
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Offline embedder: signed feature hashing of lowercased word unigrams
/// and bigrams, L2-normalized. Runs on the blocking pool.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn embed_sync(dim: usize, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut vector = vec![0.0_f32; dim];
        let mut bump = |feature: &str| {
            let hash = blake3::hash(feature.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]);
            #[allow(clippy::cast_possible_truncation)]
            let idx = (bucket % dim as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        };

        for word in &words {
            bump(word);
        }
        for pair in words.windows(2) {
            bump(&format!("{} {}", pair[0], pair[1]));
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let dim = self.dim;
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || Self::embed_sync(dim, &text))
            .await
            .map_err(|e| AgentError::Embedding(e.to_string()))
    }
}

/// Brute-force Euclidean index; position is the key
#[derive(Clone, Debug, Default)]
pub struct FlatL2Index {
    dim: Option<usize>,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimension, fixed by the first vector added
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.dim.map_or(0, |d| self.data.len() / d)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(AgentError::Embedding("empty embedding".into()));
        }
        match self.dim {
            Some(d) if d != vector.len() => Err(AgentError::Embedding(format!(
                "dimension mismatch: index has {d}, got {}",
                vector.len()
            ))),
            _ => Ok(()),
        }
    }

    /// Append a vector; returns its position
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        self.check_dim(vector)?;
        let position = self.len();
        self.dim = Some(vector.len());
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// The `k` nearest positions with squared distances, closest first.
    /// Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        let Some(dim) = self.dim else {
            return Ok(Vec::new());
        };
        self.check_dim(query)?;

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(dim)
            .enumerate()
            .map(|(idx, row)| {
                let dist = row
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (idx, dist)
            })
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        Ok(scored)
    }
}

/// One remembered exchange
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryEntry {
    pub user_message: String,
    pub assistant_response: String,
}

#[derive(Default)]
struct MemoryState {
    index: FlatL2Index,
    entries: Vec<MemoryEntry>,
}

/// Append-only similarity memory
///
/// Index and records sit behind one lock so their counts never diverge,
/// even when several orchestrators share the store.
pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    state: RwLock<MemoryState>,
    /// Exchanges dropped because embedding or insertion failed
    failed_stores: AtomicUsize,
}

impl MemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            embedder,
            top_k: top_k.max(1),
            state: RwLock::default(),
            failed_stores: AtomicUsize::new(0),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn embedder_model(&self) -> &str {
        self.embedder.model()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of vectors in the index (equal to `len`)
    pub async fn indexed(&self) -> usize {
        self.state.read().await.index.len()
    }

    /// Exchanges that could not be stored since startup
    pub fn failed_stores(&self) -> usize {
        self.failed_stores.load(Ordering::Relaxed)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    /// Remember one exchange; failures are counted in `failed_stores`
    pub async fn store(&self, user_message: &str, assistant_response: &str) -> Result<()> {
        let stored = self.insert(user_message, assistant_response).await;
        if stored.is_err() {
            self.failed_stores.fetch_add(1, Ordering::Relaxed);
        }
        stored
    }

    async fn insert(&self, user_message: &str, assistant_response: &str) -> Result<()> {
        let combined = format!("User: {user_message}\nAssistant: {assistant_response}");
        let embedding = self.embed(&combined).await?;

        let mut state = self.state.write().await;
        state.index.add(&embedding)?;
        state.entries.push(MemoryEntry {
            user_message: user_message.to_string(),
            assistant_response: assistant_response.to_string(),
        });
        tracing::debug!(total = state.entries.len(), "Stored interaction in memory");
        Ok(())
    }

    /// The `k` nearest past exchanges to `query`, oldest first
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<MemoryEntry>> {
        let count = self.len().await;
        if count == 0 {
            return Ok(Vec::new());
        }
        let k = k.min(count);
        let embedding = self.embed(query).await?;

        let state = self.state.read().await;
        let mut positions: Vec<usize> = state
            .index
            .search(&embedding, k)?
            .into_iter()
            .map(|(idx, _)| idx)
            .collect();
        positions.sort_unstable();

        Ok(positions
            .into_iter()
            .filter_map(|idx| state.entries.get(idx).cloned())
            .collect())
    }

    /// Retrieved exchanges as `user`/`assistant` message pairs
    pub async fn recall(&self, query: &str) -> Result<Vec<Message>> {
        let entries = self.retrieve(query, self.top_k).await?;
        Ok(entries
            .into_iter()
            .flat_map(|e| [Message::user(e.user_message), Message::assistant(e.assistant_response)])
            .collect())
    }
}

/// Wraps any adapter with retrieve → augment → store
pub struct RetrievalAdapter {
    inner: Arc<dyn ModelAdapter>,
    memory: Arc<MemoryStore>,
}

impl RetrievalAdapter {
    pub fn new(inner: Arc<dyn ModelAdapter>, memory: Arc<MemoryStore>) -> Self {
        Self { inner, memory }
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }
}

#[async_trait]
impl ModelAdapter for RetrievalAdapter {
    fn family(&self) -> BackendFamily {
        self.inner.family()
    }

    fn model(&self) -> String {
        self.inner.model()
    }

    fn set_model(&self, model: &str) {
        self.inner.set_model(model);
    }

    async fn process(
        &self,
        conversation: Vec<Message>,
        tools: &ToolRegistry,
        session: &dyn ToolSession,
    ) -> Result<InteractionRecord> {
        let query = latest_user_message(&conversation).to_string();

        // Memory is best-effort: an embedding outage must not cost the turn.
        let mut augmented = match self.memory.recall(&query).await {
            Ok(recalled) => recalled,
            Err(e) => {
                tracing::warn!(error = %e, "Memory retrieval failed; continuing without context");
                Vec::new()
            }
        };
        tracing::debug!(recalled = augmented.len() / 2, "Augmented conversation");
        augmented.extend(conversation);

        let record = self.inner.process(augmented, tools, session).await?;

        if let Err(e) = self.memory.store(&query, record.answer()).await {
            tracing::warn!(
                error = %e,
                failed = self.memory.failed_stores(),
                "Failed to store interaction in memory"
            );
        }
        Ok(record)
    }

    async fn list_models(&self) -> Vec<String> {
        self.inner.list_models().await
    }
}
