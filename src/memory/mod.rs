//! Hierarchical memory: working/episodic/semantic tiers wired
//! together behind the single [`HierarchicalMemory`] type that implements
//! the memory-backend contract (`Add`/`Get`/`List`/`Recall`/`Stats`).
//! A cache-then-search retrieval pipeline becomes [`HierarchicalMemory::recall`];
//! summarization becomes the pluggable [`Compressor`] invoked outside any lock.

mod compression;
mod embedding;
mod episodic;
mod importance;
mod semantic;
mod working;

pub use compression::{Compressor, ConcatCompressor, LlmCompressor};
pub use embedding::{cosine_similarity, jaccard_similarity, Embedder};
pub use episodic::{EpisodicEntry, EpisodicMemory};
pub use importance::{score_importance, ImportanceWeights};
pub use semantic::{SemanticFact, SemanticMemory};
pub use working::WorkingMemory;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::core::Message;
use crate::error::Result;

/// Tuning knobs for a [`HierarchicalMemory`] instance (defaults).
#[derive(Clone)]
pub struct MemoryConfig {
    pub working_capacity: usize,
    pub episodic_threshold: f32,
    pub auto_compress: bool,
    pub importance_weights: ImportanceWeights,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            working_capacity: 20,
            episodic_threshold: 0.7,
            auto_compress: false,
            importance_weights: ImportanceWeights::default(),
        }
    }
}

/// A write to [`HierarchicalMemory::add`].
pub enum MemoryEntry {
    Working(Message),
    Episodic {
        message: Message,
        importance: f32,
        embedding: Option<Vec<f32>>,
    },
    Semantic { key: String, fact: String },
}

/// Snapshot counters for each tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStats {
    pub working_len: usize,
    pub episodic_len: usize,
    pub semantic_len: usize,
}

/// The three-tier memory store. All mutations are serialized per instance
///; reads may run concurrently with each other.
/// Working and episodic/semantic tiers use separate locks so a compression
/// pass never needs to hold the working-memory lock while it awaits an LLM
/// call.
pub struct HierarchicalMemory {
    working: Mutex<WorkingMemory>,
    episodic: RwLock<EpisodicMemory>,
    semantic: RwLock<SemanticMemory>,
    config: MemoryConfig,
    compressor: Option<Arc<dyn Compressor>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl HierarchicalMemory {
    pub fn new(config: MemoryConfig) -> Self {
        HierarchicalMemory {
            working: Mutex::new(WorkingMemory::new(config.working_capacity)),
            episodic: RwLock::new(EpisodicMemory::new()),
            semantic: RwLock::new(SemanticMemory::new()),
            config,
            compressor: None,
            embedder: None,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Apply a [`MemoryEntry`] write.
    pub async fn add(&self, entry: MemoryEntry) -> Result<()> {
        match entry {
            MemoryEntry::Working(message) => self.add_message(message).await,
            MemoryEntry::Episodic { message, importance, embedding } => {
                self.episodic.write().await.promote(message, importance, Utc::now(), embedding);
                Ok(())
            }
            MemoryEntry::Semantic { key, fact } => {
                self.semantic.write().await.set(key, fact, Utc::now());
                Ok(())
            }
        }
    }

    /// Add a turn message to working memory. Scores importance, enforces
    /// FIFO eviction, and promotes an evicted-but-important message to
    /// episodic memory, atomically per call (invariant).
    pub async fn add_message(&self, message: Message) -> Result<()> {
        let evicted = {
            let mut working = self.working.lock().await;
            let at_capacity_before = working.len() >= working.capacity();
            let evicted = working.push(message);

            if self.config.auto_compress && at_capacity_before {
                let window = working.snapshot();
                drop(working);
                self.compress_window(window).await?;
            }
            evicted
        };

        if let Some(evicted_message) = evicted {
            let importance = score_importance(&evicted_message.content, &self.config.importance_weights);
            if importance >= self.config.episodic_threshold {
                let embedding = match &self.embedder {
                    Some(embedder) => Some(embedder.embed(&evicted_message.content).await?),
                    None => None,
                };
                self.episodic
                    .write()
                    .await
                    .promote(evicted_message, importance, Utc::now(), embedding);
            }
        }

        Ok(())
    }

    /// Run the configured [`Compressor`] over `window` with no lock held,
    /// then reacquire the working-memory lock to swap the synthesized
    /// message in.
    async fn compress_window(&self, window: Vec<Message>) -> Result<()> {
        let Some(compressor) = &self.compressor else {
            return Ok(());
        };
        if window.is_empty() {
            return Ok(());
        }

        let summary = compressor.compress(&window).await?;
        debug!(window_len = window.len(), "compressed working memory window");

        self.episodic.write().await.promote(
            Message::system(format!("[compressed window] {}", summary.content)),
            1.0,
            Utc::now(),
            None,
        );

        let mut working = self.working.lock().await;
        working.clear();
        working.push(summary);
        Ok(())
    }

    pub async fn set_semantic(&self, key: impl Into<String>, fact: impl Into<String>) {
        self.semantic.write().await.set(key, fact, Utc::now());
    }

    pub async fn get(&self, key: &str) -> Option<SemanticFact> {
        self.semantic.read().await.get(key).cloned()
    }

    /// Full working-memory snapshot plus all semantic facts.
    pub async fn list(&self) -> (Vec<Message>, Vec<SemanticFact>) {
        let working = self.working.lock().await.snapshot();
        let facts = self.semantic.read().await.list().into_iter().cloned().collect();
        (working, facts)
    }

    /// Top-K episodic recall for `query`.
    pub async fn recall(&self, query: &str, top_k: usize) -> Result<Vec<EpisodicEntry>> {
        let episodic = self.episodic.read().await;
        episodic.recall(query, top_k, self.embedder.as_deref()).await
    }

    pub async fn stats(&self) -> MemoryStats {
        MemoryStats {
            working_len: self.working.lock().await.len(),
            episodic_len: self.episodic.read().await.len(),
            semantic_len: self.semantic.read().await.len(),
        }
    }

    /// Assemble prompt-ready messages: semantic facts as a prepended system
    /// block, optional top-K episodic recall as context, then all current
    /// working messages in order.
    pub async fn assemble_context(&self, query: &str, recall_top_k: usize) -> Result<Vec<Message>> {
        let mut messages = Vec::new();

        let facts = self.semantic.read().await.list().into_iter().cloned().collect::<Vec<_>>();
        if !facts.is_empty() {
            let block = facts
                .iter()
                .map(|f| format!("{} = {}", f.key, f.fact))
                .collect::<Vec<_>>()
                .join("\n");
            messages.push(Message::system(format!("Known facts:\n{block}")));
        }

        if recall_top_k > 0 {
            let recalled = self.recall(query, recall_top_k).await?;
            if !recalled.is_empty() {
                let block = recalled
                    .iter()
                    .map(|e| format!("- {}", e.message.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(Message::system(format!("Relevant past context:\n{block}")));
            }
        }

        messages.extend(self.working.lock().await.snapshot());
        Ok(messages)
    }
}

impl Clone for MemoryEntry {
    fn clone(&self) -> Self {
        match self {
            MemoryEntry::Working(m) => MemoryEntry::Working(m.clone()),
            MemoryEntry::Episodic { message, importance, embedding } => MemoryEntry::Episodic {
                message: message.clone(),
                importance: *importance,
                embedding: embedding.clone(),
            },
            MemoryEntry::Semantic { key, fact } => MemoryEntry::Semantic {
                key: key.clone(),
                fact: fact.clone(),
            },
        }
    }
}
