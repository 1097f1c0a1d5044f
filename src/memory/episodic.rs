//! Episodic memory: an append-only store of important messages,
//! promoted from working memory on eviction, retrievable by similarity.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::Message;
use crate::error::Result;

use super::embedding::{cosine_similarity, jaccard_similarity, Embedder};

/// One promoted message with its scored importance and optional embedding.
#[derive(Debug, Clone)]
pub struct EpisodicEntry {
    pub id: Uuid,
    pub message: Message,
    pub importance: f32,
    pub timestamp: DateTime<Utc>,
    pub embedding: Option<Vec<f32>>,
}

/// Append-only episodic store with similarity-ranked recall.
#[derive(Default)]
pub struct EpisodicMemory {
    entries: Vec<EpisodicEntry>,
}

impl EpisodicMemory {
    pub fn new() -> Self {
        EpisodicMemory { entries: Vec::new() }
    }

    pub fn promote(&mut self, message: Message, importance: f32, timestamp: DateTime<Utc>, embedding: Option<Vec<f32>>) {
        self.entries.push(EpisodicEntry {
            id: Uuid::new_v4(),
            message,
            importance,
            timestamp,
            embedding,
        });
    }

    /// Look up a single promoted entry by id.
    pub fn get(&self, id: Uuid) -> Option<&EpisodicEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all(&self) -> &[EpisodicEntry] {
        &self.entries
    }

    /// Return the `top_k` entries most relevant to `query`. Uses cosine
    /// similarity over embeddings when `embedder` is supplied and every
    /// candidate carries one; otherwise falls back to Jaccard token overlap.
    pub async fn recall(&self, query: &str, top_k: usize, embedder: Option<&dyn Embedder>) -> Result<Vec<EpisodicEntry>> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = match embedder {
            Some(embedder) => Some(embedder.embed(query).await?),
            None => None,
        };

        let mut scored: Vec<(f32, &EpisodicEntry)> = self
            .entries
            .iter()
            .map(|entry| {
                let score = match (&query_embedding, &entry.embedding) {
                    (Some(q), Some(e)) => cosine_similarity(q, e),
                    _ => jaccard_similarity(query, &entry.message.content),
                };
                (score, entry)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(top_k).map(|(_, entry)| entry.clone()).collect())
    }
}
