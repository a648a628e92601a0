//! In-process backend with exact cosine search.
//!
//! Keeps the chunk rows and the vector index as two separate maps, exactly
//! like a real deployment keeps two stores, so tests can observe the
//! row/index split and the eventual consistency between them.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::types::{BotId, ChunkId, KbError};

use super::{ChunkRecord, FileSummary, IndexEntry, KnowledgeBackend, ScoredChunk};

#[derive(Default)]
struct Inner {
    rows: HashMap<ChunkId, ChunkRecord>,
    index: HashMap<ChunkId, Vec<f32>>,
}

/// Backend storing everything in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently present in the vector index (test observability).
    pub fn indexed_ids(&self) -> Vec<ChunkId> {
        self.inner.read().index.keys().copied().collect()
    }

    /// Ids currently present in the chunk table (test observability).
    pub fn row_ids(&self) -> Vec<ChunkId> {
        self.inner.read().rows.keys().copied().collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

#[async_trait]
impl KnowledgeBackend for MemoryBackend {
    async fn persist_chunk(&self, record: &ChunkRecord) -> Result<(), KbError> {
        self.inner.write().rows.insert(record.id, record.clone());
        Ok(())
    }

    async fn index_chunks(&self, entries: Vec<IndexEntry>) -> Result<(), KbError> {
        let mut inner = self.inner.write();
        for entry in entries {
            inner.index.insert(entry.id, entry.embedding);
        }
        Ok(())
    }

    async fn remove_chunk(&self, id: ChunkId) -> Result<bool, KbError> {
        let mut inner = self.inner.write();
        let existed = inner.rows.remove(&id).is_some();
        inner.index.remove(&id);
        Ok(existed)
    }

    async fn remove_file(&self, bot_id: BotId, filename: &str) -> Result<usize, KbError> {
        let mut inner = self.inner.write();
        let doomed: Vec<ChunkId> = inner
            .rows
            .values()
            .filter(|record| record.bot_id == bot_id && record.filename == filename)
            .map(|record| record.id)
            .collect();
        for id in &doomed {
            inner.rows.remove(id);
            inner.index.remove(id);
        }
        Ok(doomed.len())
    }

    async fn remove_bot(&self, bot_id: BotId) -> Result<usize, KbError> {
        let mut inner = self.inner.write();
        let doomed: Vec<ChunkId> = inner
            .rows
            .values()
            .filter(|record| record.bot_id == bot_id)
            .map(|record| record.id)
            .collect();
        for id in &doomed {
            inner.rows.remove(id);
            inner.index.remove(id);
        }
        Ok(doomed.len())
    }

    async fn list_files(&self, bot_id: BotId) -> Result<Vec<FileSummary>, KbError> {
        let inner = self.inner.read();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in inner.rows.values() {
            if record.bot_id == bot_id {
                *counts.entry(record.filename.as_str()).or_default() += 1;
            }
        }
        let mut summaries: Vec<FileSummary> = counts
            .into_iter()
            .map(|(filename, chunk_count)| FileSummary {
                filename: filename.to_string(),
                chunk_count,
            })
            .collect();
        summaries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(summaries)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        bot_id: BotId,
    ) -> Result<Vec<ScoredChunk>, KbError> {
        let inner = self.inner.read();
        let mut scored: Vec<ScoredChunk> = inner
            .index
            .iter()
            .filter_map(|(id, embedding)| {
                // Only chunks whose row still exists and belongs to the
                // requesting bot are eligible.
                let record = inner.rows.get(id)?;
                if record.bot_id != bot_id {
                    return None;
                }
                Some(ScoredChunk {
                    chunk: record.snapshot(),
                    score: cosine_similarity(query_embedding, embedding),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn chunk_count(&self, bot_id: BotId) -> Result<usize, KbError> {
        let inner = self.inner.read();
        Ok(inner
            .rows
            .values()
            .filter(|record| record.bot_id == bot_id)
            .count())
    }
}
