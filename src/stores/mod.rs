//! Storage backends for chunk rows and their embedding vectors.
//!
//! A [`KnowledgeBackend`] covers the two stores the pipeline writes to: the
//! durable chunk table (one row per chunk) and the vector index searched at
//! retrieval time. The two writes are deliberately separate operations —
//! `persist_chunk` lands the row, `index_chunks` lands a batch of vectors —
//! with no transaction spanning them; the pipeline orders them
//! row-then-index and accepts eventual consistency between the two.
//!
//! ```text
//!                  ┌────────────────────┐
//!                  │  KnowledgeBackend  │
//!                  │    (async trait)   │
//!                  └─────────┬──────────┘
//!                            │
//!              ┌─────────────┴─────────────┐
//!              ▼                           ▼
//!       ┌─────────────┐            ┌──────────────┐
//!       │   SQLite    │            │  In-memory   │
//!       │ sqlite-vec  │            │ exact cosine │
//!       └─────────────┘            └──────────────┘
//! ```

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{BotId, ChunkId, KbError};

pub use memory::MemoryBackend;
pub use sqlite::SqliteKnowledgeStore;

/// A persisted unit of retrievable knowledge.
///
/// Created once during ingestion and never mutated; removed individually,
/// by (bot, filename), or by bot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub bot_id: BotId,
    /// Source filename the chunk was cut from.
    pub filename: String,
    /// Ordinal position of this chunk within its source file.
    pub chunk_index: usize,
    /// Non-blank, trimmed chunk text.
    pub content: String,
    /// Embedding vector; same length for every chunk in the corpus.
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    pub fn new(
        bot_id: BotId,
        filename: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bot_id,
            filename: filename.into(),
            chunk_index,
            content: content.into(),
            embedding,
        }
    }

    /// Embedding-free view of the chunk, the unit cached and returned from
    /// retrieval.
    pub fn snapshot(&self) -> ChunkSnapshot {
        ChunkSnapshot {
            id: self.id,
            filename: self.filename.clone(),
            chunk_index: self.chunk_index,
            content: self.content.clone(),
        }
    }
}

/// Chunk state at the time of caching: id, text, minimal metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSnapshot {
    pub id: ChunkId,
    pub filename: String,
    pub chunk_index: usize,
    pub content: String,
}

/// A snapshot paired with its similarity score.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub chunk: ChunkSnapshot,
    pub score: f32,
}

/// One entry of a vector-index write batch.
#[derive(Clone, Debug)]
pub struct IndexEntry {
    pub id: ChunkId,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl From<&ChunkRecord> for IndexEntry {
    fn from(record: &ChunkRecord) -> Self {
        Self {
            id: record.id,
            content: record.content.clone(),
            embedding: record.embedding.clone(),
        }
    }
}

/// Filename with its chunk count, from the group-by-filename listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub filename: String,
    pub chunk_count: usize,
}

/// Unified interface over the durable chunk store and the vector index.
///
/// Removal operations take care of both stores (rows first, then index
/// entries) and report how many chunks went away; cache invalidation is the
/// caller's job.
#[async_trait]
pub trait KnowledgeBackend: Send + Sync {
    /// Persist one chunk row. Does not touch the vector index.
    async fn persist_chunk(&self, record: &ChunkRecord) -> Result<(), KbError>;

    /// Write a batch of vectors to the index in one call.
    async fn index_chunks(&self, entries: Vec<IndexEntry>) -> Result<(), KbError>;

    /// Remove a single chunk; returns whether it existed.
    async fn remove_chunk(&self, id: ChunkId) -> Result<bool, KbError>;

    /// Remove every chunk of one (bot, filename) pair; returns the count.
    async fn remove_file(&self, bot_id: BotId, filename: &str) -> Result<usize, KbError>;

    /// Remove a bot's entire corpus; returns the count.
    async fn remove_bot(&self, bot_id: BotId) -> Result<usize, KbError>;

    /// Filenames with chunk counts for one bot, ordered by filename.
    async fn list_files(&self, bot_id: BotId) -> Result<Vec<FileSummary>, KbError>;

    /// Similarity search restricted to one bot's chunks, best match first.
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        bot_id: BotId,
    ) -> Result<Vec<ScoredChunk>, KbError>;

    /// Total persisted chunks for one bot.
    async fn chunk_count(&self, bot_id: BotId) -> Result<usize, KbError>;
}
