//! Shared identifiers and the crate-wide error taxonomy.

use uuid::Uuid;

/// Identifier of the bot that owns a knowledge base.
pub type BotId = Uuid;

/// Identifier of a single persisted chunk.
pub type ChunkId = Uuid;

/// Errors surfaced by the ingestion and retrieval pipeline.
///
/// The variants map to distinct recovery policies:
///
/// - [`Validation`](KbError::Validation) and [`Extraction`](KbError::Extraction)
///   abort a single file's ingestion, never the whole upload.
/// - [`Embedding`](KbError::Embedding) is recoverable at chunk granularity;
///   the offending chunk is skipped.
/// - [`Persistence`](KbError::Persistence) is logged and does not roll back
///   sibling chunks already committed.
/// - [`Cache`](KbError::Cache) is always recoverable; the cache is
///   best-effort and never load-bearing for correctness.
/// - [`Model`](KbError::Model) is caught at the answer-assembly boundary and
///   converted into a fixed user-facing fallback reply.
#[derive(Debug, thiserror::Error)]
pub enum KbError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("cache operation failed: {0}")]
    Cache(String),

    #[error("language model call failed: {0}")]
    Model(String),
}
