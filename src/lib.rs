//! Per-bot document ingestion and retrieval for retrieval-augmented chat.
//!
//! Each bot owns an isolated knowledge base built from uploaded documents.
//! Ingestion streams files through a bounded-memory chunker, embeds each
//! chunk, and lands it in two stores (a durable chunk table, then a batched
//! vector index). Retrieval embeds the question, searches the bot's vectors,
//! memoizes the result, and folds the winning chunks into a grounded prompt.
//!
//! ```text
//!   upload ──► validate ──► chunk ──► embed ──► persist row ──► index batch
//!                                                     │
//!                                                     └──► invalidate cache
//!
//!   question ──► cache? ──miss──► embed ──► search ──► top-k chunks
//!                  │ hit                                    │
//!                  └────────────► snapshots ──► prompt ──► model ──► answer
//! ```
//!
//! The seams are traits: [`stores::KnowledgeBackend`] for storage,
//! [`embeddings::EmbeddingProvider`] and [`completion::ChatModel`] for the
//! models, [`cache::CacheStore`] for memoization, and
//! [`extract::TextExtractor`] for document formats beyond plain text. Mock
//! implementations of each ship in-crate, so the whole pipeline runs in
//! tests without a network.

pub mod bot;
pub mod cache;
pub mod chunker;
pub mod completion;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod ingestion;
pub mod retrieval;
pub mod session;
pub mod stores;
pub mod types;

pub use bot::BotProfile;
pub use cache::{CacheStore, MemoryCacheStore, QueryCache};
pub use chunker::StreamingChunker;
pub use completion::ChatModel;
pub use config::{IngestionConfig, NoContextPolicy, RetrievalConfig};
pub use embeddings::EmbeddingProvider;
pub use ingestion::{FileOutcome, IngestionPipeline, SourceFile, UploadReport};
pub use retrieval::{AnswerEngine, Retriever};
pub use session::{ChatTurn, SessionId, SessionStore};
pub use stores::{ChunkRecord, ChunkSnapshot, KnowledgeBackend, MemoryBackend, SqliteKnowledgeStore};
pub use types::{BotId, ChunkId, KbError};
