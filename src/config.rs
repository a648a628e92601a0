//! Tunables for ingestion and retrieval.
//!
//! Defaults mirror a deployment sized for small uploaded documents: chunks of
//! at most 500 characters with a 100-character overlap, vector-index writes
//! batched five at a time, and a one-hour retrieval cache.

use std::time::Duration;

/// Knobs controlling how uploaded files are chunked and persisted.
#[derive(Clone, Debug)]
pub struct IngestionConfig {
    /// Maximum chunk size in bytes; a chunk becomes ready once the streaming
    /// buffer reaches this length.
    pub max_chunk_size: usize,
    /// Number of trailing bytes of each chunk re-seeded into the next one.
    /// Must be smaller than `max_chunk_size`.
    pub chunk_overlap: usize,
    /// Number of chunks accumulated before a vector-index write is flushed.
    pub index_batch_size: usize,
    /// Files larger than this are skipped with a warning.
    pub max_file_bytes: u64,
    /// Extracted text longer than this is truncated, not rejected.
    pub max_text_chars: usize,
    /// Upper bound on files accepted in one upload request.
    pub max_files_per_upload: usize,
    /// Upper bound on the combined size of one upload request.
    pub max_upload_bytes: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            chunk_overlap: 100,
            index_batch_size: 5,
            max_file_bytes: 5 * 1024 * 1024,
            max_text_chars: 1_000_000,
            max_files_per_upload: 10,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// What the answer engine does when retrieval finds no chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoContextPolicy {
    /// Short-circuit with a canned "not enough information" reply, skipping
    /// the language-model call entirely.
    CannedReply,
    /// Still call the model, with an explicit "no context available"
    /// placeholder in place of retrieved passages.
    Placeholder,
}

/// Knobs controlling retrieval and answer assembly.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Number of highest-scoring chunks requested from similarity search.
    pub top_k: usize,
    /// Lifetime of a memoized retrieval result.
    pub cache_ttl: Duration,
    /// Number of most-recent conversation turns folded into the prompt.
    pub history_window: usize,
    /// Policy applied when zero chunks match; one policy per engine, applied
    /// consistently across every query it serves.
    pub no_context_policy: NoContextPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            cache_ttl: Duration::from_secs(60 * 60),
            history_window: 5,
            no_context_policy: NoContextPolicy::CannedReply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_overlap_below_chunk_size() {
        let cfg = IngestionConfig::default();
        assert!(cfg.chunk_overlap < cfg.max_chunk_size);
        assert!(cfg.index_batch_size > 0);
    }

    #[test]
    fn default_policy_short_circuits() {
        let cfg = RetrievalConfig::default();
        assert_eq!(cfg.no_context_policy, NoContextPolicy::CannedReply);
        assert_eq!(cfg.top_k, 3);
    }
}
