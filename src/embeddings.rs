//! Embedding provider seam.
//!
//! The pipeline requests one embedding per chunk through
//! [`EmbeddingProvider`]; a failure is recoverable at chunk granularity and
//! never aborts the file. [`RigEmbeddingProvider`] adapts any `rig-core`
//! embedding model, [`MockEmbeddingProvider`] produces deterministic vectors
//! for tests.

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;

use crate::types::KbError;

/// Turns text into a fixed-length float vector.
///
/// Every vector returned by one provider instance has exactly
/// [`dimensions`](EmbeddingProvider::dimensions) entries; the constant
/// dimensionality invariant of the corpus rests on this.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider produces.
    fn dimensions(&self) -> usize;

    /// Embed one piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError>;
}

/// Adapter over a `rig-core` embedding model (OpenAI, Ollama, ...).
#[derive(Clone)]
pub struct RigEmbeddingProvider<M>
where
    M: EmbeddingModel,
{
    model: M,
}

impl<M> RigEmbeddingProvider<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M> EmbeddingProvider for RigEmbeddingProvider<M>
where
    M: EmbeddingModel,
{
    fn dimensions(&self) -> usize {
        self.model.ndims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        let embedding = self
            .model
            .embed_text(text)
            .await
            .map_err(|err| KbError::Embedding(err.to_string()))?;
        Ok(embedding.vec.into_iter().map(|value| value as f32).collect())
    }
}

/// Deterministic embedding provider for tests and offline runs.
///
/// Identical text always yields the identical vector; different text yields
/// a different one with overwhelming probability.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 16 }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions.max(1);
        self
    }

    fn seed(text: &str) -> u64 {
        // FNV-1a over the bytes; cheap and stable across runs.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        let mut state = Self::seed(text);
        let mut vector = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            // Map the top bits into [-1.0, 1.0).
            vector.push(((state >> 40) as f32 / 8_388_608.0) - 1.0);
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let first = provider.embed("hello world").await.unwrap();
        let second = provider.embed("hello world").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), provider.dimensions());
    }

    #[tokio::test]
    async fn different_text_gets_different_vectors() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("hello").await.unwrap();
        let b = provider.embed("goodbye").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn dimensions_are_configurable() {
        let provider = MockEmbeddingProvider::new().with_dimensions(4);
        let vector = provider.embed("text").await.unwrap();
        assert_eq!(vector.len(), 4);
    }
}
