//! Retrieval-result cache keyed by bot, normalized query, and top-k.
//!
//! The cache memoizes the chunk snapshots a (bot, query, top_k) triple
//! retrieved, not the generated answer, so a cache hit skips the query
//! embedding and the similarity search but the language model still sees the
//! live conversation history. Every cache failure degrades to a recompute;
//! retrieval must keep working with the cache completely broken.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::stores::ChunkSnapshot;
use crate::types::{BotId, KbError};

/// String key/value store with per-entry TTL and prefix deletion.
///
/// Implementations back onto whatever the deployment has at hand; the
/// in-process [`MemoryCacheStore`] is the default.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KbError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), KbError>;

    async fn delete(&self, key: &str) -> Result<(), KbError>;

    /// Delete every key starting with `prefix`; returns how many went away.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, KbError>;
}

/// In-process cache store with lazy expiry.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KbError> {
        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some((value, expiry)) if *expiry > Instant::now() => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries.write().remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), KbError> {
        self.entries
            .write()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KbError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, KbError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }
}

/// Memoizes retrieval results with a fixed TTL.
///
/// Keys follow `query:{bot_id}:{sha256(query)}:{top_k}` with the query
/// trimmed and lowercased before hashing, so trivially re-phrased queries
/// ("Hello?" vs "hello?") share an entry. Invalidation deletes the
/// `query:{bot_id}:` prefix, wiping every memoized query for the bot.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(bot_id: BotId, query: &str, top_k: usize) -> String {
        let normalized = query.trim().to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        format!("query:{bot_id}:{digest:x}:{top_k}")
    }

    /// Return the cached snapshots for this (bot, query, top_k), or run
    /// `compute` and memoize its result.
    ///
    /// Store errors and undecodable entries are logged and treated as
    /// misses; only `compute` itself can fail the call.
    pub async fn get_or_compute<F, Fut>(
        &self,
        bot_id: BotId,
        query: &str,
        top_k: usize,
        compute: F,
    ) -> Result<Vec<ChunkSnapshot>, KbError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Vec<ChunkSnapshot>, KbError>> + Send,
    {
        let key = Self::key(bot_id, query, top_k);

        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<ChunkSnapshot>>(&raw) {
                Ok(snapshots) => {
                    debug!(%bot_id, top_k, "retrieval cache hit");
                    return Ok(snapshots);
                }
                Err(err) => {
                    warn!(%bot_id, error = %err, "evicting undecodable cache entry");
                    if let Err(err) = self.store.delete(&key).await {
                        warn!(%bot_id, error = %err, "failed to evict cache entry");
                    }
                }
            },
            Ok(None) => {}
            Err(err) => warn!(%bot_id, error = %err, "cache read failed, recomputing"),
        }

        let snapshots = compute().await?;

        match serde_json::to_string(&snapshots) {
            Ok(raw) => {
                if let Err(err) = self.store.set(&key, raw, self.ttl).await {
                    warn!(%bot_id, error = %err, "cache write failed");
                }
            }
            Err(err) => warn!(%bot_id, error = %err, "failed to encode retrieval result"),
        }
        Ok(snapshots)
    }

    /// Drop every memoized query for one bot. Called after any write to the
    /// bot's corpus.
    pub async fn invalidate(&self, bot_id: BotId) -> Result<usize, KbError> {
        let removed = self.store.delete_prefix(&format!("query:{bot_id}:")).await?;
        debug!(%bot_id, removed, "invalidated retrieval cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn snapshot(content: &str) -> ChunkSnapshot {
        ChunkSnapshot {
            id: Uuid::new_v4(),
            filename: "doc.txt".into(),
            chunk_index: 0,
            content: content.into(),
        }
    }

    fn cache() -> QueryCache {
        QueryCache::new(Arc::new(MemoryCacheStore::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn second_lookup_skips_compute() {
        let cache = cache();
        let bot = Uuid::new_v4();
        let computed = AtomicUsize::new(0);

        for _ in 0..2 {
            let result = cache
                .get_or_compute(bot, "what is shipping?", 3, || async {
                    computed.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![snapshot("shipping takes two days")])
                })
                .await
                .unwrap();
            assert_eq!(result.len(), 1);
        }
        assert_eq!(computed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rephrased_query_shares_the_entry() {
        let cache = cache();
        let bot = Uuid::new_v4();
        let computed = AtomicUsize::new(0);

        for query in ["  What Is Shipping? ", "what is shipping?"] {
            cache
                .get_or_compute(bot, query, 3, || async {
                    computed.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![snapshot("shipping takes two days")])
                })
                .await
                .unwrap();
        }
        assert_eq!(computed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache = cache();
        let bot = Uuid::new_v4();
        let other_bot = Uuid::new_v4();
        let computed = AtomicUsize::new(0);

        let lookup = |bot| {
            cache.get_or_compute(bot, "query", 3, || async {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(vec![snapshot("hit")])
            })
        };

        lookup(bot).await.unwrap();
        lookup(other_bot).await.unwrap();
        assert_eq!(cache.invalidate(bot).await.unwrap(), 1);

        lookup(bot).await.unwrap();
        lookup(other_bot).await.unwrap();
        // The other bot's entry survived the invalidation.
        assert_eq!(computed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn undecodable_entry_is_evicted_and_recomputed() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = QueryCache::new(store.clone(), Duration::from_secs(60));
        let bot = Uuid::new_v4();

        let key = QueryCache::key(bot, "query", 3);
        store
            .set(&key, "not json".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let result = cache
            .get_or_compute(bot, "query", 3, || async { Ok(vec![snapshot("fresh")]) })
            .await
            .unwrap();
        assert_eq!(result[0].content, "fresh");
        assert!(store.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = Arc::new(MemoryCacheStore::new());
        store
            .set("k", "v".into(), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[test]
    fn distinct_top_k_gets_distinct_keys() {
        let bot = Uuid::new_v4();
        assert_ne!(
            QueryCache::key(bot, "query", 3),
            QueryCache::key(bot, "query", 5)
        );
    }
}
