//! Cached retrieval and the outward-facing answer engine.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::bot::BotProfile;
use crate::cache::QueryCache;
use crate::completion::ChatModel;
use crate::config::{NoContextPolicy, RetrievalConfig};
use crate::embeddings::EmbeddingProvider;
use crate::session::{ChatTurn, SessionId, SessionStore};
use crate::stores::{ChunkSnapshot, KnowledgeBackend};
use crate::types::{BotId, KbError};

use super::prompt::{build_prompt, format_context};

/// Reply returned when anything inside answering fails.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I encountered an error processing your request. Please try again.";

/// Reply returned under [`NoContextPolicy::CannedReply`] when retrieval
/// finds nothing.
pub const NO_CONTEXT_REPLY: &str =
    "I don't have any information about that in my knowledge base yet. \
     Please upload relevant documents and try again.";

/// Context block sent to the model under [`NoContextPolicy::Placeholder`].
const PLACEHOLDER_CONTEXT: &str = "No specific context available.";

/// Similarity retrieval memoized through the query cache.
#[derive(Clone)]
pub struct Retriever {
    backend: Arc<dyn KnowledgeBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: QueryCache,
}

impl Retriever {
    pub fn new(
        backend: Arc<dyn KnowledgeBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        cache: QueryCache,
    ) -> Self {
        Self {
            backend,
            embedder,
            cache,
        }
    }

    /// The `top_k` most similar chunks to `query` in this bot's corpus.
    ///
    /// A cache hit skips both the query embedding and the search; scores are
    /// dropped before memoization, callers get snapshots in rank order.
    pub async fn retrieve(
        &self,
        bot_id: BotId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ChunkSnapshot>, KbError> {
        self.cache
            .get_or_compute(bot_id, query, top_k, || async {
                let embedding = self.embedder.embed(query).await?;
                let hits = self.backend.search(&embedding, top_k, bot_id).await?;
                debug!(%bot_id, top_k, hits = hits.len(), "similarity search");
                Ok(hits.into_iter().map(|hit| hit.chunk).collect())
            })
            .await
    }
}

/// Answers questions against a bot's knowledge base.
///
/// The public entry points never return an error: any failure inside
/// retrieval or generation is logged and collapses into [`FALLBACK_REPLY`],
/// so callers always have something safe to show the user.
pub struct AnswerEngine {
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
    sessions: SessionStore,
    config: RetrievalConfig,
}

impl AnswerEngine {
    pub fn new(retriever: Retriever, model: Arc<dyn ChatModel>, config: RetrievalConfig) -> Self {
        Self {
            retriever,
            model,
            sessions: SessionStore::new(),
            config,
        }
    }

    /// Answer a question, threading conversation history through the named
    /// session. With no session the exchange is stateless and unrecorded.
    pub async fn ask(
        &self,
        bot: &BotProfile,
        question: &str,
        session: Option<SessionId>,
    ) -> String {
        let history = match session {
            Some(id) => self.sessions.recent(id, self.config.history_window),
            None => Vec::new(),
        };

        let answer = self.ask_with_history(bot, question, &history).await;

        if let Some(id) = session {
            self.sessions.record(id, ChatTurn::user(question));
            self.sessions.record(id, ChatTurn::assistant(&answer));
        }
        answer
    }

    /// Answer a question with caller-supplied history.
    pub async fn ask_with_history(
        &self,
        bot: &BotProfile,
        question: &str,
        history: &[ChatTurn],
    ) -> String {
        match self.answer(bot, question, history).await {
            Ok(answer) => answer,
            Err(err) => {
                error!(bot_id = %bot.id, error = %err, "answering failed, sending fallback");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn answer(
        &self,
        bot: &BotProfile,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, KbError> {
        let chunks = self
            .retriever
            .retrieve(bot.id, question, self.config.top_k)
            .await?;

        let context = if chunks.is_empty() {
            match self.config.no_context_policy {
                NoContextPolicy::CannedReply => {
                    info!(bot_id = %bot.id, "no matching chunks, short-circuiting");
                    return Ok(NO_CONTEXT_REPLY.to_string());
                }
                NoContextPolicy::Placeholder => PLACEHOLDER_CONTEXT.to_string(),
            }
        } else {
            format_context(&chunks)
        };

        let prompt = build_prompt(&bot.instructions_text(), history, &context, question);
        self.model.complete(&prompt).await
    }

    /// Drop one session's history.
    pub fn clear_session(&self, session: SessionId) {
        self.sessions.clear(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::completion::MockChatModel;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::stores::{ChunkRecord, IndexEntry, MemoryBackend};
    use std::time::Duration;
    use uuid::Uuid;

    fn engine_with(
        backend: Arc<MemoryBackend>,
        model: MockChatModel,
        policy: NoContextPolicy,
    ) -> AnswerEngine {
        let embedder = Arc::new(MockEmbeddingProvider::new().with_dimensions(4));
        let cache = QueryCache::new(Arc::new(MemoryCacheStore::new()), Duration::from_secs(60));
        let retriever = Retriever::new(backend, embedder, cache);
        let config = RetrievalConfig {
            no_context_policy: policy,
            ..RetrievalConfig::default()
        };
        AnswerEngine::new(retriever, Arc::new(model), config)
    }

    async fn seed_chunk(backend: &MemoryBackend, bot: BotId, content: &str) {
        let embedder = MockEmbeddingProvider::new().with_dimensions(4);
        let embedding = embedder.embed(content).await.unwrap();
        let record = ChunkRecord::new(bot, "kb.txt", 0, content, embedding);
        backend.persist_chunk(&record).await.unwrap();
        backend.index_chunks(vec![IndexEntry::from(&record)]).await.unwrap();
    }

    #[tokio::test]
    async fn empty_corpus_short_circuits_without_a_model_call() {
        let model = MockChatModel::with_reply("should never be sent");
        let engine = engine_with(
            Arc::new(MemoryBackend::new()),
            model.clone(),
            NoContextPolicy::CannedReply,
        );
        let bot = BotProfile::new("Helper", vec![]);

        let answer = engine.ask(&bot, "anything?", None).await;
        assert_eq!(answer, NO_CONTEXT_REPLY);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn placeholder_policy_still_calls_the_model() {
        let model = MockChatModel::with_reply("best effort answer");
        let engine = engine_with(
            Arc::new(MemoryBackend::new()),
            model.clone(),
            NoContextPolicy::Placeholder,
        );
        let bot = BotProfile::new("Helper", vec![]);

        let answer = engine.ask(&bot, "anything?", None).await;
        assert_eq!(answer, "best effort answer");
        assert_eq!(model.call_count(), 1);
        assert!(model.last_prompt().unwrap().contains("No specific context available."));
    }

    #[tokio::test]
    async fn model_failure_becomes_the_fallback_reply() {
        let backend = Arc::new(MemoryBackend::new());
        let bot = BotProfile::new("Helper", vec![]);
        seed_chunk(&backend, bot.id, "shipping takes two days").await;

        let engine = engine_with(backend, MockChatModel::failing(), NoContextPolicy::CannedReply);
        let answer = engine.ask(&bot, "how long is shipping?", None).await;
        assert_eq!(answer, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn session_history_flows_into_the_next_prompt() {
        let backend = Arc::new(MemoryBackend::new());
        let bot = BotProfile::new("Helper", vec!["Be brief.".into()]);
        seed_chunk(&backend, bot.id, "our store opens at nine").await;

        let model = MockChatModel::with_reply("we open at nine");
        let engine = engine_with(backend, model.clone(), NoContextPolicy::CannedReply);
        let session = Uuid::new_v4();

        engine.ask(&bot, "when do you open?", Some(session)).await;
        engine.ask(&bot, "and on weekends?", Some(session)).await;

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("User: when do you open?"));
        assert!(prompt.contains("Assistant: we open at nine"));
        assert!(prompt.contains("Current question: and on weekends?"));
    }
}
