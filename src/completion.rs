//! Language-model seam for answer generation.
//!
//! [`ChatModel`] is the narrow `prompt text -> completion text` contract the
//! answer engine depends on. [`RigChatModel`] adapts a `rig-core` agent;
//! [`MockChatModel`] records calls for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::types::KbError;

/// Synchronous completion contract: one prompt in, plain answer text out.
///
/// Calls may fail or time out; the answer engine converts every failure into
/// a user-safe fallback reply at its outer boundary.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, KbError>;
}

/// Adapter over a `rig-core` agent.
pub struct RigChatModel<M>
where
    M: rig::completion::CompletionModel,
{
    agent: rig::agent::Agent<M>,
}

impl<M> RigChatModel<M>
where
    M: rig::completion::CompletionModel,
{
    pub fn new(agent: rig::agent::Agent<M>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl<M> ChatModel for RigChatModel<M>
where
    M: rig::completion::CompletionModel,
{
    async fn complete(&self, prompt: &str) -> Result<String, KbError> {
        use rig::completion::Prompt;

        self.agent
            .prompt(prompt)
            .await
            .map_err(|err| KbError::Model(err.to_string()))
    }
}

/// Canned-reply model that records every prompt it receives.
#[derive(Clone, Default)]
pub struct MockChatModel {
    reply: String,
    fail: bool,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockChatModel {
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Self::default()
        }
    }

    /// A model whose every call fails, for exercising the fallback path.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, KbError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if self.fail {
            return Err(KbError::Model("mock model failure".into()));
        }
        Ok(self.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_model_records_prompts() {
        let model = MockChatModel::with_reply("fine");
        let reply = model.complete("what is up?").await.unwrap();
        assert_eq!(reply, "fine");
        assert_eq!(model.call_count(), 1);
        assert_eq!(model.last_prompt().as_deref(), Some("what is up?"));
    }

    #[tokio::test]
    async fn failing_model_returns_model_error() {
        let model = MockChatModel::failing();
        let err = model.complete("anything").await.unwrap_err();
        assert!(matches!(err, KbError::Model(_)));
    }
}
