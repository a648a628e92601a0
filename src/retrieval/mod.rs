//! Retrieval and answer assembly.
//!
//! [`Retriever`] turns a question into the top-k chunk snapshots, memoized
//! through the query cache. [`AnswerEngine`] folds those snapshots, the
//! bot's instructions, and recent conversation history into a prompt and
//! asks the language model, degrading to fixed replies when retrieval comes
//! back empty or the model call fails.

mod engine;
mod prompt;

pub use engine::{AnswerEngine, Retriever, FALLBACK_REPLY, NO_CONTEXT_REPLY};
pub use prompt::{build_prompt, format_context};
