//! Pure prompt assembly.
//!
//! No clocks, no stores, no model handles: the same inputs always produce
//! the same prompt text, so every layout detail is testable with plain
//! string assertions.

use crate::session::ChatTurn;
use crate::stores::ChunkSnapshot;

/// Render retrieved chunks into the context block of the prompt, each
/// passage tagged with its source filename.
pub fn format_context(chunks: &[ChunkSnapshot]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("[source: {}]\n{}", chunk.filename, chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assemble the full prompt from instructions, history, context, and the
/// current question.
///
/// The history section is omitted entirely when there are no prior turns.
pub fn build_prompt(
    instructions: &str,
    history: &[ChatTurn],
    context_block: &str,
    question: &str,
) -> String {
    let mut prompt = String::from("You are a helpful assistant. Follow these instructions:\n");
    prompt.push_str(instructions);
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for turn in history {
            prompt.push_str(turn.role.label());
            prompt.push_str(": ");
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str("Use the following knowledge base to answer questions:\n");
    prompt.push_str(context_block);
    prompt.push_str("\n\nCurrent question: ");
    prompt.push_str(question);
    prompt.push_str(
        "\n\nProvide a helpful, contextual answer based on the knowledge base \
         and the conversation so far. If the answer isn't in the knowledge \
         base, say so politely.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn snapshot(filename: &str, content: &str) -> ChunkSnapshot {
        ChunkSnapshot {
            id: Uuid::new_v4(),
            filename: filename.into(),
            chunk_index: 0,
            content: content.into(),
        }
    }

    #[test]
    fn context_tags_each_chunk_with_its_source() {
        let block = format_context(&[
            snapshot("faq.txt", "shipping takes two days"),
            snapshot("returns.md", "returns within 30 days"),
        ]);
        assert_eq!(
            block,
            "[source: faq.txt]\nshipping takes two days\n\n\
             [source: returns.md]\nreturns within 30 days"
        );
    }

    #[test]
    fn prompt_contains_every_section_in_order() {
        let history = vec![
            ChatTurn::user("hi"),
            ChatTurn::assistant("hello, how can I help?"),
        ];
        let prompt = build_prompt("Be brief.", &history, "[source: a.txt]\nfact", "what now?");

        let instructions_at = prompt.find("Be brief.").unwrap();
        let history_at = prompt.find("Previous conversation:\nUser: hi\n").unwrap();
        let context_at = prompt.find("[source: a.txt]\nfact").unwrap();
        let question_at = prompt.find("Current question: what now?").unwrap();
        assert!(instructions_at < history_at);
        assert!(history_at < context_at);
        assert!(context_at < question_at);
        assert!(prompt.contains("Assistant: hello, how can I help?"));
    }

    #[test]
    fn empty_history_omits_the_section() {
        let prompt = build_prompt("Be brief.", &[], "context", "q?");
        assert!(!prompt.contains("Previous conversation"));
    }

    #[test]
    fn identical_inputs_build_identical_prompts() {
        let history = vec![ChatTurn::user("hi")];
        let a = build_prompt("x", &history, "ctx", "q");
        let b = build_prompt("x", &history, "ctx", "q");
        assert_eq!(a, b);
    }
}
