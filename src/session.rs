//! Conversation history keyed by caller-supplied session id.
//!
//! Each request names its session explicitly; there is no ambient
//! "current session" shared across callers, so concurrent users can never
//! bleed history into each other.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier chosen by the caller for one conversation.
pub type SessionId = Uuid;

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// In-process store of per-session conversation history.
///
/// Safe for concurrent use; the answer engine only ever reads the
/// most-recent-N window, so unbounded growth of a single session does not
/// grow prompts.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Vec<ChatTurn>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn to a session, creating the session on first use.
    pub fn record(&self, session: SessionId, turn: ChatTurn) {
        self.sessions.lock().entry(session).or_default().push(turn);
    }

    /// The most recent `window` turns of a session, oldest first.
    pub fn recent(&self, session: SessionId, window: usize) -> Vec<ChatTurn> {
        let sessions = self.sessions.lock();
        match sessions.get(&session) {
            Some(turns) => {
                let start = turns.len().saturating_sub(window);
                turns[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Drop a session's history entirely.
    pub fn clear(&self, session: SessionId) {
        self.sessions.lock().remove(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_returns_most_recent_window_in_order() {
        let store = SessionStore::new();
        let session = Uuid::new_v4();
        for i in 0..8 {
            store.record(session, ChatTurn::user(format!("message {i}")));
        }

        let recent = store.recent(session, 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "message 5");
        assert_eq!(recent[2].content, "message 7");
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.record(a, ChatTurn::user("from a"));

        assert!(store.recent(b, 5).is_empty());
        store.clear(a);
        assert!(store.recent(a, 5).is_empty());
    }
}
