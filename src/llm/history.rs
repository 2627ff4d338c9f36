//! Bounded conversation history sent with every inference request.
//!
//! Keeps the last *N* exchanges (2×N role-tagged messages) and evicts the
//! oldest entries first.  The orchestrator only appends from a run that is
//! still live, so preempted runs never leave traces here.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the dialogue, in the shape chat-completion APIs expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

// ---------------------------------------------------------------------------
// ConversationHistory
// ---------------------------------------------------------------------------

/// FIFO window of the most recent exchanges.
///
/// ```rust
/// use jarvis_voice::llm::{ChatMessage, ConversationHistory};
///
/// let mut history = ConversationHistory::new(1);
/// history.push(ChatMessage::user("oi"));
/// history.push(ChatMessage::assistant("Olá, senhor."));
/// history.push(ChatMessage::user("que horas são?"));
/// assert_eq!(history.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<ChatMessage>,
    max_exchanges: usize,
}

impl ConversationHistory {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_exchanges * 2 + 1),
            max_exchanges,
        }
    }

    /// Maximum number of stored messages (2 × exchanges).
    pub fn capacity(&self) -> usize {
        self.max_exchanges * 2
    }

    /// Append a message, evicting the oldest ones past capacity.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity() {
            self.messages.pop_front();
        }
    }

    /// Owned copy of the window, oldest first, for use outside the lock.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_to_twice_the_exchanges() {
        let mut history = ConversationHistory::new(3);
        for i in 0..20 {
            history.push(ChatMessage::user(format!("u{i}")));
            history.push(ChatMessage::assistant(format!("a{i}")));
            assert!(history.len() <= 6);
        }
        assert_eq!(history.len(), 6);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut history = ConversationHistory::new(2);
        for i in 0..5 {
            history.push(ChatMessage::user(format!("m{i}")));
        }

        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut history = ConversationHistory::new(2);
        history.push(ChatMessage::user("a"));
        let snap = history.snapshot();
        history.push(ChatMessage::assistant("b"));

        assert_eq!(snap.len(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn zero_exchanges_keeps_nothing() {
        let mut history = ConversationHistory::new(0);
        history.push(ChatMessage::user("a"));
        assert!(history.is_empty());
    }

    #[test]
    fn clear_empties_window() {
        let mut history = ConversationHistory::new(2);
        history.push(ChatMessage::user("a"));
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn role_serialises_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "ok");
    }
}
