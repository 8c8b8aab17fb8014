//! Short in-memory research history for follow-up questions
//!
//! Nothing here is persisted; the history lives as long as the session.

use std::collections::VecDeque;

/// Who said a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Bounded message history, oldest dropped first
#[derive(Debug)]
pub struct Conversation {
    messages: VecDeque<Message>,
    max_messages: usize,
}

impl Conversation {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_messages),
            max_messages,
        }
    }

    /// Record a question and the answer that was spoken for it
    pub fn record(&mut self, question: &str, answer: &str) {
        self.push(Role::User, question);
        self.push(Role::Assistant, answer);
    }

    fn push(&mut self, role: Role, content: &str) {
        if self.max_messages == 0 {
            return;
        }
        while self.messages.len() >= self.max_messages {
            self.messages.pop_front();
        }
        self.messages.push_back(Message {
            role,
            content: content.to_string(),
        });
    }

    /// The last `n` messages, oldest first
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
