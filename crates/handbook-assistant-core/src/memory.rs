//! Bounded conversation history.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SourceRef;

/// Messages rendered by [`ConversationMemory::context`].
const CONTEXT_MESSAGES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("User"),
            Role::Assistant => f.write_str("Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
}

/// FIFO message history; the oldest message is evicted past `max_messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    max_messages: usize,
    messages: VecDeque<ChatMessage>,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            messages: VecDeque::new(),
        }
    }

    pub fn add(&mut self, role: Role, content: &str, sources: Option<Vec<SourceRef>>) {
        self.messages.push_back(ChatMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            sources,
        });
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    /// The last few messages as `Role: content` lines.
    pub fn context(&self) -> String {
        let skip = self.messages.len().saturating_sub(CONTEXT_MESSAGES);
        self.messages
            .iter()
            .skip(skip)
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.messages.back().map(|m| m.timestamp)
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

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(10)
    }
}
