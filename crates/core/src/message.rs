//! Chat history shown beside the whiteboard and replayed to providers as context.

use crate::lecture::CHUNK_SEPARATOR;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How many earlier messages are sent to a provider with each request.
pub const HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// One entry of the chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Whether this is a lecture plan rather than a direct answer.
    pub fn is_lecture_plan(&self) -> bool {
        self.role == MessageRole::Assistant && self.content.contains(CHUNK_SEPARATOR)
    }

    /// Small caption shown above assistant messages.
    pub fn label(&self) -> Option<&'static str> {
        match self.role {
            MessageRole::Assistant if self.is_lecture_plan() => Some("Explanation Plan"),
            MessageRole::Assistant => Some("Response"),
            _ => None,
        }
    }

    /// Text for the chat panel. Lecture plans are written on the whiteboard
    /// instead, so the chat only shows a placeholder for them.
    pub fn display_text(&self) -> &str {
        if self.is_lecture_plan() {
            "explaining on whiteboard..."
        } else {
            &self.content
        }
    }
}

/// A `{role, content}` pair sent to a provider as conversational context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
}

/// Append-only ordered chat history.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The last `window` user/assistant messages, oldest first.
    ///
    /// System notices are UI feedback and never leave the client. Lecture
    /// plans are sent raw, separators included.
    pub fn context_window(&self, window: usize) -> Vec<HistoryEntry> {
        let conversational: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .collect();
        let start = conversational.len().saturating_sub(window);
        conversational[start..]
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}
