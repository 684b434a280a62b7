//! Transcript entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic entry identifier, never reused within one transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Captured output of a finished terminal session.
    Terminal,
    /// Local notices (transport failures, rejected operations). Never sent to the server.
    Notice,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::Terminal => "terminal",
            Role::Notice => "notice",
        }
    }
}

/// One line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: EntryId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(id: EntryId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
