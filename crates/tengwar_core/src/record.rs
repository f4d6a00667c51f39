use crate::emotion::EmotionalState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identifier; strictly increasing in insertion order.
pub type RecordId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtSource {
    Daemon,
    Dialogue,
    Boot,
}

impl ThoughtSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ThoughtSource::Daemon => "daemon",
            ThoughtSource::Dialogue => "dialogue",
            ThoughtSource::Boot => "boot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daemon" => Some(ThoughtSource::Daemon),
            "dialogue" => Some(ThoughtSource::Dialogue),
            "boot" => Some(ThoughtSource::Boot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A thought waiting to be persisted.
#[derive(Debug, Clone)]
pub struct NewThought {
    pub content: String,
    pub emotion: EmotionalState,
    pub source: ThoughtSource,
    pub importance: f32,
}

impl NewThought {
    /// The record as persisted under `id` at `timestamp`.
    pub fn stored(self, id: RecordId, timestamp: DateTime<Utc>) -> Thought {
        Thought {
            id,
            timestamp,
            content: self.content,
            emotion: self.emotion,
            source: self.source,
            importance: self.importance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub emotion: EmotionalState,
    pub source: ThoughtSource,
    pub importance: f32,
}

/// A conversation turn waiting to be persisted.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub role: Role,
    pub content: String,
    pub thread_id: String,
    /// Thoughts the prompt for this turn drew on.
    pub context_ids: Vec<RecordId>,
    pub tools_used: Vec<String>,
    pub importance: f32,
}

impl NewTurn {
    pub fn user(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            thread_id: thread_id.into(),
            context_ids: Vec::new(),
            tools_used: Vec::new(),
            importance: 0.7,
        }
    }

    pub fn assistant(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            thread_id: thread_id.into(),
            context_ids: Vec::new(),
            tools_used: Vec::new(),
            importance: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
    pub thread_id: String,
    pub context_ids: Vec<RecordId>,
    pub tools_used: Vec<String>,
    pub importance: f32,
}

/// Either kind of permanent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryRecord {
    Thought(Thought),
    Turn(ConversationTurn),
}

impl MemoryRecord {
    pub fn id(&self) -> RecordId {
        match self {
            MemoryRecord::Thought(t) => t.id,
            MemoryRecord::Turn(t) => t.id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MemoryRecord::Thought(t) => t.timestamp,
            MemoryRecord::Turn(t) => t.timestamp,
        }
    }

    pub fn importance(&self) -> f32 {
        match self {
            MemoryRecord::Thought(t) => t.importance,
            MemoryRecord::Turn(t) => t.importance,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            MemoryRecord::Thought(t) => &t.content,
            MemoryRecord::Turn(t) => &t.content,
        }
    }

    /// One-line rendering for prompt context.
    pub fn render(&self) -> String {
        let ts = self.timestamp().format("%Y-%m-%d %H:%M:%S");
        match self {
            MemoryRecord::Thought(t) => format!("[{}] thought: {}", ts, t.content),
            MemoryRecord::Turn(t) => format!("[{}] {}: {}", ts, t.role, t.content),
        }
    }
}

/// Boot and daemon lifecycle journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeMarker {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub notes: Option<String>,
}
