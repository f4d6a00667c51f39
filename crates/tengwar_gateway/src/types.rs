use serde::{Deserialize, Serialize};
use tengwar_core::{EmotionalState, MemoryRecord, Thought, TimeBucket};
use tengwar_reasoning::{DaemonPhase, DirectiveOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub thread_id: String,
    pub emotions: EmotionalState,
    pub directives: Vec<DirectiveOutcome>,
    /// The backend was unavailable; `response` is a stand-in.
    pub degraded: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemporalStatus {
    pub now: chrono::DateTime<chrono::Utc>,
    pub seconds_since_first_boot: Option<u64>,
    pub seconds_since_last_interaction: Option<u64>,
    pub silence: Option<TimeBucket>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub emotions: EmotionalState,
    pub summary: String,
    pub temporal: TemporalStatus,
    pub thought_count: u64,
    pub record_count: u64,
    pub daemon_phase: DaemonPhase,
    pub daemon_paused: bool,
    pub thought_backend: BackendStatus,
    pub dialogue_backend: BackendStatus,
    pub conversation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThoughtsResponse {
    /// Oldest first.
    pub thoughts: Vec<Thought>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoriesResponse {
    pub records: Vec<MemoryRecord>,
}

/// Client → server WebSocket frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInbound {
    Chat { content: String },
    NewConversation,
    Ping,
}

/// Server → client WebSocket frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutbound {
    State {
        emotions: EmotionalState,
        summary: String,
        daemon_phase: DaemonPhase,
    },
    History {
        thoughts: Vec<Thought>,
    },
    Thought {
        thought: Thought,
    },
    /// A fragment of the reply being produced.
    ChatToken {
        token: String,
    },
    ChatDone {
        response: String,
        thread_id: String,
        emotions: EmotionalState,
        directives: Vec<DirectiveOutcome>,
        degraded: bool,
    },
    ConversationReset,
    Pong,
    Error {
        message: String,
    },
}
