pub mod classifier;
pub mod config;
pub mod emotion;
pub mod error;
pub mod record;
pub mod safety;
pub mod time;

pub use classifier::ContentClassifier;
pub use config::TengwarConfig;
pub use emotion::{Dimension, EmotionConfig, EmotionEvent, EmotionalState};
pub use error::{StorageError, StorageResult};
pub use record::{
    ConversationTurn, MemoryRecord, NewThought, NewTurn, RecordId, Role, Thought, ThoughtSource,
    TimeMarker,
};
pub use safety::{PathDenied, PathGuard};
pub use time::{TemporalContext, TimeBucket, TimeBuckets};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable, append-only log of thoughts and conversation turns.
///
/// Every `append_*` call is durable before it returns. There is deliberately
/// no update or delete operation.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Returns the thought exactly as stored, timestamp included.
    async fn append_thought(&self, thought: NewThought) -> StorageResult<Thought>;
    async fn append_turn(&self, turn: NewTurn) -> StorageResult<RecordId>;

    /// Last `n` records of either kind, most recent first.
    async fn recent(&self, n: usize) -> StorageResult<Vec<MemoryRecord>>;
    /// Last `n` thoughts, most recent first.
    async fn recent_thoughts(&self, n: usize) -> StorageResult<Vec<Thought>>;
    /// Last `n` turns with the given role (any role when `None`), most recent first.
    async fn recent_turns(&self, role: Option<Role>, n: usize)
        -> StorageResult<Vec<ConversationTurn>>;
    /// Last `n` turns of one thread, oldest first.
    async fn thread_history(&self, thread_id: &str, n: usize)
        -> StorageResult<Vec<ConversationTurn>>;
    /// Keyword relevance search, best match first.
    async fn search(&self, query: &str, n: usize) -> StorageResult<Vec<MemoryRecord>>;

    async fn first_thought_at(&self) -> StorageResult<Option<DateTime<Utc>>>;
    async fn last_interaction_at(&self) -> StorageResult<Option<DateTime<Utc>>>;
    async fn thought_count(&self) -> StorageResult<u64>;
    async fn record_count(&self) -> StorageResult<u64>;

    /// Append a committed emotional state to the history.
    async fn record_emotion(&self, state: &EmotionalState, trigger: &str) -> StorageResult<()>;
    async fn latest_emotion(&self) -> StorageResult<Option<EmotionalState>>;

    async fn mark_time(&self, event: &str, notes: Option<&str>) -> StorageResult<RecordId>;
    async fn time_markers(&self, n: usize) -> StorageResult<Vec<TimeMarker>>;
}
