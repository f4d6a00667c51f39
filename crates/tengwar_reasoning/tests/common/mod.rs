//! Shared fixtures: in-memory store, temp roots, fake git and interpreter.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tengwar_core::{
    ConversationTurn, EmotionalState, MemoryRecord, MemoryStore, NewThought, NewTurn, PathGuard,
    RecordId, Role, StorageError, StorageResult, TengwarConfig, Thought, TimeMarker,
};
use tengwar_limbic::EmotionEngine;
use tengwar_memory::SqliteMemory;
use tengwar_os::{EditorError, Interpreter, SelfEditor, VersionControl};

/// Store wrapper whose appends can be switched to fail; counts emotion writes.
pub struct FlakyStore {
    pub inner: SqliteMemory,
    pub fail_appends: AtomicBool,
    pub emotion_writes: AtomicUsize,
}

impl FlakyStore {
    pub async fn new() -> Self {
        Self {
            inner: SqliteMemory::new(":memory:").await.unwrap(),
            fail_appends: AtomicBool::new(false),
            emotion_writes: AtomicUsize::new(0),
        }
    }

    pub fn emotion_writes(&self) -> usize {
        self.emotion_writes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_appends.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            Err(StorageError::Database("disk I/O error".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MemoryStore for FlakyStore {
    async fn append_thought(&self, thought: NewThought) -> StorageResult<Thought> {
        self.check()?;
        self.inner.append_thought(thought).await
    }
    async fn append_turn(&self, turn: NewTurn) -> StorageResult<RecordId> {
        self.check()?;
        self.inner.append_turn(turn).await
    }
    async fn recent(&self, n: usize) -> StorageResult<Vec<MemoryRecord>> {
        self.inner.recent(n).await
    }
    async fn recent_thoughts(&self, n: usize) -> StorageResult<Vec<Thought>> {
        self.inner.recent_thoughts(n).await
    }
    async fn recent_turns(
        &self,
        role: Option<Role>,
        n: usize,
    ) -> StorageResult<Vec<ConversationTurn>> {
        self.inner.recent_turns(role, n).await
    }
    async fn thread_history(
        &self,
        thread_id: &str,
        n: usize,
    ) -> StorageResult<Vec<ConversationTurn>> {
        self.inner.thread_history(thread_id, n).await
    }
    async fn search(&self, query: &str, n: usize) -> StorageResult<Vec<MemoryRecord>> {
        self.inner.search(query, n).await
    }
    async fn first_thought_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        self.inner.first_thought_at().await
    }
    async fn last_interaction_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        self.inner.last_interaction_at().await
    }
    async fn thought_count(&self) -> StorageResult<u64> {
        self.inner.thought_count().await
    }
    async fn record_count(&self) -> StorageResult<u64> {
        self.inner.record_count().await
    }
    async fn record_emotion(&self, state: &EmotionalState, trigger: &str) -> StorageResult<()> {
        self.emotion_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.record_emotion(state, trigger).await
    }
    async fn latest_emotion(&self) -> StorageResult<Option<EmotionalState>> {
        self.inner.latest_emotion().await
    }
    async fn mark_time(&self, event: &str, notes: Option<&str>) -> StorageResult<RecordId> {
        self.inner.mark_time(event, notes).await
    }
    async fn time_markers(&self, n: usize) -> StorageResult<Vec<TimeMarker>> {
        self.inner.time_markers(n).await
    }
}

/// Records commits instead of running git.
#[derive(Default)]
pub struct FakeVcs {
    pub commits: Mutex<Vec<String>>,
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn status(&self) -> Result<String, EditorError> {
        Ok("(clean)".to_string())
    }
    async fn commit(&self, message: &str) -> Result<String, EditorError> {
        self.commits.lock().unwrap().push(message.to_string());
        Ok(format!("[main 1a2b3c4] {}", message))
    }
    async fn push(&self) -> Result<String, EditorError> {
        Err(EditorError::Network("no route to host".to_string()))
    }
}

/// Evaluates nothing; answers `55` for anything mentioning `fib`.
pub struct FakeInterpreter;

#[async_trait]
impl Interpreter for FakeInterpreter {
    async fn run(&self, code: &str, _workdir: &Path) -> Result<String, EditorError> {
        if code.contains("fib") {
            Ok("55".to_string())
        } else {
            Err(EditorError::Execution {
                code: Some(1),
                output: "unknown form".to_string(),
            })
        }
    }
}

pub struct Roots {
    pub self_root: TempDir,
    pub lang_root: TempDir,
    pub outside: TempDir,
}

pub fn roots() -> Roots {
    Roots {
        self_root: TempDir::new().unwrap(),
        lang_root: TempDir::new().unwrap(),
        outside: TempDir::new().unwrap(),
    }
}

pub fn editor(roots: &Roots, vcs: Arc<FakeVcs>) -> SelfEditor {
    SelfEditor::new(
        PathGuard::new(roots.self_root.path(), roots.lang_root.path()),
        vcs,
        Arc::new(FakeInterpreter),
    )
}

pub async fn emotions(store: Arc<dyn MemoryStore>, config: &TengwarConfig) -> Arc<EmotionEngine> {
    Arc::new(
        EmotionEngine::restore(config.emotion.clone(), config.time.clone(), store)
            .await
            .unwrap(),
    )
}
