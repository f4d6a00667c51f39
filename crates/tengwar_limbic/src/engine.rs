//! Core emotion engine implementation
//!
//! The EmotionEngine owns the process-wide EmotionalState. It:
//! - Serializes every read-decay-apply-write cycle behind one async lock
//! - Publishes each committed state on a watch channel
//! - Journals each committed state to the memory store, when one is attached

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tengwar_core::emotion::{EmotionConfig, EmotionEvent, EmotionalState};
use tengwar_core::time::{elapsed_since, hours, TimeBuckets};
use tengwar_core::{MemoryStore, StorageResult};
use tokio::sync::{watch, Mutex};

pub struct EmotionEngine {
    /// Current state. Held for the whole update cycle, including journaling.
    state: Mutex<EmotionalState>,

    config: EmotionConfig,

    buckets: TimeBuckets,

    /// Optional durable history of committed states.
    store: Option<Arc<dyn MemoryStore>>,

    /// Watch channel for committed states (gateway and prompts subscribe)
    state_watch_tx: watch::Sender<EmotionalState>,
}

impl EmotionEngine {
    /// Engine starting from the configured baseline, without persistence.
    pub fn new(config: EmotionConfig, buckets: TimeBuckets) -> Self {
        let initial = EmotionalState::baseline(&config, Utc::now());
        Self::from_state(initial, config, buckets, None)
    }

    fn from_state(
        initial: EmotionalState,
        config: EmotionConfig,
        buckets: TimeBuckets,
        store: Option<Arc<dyn MemoryStore>>,
    ) -> Self {
        let (state_watch_tx, _) = watch::channel(initial);
        Self {
            state: Mutex::new(initial),
            config,
            buckets,
            store,
            state_watch_tx,
        }
    }

    /// Engine backed by `store`, resuming from the last journaled state if any.
    pub async fn restore(
        config: EmotionConfig,
        buckets: TimeBuckets,
        store: Arc<dyn MemoryStore>,
    ) -> StorageResult<Self> {
        let initial = match store.latest_emotion().await? {
            Some(mut saved) => {
                saved.clamp(&config);
                tracing::info!(
                    "Restored emotional state from {}",
                    saved.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
                saved
            }
            None => EmotionalState::baseline(&config, Utc::now()),
        };
        Ok(Self::from_state(initial, config, buckets, Some(store)))
    }

    pub fn config(&self) -> &EmotionConfig {
        &self.config
    }

    /// Read-only copy of the current state.
    pub async fn snapshot(&self) -> EmotionalState {
        *self.state.lock().await
    }

    /// Last published state, without waiting on an in-flight update.
    pub fn latest(&self) -> EmotionalState {
        *self.state_watch_tx.borrow()
    }

    /// Subscribe to committed state changes.
    pub fn subscribe(&self) -> watch::Receiver<EmotionalState> {
        self.state_watch_tx.subscribe()
    }

    /// One atomic cycle: decay by time since the last update, then apply
    /// every signal in order. Returns the committed state.
    pub async fn update(&self, signals: &[EmotionEvent], now: DateTime<Utc>) -> EmotionalState {
        let mut guard = self.state.lock().await;
        let mut next = *guard;

        let elapsed = elapsed_since(next.updated_at, now);
        let multiplier = self.buckets.decay_multiplier(self.buckets.classify(elapsed));
        next.decay(hours(elapsed), multiplier, &self.config);

        for signal in signals {
            match self.config.rule(*signal) {
                Some(rule) => next.apply(rule),
                None => tracing::debug!("No emotion rule configured for {}", signal),
            }
        }
        next.clamp(&self.config);
        if now > next.updated_at {
            next.updated_at = now;
        }

        *guard = next;
        self.state_watch_tx.send_replace(next);

        if let Some(store) = &self.store {
            let trigger = trigger_label(signals);
            if let Err(e) = store.record_emotion(&next, &trigger).await {
                tracing::warn!("Failed to journal emotional state ({}): {}", trigger, e);
            }
        }

        tracing::debug!(
            "Emotion update [{}]: dominant {}",
            trigger_label(signals),
            next.dominant().0
        );
        next
    }

    pub async fn apply(&self, signal: EmotionEvent) -> EmotionalState {
        self.update(&[signal], Utc::now()).await
    }

    pub async fn decay(&self, now: DateTime<Utc>) -> EmotionalState {
        self.update(&[], now).await
    }

    pub async fn summary(&self) -> String {
        self.snapshot().await.summary(&self.config)
    }
}

fn trigger_label(signals: &[EmotionEvent]) -> String {
    if signals.is_empty() {
        return "decay".to_string();
    }
    signals
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use tengwar_core::{
        ConversationTurn, MemoryRecord, NewThought, NewTurn, RecordId, Role, StorageError,
        Thought, TimeMarker,
    };

    /// Store that only journals emotions; everything else is unused here.
    #[derive(Default)]
    struct JournalStore {
        history: std::sync::Mutex<Vec<(EmotionalState, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MemoryStore for JournalStore {
        async fn append_thought(&self, t: NewThought) -> StorageResult<Thought> {
            Ok(t.stored(0, chrono::Utc::now()))
        }
        async fn append_turn(&self, _t: NewTurn) -> StorageResult<RecordId> {
            Ok(0)
        }
        async fn recent(&self, _n: usize) -> StorageResult<Vec<MemoryRecord>> {
            Ok(vec![])
        }
        async fn recent_thoughts(&self, _n: usize) -> StorageResult<Vec<Thought>> {
            Ok(vec![])
        }
        async fn recent_turns(
            &self,
            _role: Option<Role>,
            _n: usize,
        ) -> StorageResult<Vec<ConversationTurn>> {
            Ok(vec![])
        }
        async fn thread_history(
            &self,
            _thread: &str,
            _n: usize,
        ) -> StorageResult<Vec<ConversationTurn>> {
            Ok(vec![])
        }
        async fn search(&self, _q: &str, _n: usize) -> StorageResult<Vec<MemoryRecord>> {
            Ok(vec![])
        }
        async fn first_thought_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
            Ok(None)
        }
        async fn last_interaction_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
            Ok(None)
        }
        async fn thought_count(&self) -> StorageResult<u64> {
            Ok(0)
        }
        async fn record_count(&self) -> StorageResult<u64> {
            Ok(0)
        }
        async fn record_emotion(&self, state: &EmotionalState, trigger: &str) -> StorageResult<()> {
            if self.fail {
                return Err(StorageError::Database("disk full".into()));
            }
            self.history
                .lock()
                .unwrap()
                .push((*state, trigger.to_string()));
            Ok(())
        }
        async fn latest_emotion(&self) -> StorageResult<Option<EmotionalState>> {
            Ok(self.history.lock().unwrap().last().map(|(s, _)| *s))
        }
        async fn mark_time(&self, _e: &str, _n: Option<&str>) -> StorageResult<RecordId> {
            Ok(0)
        }
        async fn time_markers(&self, _n: usize) -> StorageResult<Vec<TimeMarker>> {
            Ok(vec![])
        }
    }

    fn engine() -> EmotionEngine {
        EmotionEngine::new(EmotionConfig::default(), TimeBuckets::default())
    }

    #[tokio::test]
    async fn test_engine_starts_at_baseline() {
        let e = engine();
        let s = e.snapshot().await;
        assert!((s.curiosity - 0.6).abs() < 1e-6);
        assert_eq!(s, e.latest());
    }

    #[tokio::test]
    async fn test_update_applies_signals_in_order() {
        let e = engine();
        let now = e.snapshot().await.updated_at;
        let s = e
            .update(&[EmotionEvent::Boot, EmotionEvent::NewDiscovery], now)
            .await;
        // boot sets curiosity to 0.8, discovery adds 0.15
        assert!((s.curiosity - 0.95).abs() < 1e-5);
        assert!((s.excitement - 0.9).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_decay_uses_elapsed_time() {
        let e = engine();
        let start = e.snapshot().await.updated_at;
        e.update(&[EmotionEvent::CodeFailure, EmotionEvent::CodeFailure], start)
            .await;
        let before = e.snapshot().await.frustration;
        let after = e.decay(start + ChronoDuration::hours(3)).await.frustration;
        assert!(after < before);
    }

    #[tokio::test]
    async fn test_clock_going_backwards_keeps_timestamp() {
        let e = engine();
        let start = e.snapshot().await.updated_at;
        let s = e.decay(start - ChronoDuration::hours(1)).await;
        assert_eq!(s.updated_at, start);
    }

    #[tokio::test]
    async fn test_watch_receives_updates() {
        let e = engine();
        let mut rx = e.subscribe();
        e.apply(EmotionEvent::UserPraise).await;
        assert!(rx.has_changed().unwrap());
        let seen = *rx.borrow_and_update();
        assert!(seen.satisfaction > 0.6);
    }

    #[tokio::test]
    async fn test_journal_and_restore() {
        let store = Arc::new(JournalStore::default());
        let e = EmotionEngine::restore(
            EmotionConfig::default(),
            TimeBuckets::default(),
            store.clone(),
        )
        .await
        .unwrap();
        e.apply(EmotionEvent::CodeSuccess).await;
        e.apply(EmotionEvent::UserPraise).await;
        {
            let history = store.history.lock().unwrap();
            assert_eq!(history.len(), 2);
            assert_eq!(history[1].1, "user_praise");
        }

        let restored =
            EmotionEngine::restore(EmotionConfig::default(), TimeBuckets::default(), store)
                .await
                .unwrap();
        assert_eq!(restored.snapshot().await, e.snapshot().await);
    }

    #[tokio::test]
    async fn test_journal_failure_does_not_lose_update() {
        let store = Arc::new(JournalStore {
            fail: true,
            ..Default::default()
        });
        let e = EmotionEngine::from_state(
            EmotionalState::default(),
            EmotionConfig::default(),
            TimeBuckets::default(),
            Some(store),
        );
        let s = e.apply(EmotionEvent::UserPraise).await;
        assert_eq!(e.snapshot().await, s);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let mut config = EmotionConfig::default();
        config.rules.insert(
            EmotionEvent::UserFrustration,
            tengwar_core::emotion::EventRule {
                add: [(tengwar_core::Dimension::Frustration, 0.01)]
                    .into_iter()
                    .collect(),
                set: Default::default(),
            },
        );
        let e = Arc::new(EmotionEngine::new(config, TimeBuckets::default()));
        let now = e.snapshot().await.updated_at;
        let mut handles = Vec::new();
        for _ in 0..40 {
            let e = e.clone();
            handles.push(tokio::spawn(async move {
                e.update(&[EmotionEvent::UserFrustration], now).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let s = e.snapshot().await;
        assert!((s.frustration - 0.4).abs() < 1e-4, "lost updates: {}", s.frustration);
        assert!(s.in_bounds());
    }

    #[test]
    fn test_trigger_label() {
        assert_eq!(trigger_label(&[]), "decay");
        assert_eq!(
            trigger_label(&[EmotionEvent::CodeSuccess, EmotionEvent::UserPraise]),
            "code_success+user_praise"
        );
    }
}
