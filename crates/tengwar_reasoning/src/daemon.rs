//! Thought daemon: the background stream of consciousness.
//!
//! Each cycle walks `Idle → Compose → BackendCall → Persist → Idle`. A failed
//! or late backend call leaves no trace beyond a log line and a longer pause;
//! a storage failure aborts the cycle without backoff.

use crate::llm::{BackendError, CompletionBackend, CompletionParams};
use crate::prompts::{self, ThoughtContext, THOUGHT_SYSTEM_PROMPT};
use crate::providers::params_for;
use crate::scheduler::ThoughtScheduler;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tengwar_core::config::DaemonConfig;
use tengwar_core::{
    ContentClassifier, EmotionEvent, MemoryStore, NewThought, Role, StorageError,
    TemporalContext, TengwarConfig, Thought, ThoughtSource, TimeBuckets,
};
use tengwar_limbic::EmotionEngine;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonPhase {
    Idle,
    Compose,
    BackendCall,
    Persist,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cycle cancelled")]
    Cancelled,
}

pub struct ThoughtDaemon {
    store: Arc<dyn MemoryStore>,
    emotions: Arc<EmotionEngine>,
    backend: Arc<dyn CompletionBackend>,
    classifier: Arc<ContentClassifier>,
    config: DaemonConfig,
    params: CompletionParams,
    /// Bound on one backend call; a later result is discarded.
    call_timeout: Duration,
    buckets: TimeBuckets,
    scheduler: ThoughtScheduler,

    phase_tx: watch::Sender<DaemonPhase>,
    thoughts_tx: broadcast::Sender<Thought>,
    paused: AtomicBool,
    resumed: Notify,
    failures: AtomicU32,
    /// Last-interaction timestamp for which `long_silence` already fired.
    silence_noted_for: Mutex<Option<DateTime<Utc>>>,
}

impl ThoughtDaemon {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        emotions: Arc<EmotionEngine>,
        backend: Arc<dyn CompletionBackend>,
        classifier: Arc<ContentClassifier>,
        config: &TengwarConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(DaemonPhase::Idle);
        let (thoughts_tx, _) = broadcast::channel(64);
        Self {
            store,
            emotions,
            backend,
            classifier,
            config: config.daemon.clone(),
            params: params_for(&config.thought_backend),
            call_timeout: Duration::from_secs(config.thought_backend.timeout_secs.max(1)),
            buckets: config.time.clone(),
            scheduler: ThoughtScheduler::from_config(&config.daemon),
            phase_tx,
            thoughts_tx,
            paused: AtomicBool::new(false),
            resumed: Notify::new(),
            failures: AtomicU32::new(0),
            silence_noted_for: Mutex::new(None),
        }
    }

    /// Override the per-call bound (tests use sub-second values).
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn phase(&self) -> DaemonPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<DaemonPhase> {
        self.phase_tx.subscribe()
    }

    /// Every persisted thought, as it happens.
    pub fn subscribe(&self) -> broadcast::Receiver<Thought> {
        self.thoughts_tx.subscribe()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::info!("Thought daemon paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
        tracing::info!("Thought daemon resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    pub async fn backend_healthy(&self) -> bool {
        self.backend.health().await
    }

    fn set_phase(&self, phase: DaemonPhase) {
        self.phase_tx.send_replace(phase);
    }

    /// Start the loop on the runtime. Cancel `token` to stop it.
    pub fn spawn(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let daemon = Arc::clone(self);
        tokio::spawn(async move { daemon.run(token).await })
    }

    pub async fn run(&self, token: CancellationToken) {
        if !self.config.enabled {
            tracing::info!("Thought daemon disabled by config");
            return;
        }
        if let Err(e) = self
            .store
            .mark_time("daemon_start", Some("Thought daemon activated"))
            .await
        {
            tracing::error!("Failed to record daemon start: {}", e);
        }
        tracing::info!("Thought daemon active ({})", self.backend.name());

        loop {
            if self.is_paused() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = self.resumed.notified() => {}
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                continue;
            }

            let outcome = self.cycle(Some(&token)).await;
            if matches!(outcome, Err(CycleError::Cancelled)) {
                break;
            }
            let delay = self.record_outcome(&outcome);
            self.set_phase(DaemonPhase::Idle);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_phase(DaemonPhase::Stopped);
        if let Err(e) = self
            .store
            .mark_time("daemon_stop", Some("Thought daemon deactivated"))
            .await
        {
            tracing::error!("Failed to record daemon stop: {}", e);
        }
        tracing::info!("Thought daemon stopped");
    }

    /// Log a cycle's outcome and return the pause before the next one.
    pub fn record_outcome(&self, outcome: &Result<Thought, CycleError>) -> Duration {
        match outcome {
            Ok(_) => {
                self.failures.store(0, Ordering::SeqCst);
                self.scheduler.next_interval(&self.emotions.latest())
            }
            Err(CycleError::Backend(e)) => {
                let k = self.failures.fetch_add(1, Ordering::SeqCst).saturating_add(1);
                let delay = self.scheduler.retry_interval(&self.emotions.latest(), k);
                tracing::warn!(
                    "Thought backend failed ({} in a row): {}; retrying in {:.0}s",
                    k,
                    e,
                    delay.as_secs_f64()
                );
                delay
            }
            Err(CycleError::Storage(e)) => {
                tracing::error!("Thought cycle aborted by storage failure: {}", e);
                self.scheduler.next_interval(&self.emotions.latest())
            }
            Err(CycleError::Cancelled) => Duration::ZERO,
        }
    }

    /// One full cycle outside the loop.
    pub async fn run_cycle(&self) -> Result<Thought, CycleError> {
        let outcome = self.cycle(None).await;
        self.set_phase(DaemonPhase::Idle);
        outcome
    }

    async fn cycle(&self, token: Option<&CancellationToken>) -> Result<Thought, CycleError> {
        // COMPOSE
        self.set_phase(DaemonPhase::Compose);
        let now = Utc::now();
        let recent_thoughts = self.store.recent_thoughts(self.config.context_thoughts).await?;
        let recent_messages = self
            .store
            .recent_turns(Some(Role::User), self.config.context_messages)
            .await?;
        let first_boot = self.store.first_thought_at().await?;
        let last_interaction = self.store.last_interaction_at().await?;
        let thought_count = self.store.thought_count().await?;
        let record_count = self.store.record_count().await?;
        let state = self.emotions.snapshot().await;
        let temporal = TemporalContext::derive(now, first_boot, last_interaction, &self.buckets);

        let summary = state.summary(self.emotions.config());
        let style = state.thought_style();
        let prompt = prompts::thought_prompt(&ThoughtContext {
            temporal: &temporal,
            thought_count,
            record_count,
            emotion_summary: &summary,
            thinking_style: &style,
            recent_thoughts: &recent_thoughts,
            recent_messages: &recent_messages,
        });

        // BACKEND_CALL
        self.set_phase(DaemonPhase::BackendCall);
        let call = tokio::time::timeout(
            self.call_timeout,
            self.backend
                .complete(Some(THOUGHT_SYSTEM_PROMPT), &prompt, &self.params),
        );
        let result = match token {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(CycleError::Cancelled),
                r = call => r,
            },
            None => call.await,
        };
        let content = match result {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(BackendError::Timeout(self.call_timeout).into()),
        };

        // PERSIST
        self.set_phase(DaemonPhase::Persist);
        let importance = self.classifier.importance(&content);
        let thought = self
            .store
            .append_thought(NewThought {
                content: content.clone(),
                emotion: state,
                source: ThoughtSource::Daemon,
                importance,
            })
            .await?;

        let mut events: Vec<EmotionEvent> =
            self.classifier.classify_thought(&content).into_iter().collect();
        if self.long_silence_due(&temporal, last_interaction).await {
            events.push(EmotionEvent::LongSilence);
        }
        self.emotions.update(&events, Utc::now()).await;

        tracing::info!(
            "Thought #{}: {}",
            thought_count + 1,
            prompts::truncate(&thought.content, 120)
        );
        // No subscribers is fine.
        let _ = self.thoughts_tx.send(thought.clone());
        Ok(thought)
    }

    /// True once per stretch of silence that reaches the configured bucket.
    async fn long_silence_due(
        &self,
        temporal: &TemporalContext,
        last_interaction: Option<DateTime<Utc>>,
    ) -> bool {
        let (Some(bucket), Some(last)) = (temporal.silence, last_interaction) else {
            return false;
        };
        if bucket < self.config.long_silence_after {
            return false;
        }
        let mut noted = self.silence_noted_for.lock().await;
        if *noted == Some(last) {
            return false;
        }
        *noted = Some(last);
        true
    }
}
