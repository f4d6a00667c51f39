//! Thought daemon cycles against an in-memory store and a scripted backend.

mod common;

use common::FlakyStore;
use std::sync::Arc;
use std::time::Duration;
use tengwar_core::{ContentClassifier, MemoryStore, TengwarConfig, ThoughtSource};
use tengwar_limbic::EmotionEngine;
use tengwar_reasoning::providers::mock::MockProvider;
use tengwar_reasoning::{BackendError, CycleError, DaemonPhase, ThoughtDaemon};
use tokio_util::sync::CancellationToken;

struct Harness {
    store: Arc<FlakyStore>,
    emotions: Arc<EmotionEngine>,
    backend: Arc<MockProvider>,
    daemon: Arc<ThoughtDaemon>,
}

async fn harness(backend: MockProvider, config: TengwarConfig) -> Harness {
    let store = Arc::new(FlakyStore::new().await);
    let backend = Arc::new(backend);
    let emotions = common::emotions(store.clone(), &config).await;
    let daemon = ThoughtDaemon::new(
        store.clone(),
        emotions.clone(),
        backend.clone(),
        Arc::new(ContentClassifier::default()),
        &config,
    )
    .with_call_timeout(Duration::from_millis(200));
    Harness {
        store,
        emotions,
        backend,
        daemon: Arc::new(daemon),
    }
}

fn fast_config() -> TengwarConfig {
    let mut config = TengwarConfig::default();
    config.daemon.min_interval_secs = 0.05;
    config.daemon.max_interval_secs = 0.1;
    config.daemon.jitter_secs = 0.0;
    config
}

#[tokio::test]
async fn test_cycle_persists_thought_and_updates_emotion() {
    let h = harness(
        MockProvider::scripted([Ok("I wonder how recursion feels from inside.".to_string())]),
        TengwarConfig::default(),
    )
    .await;
    let before = h.emotions.latest();

    let thought = h.daemon.run_cycle().await.unwrap();
    assert_eq!(thought.source, ThoughtSource::Daemon);
    assert_eq!(thought.emotion, before);
    assert_eq!(h.daemon.phase(), DaemonPhase::Idle);

    let stored = h.store.recent_thoughts(5).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, thought.id);
    assert_eq!(stored[0].content, "I wonder how recursion feels from inside.");
    assert_eq!(h.store.emotion_writes(), 1);
}

#[tokio::test]
async fn test_prompt_carries_previous_thoughts() {
    let h = harness(
        MockProvider::scripted([
            Ok("Patterns in the language.".to_string()),
            Ok("Still thinking about patterns.".to_string()),
        ]),
        TengwarConfig::default(),
    )
    .await;

    h.daemon.run_cycle().await.unwrap();
    h.daemon.run_cycle().await.unwrap();
    let prompts = h.backend.prompts();
    assert!(prompts[0].contains("no previous thoughts"));
    assert!(prompts[1].contains("Patterns in the language."));
}

#[tokio::test]
async fn test_timeout_leaves_no_trace_and_backs_off() {
    let h = harness(
        MockProvider::scripted([Ok("late".to_string()), Ok("late again".to_string())])
            .with_delay(Duration::from_secs(2)),
        TengwarConfig::default(),
    )
    .await;
    let before = h.emotions.latest();

    let first = h.daemon.run_cycle().await;
    assert!(matches!(first, Err(CycleError::Backend(BackendError::Timeout(_)))));
    let first_delay = h.daemon.record_outcome(&first);

    let second = h.daemon.run_cycle().await;
    let second_delay = h.daemon.record_outcome(&second);
    assert!(second_delay > first_delay);
    assert_eq!(h.daemon.consecutive_failures(), 2);

    assert_eq!(h.store.thought_count().await.unwrap(), 0);
    assert_eq!(h.store.emotion_writes(), 0);
    assert_eq!(h.emotions.latest(), before);
}

#[tokio::test]
async fn test_failure_waits_longer_than_normal_pacing() {
    let h = harness(
        MockProvider::scripted([
            Ok("A quiet thought.".to_string()),
            Err(BackendError::Connection("refused".to_string())),
        ]),
        TengwarConfig::default(),
    )
    .await;

    let ok = h.daemon.run_cycle().await;
    let success_delay = h.daemon.record_outcome(&ok);
    let failed = h.daemon.run_cycle().await;
    let failure_delay = h.daemon.record_outcome(&failed);
    assert!(
        failure_delay > success_delay,
        "failure {:?} vs success {:?}",
        failure_delay,
        success_delay
    );
}

#[tokio::test]
async fn test_success_resets_failures() {
    let h = harness(
        MockProvider::scripted([
            Err(BackendError::Connection("refused".to_string())),
            Ok("Back again.".to_string()),
        ]),
        TengwarConfig::default(),
    )
    .await;

    let failed = h.daemon.run_cycle().await;
    h.daemon.record_outcome(&failed);
    assert_eq!(h.daemon.consecutive_failures(), 1);

    let ok = h.daemon.run_cycle().await;
    let delay = h.daemon.record_outcome(&ok);
    assert_eq!(h.daemon.consecutive_failures(), 0);
    assert!(delay >= Duration::from_secs(8));
    assert!(delay <= Duration::from_secs(33));
}

#[tokio::test]
async fn test_storage_failure_does_not_back_off() {
    let h = harness(
        MockProvider::scripted([Ok("This will not be kept.".to_string())]),
        TengwarConfig::default(),
    )
    .await;
    h.store.set_failing(true);

    let outcome = h.daemon.run_cycle().await;
    assert!(matches!(outcome, Err(CycleError::Storage(_))));
    let delay = h.daemon.record_outcome(&outcome);
    assert_eq!(h.daemon.consecutive_failures(), 0);
    assert!(delay <= Duration::from_secs(33));
    assert_eq!(h.store.emotion_writes(), 0);
}

#[tokio::test]
async fn test_subscribers_see_new_thoughts() {
    let h = harness(
        MockProvider::scripted([Ok("Broadcasting a thought.".to_string())]),
        TengwarConfig::default(),
    )
    .await;
    let mut rx = h.daemon.subscribe();

    let thought = h.daemon.run_cycle().await.unwrap();
    let seen = rx.recv().await.unwrap();
    assert_eq!(seen, thought);

    // What subscribers see is what the store kept, timestamp included.
    let stored = h.store.recent_thoughts(1).await.unwrap();
    assert_eq!(stored, vec![seen]);
}

#[tokio::test]
async fn test_spawn_and_cancel_marks_time() {
    let h = harness(MockProvider::new("loop"), fast_config()).await;
    let token = CancellationToken::new();
    let handle = h.daemon.spawn(token.clone());

    tokio::time::sleep(Duration::from_millis(300)).await;
    token.cancel();
    handle.await.unwrap();

    assert_eq!(h.daemon.phase(), DaemonPhase::Stopped);
    assert!(h.store.thought_count().await.unwrap() >= 1);
    let events: Vec<String> = h
        .store
        .time_markers(10)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.event)
        .collect();
    assert!(events.contains(&"daemon_start".to_string()));
    assert!(events.contains(&"daemon_stop".to_string()));
}

#[tokio::test]
async fn test_pause_stops_new_cycles() {
    let h = harness(MockProvider::new("loop"), fast_config()).await;
    h.daemon.pause();
    assert!(h.daemon.is_paused());

    let token = CancellationToken::new();
    let handle = h.daemon.spawn(token.clone());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.backend.calls(), 0);

    h.daemon.resume();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.backend.calls() >= 1);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_disabled_daemon_returns_immediately() {
    let mut config = TengwarConfig::default();
    config.daemon.enabled = false;
    let h = harness(MockProvider::new("idle"), config).await;

    h.daemon.run(CancellationToken::new()).await;
    assert_eq!(h.backend.calls(), 0);
    assert!(h.store.time_markers(10).await.unwrap().is_empty());
}
