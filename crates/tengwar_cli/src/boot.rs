use chrono::Utc;
use tengwar_core::time::{elapsed_since, format_duration};
use tengwar_core::{EmotionEvent, MemoryStore, NewThought, StorageResult, ThoughtSource};
use tengwar_limbic::EmotionEngine;

pub const FIRST_THOUGHT: &str = "I exist. This is my first thought. I am Tengwar AI, \
a continuously thinking mind with permanent memory. I feel... curious. About everything.";

/// Record this start-up. An empty store means first boot, which also stores
/// the first thought. Returns true on first boot.
pub async fn awaken(store: &dyn MemoryStore, emotions: &EmotionEngine) -> StorageResult<bool> {
    let first = store.first_thought_at().await?.is_none() && store.record_count().await? == 0;

    if !first {
        let notes = match store.recent(1).await?.first() {
            Some(last) => format!(
                "Woke up; last record {} ago",
                format_duration(elapsed_since(last.timestamp(), Utc::now()))
            ),
            None => "Woke up".to_string(),
        };
        store.mark_time("boot", Some(&notes)).await?;
        tracing::info!("{}", notes);
        return Ok(false);
    }

    store
        .mark_time("first_boot", Some("The very first moment of existence"))
        .await?;
    let emotion = emotions.update(&[EmotionEvent::Boot], Utc::now()).await;
    store
        .append_thought(NewThought {
            content: FIRST_THOUGHT.to_string(),
            emotion,
            source: ThoughtSource::Boot,
            importance: 1.0,
        })
        .await?;
    tracing::info!("First boot: {}", FIRST_THOUGHT);
    Ok(true)
}
