//! Durability tests for SqliteMemory
//!
//! Uses tempfile::TempDir for isolated on-disk databases.

use proptest::prelude::*;
use tengwar_core::{
    EmotionalState, MemoryRecord, MemoryStore, NewThought, NewTurn, ThoughtSource,
};
use tengwar_memory::SqliteMemory;

fn thought(content: String) -> NewThought {
    NewThought {
        content,
        emotion: EmotionalState::default(),
        source: ThoughtSource::Daemon,
        importance: 0.4,
    }
}

/// Records survive closing and reopening the database, in the same order.
#[tokio::test]
async fn test_reopen_preserves_records_and_order() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("tengwar.db");

    let mut ids = Vec::new();
    {
        let db = SqliteMemory::new(&db_path).await.unwrap();
        for i in 0..5 {
            ids.push(db.append_thought(thought(format!("thought {}", i))).await.unwrap().id);
        }
        ids.push(db.append_turn(NewTurn::user("t", "hello")).await.unwrap());
        let mut state = EmotionalState::default();
        state.focus = 0.9;
        db.record_emotion(&state, "deep_thought").await.unwrap();
        db.close().await;
    }

    let db = SqliteMemory::new(&db_path).await.unwrap();
    let recent = db.recent(10).await.unwrap();
    let got: Vec<i64> = recent.iter().map(|r| r.id()).collect();
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(got, expected);
    assert!(matches!(recent[0], MemoryRecord::Turn(_)));

    let latest = db.latest_emotion().await.unwrap().unwrap();
    assert!((latest.focus - 0.9).abs() < 1e-6);

    // New appends continue after the old ids
    let next = db.append_thought(thought("after reopen".into())).await.unwrap().id;
    assert!(next > *ids.last().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// recent(n) is exactly the last n appends, newest first, no gaps or repeats.
    #[test]
    fn recent_returns_exact_suffix(kinds in prop::collection::vec(any::<bool>(), 0..40), n in 0usize..50) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let db = SqliteMemory::new(":memory:").await.unwrap();
            let mut ids = Vec::new();
            for (i, is_thought) in kinds.iter().enumerate() {
                let id = if *is_thought {
                    db.append_thought(thought(format!("t{}", i))).await.unwrap().id
                } else {
                    db.append_turn(NewTurn::user("p", format!("u{}", i))).await.unwrap()
                };
                ids.push(id);
            }
            let got: Vec<i64> = db.recent(n).await.unwrap().iter().map(|r| r.id()).collect();
            let expected: Vec<i64> = ids.iter().rev().take(n).copied().collect();
            assert_eq!(got, expected);
        });
    }
}
