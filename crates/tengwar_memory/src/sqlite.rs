use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tengwar_core::{
    ConversationTurn, EmotionalState, MemoryRecord, MemoryStore, NewThought, NewTurn, RecordId,
    Role, StorageError, StorageResult, Thought, ThoughtSource, TimeMarker,
};

/// Upper bound on rows pulled into Rust for relevance ranking.
const SEARCH_CANDIDATES: i64 = 500;
/// Upper bound on distinct query terms.
const MAX_SEARCH_TERMS: usize = 8;

/// Append-only SQLite store.
///
/// `memories` holds both thoughts and conversation turns so a single
/// autoincrement id orders them. Triggers reject UPDATE and DELETE on every
/// historical table.
#[derive(Clone)]
pub struct SqliteMemory {
    pub(crate) pool: Pool<Sqlite>,
}

impl SqliteMemory {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().display().to_string();
        let in_memory = path == ":memory:";
        let db_url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };

        let mut options = SqlitePoolOptions::new().after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA synchronous = FULL").execute(&mut *conn).await?;
                Ok(())
            })
        });
        if in_memory {
            // Every connection to :memory: is a separate database; pin one.
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = options
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let memory = Self { pool };
        memory.migrate().await?;
        tracing::info!("Memory store ready at {}", path);
        Ok(memory)
    }

    /// Flush and close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts_millis INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('thought', 'turn')),
                content TEXT NOT NULL,
                content_folded TEXT,
                source TEXT,
                role TEXT,
                thread_id TEXT,
                emotion_json TEXT,
                importance REAL NOT NULL DEFAULT 0.5,
                context_ids_json TEXT NOT NULL DEFAULT '[]',
                tools_used_json TEXT NOT NULL DEFAULT '[]'
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create memories table")?;

        // Stores created before search folding; old rows fall back to lower().
        if let Err(e) = sqlx::query("ALTER TABLE memories ADD COLUMN content_folded TEXT")
            .execute(&self.pool)
            .await
        {
            tracing::debug!("Column 'content_folded' likely exists: {}", e);
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind, id)")
            .execute(&self.pool)
            .await
            .context("Failed to create memories kind index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_thread ON memories(thread_id, id)")
            .execute(&self.pool)
            .await
            .context("Failed to create memories thread index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emotion_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts_millis INTEGER NOT NULL,
                curiosity REAL NOT NULL,
                satisfaction REAL NOT NULL,
                frustration REAL NOT NULL,
                excitement REAL NOT NULL,
                focus REAL NOT NULL,
                empathy REAL NOT NULL,
                confidence REAL NOT NULL,
                trigger TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create emotion_history table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS time_markers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts_millis INTEGER NOT NULL,
                event TEXT NOT NULL,
                notes TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create time_markers table")?;

        for table in ["memories", "emotion_history", "time_markers"] {
            for op in ["UPDATE", "DELETE"] {
                let sql = format!(
                    "CREATE TRIGGER IF NOT EXISTS {table}_no_{lower} BEFORE {op} ON {table} \
                     BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END",
                    table = table,
                    op = op,
                    lower = op.to_lowercase(),
                );
                sqlx::query(&sql)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to create append-only trigger on {}", table))?;
            }
        }

        Ok(())
    }

    async fn fetch_records(&self, sql: &str, binds: &[Bind<'_>]) -> StorageResult<Vec<MemoryRecord>> {
        let mut query = sqlx::query(sql);
        for b in binds {
            query = match b {
                Bind::Int(v) => query.bind(*v),
                Bind::Text(v) => query.bind(*v),
                Bind::OptText(v) => query.bind(*v),
            };
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn fetch_turns(&self, sql: &str, binds: &[Bind<'_>]) -> StorageResult<Vec<ConversationTurn>> {
        self.fetch_records(sql, binds)
            .await?
            .into_iter()
            .map(|r| match r {
                MemoryRecord::Turn(t) => Ok(t),
                MemoryRecord::Thought(t) => Err(StorageError::Corrupt {
                    id: t.id,
                    reason: "expected a conversation turn".to_string(),
                }),
            })
            .collect()
    }
}

enum Bind<'a> {
    Int(i64),
    Text(&'a str),
    OptText(Option<&'a str>),
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(id: i64, ms: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StorageError::Corrupt {
        id,
        reason: format!("timestamp out of range: {}", ms),
    })
}

fn record_from_row(row: &SqliteRow) -> StorageResult<MemoryRecord> {
    let id: i64 = row.try_get("id").map_err(db_err)?;
    let timestamp = from_millis(id, row.try_get("ts_millis").map_err(db_err)?)?;
    let kind: String = row.try_get("kind").map_err(db_err)?;
    let content: String = row.try_get("content").map_err(db_err)?;
    let importance: f64 = row.try_get("importance").map_err(db_err)?;
    let corrupt = |reason: String| StorageError::Corrupt { id, reason };

    match kind.as_str() {
        "thought" => {
            let source: Option<String> = row.try_get("source").map_err(db_err)?;
            let source = source
                .as_deref()
                .and_then(ThoughtSource::parse)
                .ok_or_else(|| corrupt(format!("unknown thought source {:?}", source)))?;
            let emotion_json: Option<String> = row.try_get("emotion_json").map_err(db_err)?;
            let emotion_json = emotion_json.ok_or_else(|| corrupt("missing emotion".into()))?;
            let emotion: EmotionalState = serde_json::from_str(&emotion_json)?;
            Ok(MemoryRecord::Thought(Thought {
                id,
                timestamp,
                content,
                emotion,
                source,
                importance: importance as f32,
            }))
        }
        "turn" => {
            let role: Option<String> = row.try_get("role").map_err(db_err)?;
            let role = role
                .as_deref()
                .and_then(Role::parse)
                .ok_or_else(|| corrupt(format!("unknown role {:?}", role)))?;
            let thread_id: Option<String> = row.try_get("thread_id").map_err(db_err)?;
            let context_ids: String = row.try_get("context_ids_json").map_err(db_err)?;
            let tools_used: String = row.try_get("tools_used_json").map_err(db_err)?;
            Ok(MemoryRecord::Turn(ConversationTurn {
                id,
                timestamp,
                role,
                content,
                thread_id: thread_id.unwrap_or_default(),
                context_ids: serde_json::from_str(&context_ids)?,
                tools_used: serde_json::from_str(&tools_used)?,
                importance: importance as f32,
            }))
        }
        other => Err(corrupt(format!("unknown record kind {:?}", other))),
    }
}

/// Lowercased, de-duplicated query terms.
fn search_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty() && seen.insert(w.clone()))
        .take(MAX_SEARCH_TERMS)
        .collect()
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl MemoryStore for SqliteMemory {
    async fn append_thought(&self, thought: NewThought) -> StorageResult<Thought> {
        let emotion_json = serde_json::to_string(&thought.emotion)?;
        let ts_millis = to_millis(Utc::now());
        let result = sqlx::query(
            "INSERT INTO memories \
             (ts_millis, kind, content, content_folded, source, emotion_json, importance) \
             VALUES (?, 'thought', ?, ?, ?, ?, ?)",
        )
        .bind(ts_millis)
        .bind(&thought.content)
        .bind(thought.content.to_lowercase())
        .bind(thought.source.as_str())
        .bind(emotion_json)
        .bind(thought.importance as f64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        let id = result.last_insert_rowid();
        Ok(thought.stored(id, from_millis(id, ts_millis)?))
    }

    async fn append_turn(&self, turn: NewTurn) -> StorageResult<RecordId> {
        let context_ids = serde_json::to_string(&turn.context_ids)?;
        let tools_used = serde_json::to_string(&turn.tools_used)?;
        let result = sqlx::query(
            "INSERT INTO memories \
             (ts_millis, kind, content, content_folded, role, thread_id, importance, \
              context_ids_json, tools_used_json) \
             VALUES (?, 'turn', ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(to_millis(Utc::now()))
        .bind(&turn.content)
        .bind(turn.content.to_lowercase())
        .bind(turn.role.as_str())
        .bind(&turn.thread_id)
        .bind(turn.importance as f64)
        .bind(context_ids)
        .bind(tools_used)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, n: usize) -> StorageResult<Vec<MemoryRecord>> {
        self.fetch_records(
            "SELECT * FROM memories ORDER BY id DESC LIMIT ?",
            &[Bind::Int(limit(n))],
        )
        .await
    }

    async fn recent_thoughts(&self, n: usize) -> StorageResult<Vec<Thought>> {
        let records = self
            .fetch_records(
                "SELECT * FROM memories WHERE kind = 'thought' ORDER BY id DESC LIMIT ?",
                &[Bind::Int(limit(n))],
            )
            .await?;
        records
            .into_iter()
            .map(|r| match r {
                MemoryRecord::Thought(t) => Ok(t),
                MemoryRecord::Turn(t) => Err(StorageError::Corrupt {
                    id: t.id,
                    reason: "expected a thought".to_string(),
                }),
            })
            .collect()
    }

    async fn recent_turns(
        &self,
        role: Option<Role>,
        n: usize,
    ) -> StorageResult<Vec<ConversationTurn>> {
        self.fetch_turns(
            "SELECT * FROM memories WHERE kind = 'turn' AND (?1 IS NULL OR role = ?1) \
             ORDER BY id DESC LIMIT ?2",
            &[
                Bind::OptText(role.map(|r| r.as_str())),
                Bind::Int(limit(n)),
            ],
        )
        .await
    }

    async fn thread_history(
        &self,
        thread_id: &str,
        n: usize,
    ) -> StorageResult<Vec<ConversationTurn>> {
        let mut turns = self
            .fetch_turns(
                "SELECT * FROM memories WHERE kind = 'turn' AND thread_id = ? \
                 ORDER BY id DESC LIMIT ?",
                &[Bind::Text(thread_id), Bind::Int(limit(n))],
            )
            .await?;
        turns.reverse();
        Ok(turns)
    }

    async fn search(&self, query: &str, n: usize) -> StorageResult<Vec<MemoryRecord>> {
        let terms = search_terms(query);
        if terms.is_empty() || n == 0 {
            return Ok(vec![]);
        }

        // Folded in Rust at insert time; SQLite only folds ASCII.
        let clauses =
            vec!["COALESCE(content_folded, lower(content)) LIKE ? ESCAPE '\\'"; terms.len()]
                .join(" OR ");
        let sql = format!(
            "SELECT * FROM memories WHERE {} ORDER BY id DESC LIMIT ?",
            clauses
        );
        let patterns: Vec<String> = terms.iter().map(|t| escape_like(t)).collect();
        let mut binds: Vec<Bind<'_>> = patterns.iter().map(|p| Bind::Text(p.as_str())).collect();
        binds.push(Bind::Int(SEARCH_CANDIDATES));

        let candidates = self.fetch_records(&sql, &binds).await?;
        let mut scored: Vec<(usize, MemoryRecord)> = candidates
            .into_iter()
            .map(|r| {
                let lower = r.content().to_lowercase();
                let hits = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                (hits, r)
            })
            .collect();

        // More matched terms first, then importance, then recency.
        scored.sort_by(|(ha, a), (hb, b)| {
            hb.cmp(ha)
                .then_with(|| {
                    b.importance()
                        .partial_cmp(&a.importance())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.id().cmp(&a.id()))
        });

        Ok(scored.into_iter().take(n).map(|(_, r)| r).collect())
    }

    async fn first_thought_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT id, ts_millis FROM memories WHERE kind = 'thought' ORDER BY id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => {
                let id: i64 = row.try_get("id").map_err(db_err)?;
                let ms: i64 = row.try_get("ts_millis").map_err(db_err)?;
                Ok(Some(from_millis(id, ms)?))
            }
            None => Ok(None),
        }
    }

    async fn last_interaction_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT id, ts_millis FROM memories WHERE kind = 'turn' ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => {
                let id: i64 = row.try_get("id").map_err(db_err)?;
                let ms: i64 = row.try_get("ts_millis").map_err(db_err)?;
                Ok(Some(from_millis(id, ms)?))
            }
            None => Ok(None),
        }
    }

    async fn thought_count(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories WHERE kind = 'thought'")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }

    async fn record_count(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }

    async fn record_emotion(&self, state: &EmotionalState, trigger: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO emotion_history \
             (ts_millis, curiosity, satisfaction, frustration, excitement, focus, empathy, confidence, trigger) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(to_millis(state.updated_at))
        .bind(state.curiosity as f64)
        .bind(state.satisfaction as f64)
        .bind(state.frustration as f64)
        .bind(state.excitement as f64)
        .bind(state.focus as f64)
        .bind(state.empathy as f64)
        .bind(state.confidence as f64)
        .bind(trigger)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn latest_emotion(&self) -> StorageResult<Option<EmotionalState>> {
        let row = sqlx::query("SELECT * FROM emotion_history ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.try_get("id").map_err(db_err)?;
        let get = |col: &str| -> StorageResult<f32> {
            let v: f64 = row.try_get(col).map_err(db_err)?;
            Ok(v as f32)
        };
        Ok(Some(EmotionalState {
            curiosity: get("curiosity")?,
            satisfaction: get("satisfaction")?,
            frustration: get("frustration")?,
            excitement: get("excitement")?,
            focus: get("focus")?,
            empathy: get("empathy")?,
            confidence: get("confidence")?,
            updated_at: from_millis(id, row.try_get("ts_millis").map_err(db_err)?)?,
        }))
    }

    async fn mark_time(&self, event: &str, notes: Option<&str>) -> StorageResult<RecordId> {
        let result =
            sqlx::query("INSERT INTO time_markers (ts_millis, event, notes) VALUES (?, ?, ?)")
                .bind(to_millis(Utc::now()))
                .bind(event)
                .bind(notes)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    async fn time_markers(&self, n: usize) -> StorageResult<Vec<TimeMarker>> {
        let rows = sqlx::query("SELECT * FROM time_markers ORDER BY id DESC LIMIT ?")
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id").map_err(db_err)?;
                Ok(TimeMarker {
                    id,
                    timestamp: from_millis(id, row.try_get("ts_millis").map_err(db_err)?)?,
                    event: row.try_get("event").map_err(db_err)?,
                    notes: row.try_get("notes").map_err(db_err)?,
                })
            })
            .collect()
    }
}
