//! Dialogue handler: one request/response exchange per user message.
//!
//! Turns are serialized per handler, so a thread's turns interleave strictly
//! user → assistant. Tool directives in the reply run in textual order and
//! each is replaced inline by its outcome; a failing directive never stops
//! the ones after it. A streamed reply forwards raw backend text as it
//! arrives and runs directives once the stream has finished.

use crate::directive::{self, ToolDirective};
use crate::llm::{CompletionBackend, CompletionParams};
use crate::prompts::{self, DialogueContext, DIALOGUE_SYSTEM_PROMPT};
use crate::providers::params_for;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tengwar_core::config::DialogueConfig;
use tengwar_core::{
    ContentClassifier, EmotionEvent, EmotionalState, MemoryRecord, MemoryStore, NewThought,
    NewTurn, RecordId, StorageError, TemporalContext, TengwarConfig, ThoughtSource, TimeBuckets,
};
use tengwar_limbic::EmotionEngine;
use tengwar_os::Capabilities;
use tokio::sync::{mpsc, watch, Mutex};

/// Result of one directive, as shown to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct DirectiveOutcome {
    pub tool: &'static str,
    /// Path, commit message or code the directive acted on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    /// Text substituted into the reply.
    pub rendered: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DialogueReply {
    pub thread_id: String,
    pub text: String,
    pub directives: Vec<DirectiveOutcome>,
    pub emotion: EmotionalState,
    /// True when the backend was unavailable and `text` is a stand-in.
    pub degraded: bool,
    pub user_turn_id: RecordId,
    pub assistant_turn_id: RecordId,
}

#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct DialogueHandler {
    store: Arc<dyn MemoryStore>,
    emotions: Arc<EmotionEngine>,
    backend: Arc<dyn CompletionBackend>,
    capabilities: Arc<dyn Capabilities>,
    classifier: Arc<ContentClassifier>,
    config: DialogueConfig,
    params: CompletionParams,
    call_timeout: Duration,
    buckets: TimeBuckets,
    /// Held for a whole exchange.
    turn: Mutex<()>,
    /// Current thread id. Readable while an exchange is in flight.
    thread: watch::Sender<Option<String>>,
}

impl DialogueHandler {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        emotions: Arc<EmotionEngine>,
        backend: Arc<dyn CompletionBackend>,
        capabilities: Arc<dyn Capabilities>,
        classifier: Arc<ContentClassifier>,
        config: &TengwarConfig,
    ) -> Self {
        let (thread, _) = watch::channel(None);
        Self {
            store,
            emotions,
            backend,
            capabilities,
            classifier,
            config: config.dialogue.clone(),
            params: params_for(&config.dialogue_backend),
            call_timeout: Duration::from_secs(config.dialogue_backend.timeout_secs.max(1)),
            buckets: config.time.clone(),
            turn: Mutex::new(()),
            thread,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    pub async fn backend_healthy(&self) -> bool {
        self.backend.health().await
    }

    pub fn current_thread(&self) -> Option<String> {
        self.thread.borrow().clone()
    }

    /// Forget the current thread; the next message opens a new one. An
    /// exchange already in flight finishes on its old thread.
    pub fn new_conversation(&self) {
        if let Some(old) = self.thread.send_replace(None) {
            tracing::info!("Closed conversation thread {}", old);
        }
    }

    pub async fn handle(&self, message: &str) -> Result<DialogueReply, DialogueError> {
        self.exchange(message, None).await
    }

    /// Like [`handle`](Self::handle), but forwards reply text to `tokens` as
    /// the backend produces it. Directive outcomes follow as a trailer once
    /// the stream has finished; the returned reply carries the final text.
    pub async fn handle_stream(
        &self,
        message: &str,
        tokens: mpsc::Sender<String>,
    ) -> Result<DialogueReply, DialogueError> {
        self.exchange(message, Some(tokens)).await
    }

    async fn exchange(
        &self,
        message: &str,
        tokens: Option<mpsc::Sender<String>>,
    ) -> Result<DialogueReply, DialogueError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DialogueError::EmptyMessage);
        }

        let _turn = self.turn.lock().await;
        let current = self.thread.borrow().clone();
        let fresh = current.is_none();
        let thread_id = match current {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
                tracing::info!("Opened conversation thread {}", id);
                self.thread.send_replace(Some(id.clone()));
                id
            }
        };

        // Silence is measured up to this message, not including it.
        let last_interaction = self.store.last_interaction_at().await?;
        let user_turn_id = self
            .store
            .append_turn(NewTurn::user(thread_id.clone(), message))
            .await?;

        let (prompt, context_ids) = self
            .assemble(message, &thread_id, user_turn_id, last_interaction)
            .await?;

        let call = async {
            match &tokens {
                Some(tx) => {
                    self.backend
                        .complete_stream(
                            Some(DIALOGUE_SYSTEM_PROMPT),
                            &prompt,
                            &self.params,
                            tx.clone(),
                        )
                        .await
                }
                None => {
                    self.backend
                        .complete(Some(DIALOGUE_SYSTEM_PROMPT), &prompt, &self.params)
                        .await
                }
            }
        };
        let call = tokio::time::timeout(self.call_timeout, call).await;
        let (raw, degraded) = match call {
            Ok(Ok(text)) => (text, false),
            Ok(Err(e)) => {
                tracing::warn!("Dialogue backend {} failed: {}", self.backend.name(), e);
                (degraded_reply(&e.to_string()), true)
            }
            Err(_) => {
                tracing::warn!(
                    "Dialogue backend {} timed out after {:?}",
                    self.backend.name(),
                    self.call_timeout
                );
                (degraded_reply("no answer in time"), true)
            }
        };

        let (text, outcomes) = if degraded {
            (raw, Vec::new())
        } else {
            self.run_directives(&raw).await?
        };
        if let Some(tx) = &tokens {
            let trailer = if degraded {
                Some(text.clone())
            } else {
                stream_trailer(&outcomes)
            };
            if let Some(trailer) = trailer {
                let _ = tx.send(trailer).await;
            }
        }

        let mut turn = NewTurn::assistant(thread_id.clone(), text.clone());
        turn.context_ids = context_ids;
        turn.tools_used = outcomes.iter().map(|o| o.tool.to_string()).collect();
        let assistant_turn_id = self.store.append_turn(turn).await?;

        let mut events = Vec::new();
        if fresh {
            events.push(EmotionEvent::NewConversation);
        }
        for o in &outcomes {
            events.push(if o.ok {
                EmotionEvent::CodeSuccess
            } else {
                EmotionEvent::CodeFailure
            });
        }
        events.extend(self.classifier.classify_message(message));
        let emotion = self.emotions.update(&events, Utc::now()).await;

        Ok(DialogueReply {
            thread_id,
            text,
            directives: outcomes,
            emotion,
            degraded,
            user_turn_id,
            assistant_turn_id,
        })
    }

    /// Prompt for the backend plus the thought ids it drew on.
    async fn assemble(
        &self,
        message: &str,
        thread_id: &str,
        user_turn_id: RecordId,
        last_interaction: Option<chrono::DateTime<Utc>>,
    ) -> Result<(String, Vec<RecordId>), StorageError> {
        let recent_thoughts = self.store.recent_thoughts(self.config.context_thoughts).await?;

        // Turns of this thread already appear in the history section.
        let relevant: Vec<MemoryRecord> = self
            .store
            .search(message, self.config.relevant_memories + self.config.history_turns)
            .await?
            .into_iter()
            .filter(|r| match r {
                MemoryRecord::Turn(t) => t.thread_id != thread_id,
                MemoryRecord::Thought(t) => !recent_thoughts.iter().any(|rt| rt.id == t.id),
            })
            .take(self.config.relevant_memories)
            .collect();

        let history: Vec<_> = self
            .store
            .thread_history(thread_id, self.config.history_turns + 1)
            .await?
            .into_iter()
            .filter(|t| t.id != user_turn_id)
            .collect();

        let temporal = TemporalContext::derive(
            Utc::now(),
            self.store.first_thought_at().await?,
            last_interaction,
            &self.buckets,
        );
        let thought_count = self.store.thought_count().await?;
        let record_count = self.store.record_count().await?;
        let summary = self.emotions.summary().await;

        let prompt = prompts::dialogue_prompt(&DialogueContext {
            temporal: &temporal,
            thought_count,
            record_count,
            emotion_summary: &summary,
            recent_thoughts: &recent_thoughts,
            relevant: &relevant,
            history: &history,
            message,
        });

        let mut context_ids: Vec<RecordId> = recent_thoughts.iter().map(|t| t.id).collect();
        for r in &relevant {
            if let MemoryRecord::Thought(t) = r {
                context_ids.push(t.id);
            }
        }
        context_ids.sort_unstable();
        context_ids.dedup();
        Ok((prompt, context_ids))
    }

    /// Execute directives in order and splice their outcomes into `raw`.
    async fn run_directives(
        &self,
        raw: &str,
    ) -> Result<(String, Vec<DirectiveOutcome>), StorageError> {
        let parsed = directive::parse(raw);
        if parsed.is_empty() {
            return Ok((raw.to_string(), Vec::new()));
        }

        let mut text = String::with_capacity(raw.len());
        let mut cursor = 0;
        let mut outcomes = Vec::with_capacity(parsed.len());
        for p in parsed {
            text.push_str(&raw[cursor..p.span.start]);
            let outcome = self.execute(&p.directive).await?;
            text.push_str(&outcome.rendered);
            cursor = p.span.end;
            outcomes.push(outcome);
        }
        text.push_str(&raw[cursor..]);
        Ok((text, outcomes))
    }

    async fn execute(&self, directive: &ToolDirective) -> Result<DirectiveOutcome, StorageError> {
        let tool = directive.tool_name();
        let caps = &self.capabilities;
        let (target, result) = match directive {
            ToolDirective::ReadFile { path } => (
                Some(path.clone()),
                caps.read(path)
                    .await
                    .map(|content| render_read(path, &content, self.config.read_preview_chars)),
            ),
            ToolDirective::WriteFile { path, content } => {
                let result = caps.write(path, content).await;
                if let Ok(resolved) = &result {
                    self.note_self_edit(format!("Modified file: {}", resolved.display()), 0.8)
                        .await?;
                }
                (
                    Some(path.clone()),
                    result.map(|resolved| {
                        format!("Wrote {} bytes to {}", content.len(), resolved.display())
                    }),
                )
            }
            ToolDirective::ListDir { path } => (
                Some(path.clone()),
                caps.list(path).await.map(|items| {
                    if items.is_empty() {
                        format!("```\n{} is empty\n```", path)
                    } else {
                        format!("```\n{}\n```", items.join("\n"))
                    }
                }),
            ),
            ToolDirective::GitStatus => (
                None,
                caps.status().await.map(|s| format!("```git\n{}\n```", s.trim_end())),
            ),
            ToolDirective::Commit { message } => {
                let result = caps.commit(message).await;
                if result.is_ok() {
                    self.note_self_edit(format!("Committed changes: {}", message), 0.9)
                        .await?;
                }
                (
                    Some(message.clone()),
                    result.map(|summary| format!("Committed: {}\n{}", message, summary)),
                )
            }
            ToolDirective::Push => (None, caps.push().await.map(|s| format!("Pushed: {}", s))),
            ToolDirective::Execute { code } => (
                Some(code.clone()),
                caps.execute(code)
                    .await
                    .map(|out| format!("```tengwar\n{}\n```\n→ {}", code, out)),
            ),
        };

        Ok(match result {
            Ok(rendered) => DirectiveOutcome {
                tool,
                target,
                ok: true,
                error_kind: None,
                rendered,
            },
            Err(e) => {
                tracing::warn!("Directive {} failed: {}", tool, e);
                DirectiveOutcome {
                    tool,
                    target,
                    ok: false,
                    error_kind: Some(e.kind()),
                    rendered: format!("[{} failed: {}]", tool, e),
                }
            }
        })
    }

    /// Remember a change the agent made to itself.
    async fn note_self_edit(&self, content: String, importance: f32) -> Result<(), StorageError> {
        let emotion = self.emotions.latest();
        self.store
            .append_thought(NewThought {
                content,
                emotion,
                source: ThoughtSource::Dialogue,
                importance,
            })
            .await?;
        Ok(())
    }
}

fn render_read(path: &str, content: &str, preview_chars: usize) -> String {
    let mut preview = prompts::truncate(content, preview_chars);
    if content.chars().count() > preview_chars {
        preview.push_str(&format!("\n... ({} bytes total)", content.len()));
    }
    format!("```\n{}:\n{}\n```", path, preview)
}

/// Directive results appended to a streamed reply.
fn stream_trailer(outcomes: &[DirectiveOutcome]) -> Option<String> {
    if outcomes.is_empty() {
        return None;
    }
    let mut out = String::from("\n\n---\n");
    for o in outcomes {
        let status = if o.ok { "ok" } else { "failed" };
        out.push_str(&format!(
            "{} {} → {}\n",
            status,
            o.tool,
            prompts::truncate(&o.rendered, 200)
        ));
    }
    Some(out)
}

fn degraded_reply(reason: &str) -> String {
    format!(
        "I can't think clearly right now: my thinking backend is unavailable ({}). \
         Your message is saved and I'll pick it up when I'm back.",
        reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_read_truncates() {
        let out = render_read("a.tw", &"x".repeat(10), 4);
        assert!(out.contains("xxxx…"));
        assert!(out.contains("(10 bytes total)"));
        let out = render_read("a.tw", "short", 100);
        assert_eq!(out, "```\na.tw:\nshort\n```");
    }

    #[test]
    fn test_stream_trailer_lists_outcomes() {
        assert!(stream_trailer(&[]).is_none());
        let outcomes = vec![
            DirectiveOutcome {
                tool: "read",
                target: Some("a.tw".into()),
                ok: true,
                error_kind: None,
                rendered: "contents".into(),
            },
            DirectiveOutcome {
                tool: "git_push",
                target: None,
                ok: false,
                error_kind: Some("network"),
                rendered: "[git_push failed: offline]".into(),
            },
        ];
        let trailer = stream_trailer(&outcomes).unwrap();
        assert!(trailer.starts_with("\n\n---\n"));
        assert!(trailer.contains("ok read → contents"));
        assert!(trailer.contains("failed git_push → [git_push failed: offline]"));
    }

    #[test]
    fn test_degraded_reply_mentions_backend() {
        assert!(degraded_reply("timeout").contains("thinking backend is unavailable"));
    }
}
