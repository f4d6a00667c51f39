use crate::types::{
    BackendStatus, ChatRequest, ChatResponse, ListQuery, MemoriesResponse, MemoryQuery,
    StatusResponse, TemporalStatus, ThoughtsResponse, WsInbound, WsOutbound,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tengwar_core::{MemoryStore, StorageError, TemporalContext, TimeBuckets};
use tengwar_limbic::EmotionEngine;
use tengwar_reasoning::{DialogueError, DialogueHandler, DialogueReply, ThoughtDaemon};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 500;
/// Thoughts replayed to a WebSocket client on connect.
const WS_HISTORY: usize = 10;

/// Everything the handlers reach into.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MemoryStore>,
    pub emotions: Arc<EmotionEngine>,
    pub daemon: Arc<ThoughtDaemon>,
    pub dialogue: Arc<DialogueHandler>,
    pub buckets: TimeBuckets,
    /// Number of active WebSocket connections.
    pub active_ws: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        emotions: Arc<EmotionEngine>,
        daemon: Arc<ThoughtDaemon>,
        dialogue: Arc<DialogueHandler>,
        buckets: TimeBuckets,
    ) -> Self {
        Self {
            store,
            emotions,
            daemon,
            dialogue,
            buckets,
            active_ws: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// The HTTP + WebSocket surface.
///
/// - `GET /health`, `GET /api/status`
/// - `GET /api/thoughts`, `GET /api/memories`
/// - `POST /api/chat`, `POST /api/new-conversation`
/// - `POST /api/daemon/pause`, `POST /api/daemon/resume`
/// - `GET /ws` live thought stream and chat
pub struct GatewayServer {
    state: AppState,
    host: String,
    port: u16,
}

impl GatewayServer {
    pub fn new(state: AppState, host: &str, port: u16) -> Self {
        Self {
            state,
            host: host.to_string(),
            port,
        }
    }

    /// Number of active WebSocket connections.
    pub fn active_connections(&self) -> Arc<AtomicUsize> {
        self.state.active_ws.clone()
    }

    /// Bind and serve until `shutdown` is cancelled.
    pub fn start(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let app = router(self.state);
        let addr = format!("{}:{}", self.host, self.port);

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Gateway failed to bind {}: {}", addr, e);
                    return;
                }
            };
            tracing::info!("Gateway listening on {}", addr);
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!("Gateway server error: {}", e);
            }
            tracing::info!("Gateway stopped");
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/thoughts", get(thoughts))
        .route("/api/memories", get(memories))
        .route("/api/chat", post(chat))
        .route("/api/new-conversation", post(new_conversation))
        .route("/api/daemon/pause", post(pause_daemon))
        .route("/api/daemon/resume", post(resume_daemon))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl From<DialogueError> for ApiError {
    fn from(e: DialogueError) -> Self {
        match e {
            DialogueError::EmptyMessage => ApiError::BadRequest(e.to_string()),
            DialogueError::Storage(e) => ApiError::Storage(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Storage(e) => {
                tracing::error!("Request failed on storage: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

// ============================================================================
// Route handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let temporal = TemporalContext::derive(
        Utc::now(),
        state.store.first_thought_at().await?,
        state.store.last_interaction_at().await?,
        &state.buckets,
    );
    let (thought_healthy, dialogue_healthy) = tokio::join!(
        state.daemon.backend_healthy(),
        state.dialogue.backend_healthy()
    );

    Ok(Json(StatusResponse {
        emotions: state.emotions.snapshot().await,
        summary: state.emotions.summary().await,
        temporal: TemporalStatus {
            now: temporal.now,
            seconds_since_first_boot: temporal.since_first_boot.map(|d| d.as_secs()),
            seconds_since_last_interaction: temporal.since_last_interaction.map(|d| d.as_secs()),
            silence: temporal.silence,
            description: temporal.describe(),
        },
        thought_count: state.store.thought_count().await?,
        record_count: state.store.record_count().await?,
        daemon_phase: state.daemon.phase(),
        daemon_paused: state.daemon.is_paused(),
        thought_backend: BackendStatus {
            name: state.daemon.backend_name(),
            healthy: thought_healthy,
        },
        dialogue_backend: BackendStatus {
            name: state.dialogue.backend_name(),
            healthy: dialogue_healthy,
        },
        conversation: state.dialogue.current_thread(),
    }))
}

async fn thoughts(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ThoughtsResponse>, ApiError> {
    let mut thoughts = state.store.recent_thoughts(clamp_limit(q.limit)).await?;
    thoughts.reverse();
    Ok(Json(ThoughtsResponse { thoughts }))
}

/// Keyword search when `query` is given, otherwise the latest records.
async fn memories(
    State(state): State<AppState>,
    Query(q): Query<MemoryQuery>,
) -> Result<Json<MemoriesResponse>, ApiError> {
    let limit = clamp_limit(q.limit);
    let records = match q.query.as_deref().map(str::trim) {
        Some(query) if !query.is_empty() => state.store.search(query, limit).await?,
        _ => state.store.recent(limit).await?,
    };
    Ok(Json(MemoriesResponse { records }))
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state.dialogue.handle(&req.message).await?;
    Ok(Json(chat_response(reply)))
}

fn chat_response(reply: DialogueReply) -> ChatResponse {
    ChatResponse {
        response: reply.text,
        thread_id: reply.thread_id,
        emotions: reply.emotion,
        directives: reply.directives,
        degraded: reply.degraded,
    }
}

async fn new_conversation(State(state): State<AppState>) -> StatusCode {
    state.dialogue.new_conversation();
    StatusCode::NO_CONTENT
}

async fn pause_daemon(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.daemon.pause();
    Json(serde_json::json!({ "paused": true }))
}

async fn resume_daemon(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.daemon.resume();
    Json(serde_json::json!({ "paused": false }))
}

// ============================================================================
// WebSocket
// ============================================================================

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn frame(out: &WsOutbound) -> Message {
    Message::Text(serde_json::to_string(out).unwrap_or_default().into())
}

/// Greet with state and recent thoughts, then stream new thoughts and
/// answer chat frames until the client goes away. Chat replies arrive as
/// `chat_token` frames followed by one `chat_done`.
async fn handle_ws(socket: WebSocket, state: AppState) {
    state.active_ws.fetch_add(1, Ordering::Relaxed);
    let (mut ws_tx, mut ws_rx) = socket.split();
    // Subscribe before reading history so nothing falls in between.
    let mut live = state.daemon.subscribe();

    let greeting = WsOutbound::State {
        emotions: state.emotions.snapshot().await,
        summary: state.emotions.summary().await,
        daemon_phase: state.daemon.phase(),
    };
    let history = match state.store.recent_thoughts(WS_HISTORY).await {
        Ok(mut thoughts) => {
            thoughts.reverse();
            WsOutbound::History { thoughts }
        }
        Err(e) => WsOutbound::Error {
            message: e.to_string(),
        },
    };
    if ws_tx.send(frame(&greeting)).await.is_err() || ws_tx.send(frame(&history)).await.is_err()
    {
        state.active_ws.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    loop {
        tokio::select! {
            thought = live.recv() => {
                let out = match thought {
                    Ok(thought) => WsOutbound::Thought { thought },
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!("WebSocket client lagged {} thoughts", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if ws_tx.send(frame(&out)).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let out = match serde_json::from_str::<WsInbound>(&text) {
                    Ok(inbound) => match answer(&state, inbound, &mut ws_tx).await {
                        Ok(out) => out,
                        Err(_) => break,
                    },
                    Err(e) => WsOutbound::Error {
                        message: format!("Invalid frame: {}", e),
                    },
                };
                if ws_tx.send(frame(&out)).await.is_err() {
                    break;
                }
            }
        }
    }
    state.active_ws.fetch_sub(1, Ordering::Relaxed);
}

/// The closing frame for one inbound frame. Errors only when the client
/// is gone.
async fn answer(
    state: &AppState,
    inbound: WsInbound,
    ws_tx: &mut SplitSink<WebSocket, Message>,
) -> Result<WsOutbound, axum::Error> {
    Ok(match inbound {
        WsInbound::Chat { content } => stream_chat(state, &content, ws_tx).await?,
        WsInbound::NewConversation => {
            state.dialogue.new_conversation();
            WsOutbound::ConversationReset
        }
        WsInbound::Ping => WsOutbound::Pong,
    })
}

/// Forward reply text as it is produced, then report the finished turn.
///
/// A client that disconnects mid-reply does not cut the turn short; the
/// exchange still completes and is stored.
async fn stream_chat(
    state: &AppState,
    content: &str,
    ws_tx: &mut SplitSink<WebSocket, Message>,
) -> Result<WsOutbound, axum::Error> {
    let (tx, mut rx) = mpsc::channel(64);
    let forward = async {
        while let Some(token) = rx.recv().await {
            ws_tx.send(frame(&WsOutbound::ChatToken { token })).await?;
        }
        Ok::<(), axum::Error>(())
    };
    let (reply, forwarded) = tokio::join!(state.dialogue.handle_stream(content, tx), forward);
    forwarded?;

    Ok(match reply {
        Ok(reply) => {
            let r = chat_response(reply);
            WsOutbound::ChatDone {
                response: r.response,
                thread_id: r.thread_id,
                emotions: r.emotions,
                directives: r.directives,
                degraded: r.degraded,
            }
        }
        Err(e) => WsOutbound::Error {
            message: e.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(health().await, "ok");
    }

    #[test]
    fn test_limit_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(3)), 3);
        assert_eq!(clamp_limit(Some(1_000_000)), MAX_LIMIT);
    }

    #[test]
    fn test_empty_message_is_bad_request() {
        let resp = ApiError::from(DialogueError::EmptyMessage).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_storage_error_is_server_error() {
        let resp = ApiError::from(StorageError::Database("locked".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
