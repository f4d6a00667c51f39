use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sampling parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.8,
        }
    }
}

/// Why a completion backend produced no usable text.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("cannot reach backend: {0}")]
    Connection(String),
    #[error("backend API error: {0}")]
    Api(String),
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("backend returned no text")]
    Empty,
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else {
            BackendError::Connection(e.to_string())
        }
    }
}

/// Opaque text completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label for logs, e.g. `ollama:qwen2.5:3b`.
    fn name(&self) -> String;

    /// Complete `prompt`, optionally under a system prompt. Whitespace-only
    /// output is reported as `BackendError::Empty`.
    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, BackendError>;

    /// Like [`complete`](Self::complete), but sends text fragments to
    /// `tokens` as they arrive. Returns the whole text, trimmed.
    ///
    /// The default sends the finished completion as a single fragment.
    async fn complete_stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
        tokens: mpsc::Sender<String>,
    ) -> Result<String, BackendError> {
        let text = self.complete(system, prompt, params).await?;
        // A dropped receiver only means nobody is watching.
        let _ = tokens.send(text.clone()).await;
        Ok(text)
    }

    /// Cheap reachability check.
    async fn health(&self) -> bool {
        true
    }
}

/// Trim and reject empty completions.
pub(crate) fn non_empty(text: String) -> Result<String, BackendError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(BackendError::Empty)
    } else {
        Ok(trimmed.to_string())
    }
}
