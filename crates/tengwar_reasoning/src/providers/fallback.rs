use crate::llm::{BackendError, CompletionBackend, CompletionParams};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Tries `primary`, then `secondary` on any failure.
pub struct FallbackBackend {
    primary: Arc<dyn CompletionBackend>,
    secondary: Arc<dyn CompletionBackend>,
}

impl FallbackBackend {
    pub fn new(primary: Arc<dyn CompletionBackend>, secondary: Arc<dyn CompletionBackend>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait::async_trait]
impl CompletionBackend for FallbackBackend {
    fn name(&self) -> String {
        format!("{} -> {}", self.primary.name(), self.secondary.name())
    }

    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, BackendError> {
        match self.primary.complete(system, prompt, params).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!(
                    "{} failed ({}), falling back to {}",
                    self.primary.name(),
                    e,
                    self.secondary.name()
                );
                self.secondary.complete(system, prompt, params).await
            }
        }
    }

    /// Falls back only while nothing has been streamed yet.
    async fn complete_stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
        tokens: mpsc::Sender<String>,
    ) -> Result<String, BackendError> {
        let (tx, mut rx) = mpsc::channel(64);
        let forward = async {
            let mut forwarded = false;
            while let Some(token) = rx.recv().await {
                forwarded = true;
                let _ = tokens.send(token).await;
            }
            forwarded
        };
        let (result, forwarded) = tokio::join!(
            self.primary.complete_stream(system, prompt, params, tx),
            forward
        );
        match result {
            Ok(text) => Ok(text),
            Err(e) if !forwarded => {
                tracing::warn!(
                    "{} failed ({}), falling back to {}",
                    self.primary.name(),
                    e,
                    self.secondary.name()
                );
                self.secondary.complete_stream(system, prompt, params, tokens).await
            }
            Err(e) => Err(e),
        }
    }

    async fn health(&self) -> bool {
        self.primary.health().await || self.secondary.health().await
    }
}
