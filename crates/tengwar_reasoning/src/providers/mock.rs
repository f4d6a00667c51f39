//! Mock provider: deterministic responses for running without a model server.

use crate::llm::{non_empty, BackendError, CompletionBackend, CompletionParams};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Replays scripted results in order, then repeats the fallback reply.
#[derive(Debug)]
pub struct MockProvider {
    model: String,
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn scripted(results: impl IntoIterator<Item = Result<String, BackendError>>) -> Self {
        let mock = Self::new("scripted");
        if let Ok(mut script) = mock.script.lock() {
            script.extend(results);
        }
        mock
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, result: Result<String, BackendError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt seen so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl CompletionBackend for MockProvider {
    fn name(&self) -> String {
        format!("mock:{}", self.model)
    }

    async fn complete(
        &self,
        _system: Option<&str>,
        prompt: &str,
        _params: &CompletionParams,
    ) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result.and_then(non_empty),
            None => Ok(format!("(Mock {} Response) I received your prompt.", self.model)),
        }
    }

    /// Streams the scripted reply one word at a time.
    async fn complete_stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
        tokens: mpsc::Sender<String>,
    ) -> Result<String, BackendError> {
        let text = self.complete(system, prompt, params).await?;
        for word in text.split_inclusive(' ') {
            let _ = tokens.send(word.to_string()).await;
        }
        Ok(text)
    }
}
