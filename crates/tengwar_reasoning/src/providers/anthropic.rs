use super::stream::{next_chunk, parse_event_block, ChunkBuffer};
use crate::api_types::{Message, MessagesRequest, MessagesResponse, Role};
use crate::llm::{non_empty, BackendError, CompletionBackend, CompletionParams};
use crate::retry::{with_retry, RetryConfig};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    retry: RetryConfig,
}

impl AnthropicClient {
    pub fn new(
        model: &str,
        api_key: Option<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn post_messages(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(BackendError::Api("no Anthropic API key configured".to_string()));
        };
        let url = format!("{}/v1/messages", self.base_url);

        let request_body = MessagesRequest {
            model: self.model.clone(),
            system: system.map(str::to_string),
            messages: vec![Message {
                role: Role::User,
                content: prompt.to_string(),
            }],
            max_tokens: params.max_tokens,
            temperature: Some(params.temperature),
            stream,
        };

        tracing::debug!(
            "LLM params: max_tokens={}, temperature={:.2}, stream={}",
            params.max_tokens,
            params.temperature,
            stream
        );

        let client = &self.client;
        with_retry(&self.retry, "Anthropic", || {
            client
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&request_body)
                .send()
        })
        .await
    }
}

/// Apply one SSE event; `Ok(true)` once the message is complete.
///
/// Only `text_delta` content is forwarded; `ping`, `message_start` and the
/// block bookkeeping events are ignored.
async fn apply_event(
    block: &str,
    full: &mut String,
    tokens: &mpsc::Sender<String>,
) -> Result<bool, BackendError> {
    let (event, data) = parse_event_block(block);
    match event.as_str() {
        "content_block_delta" => {
            let v: serde_json::Value =
                serde_json::from_str(&data).map_err(|e| BackendError::Malformed(e.to_string()))?;
            let delta = &v["delta"];
            if delta["type"] == "text_delta" {
                if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                    full.push_str(text);
                    let _ = tokens.send(text.to_string()).await;
                }
            }
            Ok(false)
        }
        "message_stop" => Ok(true),
        "error" => Err(BackendError::Api(format!("Anthropic stream error: {}", data))),
        _ => Ok(false),
    }
}

#[async_trait::async_trait]
impl CompletionBackend for AnthropicClient {
    fn name(&self) -> String {
        format!("anthropic:{}", self.model)
    }

    #[tracing::instrument(skip(self, system, prompt, params), fields(model = %self.model))]
    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, BackendError> {
        let response = self.post_messages(system, prompt, params, false).await?;

        let resp_text = response.text().await?;
        tracing::debug!(
            "Anthropic raw response (first 2000 chars): {}",
            resp_text.chars().take(2000).collect::<String>()
        );
        let api_response: MessagesResponse = serde_json::from_str(&resp_text)
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        non_empty(api_response.text())
    }

    #[tracing::instrument(skip(self, system, prompt, params, tokens), fields(model = %self.model))]
    async fn complete_stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
        tokens: mpsc::Sender<String>,
    ) -> Result<String, BackendError> {
        let response = self.post_messages(system, prompt, params, true).await?;
        let mut body = response.bytes_stream();
        let mut buffer = ChunkBuffer::new();
        let mut full = String::new();

        'read: while let Some(chunk) = next_chunk(&mut body).await {
            buffer.push_bytes(&chunk?);
            for block in buffer.extract_event_blocks() {
                if apply_event(&block, &mut full, &tokens).await? {
                    break 'read;
                }
            }
        }
        non_empty(full)
    }

    async fn health(&self) -> bool {
        self.has_api_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let client = AnthropicClient::new(
            "claude-haiku-4-5-20251001",
            Some("   ".to_string()),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!client.has_api_key());
        assert!(!client.health().await);
        let err = client
            .complete(None, "hello", &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api(_)));
    }

    #[test]
    fn test_request_shape() {
        let req = MessagesRequest {
            model: "m".into(),
            system: Some("sys".into()),
            messages: vec![Message {
                role: Role::User,
                content: "hi".into(),
            }],
            max_tokens: 2048,
            temperature: Some(0.7),
            stream: false,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("stream").is_none());
        assert_eq!(v["system"], "sys");
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_response_text_skips_non_text_blocks() {
        let body = json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Hello "},
                {"type": "text", "text": "there"}
            ],
            "stop_reason": "end_turn"
        });
        let resp: MessagesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.text(), "Hello there");
    }

    #[tokio::test]
    async fn test_apply_event_forwards_text_deltas_only() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut full = String::new();
        let delta = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}";
        assert!(!apply_event(delta, &mut full, &tx).await.unwrap());
        let thinking = "event: content_block_delta\ndata: {\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hm\"}}";
        assert!(!apply_event(thinking, &mut full, &tx).await.unwrap());
        assert!(!apply_event("event: ping\ndata: {}", &mut full, &tx).await.unwrap());
        assert!(apply_event("event: message_stop\ndata: {}", &mut full, &tx).await.unwrap());
        assert_eq!(full, "Hi");
        assert_eq!(rx.recv().await.unwrap(), "Hi");
        assert!(rx.try_recv().is_err());

        let err = apply_event("event: error\ndata: {\"type\":\"overloaded_error\"}", &mut full, &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api(_)));
    }
}
