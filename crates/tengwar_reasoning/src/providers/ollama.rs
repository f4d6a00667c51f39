//! Ollama LLM Provider
//!
//! Talks to the native `/api/generate` endpoint. A plain completion is a single
//! JSON object; a streamed one is newline-delimited JSON chunks.

use super::stream::{next_chunk, ChunkBuffer};
use crate::api_types::{
    GenerateChunk, GenerateOptions, GenerateRequest, GenerateResponse, TagsResponse,
};
use crate::llm::{non_empty, BackendError, CompletionBackend, CompletionParams};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(model: &str, base_url: Option<&str>, timeout: Duration) -> Result<Self, BackendError> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            // accept the OpenAI-compatible URL form too
            .trim_end_matches("/v1")
            .to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
        })
    }

    /// Names of locally pulled models; empty when Ollama is unreachable.
    pub async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            _ => return Vec::new(),
        };
        resp.json::<TagsResponse>()
            .await
            .map(|t| t.models.into_iter().map(|m| m.name).collect())
            .unwrap_or_default()
    }

    async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(format!("Ollama error {}: {}", status, err_text)));
        }
        Ok(response)
    }
}

/// Apply one NDJSON line; `Ok(true)` once the model reports it is done.
async fn apply_chunk(
    line: &str,
    full: &mut String,
    tokens: &mpsc::Sender<String>,
) -> Result<bool, BackendError> {
    let chunk: GenerateChunk =
        serde_json::from_str(line).map_err(|e| BackendError::Malformed(e.to_string()))?;
    if let Some(error) = chunk.error {
        return Err(BackendError::Api(format!("Ollama error: {}", error)));
    }
    if !chunk.response.is_empty() {
        full.push_str(&chunk.response);
        let _ = tokens.send(chunk.response).await;
    }
    Ok(chunk.done)
}

#[async_trait::async_trait]
impl CompletionBackend for OllamaClient {
    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    #[tracing::instrument(skip(self, system, prompt, params), fields(model = %self.model))]
    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, BackendError> {
        let response = self.generate(system, prompt, params, false).await?;
        let body = response.text().await?;
        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::Malformed(e.to_string()))?;
        non_empty(parsed.response)
    }

    #[tracing::instrument(skip(self, system, prompt, params, tokens), fields(model = %self.model))]
    async fn complete_stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &CompletionParams,
        tokens: mpsc::Sender<String>,
    ) -> Result<String, BackendError> {
        let response = self.generate(system, prompt, params, true).await?;
        let mut body = response.bytes_stream();
        let mut buffer = ChunkBuffer::new();
        let mut full = String::new();
        let mut done = false;

        'read: while let Some(chunk) = next_chunk(&mut body).await {
            buffer.push_bytes(&chunk?);
            for line in buffer.extract_lines() {
                if apply_chunk(&line, &mut full, &tokens).await? {
                    done = true;
                    break 'read;
                }
            }
        }
        // A final line without a trailing newline.
        let residue = buffer.take_residue();
        if !done && !residue.trim().is_empty() {
            apply_chunk(residue.trim(), &mut full, &tokens).await?;
        }
        non_empty(full)
    }

    async fn health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.client
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new("qwen2.5:3b", None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.model, "qwen2.5:3b");
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.name(), "ollama:qwen2.5:3b");
    }

    #[test]
    fn test_base_url_normalization() {
        let client =
            OllamaClient::new("m", Some("http://box:11434/v1/"), Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "http://box:11434");
    }

    #[test]
    fn test_generate_payload_shape() {
        let payload = GenerateRequest {
            model: "qwen2.5:3b",
            prompt: "think",
            system: None,
            stream: false,
            options: GenerateOptions {
                temperature: 0.85,
                num_predict: 200,
            },
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["model"], "qwen2.5:3b");
        assert_eq!(v["stream"], false);
        assert_eq!(v["options"]["num_predict"], 200);
        assert!(v.get("system").is_none());
    }

    #[test]
    fn test_parse_generate_response() {
        let body = json!({"model": "m", "response": "  A thought.  ", "done": true});
        let parsed: GenerateResponse = serde_json::from_value(body).unwrap();
        assert_eq!(non_empty(parsed.response).unwrap(), "A thought.");

        let parsed: GenerateResponse = serde_json::from_value(json!({"done": true})).unwrap();
        assert!(matches!(non_empty(parsed.response), Err(BackendError::Empty)));
    }

    #[tokio::test]
    async fn test_unreachable_is_unhealthy() {
        let client =
            OllamaClient::new("m", Some("http://127.0.0.1:9"), Duration::from_secs(2)).unwrap();
        assert!(!client.health().await);
        assert!(client.list_models().await.is_empty());
        let err = client
            .complete(None, "hi", &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Connection(_) | BackendError::Timeout(_)
        ));
    }
}
