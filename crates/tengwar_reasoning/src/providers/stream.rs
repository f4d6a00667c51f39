//! Buffering for streamed HTTP bodies.
//!
//! Ollama streams newline-delimited JSON and Anthropic streams SSE event
//! blocks; both arrive in arbitrary byte chunks.

use crate::llm::BackendError;
use futures_util::{Stream, StreamExt};

pub(crate) struct ChunkBuffer {
    buffer: String,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Append raw bytes (lossy UTF-8).
    pub fn push_bytes(&mut self, chunk: &bytes::Bytes) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Complete newline-terminated lines, trimmed. Blank lines are skipped.
    pub fn extract_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Complete `\n\n`-delimited event blocks.
    pub fn extract_event_blocks(&mut self) -> Vec<String> {
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut blocks = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            blocks.push(self.buffer[..pos].to_string());
            self.buffer.drain(..pos + 2);
        }
        blocks
    }

    /// Whatever is left once the body ends.
    pub fn take_residue(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Next body chunk, with transport errors mapped.
pub(crate) async fn next_chunk<S>(body: &mut S) -> Option<Result<bytes::Bytes, BackendError>>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    body.next().await.map(|r| r.map_err(BackendError::from))
}

/// The `event:` name and `data:` payload of one SSE block.
pub(crate) fn parse_event_block(block: &str) -> (String, String) {
    let mut event = String::new();
    let mut data = String::new();
    for line in block.lines() {
        if let Some(t) = line.strip_prefix("event:") {
            event = t.trim().to_string();
        } else if let Some(d) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(d.strip_prefix(' ').unwrap_or(d));
        }
    }
    (event, data)
}
