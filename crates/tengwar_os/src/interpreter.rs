use crate::error::EditorError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs embedded-language code out of process.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn run(&self, code: &str, workdir: &Path) -> Result<String, EditorError>;
}

/// External interpreter binary. Code goes in on stdin; the child gets a
/// cleared environment, a working directory inside an allowed root, and a
/// hard wall-clock budget.
pub struct ProcessInterpreter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    max_output: usize,
}

impl ProcessInterpreter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(10),
            max_output: 16 * 1024,
        }
    }

    pub fn with_limits(mut self, timeout: Duration, max_output: usize) -> Self {
        self.timeout = timeout;
        self.max_output = max_output;
        self
    }
}

#[async_trait]
impl Interpreter for ProcessInterpreter {
    async fn run(&self, code: &str, workdir: &Path) -> Result<String, EditorError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(workdir)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let mut child = command.spawn().map_err(|e| EditorError::Execution {
            code: None,
            output: format!("Failed to start interpreter '{}': {e}", self.program),
        })?;

        let stdin = child.stdin.take();
        let code = code.to_string();
        let run = async move {
            if let Some(mut stdin) = stdin {
                // A child that exits without reading stdin is not an error.
                let _ = stdin.write_all(code.as_bytes()).await;
                drop(stdin);
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(EditorError::Execution {
                    code: None,
                    output: format!("Interpreter I/O error: {e}"),
                })
            }
            Err(_) => {
                tracing::warn!("Interpreter exceeded {:?}; killed", self.timeout);
                return Err(EditorError::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let content = if stderr.trim().is_empty() {
                stdout.trim_end().to_string()
            } else {
                format!("{}\n[stderr]: {}", stdout.trim_end(), stderr.trim_end())
            };
            let content = if content.is_empty() {
                "(no output)".to_string()
            } else {
                content
            };
            Ok(cap(content, self.max_output))
        } else {
            Err(EditorError::Execution {
                code: output.status.code(),
                output: cap(
                    format!("{}{}", stderr.trim_end(), stdout.trim_end()),
                    self.max_output,
                ),
            })
        }
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn cap(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let total = s.len();
    s.truncate(end);
    s.push_str(&format!("\n... (truncated, {} bytes total)", total));
    s
}
