pub mod editor;
pub mod error;
pub mod interpreter;
pub mod vcs;

pub use editor::SelfEditor;
pub use error::EditorError;
pub use interpreter::{Interpreter, ProcessInterpreter};
pub use vcs::{GitCli, VersionControl};

use async_trait::async_trait;
use std::path::PathBuf;

/// Capabilities the dialogue side may invoke on the agent's own files and
/// the embedded language's runtime.
///
/// Implementors:
/// - `SelfEditor`: real filesystem, `git` and interpreter subprocesses
///
/// Every path argument is validated before any I/O happens; a denied path
/// leaves the filesystem untouched.
#[async_trait]
pub trait Capabilities: Send + Sync {
    /// Full text of a file.
    async fn read(&self, path: &str) -> Result<String, EditorError>;

    /// Create or overwrite a file, creating parent directories. Returns the
    /// resolved path that was written.
    async fn write(&self, path: &str, content: &str) -> Result<PathBuf, EditorError>;

    /// Sorted entry names; directories carry a trailing `/`.
    async fn list(&self, path: &str) -> Result<Vec<String>, EditorError>;

    async fn status(&self) -> Result<String, EditorError>;

    async fn commit(&self, message: &str) -> Result<String, EditorError>;

    async fn push(&self) -> Result<String, EditorError>;

    /// Run embedded-language code; returns captured output.
    async fn execute(&self, code: &str) -> Result<String, EditorError>;
}
