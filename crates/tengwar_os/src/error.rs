use std::path::PathBuf;
use std::time::Duration;
use tengwar_core::PathDenied;

/// Failure of one self-editor operation. Each is reported inline and never
/// aborts the operations that follow it.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("{0}")]
    AccessDenied(#[from] PathDenied),
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Nothing to commit")]
    NothingToCommit,
    #[error("Version control error: {0}")]
    Vcs(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Execution failed (exit {code:?}): {output}")]
    Execution { code: Option<i32>, output: String },
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl EditorError {
    /// Stable short name, used in logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            EditorError::AccessDenied(_) => "access_denied",
            EditorError::NotFound(_) => "not_found",
            EditorError::Io { .. } => "io",
            EditorError::NothingToCommit => "nothing_to_commit",
            EditorError::Vcs(_) => "vcs",
            EditorError::Network(_) => "network",
            EditorError::Auth(_) => "auth",
            EditorError::Execution { .. } => "execution",
            EditorError::Timeout(_) => "timeout",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            EditorError::NotFound(path)
        } else {
            EditorError::Io { path, source }
        }
    }
}
