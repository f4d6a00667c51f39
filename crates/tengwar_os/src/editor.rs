use crate::error::EditorError;
use crate::interpreter::{Interpreter, ProcessInterpreter};
use crate::vcs::{GitCli, VersionControl};
use crate::Capabilities;
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tengwar_core::config::{EditorConfig, VcsRoot};
use tengwar_core::PathGuard;

/// Directory entries never shown by `list`.
const HIDDEN: &[&str] = &["__pycache__", "node_modules", "target"];

/// Quoted string literals inside embedded code.
static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap());

/// File and VCS access for the agent, confined to two directory roots.
pub struct SelfEditor {
    guard: PathGuard,
    vcs: Arc<dyn VersionControl>,
    interpreter: Arc<dyn Interpreter>,
    /// Working directory for executed code.
    exec_root: PathBuf,
}

impl SelfEditor {
    pub fn new(
        guard: PathGuard,
        vcs: Arc<dyn VersionControl>,
        interpreter: Arc<dyn Interpreter>,
    ) -> Self {
        let exec_root = guard.roots()[1].clone();
        Self {
            guard,
            vcs,
            interpreter,
            exec_root,
        }
    }

    /// Wire up `git` and the configured interpreter binary.
    pub fn from_config(config: &EditorConfig) -> Self {
        let guard = PathGuard::new(&config.self_root, &config.language_root);
        let repo = match config.vcs_root {
            VcsRoot::SelfRoot => guard.roots()[0].clone(),
            VcsRoot::LanguageRoot => guard.roots()[1].clone(),
        };
        let vcs = GitCli::new(repo)
            .with_prefix(config.commit_prefix.clone())
            .with_timeouts(
                Duration::from_secs(config.git_timeout_secs),
                Duration::from_secs(config.push_timeout_secs),
            );
        let interp = &config.interpreter;
        let interpreter = ProcessInterpreter::new(interp.program.clone(), interp.args.clone())
            .with_limits(Duration::from_secs(interp.timeout_secs), interp.max_output_bytes);
        Self::new(guard, Arc::new(vcs), Arc::new(interpreter))
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    /// Reject code whose path-like string literals point outside the roots.
    fn screen_code(&self, code: &str) -> Result<(), EditorError> {
        for cap in STRING_LITERAL.captures_iter(code) {
            let literal = &cap[1];
            let looks_like_path =
                literal.starts_with('/') || literal.starts_with('~') || literal.contains("..");
            if looks_like_path {
                self.guard.check_from(&self.exec_root, literal)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Capabilities for SelfEditor {
    async fn read(&self, path: &str) -> Result<String, EditorError> {
        let resolved = self.guard.check(path)?;
        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| EditorError::io(&resolved, e))?;
        tracing::debug!("Read {} ({} bytes)", resolved.display(), content.len());
        Ok(content)
    }

    async fn write(&self, path: &str, content: &str) -> Result<PathBuf, EditorError> {
        let resolved = self.guard.check(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EditorError::io(parent, e))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| EditorError::io(&resolved, e))?;
        tracing::info!("Wrote {} bytes to {}", content.len(), resolved.display());
        Ok(resolved)
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, EditorError> {
        let resolved = self.guard.check(path)?;
        let mut dir = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| EditorError::io(&resolved, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| EditorError::io(&resolved, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || HIDDEN.contains(&name.as_str()) {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{}/", name) } else { name });
        }
        entries.sort();
        Ok(entries)
    }

    async fn status(&self) -> Result<String, EditorError> {
        self.vcs.status().await
    }

    async fn commit(&self, message: &str) -> Result<String, EditorError> {
        self.vcs.commit(message).await
    }

    async fn push(&self) -> Result<String, EditorError> {
        self.vcs.push().await
    }

    async fn execute(&self, code: &str) -> Result<String, EditorError> {
        self.screen_code(code)?;
        self.interpreter.run(code, &self.exec_root).await
    }
}
