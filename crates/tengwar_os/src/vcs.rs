use crate::error::EditorError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Commit/push primitives over the version-controlled root.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Short status of the working tree; "(clean)" when nothing changed.
    async fn status(&self) -> Result<String, EditorError>;

    /// Stage everything and commit. Returns the commit summary line.
    async fn commit(&self, message: &str) -> Result<String, EditorError>;

    /// Push committed changes to the configured remote.
    async fn push(&self) -> Result<String, EditorError>;
}

/// `git` binary driven as a subprocess.
pub struct GitCli {
    repo: PathBuf,
    prefix: String,
    timeout: Duration,
    push_timeout: Duration,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            prefix: String::new(),
            timeout: Duration::from_secs(10),
            push_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_timeouts(mut self, timeout: Duration, push_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.push_timeout = push_timeout;
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn git(&self, args: &[&str], timeout: Duration) -> Result<Output, EditorError> {
        let child = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            // Never block on an interactive credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EditorError::Vcs(format!("Failed to spawn git: {e}")))?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(EditorError::Vcs(format!("git execution error: {e}"))),
            Err(_) => Err(EditorError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn status(&self) -> Result<String, EditorError> {
        let output = self.git(&["status", "--short"], self.timeout).await?;
        if !output.status.success() {
            return Err(EditorError::Vcs(lossy(&output.stderr)));
        }
        let stdout = lossy(&output.stdout);
        if stdout.trim().is_empty() {
            Ok("(clean)".to_string())
        } else {
            Ok(stdout)
        }
    }

    async fn commit(&self, message: &str) -> Result<String, EditorError> {
        let add = self.git(&["add", "-A"], self.timeout).await?;
        if !add.status.success() {
            return Err(EditorError::Vcs(lossy(&add.stderr)));
        }

        let staged = self
            .git(&["diff", "--cached", "--quiet"], self.timeout)
            .await?;
        // exit 0: no staged changes, exit 1: changes present
        if staged.status.success() {
            return Err(EditorError::NothingToCommit);
        }

        let full = format!("{}{}", self.prefix, message.trim());
        let output = self.git(&["commit", "-m", &full], self.timeout).await?;
        let stdout = lossy(&output.stdout);
        if !output.status.success() {
            if stdout.contains("nothing to commit") {
                return Err(EditorError::NothingToCommit);
            }
            return Err(EditorError::Vcs(first_nonempty(&lossy(&output.stderr), &stdout)));
        }
        tracing::info!("Committed in {}: {}", self.repo.display(), full);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }

    async fn push(&self) -> Result<String, EditorError> {
        let output = match self.git(&["push"], self.push_timeout).await {
            Err(EditorError::Timeout(d)) => {
                return Err(EditorError::Network(format!("push timed out after {:?}", d)))
            }
            other => other?,
        };
        let stderr = lossy(&output.stderr);
        if output.status.success() {
            // git reports push progress on stderr
            return Ok(first_nonempty(&stderr, "Pushed"));
        }
        Err(classify_push_failure(&stderr))
    }
}

/// Sort a failed push into auth, network or generic VCS trouble.
pub fn classify_push_failure(stderr: &str) -> EditorError {
    let lower = stderr.to_lowercase();
    const AUTH: &[&str] = &[
        "authentication failed",
        "permission denied",
        "could not read username",
        "invalid username or password",
        "the requested url returned error: 403",
        "access denied",
    ];
    const NETWORK: &[&str] = &[
        "could not resolve host",
        "unable to access",
        "connection refused",
        "connection timed out",
        "network is unreachable",
        "operation timed out",
        "could not read from remote repository",
    ];
    let detail = stderr.trim().to_string();
    if AUTH.iter().any(|p| lower.contains(p)) {
        EditorError::Auth(detail)
    } else if NETWORK.iter().any(|p| lower.contains(p)) {
        EditorError::Network(detail)
    } else {
        EditorError::Vcs(detail)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

fn first_nonempty(a: &str, b: &str) -> String {
    if a.trim().is_empty() {
        b.trim().to_string()
    } else {
        a.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth() {
        let e = classify_push_failure(
            "remote: Invalid username or password.\nfatal: Authentication failed for 'https://x'",
        );
        assert!(matches!(e, EditorError::Auth(_)));
        let e = classify_push_failure("git@github.com: Permission denied (publickey).\nfatal: Could not read from remote repository.");
        assert!(matches!(e, EditorError::Auth(_)));
    }

    #[test]
    fn test_classify_network() {
        let e = classify_push_failure(
            "fatal: unable to access 'https://github.com/x/y/': Could not resolve host: github.com",
        );
        assert!(matches!(e, EditorError::Network(_)));
    }

    #[test]
    fn test_classify_other() {
        let e = classify_push_failure("error: failed to push some refs (non-fast-forward)");
        assert!(matches!(e, EditorError::Vcs(_)));
    }

    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "tengwar@example.invalid"],
            vec!["config", "user.name", "Tengwar"],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(dir)
                .status()
                .await
                .unwrap();
            assert!(status.success());
        }
    }

    #[tokio::test]
    async fn test_commit_then_nothing_to_commit() {
        if !git_available().await {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path()).await;
        let git = GitCli::new(dir.path()).with_prefix("[Tengwar AI] ");

        std::fs::write(dir.path().join("a.tw"), "(+ 1 2)").unwrap();
        assert!(git.status().await.unwrap().contains("a.tw"));
        let summary = git.commit("add a").await.unwrap();
        assert!(summary.contains("[Tengwar AI] add a"));
        assert_eq!(git.status().await.unwrap(), "(clean)");

        let err = git.commit("again").await.unwrap_err();
        assert!(matches!(err, EditorError::NothingToCommit));
    }

    #[tokio::test]
    async fn test_push_without_remote_is_an_error() {
        if !git_available().await {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path()).await;
        let git = GitCli::new(dir.path());
        assert!(git.push().await.is_err());
    }
}
