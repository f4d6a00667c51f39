use std::fmt;
use std::path::{Component, Path, PathBuf};

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PathDenied {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for PathDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Access denied for '{}': {}", self.path.display(), self.reason)
    }
}

impl std::error::Error for PathDenied {}

// ============================================================================
// PathGuard
// ============================================================================

/// Allow-list over exactly two directory roots: the agent's own source tree
/// and the embedded-language tree.
///
/// Every check resolves the candidate before comparing, so `..` segments and
/// symlinks cannot walk out of a root. Checks never touch the filesystem
/// beyond `canonicalize` on ancestors that already exist.
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: [PathBuf; 2],
    home: Option<PathBuf>,
}

impl PathGuard {
    pub fn new(self_root: impl AsRef<Path>, language_root: impl AsRef<Path>) -> Self {
        Self {
            roots: [
                resolve_best_effort(&normalize(self_root.as_ref())),
                resolve_best_effort(&normalize(language_root.as_ref())),
            ],
            home: dirs::home_dir(),
        }
    }

    /// The root relative paths resolve against.
    pub fn primary_root(&self) -> &Path {
        &self.roots[0]
    }

    pub fn roots(&self) -> &[PathBuf; 2] {
        &self.roots
    }

    /// Expand `~`, anchor relative paths at the primary root, and strip `.`/`..`.
    pub fn expand(&self, raw: &str) -> PathBuf {
        self.expand_from(&self.roots[0], raw)
    }

    /// Like [`expand`](Self::expand), but relative paths anchor at `base`.
    pub fn expand_from(&self, base: &Path, raw: &str) -> PathBuf {
        let raw = raw.trim();
        let expanded = match (raw.strip_prefix('~'), &self.home) {
            (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
                home.join(rest.trim_start_matches('/'))
            }
            _ => PathBuf::from(raw),
        };
        let anchored = if expanded.is_absolute() {
            expanded
        } else {
            base.join(expanded)
        };
        normalize(&anchored)
    }

    /// Resolve `raw` and confirm it lies inside one of the roots.
    pub fn check(&self, raw: &str) -> Result<PathBuf, PathDenied> {
        self.check_from(&self.roots[0], raw)
    }

    /// Check a path as a process running in `base` would resolve it.
    pub fn check_from(&self, base: &Path, raw: &str) -> Result<PathBuf, PathDenied> {
        if raw.trim().is_empty() {
            return Err(PathDenied {
                path: PathBuf::new(),
                reason: "empty path".to_string(),
            });
        }
        if raw.contains('\0') {
            return Err(PathDenied {
                path: PathBuf::from(raw.replace('\0', "")),
                reason: "path contains a NUL byte".to_string(),
            });
        }
        let candidate = self.expand_from(base, raw);
        let resolved = resolve_best_effort(&candidate);
        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            Err(PathDenied {
                path: candidate,
                reason: format!(
                    "outside allowed roots ({}, {})",
                    self.roots[0].display(),
                    self.roots[1].display()
                ),
            })
        }
    }

    /// Which root contains an already-checked path.
    pub fn root_of(&self, resolved: &Path) -> Option<&Path> {
        self.roots
            .iter()
            .find(|root| resolved.starts_with(root))
            .map(|p| p.as_path())
    }
}

/// Lexically remove `.` and `..` components. `..` never climbs above the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-append the rest, so
/// symlinks in the existing prefix are followed even for paths not yet created.
fn resolve_best_effort(path: &Path) -> PathBuf {
    if let Ok(p) = std::fs::canonicalize(path) {
        return p;
    }
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    while let Some(name) = existing.file_name().map(|n| n.to_os_string()) {
        existing.pop();
        tail.push(name);
        if let Ok(base) = std::fs::canonicalize(&existing) {
            let mut out = base;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
    }
    path.to_path_buf()
}

// ============================================================================
// Tests
// ============================================================================
