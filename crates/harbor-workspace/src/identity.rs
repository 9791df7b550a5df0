use std::path::{Component, Path, PathBuf};

use crate::git::common_git_dir;

/// Registry key derived from a workspace record as it was stored.
///
/// Two keys can differ while naming the same workspace, e.g. when one
/// record stored a relative root and a later one stored the canonical form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkspaceKey(pub String);

impl WorkspaceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkspaceKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A working-directory context owning zero or more terminal tabs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceRecord {
    /// Stable id used to name external sessions. Never derived from paths.
    pub id: String,
    /// Root directory as stored; may be relative.
    pub root: PathBuf,
    /// Parent repository, for worktrees.
    pub repo: Option<PathBuf>,
}

impl WorkspaceRecord {
    pub fn new(id: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.to_string(),
            root: root.into(),
            repo: None,
        }
    }

    pub fn with_repo(mut self, repo: impl Into<PathBuf>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    /// The registry key for this record.
    pub fn key(&self) -> WorkspaceKey {
        WorkspaceKey(self.root.to_string_lossy().to_string())
    }

    pub fn canonical_root(&self) -> PathBuf {
        canonicalize(&self.root)
    }

    /// Canonical parent repository, following worktree pointers so a
    /// worktree path and its main checkout compare equal.
    pub fn canonical_repo(&self) -> Option<PathBuf> {
        self.repo.as_deref().map(canonical_repo)
    }
}

/// Whether two records describe the same logical workspace.
///
/// Roots must canonicalize to the same path. When both records name a
/// parent repository those must match too; a record without one does not
/// veto the match.
pub fn same_identity(a: &WorkspaceRecord, b: &WorkspaceRecord) -> bool {
    if a.canonical_root() != b.canonical_root() {
        return false;
    }
    match (a.canonical_repo(), b.canonical_repo()) {
        (Some(repo_a), Some(repo_b)) => repo_a == repo_b,
        _ => true,
    }
}

/// Resolve symlinks and make `path` absolute.
///
/// Paths that do not exist (yet) are normalized lexically against the
/// current directory instead.
pub fn canonicalize(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize_lexically(&absolute)
}

fn normalize_lexically(path: &Path) -> PathBuf {
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

fn canonical_repo(repo: &Path) -> PathBuf {
    match common_git_dir(repo) {
        Ok(git_dir) => {
            let git_dir = canonicalize(&git_dir);
            // `<repo>/.git` identifies `<repo>`; a bare directory is its own identity.
            if git_dir.file_name().is_some_and(|name| name == ".git") {
                git_dir.parent().map(Path::to_path_buf).unwrap_or(git_dir)
            } else {
                git_dir
            }
        }
        Err(_) => canonicalize(repo),
    }
}
