use std::fs;
use std::path::{Path, PathBuf};

/// Resolve the actual git directory from a repo path.
/// Handles both normal repos (where `.git` is a directory) and worktrees
/// (where `.git` is a file containing `gitdir: /path/to/real/git/dir`).
pub fn resolve_git_dir(repo_path: &Path) -> Result<PathBuf, String> {
    let dot_git = repo_path.join(".git");

    if !dot_git.exists() {
        return Err(format!(
            "not a git repository: {} does not exist",
            dot_git.display()
        ));
    }

    if dot_git.is_dir() {
        return Ok(dot_git);
    }

    // .git is a file -- this is a worktree. Read the gitdir pointer.
    let content =
        fs::read_to_string(&dot_git).map_err(|e| format!("failed to read .git file: {e}"))?;

    let gitdir_path = content
        .strip_prefix("gitdir: ")
        .ok_or_else(|| format!("unexpected .git file format: {content}"))?
        .trim();

    let resolved = if Path::new(gitdir_path).is_absolute() {
        PathBuf::from(gitdir_path)
    } else {
        repo_path.join(gitdir_path)
    };

    if !resolved.exists() {
        return Err(format!(
            "git directory does not exist: {}",
            resolved.display()
        ));
    }

    Ok(resolved)
}

/// The git directory shared by all worktrees of the repository at `repo_path`.
///
/// For a main checkout this is its `.git` directory. For a linked worktree
/// the per-worktree git dir carries a `commondir` file pointing back to it.
pub fn common_git_dir(repo_path: &Path) -> Result<PathBuf, String> {
    let git_dir = resolve_git_dir(repo_path)?;
    let commondir = git_dir.join("commondir");
    if !commondir.is_file() {
        return Ok(git_dir);
    }

    let content =
        fs::read_to_string(&commondir).map_err(|e| format!("failed to read commondir: {e}"))?;
    let pointer = content.trim();
    let resolved = if Path::new(pointer).is_absolute() {
        PathBuf::from(pointer)
    } else {
        git_dir.join(pointer)
    };
    Ok(resolved)
}
