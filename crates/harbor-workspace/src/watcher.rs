use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use crate::identity::WorkspaceKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    /// The workspace root no longer exists; its tabs should be torn down.
    Deleted(WorkspaceKey),
}

/// Watch a workspace root and report when it is removed.
///
/// The root's parent directory is watched non-recursively so that removing
/// the root itself (not just its contents) is observed. `Deleted` is sent at
/// most once. Returns a receiver plus the watcher, which must be kept alive.
pub fn watch_root(
    key: WorkspaceKey,
    root: &Path,
) -> Result<(mpsc::Receiver<WorkspaceEvent>, RecommendedWatcher), String> {
    let (tx, rx) = mpsc::channel();

    let root: PathBuf = std::fs::canonicalize(root)
        .map_err(|e| format!("failed to resolve {}: {e}", root.display()))?;
    let parent = root
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| format!("workspace root has no parent: {}", root.display()))?;

    let fired = Arc::new(AtomicBool::new(false));
    let watched_root = root.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            let Ok(event) = res else {
                return;
            };
            if !matches!(event.kind, EventKind::Remove(_) | EventKind::Modify(_)) {
                return;
            }
            let touches_root = event
                .paths
                .iter()
                .any(|path| watched_root.starts_with(path) || path.starts_with(&watched_root));
            if touches_root && !watched_root.exists() && !fired.swap(true, Ordering::SeqCst) {
                let _ = tx.send(WorkspaceEvent::Deleted(key.clone()));
            }
        },
        Config::default(),
    )
    .map_err(|e| format!("failed to create watcher: {e}"))?;

    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .map_err(|e| format!("failed to watch {}: {e}", parent.display()))?;

    Ok((rx, watcher))
}
