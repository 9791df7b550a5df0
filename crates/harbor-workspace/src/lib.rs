pub mod git;
pub mod identity;
pub mod watcher;

pub use git::{common_git_dir, resolve_git_dir};
pub use identity::{canonicalize, same_identity, WorkspaceKey, WorkspaceRecord};
pub use watcher::{watch_root, WorkspaceEvent};
