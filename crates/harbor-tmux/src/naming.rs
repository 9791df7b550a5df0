//! Session names and the metadata tags stored on each session.

use std::collections::BTreeMap;

/// Prefix shared by every session this program creates.
pub const SESSION_PREFIX: &str = "harbor";

pub const TAG_WORKSPACE: &str = "@harbor_workspace";
pub const TAG_TAB: &str = "@harbor_tab";
pub const TAG_TYPE: &str = "@harbor_type";
pub const TAG_CREATED: &str = "@harbor_created";
pub const TAG_INSTANCE: &str = "@harbor_instance";

/// Session type recorded for interactive terminal tabs.
pub const TYPE_TERMINAL: &str = "terminal";

/// Derive the session name for a tab.
///
/// The same workspace id and tab id always produce the same name, so a
/// session started by an earlier run of the program can be found again.
/// Characters tmux treats specially in targets (`.` and `:`) and anything
/// outside `[A-Za-z0-9_-]` are replaced with `_`.
pub fn session_name(workspace_id: &str, tab_id: &str) -> String {
    format!(
        "{SESSION_PREFIX}-{}-{}",
        sanitize(workspace_id),
        sanitize(tab_id)
    )
}

fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Metadata written onto a session when it is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTags {
    pub workspace_id: String,
    pub tab_id: String,
    pub kind: String,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    /// Identifies the program instance that created the session.
    pub instance_id: String,
}

impl SessionTags {
    pub fn pairs(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (TAG_WORKSPACE, self.workspace_id.clone()),
            (TAG_TAB, self.tab_id.clone()),
            (TAG_TYPE, self.kind.clone()),
            (TAG_CREATED, self.created_at.to_string()),
            (TAG_INSTANCE, self.instance_id.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_name_is_deterministic() {
        assert_eq!(session_name("ws1", "tab1"), session_name("ws1", "tab1"));
        assert_ne!(session_name("ws1", "tab1"), session_name("ws1", "tab2"));
    }

    #[test]
    fn test_session_name_sanitizes_targets() {
        assert_eq!(session_name("my.repo:main", "a b"), "harbor-my_repo_main-a_b");
        assert_eq!(session_name("", "t"), "harbor-_-t");
    }

    #[test]
    fn test_tag_pairs_cover_all_fields() {
        let tags = SessionTags {
            workspace_id: "ws".into(),
            tab_id: "t".into(),
            kind: TYPE_TERMINAL.into(),
            created_at: 42,
            instance_id: "i".into(),
        };
        let pairs = tags.pairs();
        assert_eq!(pairs.len(), 5);
        assert_eq!(pairs[TAG_CREATED], "42");
        assert_eq!(pairs[TAG_TYPE], "terminal");
    }
}
