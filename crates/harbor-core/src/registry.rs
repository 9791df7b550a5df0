//! Tabs grouped by workspace.

use std::collections::{HashMap, HashSet};

use harbor_workspace::{WorkspaceKey, WorkspaceRecord};

use crate::state::{TabId, TerminalTab};

/// The tabs of one workspace, in display order.
pub struct WorkspaceTabs {
    pub record: WorkspaceRecord,
    pub tabs: Vec<TerminalTab>,
    /// Index of the active tab. Meaningless while `tabs` is empty.
    pub active: usize,
}

impl WorkspaceTabs {
    pub fn new(record: WorkspaceRecord) -> Self {
        Self {
            record,
            tabs: Vec::new(),
            active: 0,
        }
    }

    pub fn tab(&self, id: &TabId) -> Option<&TerminalTab> {
        self.tabs.iter().find(|tab| &tab.id == id)
    }

    pub fn position(&self, id: &TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| &tab.id == id)
    }

    pub fn active_tab(&self) -> Option<&TerminalTab> {
        self.tabs.get(self.active)
    }

    /// Keep `active` inside the list.
    pub fn clamp_active(&mut self) {
        self.active = self.active.min(self.tabs.len().saturating_sub(1));
    }
}

/// Every workspace's tabs, plus the bookkeeping around creating them.
#[derive(Default)]
pub struct SessionRegistry {
    workspaces: HashMap<WorkspaceKey, WorkspaceTabs>,
    /// Workspaces with a tab creation in flight.
    pending_create: HashSet<WorkspaceKey>,
    /// Keys retired by a rebind, mapped to their replacement.
    aliases: HashMap<WorkspaceKey, WorkspaceKey>,
    created: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow rebind aliases to the key currently in use.
    pub fn resolve(&self, key: &WorkspaceKey) -> WorkspaceKey {
        let mut current = key;
        // Bounded by the alias count so a cycle cannot spin forever.
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.clone()
    }

    pub fn alias(&mut self, old: WorkspaceKey, new: WorkspaceKey) {
        if old != new {
            self.aliases.remove(&new);
            self.aliases.insert(old, new);
        }
    }

    pub fn get(&self, key: &WorkspaceKey) -> Option<&WorkspaceTabs> {
        self.workspaces.get(&self.resolve(key))
    }

    pub fn get_mut(&mut self, key: &WorkspaceKey) -> Option<&mut WorkspaceTabs> {
        let key = self.resolve(key);
        self.workspaces.get_mut(&key)
    }

    /// The entry for `record`, created empty on first use.
    pub fn ensure(&mut self, record: &WorkspaceRecord) -> &mut WorkspaceTabs {
        let key = self.resolve(&record.key());
        self.workspaces
            .entry(key)
            .or_insert_with(|| WorkspaceTabs::new(record.clone()))
    }

    pub fn insert(&mut self, key: WorkspaceKey, tabs: WorkspaceTabs) {
        self.aliases.remove(&key);
        self.workspaces.insert(key, tabs);
    }

    pub fn remove(&mut self, key: &WorkspaceKey) -> Option<WorkspaceTabs> {
        let key = self.resolve(key);
        self.pending_create.remove(&key);
        self.aliases.retain(|_, target| *target != key);
        self.workspaces.remove(&key)
    }

    /// Detach an entry without touching aliases or creation claims.
    pub fn take(&mut self, key: &WorkspaceKey) -> Option<WorkspaceTabs> {
        self.workspaces.remove(key)
    }

    pub fn keys(&self) -> Vec<WorkspaceKey> {
        self.workspaces.keys().cloned().collect()
    }

    pub fn tab(&self, key: &WorkspaceKey, id: &TabId) -> Option<&TerminalTab> {
        self.get(key).and_then(|ws| ws.tab(id))
    }

    /// Every tab across all workspaces, with its workspace key.
    pub fn all_tabs(&self) -> impl Iterator<Item = (&WorkspaceKey, &TerminalTab)> {
        self.workspaces
            .iter()
            .flat_map(|(key, ws)| ws.tabs.iter().map(move |tab| (key, tab)))
    }

    /// Claim the right to create a tab in `key`.
    ///
    /// Returns `false` while another creation for the same workspace is in
    /// flight, so repeated focus events cannot start duplicate shells.
    pub fn begin_create(&mut self, key: &WorkspaceKey) -> bool {
        let key = self.resolve(key);
        self.pending_create.insert(key)
    }

    pub fn finish_create(&mut self, key: &WorkspaceKey) {
        let key = self.resolve(key);
        self.pending_create.remove(&key);
    }

    pub fn is_creating(&self, key: &WorkspaceKey) -> bool {
        self.pending_create.contains(&self.resolve(key))
    }

    /// Move a pending creation claim from `old` to `new`.
    pub fn move_pending(&mut self, old: &WorkspaceKey, new: &WorkspaceKey) {
        if self.pending_create.remove(old) {
            self.pending_create.insert(new.clone());
        }
    }

    /// Add a tab at the end of the workspace and make it active.
    pub fn add_tab(&mut self, key: &WorkspaceKey, tab: TerminalTab) -> bool {
        let Some(ws) = self.get_mut(key) else {
            return false;
        };
        ws.tabs.push(tab);
        ws.active = ws.tabs.len() - 1;
        true
    }

    /// Remove a tab, keeping the active index on a sensible neighbour.
    pub fn remove_tab(&mut self, key: &WorkspaceKey, id: &TabId) -> Option<TerminalTab> {
        let ws = self.get_mut(key)?;
        let index = ws.position(id)?;
        let tab = ws.tabs.remove(index);
        if index < ws.active {
            ws.active -= 1;
        }
        ws.clamp_active();
        Some(tab)
    }

    pub fn set_active(&mut self, key: &WorkspaceKey, id: &TabId) -> bool {
        let Some(ws) = self.get_mut(key) else {
            return false;
        };
        match ws.position(id) {
            Some(index) => {
                ws.active = index;
                true
            }
            None => false,
        }
    }

    /// Default display name for the next tab.
    pub fn next_tab_name(&mut self) -> String {
        self.created += 1;
        format!("Terminal {}", self.created)
    }
}
