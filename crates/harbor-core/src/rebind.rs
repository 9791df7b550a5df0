//! Moving tabs to a workspace's new key when only its derived key changed.
//!
//! A workspace stored as `repo` and later as `/home/me/repo` is the same
//! workspace. Its tabs are merged into the entry under the new key instead
//! of being torn down, and running shells keep their processes.

use harbor_workspace::{same_identity, WorkspaceKey, WorkspaceRecord};

use crate::registry::{SessionRegistry, WorkspaceTabs};
use crate::state::{TabId, TerminalTab};

/// Result of a rebind.
pub struct RebindOutcome {
    pub from: WorkspaceKey,
    pub to: WorkspaceKey,
    /// Migrated tabs whose process is running; their readers must be
    /// restarted so output is addressed to the new key.
    pub running: Vec<TabId>,
    /// Incoming tabs that lost an id collision. The caller closes their
    /// local clients.
    pub dropped: Vec<TerminalTab>,
}

/// Migrate the tabs of `old` to `new` if both describe the same workspace.
///
/// Returns `None` when the identities differ, the keys are equal, or
/// nothing is registered under the old key.
pub fn rebind(
    registry: &mut SessionRegistry,
    old: &WorkspaceRecord,
    new: &WorkspaceRecord,
) -> Option<RebindOutcome> {
    if !same_identity(old, new) {
        return None;
    }
    let from = registry.resolve(&old.key());
    let to = new.key();
    if from == to {
        return None;
    }

    let incoming = registry.take(&from)?;
    let destination = registry
        .take(&to)
        .unwrap_or_else(|| WorkspaceTabs::new(new.clone()));

    let (mut merged, dropped) = merge(destination, incoming);
    merged.record = new.clone();

    let running = merged
        .tabs
        .iter()
        .filter(|tab| tab.state.lock().running)
        .map(|tab| tab.id.clone())
        .collect();

    registry.insert(to.clone(), merged);
    registry.alias(from.clone(), to.clone());
    registry.move_pending(&from, &to);

    log::info!("rebind: moved workspace {from} to {to}");
    Some(RebindOutcome {
        from,
        to,
        running,
        dropped,
    })
}

/// Merge `incoming` into `destination`.
///
/// Tabs already in the destination win on id collision; the rest of the
/// incoming tabs are appended in order. The incoming active tab stays
/// active when it survives, otherwise its old position is clamped.
fn merge(
    mut destination: WorkspaceTabs,
    incoming: WorkspaceTabs,
) -> (WorkspaceTabs, Vec<TerminalTab>) {
    let incoming_active = incoming.active_tab().map(|tab| tab.id.clone());
    let incoming_position = incoming.active;
    let had_incoming = !incoming.tabs.is_empty();

    let mut dropped = Vec::new();
    for tab in incoming.tabs {
        if destination.position(&tab.id).is_some() {
            dropped.push(tab);
        } else {
            destination.tabs.push(tab);
        }
    }

    if had_incoming {
        destination.active = incoming_active
            .and_then(|id| destination.position(&id))
            .unwrap_or(incoming_position);
    }
    destination.clamp_active();
    (destination, dropped)
}
