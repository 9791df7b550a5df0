//! Messages into the engine, commands out of it, and events for the UI.
//!
//! The engine never blocks. Everything it wants done later or elsewhere is
//! returned as a [`Command`], and everything that happens elsewhere comes
//! back as a [`Msg`].

use std::time::Duration;

use harbor_workspace::{WorkspaceKey, WorkspaceRecord};
use serde::Serialize;

use crate::lifecycle::{Attached, CreateRequest, LifecycleError};
use crate::state::TabId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseKind {
    Press,
    Drag,
    Release,
}

/// Inbound messages, delivered one at a time to [`crate::engine::Engine::handle`].
#[derive(Debug)]
pub enum Msg {
    // Background workers.
    /// Merged reader output for a tab.
    Output {
        workspace: WorkspaceKey,
        tab: TabId,
        data: Vec<u8>,
    },
    /// The reader started under `epoch` ended on its own.
    ReaderStopped {
        workspace: WorkspaceKey,
        tab: TabId,
        epoch: u64,
        error: Option<String>,
    },
    CreationFinished {
        workspace: WorkspaceKey,
        tab: TabId,
        /// The job was a restart, which holds no creation claim.
        restart: bool,
        result: Result<Attached, LifecycleError>,
    },
    ReattachFinished {
        workspace: WorkspaceKey,
        tab: TabId,
        result: Result<Attached, LifecycleError>,
    },

    // Self-scheduled wake-ups.
    FlushDue {
        workspace: WorkspaceKey,
        tab: TabId,
    },
    RestartDue {
        workspace: WorkspaceKey,
        tab: TabId,
        epoch: u64,
    },
    SelectionTick {
        workspace: WorkspaceKey,
        tab: TabId,
        generation: u64,
    },
    WatchdogTick,

    // UI requests.
    CreateTab {
        record: WorkspaceRecord,
        name: Option<String>,
    },
    /// A workspace was shown; creates its first tab if it has none.
    Focus {
        record: WorkspaceRecord,
    },
    SelectTab {
        workspace: WorkspaceKey,
        tab: TabId,
    },
    Input {
        workspace: WorkspaceKey,
        tab: TabId,
        data: Vec<u8>,
    },
    Resize {
        workspace: WorkspaceKey,
        tab: TabId,
        cols: u16,
        rows: u16,
    },
    Mouse {
        workspace: WorkspaceKey,
        tab: TabId,
        kind: MouseKind,
        x: i32,
        y: i32,
    },
    Detach {
        workspace: WorkspaceKey,
        tab: TabId,
    },
    Reattach {
        workspace: WorkspaceKey,
        tab: TabId,
    },
    Restart {
        workspace: WorkspaceKey,
        tab: TabId,
    },
    CloseTab {
        workspace: WorkspaceKey,
        tab: TabId,
    },
    /// The workspace is gone; tear down all of its tabs.
    WorkspaceDeleted {
        workspace: WorkspaceKey,
    },
    /// A workspace record was stored again, possibly under a different key.
    Rebind {
        old: WorkspaceRecord,
        new: WorkspaceRecord,
    },
    Shutdown,
}

/// Blocking work the runtime runs off the consumer thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Create {
        workspace: WorkspaceKey,
        request: CreateRequest,
        /// Kill any existing session under the same name first.
        restart: bool,
    },
    Reattach {
        workspace: WorkspaceKey,
        tab: TabId,
        session_name: String,
        cols: u16,
        rows: u16,
    },
    /// End a session whose tab is gone.
    Kill { session_name: String },
    /// End every session tagged with the workspace, including ones left
    /// behind by earlier runs that no tab knows about.
    KillWorkspaceSessions { workspace_id: String },
}

/// What the engine asks the runtime to do.
#[derive(Debug)]
pub enum Command {
    /// Deliver `msg` back to the engine after `delay`.
    After { delay: Duration, msg: Msg },
    Job(Job),
    Emit(Event),
    /// Put text on the system clipboard.
    Copy(String),
}

/// Events sent to the UI, serialized as tagged JSON.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Event {
    /// New content was written into the tab's model.
    OutputAvailable {
        workspace: String,
        tab_id: TabId,
        content_version: u64,
    },
    TitleChanged {
        workspace: String,
        tab_id: TabId,
        title: String,
    },
    Bell {
        workspace: String,
        tab_id: TabId,
    },
    TabCreated {
        workspace: String,
        tab_id: TabId,
        name: String,
    },
    CreationSucceeded {
        workspace: String,
        tab_id: TabId,
        session_name: String,
    },
    CreationFailed {
        workspace: String,
        tab_id: TabId,
        error: String,
    },
    ReattachSucceeded {
        workspace: String,
        tab_id: TabId,
    },
    ReattachFailed {
        workspace: String,
        tab_id: TabId,
        error: String,
        /// The session is gone; offer a restart instead of another reattach.
        offer_restart: bool,
    },
    ReaderStopped {
        workspace: String,
        tab_id: TabId,
        error: Option<String>,
    },
    RestartScheduled {
        workspace: String,
        tab_id: TabId,
        attempt: u32,
        delay_ms: u64,
    },
    /// Persistent per-tab indicator: the tab has no live client.
    Disconnected {
        workspace: String,
        tab_id: TabId,
        reason: String,
        user_requested: bool,
    },
    TabClosed {
        workspace: String,
        tab_id: TabId,
    },
    ActiveTabChanged {
        workspace: String,
        tab_id: TabId,
    },
    WorkspaceRemoved {
        workspace: String,
    },
    WorkspaceRebound {
        from: String,
        to: String,
    },
    /// Dismissible message for the user.
    Notification {
        message: String,
    },
}
