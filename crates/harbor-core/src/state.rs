//! Tabs and the lock-guarded state each one carries.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use harbor_pty::{Process, ReaderControl};
use serde::Serialize;

use crate::flush::PendingOutput;
use crate::model::TerminalModel;
use crate::selection::SelectionState;
use crate::supervisor::RestartState;

/// Opaque unique tab identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One shell session within a workspace.
pub struct TerminalTab {
    pub id: TabId,
    pub name: String,
    pub state: TerminalState,
}

impl TerminalTab {
    pub fn new(id: TabId, name: &str, session_name: String, model: Box<dyn TerminalModel>) -> Self {
        Self {
            id,
            name: name.to_string(),
            state: TerminalState::new(session_name, model),
        }
    }
}

/// Runtime state of a tab.
///
/// Everything mutable sits behind one lock so flush writes into the model
/// are serialized against renderers inspecting it from other threads.
pub struct TerminalState {
    /// Name of the external multiplexer session backing this tab.
    pub session_name: String,
    inner: Arc<Mutex<TabInner>>,
}

impl TerminalState {
    pub fn new(session_name: String, model: Box<dyn TerminalModel>) -> Self {
        Self {
            session_name,
            inner: Arc::new(Mutex::new(TabInner::new(model))),
        }
    }

    /// Lock the tab. A poisoned lock is recovered rather than propagated,
    /// since every field is valid on its own.
    pub fn lock(&self) -> MutexGuard<'_, TabInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Shared handle for renderers on other threads.
    pub fn shared(&self) -> Arc<Mutex<TabInner>> {
        Arc::clone(&self.inner)
    }
}

pub struct TabInner {
    /// The local client process. `None` while detached or still being created.
    pub process: Option<Box<dyn Process>>,
    pub model: Box<dyn TerminalModel>,
    pub running: bool,
    pub detached: bool,
    /// The detach was requested by the user rather than forced by a failure.
    pub user_detached: bool,
    pub pending: PendingOutput,
    pub selection: SelectionState,
    pub reader: Option<ReaderControl>,
    /// Bumped each time a reader starts; stale stop reports carry an old value.
    pub reader_epoch: u64,
    pub restart: RestartState,
    pub last_input_at: Option<Instant>,
    pub last_title: Option<String>,
    pub size: (u16, u16),
}

impl TabInner {
    fn new(model: Box<dyn TerminalModel>) -> Self {
        let size = (model.columns() as u16, model.screen_lines() as u16);
        Self {
            process: None,
            model,
            running: false,
            detached: false,
            user_detached: false,
            pending: PendingOutput::default(),
            selection: SelectionState::default(),
            reader: None,
            reader_epoch: 0,
            restart: RestartState::default(),
            last_input_at: None,
            last_title: None,
            size,
        }
    }

    /// Install a freshly attached process.
    pub fn attach(&mut self, process: Box<dyn Process>) {
        self.stop_reader();
        if let Some(mut old) = self.process.replace(process) {
            old.close();
        }
        self.running = true;
        self.detached = false;
        self.user_detached = false;
        self.restart.reset();
    }

    /// Close the local client and mark the tab detached.
    ///
    /// The external session, if any, is left running.
    pub fn detach(&mut self, by_user: bool) {
        self.stop_reader();
        if let Some(mut process) = self.process.take() {
            process.close();
        }
        self.running = false;
        self.detached = true;
        self.user_detached = by_user;
        self.selection.clear();
    }

    /// Stop the current reader, if any, so its late reports are ignored.
    pub fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
        self.reader_epoch = self.reader_epoch.wrapping_add(1);
    }

    /// Whether the process handle is gone or reports itself closed.
    pub fn process_closed(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => process.is_closed(),
            None => true,
        }
    }

    /// Write bytes to the current process.
    pub fn write_to_process(&mut self, data: &[u8]) -> Result<(), harbor_pty::PtyError> {
        match self.process.as_mut() {
            Some(process) => process.write(data),
            None => Err(harbor_pty::PtyError::Closed),
        }
    }
}
