//! In-memory [`Multiplexer`] for tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use harbor_pty::SpawnSpec;

use crate::tmux::{Multiplexer, MuxError};

#[derive(Clone, Debug, Default)]
pub struct FakeSession {
    pub live_pane: bool,
    pub tags: HashMap<String, String>,
    pub history: Vec<u8>,
    pub size: (u16, u16),
}

#[derive(Default)]
struct FakeMuxState {
    available: bool,
    sessions: BTreeMap<String, FakeSession>,
    created: Vec<String>,
    killed: Vec<String>,
    /// Tag reads that return a wrong value before reads become truthful.
    stale_tag_reads: usize,
    tag_writes: usize,
    /// Sessions that disappear on the next `has_live_pane` probe.
    vanish_after_probe: Vec<String>,
}

/// Shared, cloneable fake: clones observe the same sessions.
#[derive(Clone)]
pub struct FakeMultiplexer {
    inner: Arc<Mutex<FakeMuxState>>,
}

impl Default for FakeMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMultiplexer {
    pub fn new() -> Self {
        let state = FakeMuxState {
            available: true,
            ..FakeMuxState::default()
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeMuxState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    /// Pretend a session exists, e.g. one left behind by an earlier run.
    pub fn insert_session(&self, name: &str, live_pane: bool, history: &[u8]) {
        self.state().sessions.insert(
            name.to_string(),
            FakeSession {
                live_pane,
                history: history.to_vec(),
                ..FakeSession::default()
            },
        );
    }

    pub fn set_pane_dead(&self, name: &str) {
        if let Some(session) = self.state().sessions.get_mut(name) {
            session.live_pane = false;
        }
    }

    pub fn remove_session(&self, name: &str) {
        self.state().sessions.remove(name);
    }

    /// The next `count` tag reads report a value that does not match.
    pub fn lie_on_tag_reads(&self, count: usize) {
        self.state().stale_tag_reads = count;
    }

    /// The session is reported live by one probe and is gone right after.
    pub fn vanish_after_probe(&self, name: &str) {
        self.state().vanish_after_probe.push(name.to_string());
    }

    pub fn session(&self, name: &str) -> Option<FakeSession> {
        self.state().sessions.get(name).cloned()
    }

    pub fn created(&self) -> Vec<String> {
        self.state().created.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state().killed.clone()
    }

    pub fn tag_writes(&self) -> usize {
        self.state().tag_writes
    }

    fn check_available(state: &FakeMuxState) -> Result<(), MuxError> {
        if state.available {
            Ok(())
        } else {
            Err(MuxError::Unavailable("fake multiplexer offline".to_string()))
        }
    }
}

impl Multiplexer for FakeMultiplexer {
    fn is_available(&self) -> bool {
        self.state().available
    }

    fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        let state = self.state();
        Self::check_available(&state)?;
        Ok(state.sessions.contains_key(name))
    }

    fn has_live_pane(&self, name: &str) -> Result<bool, MuxError> {
        let mut state = self.state();
        Self::check_available(&state)?;
        let live = state.sessions.get(name).is_some_and(|s| s.live_pane);
        if let Some(pos) = state.vanish_after_probe.iter().position(|n| n == name) {
            state.vanish_after_probe.remove(pos);
            state.sessions.remove(name);
        }
        Ok(live)
    }

    fn new_session(
        &self,
        name: &str,
        _cwd: Option<&Path>,
        cols: u16,
        rows: u16,
    ) -> Result<(), MuxError> {
        let mut state = self.state();
        Self::check_available(&state)?;
        if state.sessions.contains_key(name) {
            return Err(MuxError::CommandFailed(format!("duplicate session: {name}")));
        }
        state.sessions.insert(
            name.to_string(),
            FakeSession {
                live_pane: true,
                size: (cols, rows),
                ..FakeSession::default()
            },
        );
        state.created.push(name.to_string());
        Ok(())
    }

    fn attach_spec(&self, name: &str) -> SpawnSpec {
        SpawnSpec::command("fake-tmux", ["attach-session", "-t", name])
    }

    fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        let mut state = self.state();
        Self::check_available(&state)?;
        if state.sessions.remove(name).is_none() {
            return Err(MuxError::NoSuchSession(name.to_string()));
        }
        state.killed.push(name.to_string());
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        let state = self.state();
        Self::check_available(&state)?;
        Ok(state.sessions.keys().cloned().collect())
    }

    fn set_tag(&self, name: &str, key: &str, value: &str) -> Result<(), MuxError> {
        let mut state = self.state();
        Self::check_available(&state)?;
        state.tag_writes += 1;
        let session = state
            .sessions
            .get_mut(name)
            .ok_or_else(|| MuxError::NoSuchSession(name.to_string()))?;
        session.tags.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_tag(&self, name: &str, key: &str) -> Result<Option<String>, MuxError> {
        let mut state = self.state();
        Self::check_available(&state)?;
        if state.stale_tag_reads > 0 {
            state.stale_tag_reads -= 1;
            return Ok(Some("stale".to_string()));
        }
        let session = state
            .sessions
            .get(name)
            .ok_or_else(|| MuxError::NoSuchSession(name.to_string()))?;
        Ok(session.tags.get(key).cloned())
    }

    fn capture_history(&self, name: &str, _lines: usize) -> Result<Vec<u8>, MuxError> {
        let state = self.state();
        Self::check_available(&state)?;
        state
            .sessions
            .get(name)
            .map(|s| s.history.clone())
            .ok_or_else(|| MuxError::NoSuchSession(name.to_string()))
    }
}
