//! Binding tabs to named sessions in the external multiplexer.
//!
//! Every call here blocks on the multiplexer or the OS and runs as a job off
//! the consumer thread. Results travel back as messages.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use harbor_pty::{Process, PtyError, SpawnSpec, Spawner};
use harbor_tmux::naming::{
    self, SessionTags, TAG_CREATED, TAG_TAB, TAG_TYPE, TAG_WORKSPACE, TYPE_TERMINAL,
};
use harbor_tmux::{session_name, Multiplexer, MuxError};

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::state::TabId;

/// Why a create, reattach, or restart failed.
#[derive(Debug)]
pub enum LifecycleError {
    /// The multiplexer cannot be run.
    ToolUnavailable(String),
    /// The session no longer has a live pane; offer a restart instead.
    SessionEnded(String),
    /// The session disappeared between the liveness check and the attach.
    SessionVanished(String),
    /// The OS refused to start the process.
    Spawn(PtyError),
    Mux(MuxError),
}

impl LifecycleError {
    /// Whether the user should be offered a fresh session rather than a reattach.
    pub fn offers_restart(&self) -> bool {
        matches!(
            self,
            LifecycleError::SessionEnded(_) | LifecycleError::SessionVanished(_)
        )
    }
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleError::ToolUnavailable(msg) => write!(f, "session tool unavailable: {msg}"),
            LifecycleError::SessionEnded(name) => write!(f, "session {name} has ended"),
            LifecycleError::SessionVanished(name) => {
                write!(f, "session {name} disappeared while attaching")
            }
            LifecycleError::Spawn(err) => write!(f, "{err}"),
            LifecycleError::Mux(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LifecycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LifecycleError::Spawn(err) => Some(err),
            LifecycleError::Mux(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PtyError> for LifecycleError {
    fn from(err: PtyError) -> Self {
        LifecycleError::Spawn(err)
    }
}

impl From<MuxError> for LifecycleError {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::Unavailable(msg) => LifecycleError::ToolUnavailable(msg),
            other => LifecycleError::Mux(other),
        }
    }
}

/// Everything needed to start the session for one tab.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRequest {
    pub workspace_id: String,
    pub tab_id: TabId,
    pub cwd: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
}

impl CreateRequest {
    pub fn session_name(&self) -> String {
        session_name(&self.workspace_id, self.tab_id.as_str())
    }
}

/// A local client attached to a session.
pub struct Attached {
    pub session_name: String,
    pub process: Box<dyn Process>,
    /// History captured from a session that was already running.
    pub preload: Vec<u8>,
}

impl std::fmt::Debug for Attached {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attached")
            .field("session_name", &self.session_name)
            .field("preload", &self.preload.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// Run shells inside the multiplexer. When off, shells are spawned
    /// directly and die with their client.
    pub persistent: bool,
    pub shell: Option<String>,
    pub preload_lines: usize,
    pub verify_attempts: u32,
    pub verify_interval: Duration,
}

impl From<&EngineConfig> for LifecycleConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            persistent: config.persistent,
            shell: config.shell.clone(),
            preload_lines: config.preload_lines,
            verify_attempts: config.tag_verify_attempts,
            verify_interval: config.tag_verify_interval,
        }
    }
}

pub struct SessionLifecycleManager {
    mux: Arc<dyn Multiplexer>,
    spawner: Arc<dyn Spawner>,
    clock: SharedClock,
    config: LifecycleConfig,
    /// Identifies this program instance in session tags.
    instance_id: String,
}

impl SessionLifecycleManager {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        spawner: Arc<dyn Spawner>,
        clock: SharedClock,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            mux,
            spawner,
            clock,
            config,
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn is_persistent(&self) -> bool {
        self.config.persistent
    }

    /// Start or resume the session for a tab and attach a local client.
    ///
    /// A session left running by an earlier run is reused, and its recent
    /// history is returned as preload so the tab shows prior context.
    pub fn create(&self, request: &CreateRequest) -> Result<Attached, LifecycleError> {
        let name = request.session_name();
        if !self.config.persistent {
            return self.spawn_direct(request, name);
        }
        self.ensure_available()?;

        let mut preload = Vec::new();
        let resumed = self.mux.has_live_pane(&name)?;
        if resumed {
            match self.mux.capture_history(&name, self.config.preload_lines) {
                Ok(history) => preload = history,
                Err(e) => log::warn!("lifecycle: failed to capture history of {name}: {e}"),
            }
        } else {
            if self.mux.has_session(&name)? {
                log::debug!("lifecycle: replacing dead session {name}");
                self.kill_quietly(&name);
            }
            self.mux
                .new_session(&name, request.cwd.as_deref(), request.cols, request.rows)?;
        }

        // A resumed session keeps its original creation time if it has one.
        let created_at = if resumed {
            match self.mux.get_tag(&name, TAG_CREATED) {
                Ok(Some(value)) => value.parse().ok(),
                _ => None,
            }
        } else {
            None
        };
        let tags = self.tags_for(request, created_at);
        if !resumed {
            self.write_tags(&name, &tags);
        }

        let process = match self.attach_client(&name, request.cols, request.rows) {
            Ok(process) => process,
            Err(e) => {
                // Do not leave behind a session nobody can see.
                if !resumed && matches!(e, LifecycleError::Spawn(_)) {
                    self.kill_quietly(&name);
                }
                return Err(e);
            }
        };
        log::info!(
            "lifecycle: {} session {name}",
            if resumed { "resumed" } else { "created" }
        );
        self.verify_tags(&name, &tags);

        Ok(Attached {
            session_name: name,
            process,
            preload,
        })
    }

    /// Attach a new client to an existing session.
    ///
    /// Fails with [`LifecycleError::SessionEnded`] rather than creating a
    /// new session under the same name.
    pub fn reattach(&self, name: &str, cols: u16, rows: u16) -> Result<Attached, LifecycleError> {
        if !self.config.persistent {
            return Err(LifecycleError::SessionEnded(name.to_string()));
        }
        self.ensure_available()?;
        if !self.mux.has_live_pane(name)? {
            return Err(LifecycleError::SessionEnded(name.to_string()));
        }
        let process = self.attach_client(name, cols, rows)?;
        log::info!("lifecycle: reattached {name}");
        Ok(Attached {
            session_name: name.to_string(),
            process,
            preload: Vec::new(),
        })
    }

    /// Kill whatever runs under the tab's session name and start fresh.
    pub fn restart(&self, request: &CreateRequest) -> Result<Attached, LifecycleError> {
        if self.config.persistent {
            self.ensure_available()?;
            let name = request.session_name();
            if self.mux.has_session(&name)? {
                self.mux.kill_session(&name)?;
                log::info!("lifecycle: killed {name} for restart");
            }
        }
        self.create(request)
    }

    /// End a session for good, e.g. when its tab is closed.
    pub fn kill(&self, name: &str) -> Result<(), LifecycleError> {
        if !self.config.persistent {
            return Ok(());
        }
        match self.mux.kill_session(name) {
            Ok(()) | Err(MuxError::NoSuchSession(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sessions tagged as belonging to `workspace_id`, including ones no tab
    /// currently knows about.
    pub fn sessions_for_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<String>, LifecycleError> {
        if !self.config.persistent {
            return Ok(Vec::new());
        }
        self.ensure_available()?;
        let prefix = format!("{}-", naming::SESSION_PREFIX);
        let mut owned = Vec::new();
        for name in self.mux.list_sessions()? {
            if !name.starts_with(&prefix) {
                continue;
            }
            match self.mux.get_tag(&name, TAG_WORKSPACE) {
                Ok(Some(id)) if id == workspace_id => owned.push(name),
                Ok(_) | Err(MuxError::NoSuchSession(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(owned)
    }

    /// Poll until the identifying tags read back correctly, re-tagging on
    /// mismatch. Returns whether they did; failure is only logged.
    pub fn verify_tags(&self, name: &str, tags: &SessionTags) -> bool {
        let expected = [
            (TAG_WORKSPACE, tags.workspace_id.as_str()),
            (TAG_TAB, tags.tab_id.as_str()),
            (TAG_TYPE, tags.kind.as_str()),
        ];
        let attempts = self.config.verify_attempts.max(1);

        for attempt in 1..=attempts {
            let mismatched = expected.iter().any(|(key, want)| {
                !matches!(self.mux.get_tag(name, key), Ok(Some(ref got)) if got == want)
            });
            if !mismatched {
                return true;
            }
            log::debug!("lifecycle: tags on {name} not yet correct (attempt {attempt})");
            self.write_tags(name, tags);
            if attempt < attempts {
                self.clock.sleep(self.config.verify_interval);
            }
        }

        log::warn!("lifecycle: tags on {name} could not be verified");
        false
    }

    fn tags_for(&self, request: &CreateRequest, created_at: Option<u64>) -> SessionTags {
        let created_at = created_at.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        SessionTags {
            workspace_id: request.workspace_id.clone(),
            tab_id: request.tab_id.to_string(),
            kind: TYPE_TERMINAL.to_string(),
            created_at,
            instance_id: self.instance_id.clone(),
        }
    }

    fn write_tags(&self, name: &str, tags: &SessionTags) {
        for (key, value) in tags.pairs() {
            if let Err(e) = self.mux.set_tag(name, key, &value) {
                log::warn!("lifecycle: failed to set {key} on {name}: {e}");
            }
        }
    }

    fn ensure_available(&self) -> Result<(), LifecycleError> {
        if self.mux.is_available() {
            Ok(())
        } else {
            Err(LifecycleError::ToolUnavailable(
                "session multiplexer is not installed or not runnable".to_string(),
            ))
        }
    }

    fn attach_client(
        &self,
        name: &str,
        cols: u16,
        rows: u16,
    ) -> Result<Box<dyn Process>, LifecycleError> {
        let spec = self.mux.attach_spec(name);
        let mut process = self.spawner.spawn(&spec, cols, rows)?;
        if !self.mux.has_session(name)? {
            process.close();
            return Err(LifecycleError::SessionVanished(name.to_string()));
        }
        Ok(process)
    }

    fn spawn_direct(
        &self,
        request: &CreateRequest,
        name: String,
    ) -> Result<Attached, LifecycleError> {
        let spec = match &self.config.shell {
            Some(shell) => SpawnSpec::command(shell, Vec::<String>::new()),
            None => SpawnSpec::shell(None),
        }
        .with_cwd(request.cwd.clone());
        let process = self.spawner.spawn(&spec, request.cols, request.rows)?;
        log::info!("lifecycle: spawned shell for {name} without persistence");
        Ok(Attached {
            session_name: name,
            process,
            preload: Vec::new(),
        })
    }

    fn kill_quietly(&self, name: &str) {
        if let Err(e) = self.mux.kill_session(name) {
            log::warn!("lifecycle: failed to kill {name}: {e}");
        }
    }
}
