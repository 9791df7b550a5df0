//! Drives an [`Engine`] on a tokio runtime.
//!
//! The engine itself never waits. This loop receives one message at a time,
//! hands it to the engine, and carries out the returned commands: timers as
//! sleeping tasks, lifecycle jobs on the blocking pool, events to the UI
//! channel, and copies to the clipboard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use harbor_pty::NativeSpawner;
use harbor_tmux::TmuxCli;
use harbor_workspace::{watch_root, WorkspaceEvent, WorkspaceKey, WorkspaceRecord};
use notify::RecommendedWatcher;
use rusqlite::Connection;
use tokio::sync::mpsc;

use crate::clipboard::{ClipboardSink, SystemClipboard};
use crate::clock::{SharedClock, SystemClock};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::lifecycle::{LifecycleConfig, SessionLifecycleManager};
use crate::message::{Command, Event, Job, Msg};
use crate::model::{vt_factory, ModelFactory};

/// Messages the inbox holds before readers start to wait.
pub const INBOX_DEPTH: usize = 1024;

pub struct Runtime {
    engine: Engine,
    inbox_tx: mpsc::Sender<Msg>,
    inbox_rx: mpsc::Receiver<Msg>,
    lifecycle: Arc<SessionLifecycleManager>,
    clipboard: Box<dyn ClipboardSink>,
    events: mpsc::UnboundedSender<Event>,
    watchers: HashMap<WorkspaceKey, RecommendedWatcher>,
}

impl Runtime {
    pub fn new(
        config: EngineConfig,
        clock: SharedClock,
        models: ModelFactory,
        lifecycle: Arc<SessionLifecycleManager>,
        clipboard: Box<dyn ClipboardSink>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_DEPTH);
        Self {
            engine: Engine::new(config, clock, inbox_tx.clone(), models),
            inbox_tx,
            inbox_rx,
            lifecycle,
            clipboard,
            events,
            watchers: HashMap::new(),
        }
    }

    /// Production wiring: settings from `conn`, tmux, real PTYs, the
    /// alacritty model, and the desktop clipboard.
    pub fn from_settings(conn: &Connection, events: mpsc::UnboundedSender<Event>) -> Self {
        let config = EngineConfig::load(conn);
        let clock = SystemClock::shared();
        let lifecycle = SessionLifecycleManager::new(
            Arc::new(TmuxCli::new(&config.tmux_binary)),
            Arc::new(NativeSpawner),
            Arc::clone(&clock),
            LifecycleConfig::from(&config),
        );
        let models = vt_factory(config.scrollback_lines);
        Self::new(
            config,
            clock,
            models,
            Arc::new(lifecycle),
            Box::new(SystemClipboard),
            events,
        )
    }

    /// A handle for the UI to send requests with.
    pub fn sender(&self) -> mpsc::Sender<Msg> {
        self.inbox_tx.clone()
    }

    /// Tear the workspace down once its root directory disappears.
    pub fn watch(&mut self, record: &WorkspaceRecord) -> Result<(), String> {
        let key = record.key();
        if self.watchers.contains_key(&key) {
            return Ok(());
        }
        let (rx, watcher) = watch_root(key.clone(), &record.root)?;
        let inbox = self.inbox_tx.clone();

        std::thread::Builder::new()
            .name(format!("watch-{}", record.id))
            .spawn(move || {
                while let Ok(WorkspaceEvent::Deleted(workspace)) = rx.recv() {
                    log::info!("runtime: workspace {workspace} was deleted");
                    if inbox
                        .blocking_send(Msg::WorkspaceDeleted { workspace })
                        .is_err()
                    {
                        break;
                    }
                }
            })
            .map_err(|e| format!("failed to spawn watcher thread: {e}"))?;

        self.watchers.insert(key, watcher);
        Ok(())
    }

    /// Stop watching a workspace. Dropping the watcher ends its thread.
    pub fn unwatch(&mut self, key: &WorkspaceKey) {
        self.watchers.remove(key);
    }

    /// Run until a [`Msg::Shutdown`] is handled.
    pub async fn run(mut self) {
        let watchdog = self.engine.config().watchdog_interval;
        self.schedule(watchdog, Msg::WatchdogTick);

        while let Some(msg) = self.inbox_rx.recv().await {
            let shutdown = matches!(msg, Msg::Shutdown);
            let deleted = match &msg {
                Msg::WorkspaceDeleted { workspace } => Some(workspace.clone()),
                _ => None,
            };

            for command in self.engine.handle(msg) {
                self.execute(command);
            }

            if let Some(key) = deleted {
                self.unwatch(&key);
            }
            if shutdown {
                break;
            }
        }
        log::info!("runtime: stopped");
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::After { delay, msg } => self.schedule(delay, msg),
            Command::Job(job) => self.spawn_job(job),
            Command::Emit(event) => {
                if self.events.send(event).is_err() {
                    log::debug!("runtime: event dropped, UI channel closed");
                }
            }
            Command::Copy(text) => {
                if let Err(e) = self.clipboard.set_text(&text) {
                    log::warn!("runtime: clipboard copy failed: {e}");
                }
            }
        }
    }

    fn schedule(&self, delay: Duration, msg: Msg) {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(msg).await;
        });
    }

    fn spawn_job(&self, job: Job) {
        let lifecycle = Arc::clone(&self.lifecycle);
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || run_job(&lifecycle, job)).await {
                Ok(Some(msg)) => {
                    let _ = inbox.send(msg).await;
                }
                Ok(None) => {}
                Err(e) => log::error!("runtime: lifecycle job failed to complete: {e}"),
            }
        });
    }
}

/// Run one blocking lifecycle job and turn its outcome into a message.
fn run_job(lifecycle: &SessionLifecycleManager, job: Job) -> Option<Msg> {
    match job {
        Job::Create {
            workspace,
            request,
            restart,
        } => {
            let result = if restart {
                lifecycle.restart(&request)
            } else {
                lifecycle.create(&request)
            };
            Some(Msg::CreationFinished {
                workspace,
                tab: request.tab_id,
                restart,
                result,
            })
        }
        Job::Reattach {
            workspace,
            tab,
            session_name,
            cols,
            rows,
        } => Some(Msg::ReattachFinished {
            workspace,
            tab,
            result: lifecycle.reattach(&session_name, cols, rows),
        }),
        Job::Kill { session_name } => {
            if let Err(e) = lifecycle.kill(&session_name) {
                log::warn!("runtime: failed to kill session {session_name}: {e}");
            }
            None
        }
        Job::KillWorkspaceSessions { workspace_id } => {
            let sessions = match lifecycle.sessions_for_workspace(&workspace_id) {
                Ok(sessions) => sessions,
                Err(e) => {
                    log::warn!("runtime: failed to list sessions of {workspace_id}: {e}");
                    return None;
                }
            };
            for name in sessions {
                log::info!("runtime: ending session {name} of deleted workspace");
                if let Err(e) = lifecycle.kill(&name) {
                    log::warn!("runtime: failed to kill session {name}: {e}");
                }
            }
            None
        }
    }
}
