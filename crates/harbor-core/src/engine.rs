//! The single-threaded consumer.
//!
//! [`Engine::handle`] takes one message at a time, mutates tabs, and returns
//! the commands the runtime must carry out. It never blocks and never sleeps:
//! waits are `Command::After`, blocking work is `Command::Job`. Background
//! readers only reach it through the inbox.

use harbor_pty::{start_pipeline, PipelineConfig, PipelineEvent, PtyError};
use harbor_tmux::session_name;
use harbor_workspace::{WorkspaceKey, WorkspaceRecord};
use tokio::sync::mpsc;

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::flush::TimerAction;
use crate::lifecycle::{Attached, CreateRequest, LifecycleError};
use crate::message::{Command, Event, Job, MouseKind, Msg};
use crate::model::ModelFactory;
use crate::rebind::rebind;
use crate::registry::SessionRegistry;
use crate::selection::{SelectionController, SelectionEffect};
use crate::state::{TabId, TabInner, TerminalTab};
use crate::supervisor::Decision;

pub struct Engine {
    config: EngineConfig,
    registry: SessionRegistry,
    selection: SelectionController,
    clock: SharedClock,
    /// Where reader workers deliver their output.
    inbox: mpsc::Sender<Msg>,
    models: ModelFactory,
    pipeline: PipelineConfig,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        clock: SharedClock,
        inbox: mpsc::Sender<Msg>,
        models: ModelFactory,
    ) -> Self {
        let selection = SelectionController::new(config.grid_origin, config.autoscroll_interval);
        Self {
            config,
            registry: SessionRegistry::new(),
            selection,
            clock,
            inbox,
            models,
            pipeline: PipelineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn handle(&mut self, msg: Msg) -> Vec<Command> {
        match msg {
            Msg::Output {
                workspace,
                tab,
                data,
            } => self.on_output(&workspace, &tab, &data),
            Msg::FlushDue { workspace, tab } => self.on_flush_due(&workspace, &tab),
            Msg::ReaderStopped {
                workspace,
                tab,
                epoch,
                error,
            } => self.on_reader_stopped(&workspace, &tab, epoch, error),
            Msg::RestartDue {
                workspace,
                tab,
                epoch,
            } => self.on_restart_due(&workspace, &tab, epoch),
            Msg::WatchdogTick => self.on_watchdog(),
            Msg::CreationFinished {
                workspace,
                tab,
                restart,
                result,
            } => self.on_creation_finished(&workspace, &tab, restart, result),
            Msg::ReattachFinished {
                workspace,
                tab,
                result,
            } => self.on_reattach_finished(&workspace, &tab, result),
            Msg::CreateTab { record, name } => self.create_tab(&record, name),
            Msg::Focus { record } => self.on_focus(&record),
            Msg::SelectTab { workspace, tab } => self.on_select_tab(&workspace, &tab),
            Msg::Input {
                workspace,
                tab,
                data,
            } => self.on_input(&workspace, &tab, &data),
            Msg::Resize {
                workspace,
                tab,
                cols,
                rows,
            } => self.on_resize(&workspace, &tab, cols, rows),
            Msg::Mouse {
                workspace,
                tab,
                kind,
                x,
                y,
            } => self.on_mouse(&workspace, &tab, kind, x, y),
            Msg::SelectionTick {
                workspace,
                tab,
                generation,
            } => self.on_selection_tick(&workspace, &tab, generation),
            Msg::Detach { workspace, tab } => self.on_detach(&workspace, &tab),
            Msg::Reattach { workspace, tab } => self.on_reattach(&workspace, &tab),
            Msg::Restart { workspace, tab } => self.on_restart(&workspace, &tab),
            Msg::CloseTab { workspace, tab } => self.on_close_tab(&workspace, &tab),
            Msg::WorkspaceDeleted { workspace } => self.on_workspace_deleted(&workspace),
            Msg::Rebind { old, new } => self.on_rebind(&old, &new),
            Msg::Shutdown => {
                self.shutdown();
                Vec::new()
            }
        }
    }

    /// Stop every reader and close local clients. External sessions live on.
    pub fn shutdown(&mut self) {
        for (_, tab) in self.registry.all_tabs() {
            let mut inner = tab.state.lock();
            inner.stop_reader();
            if let Some(mut process) = inner.process.take() {
                process.close();
            }
            inner.running = false;
        }
        log::info!("engine: shut down");
    }

    // --- output path -------------------------------------------------------

    fn on_output(&mut self, workspace: &WorkspaceKey, id: &TabId, data: &[u8]) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let mut inner = tab.state.lock();
        let profile = self.config.profile(inner.model.is_alt_screen());
        let (_, arm) =
            inner
                .pending
                .push(data, self.clock.now(), profile, self.config.overflow_cap);

        arm.map(|delay| Command::After {
            delay,
            msg: Msg::FlushDue {
                workspace: key,
                tab: id.clone(),
            },
        })
        .into_iter()
        .collect()
    }

    fn on_flush_due(&mut self, workspace: &WorkspaceKey, id: &TabId) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let mut inner = tab.state.lock();
        let profile = self.config.profile(inner.model.is_alt_screen());
        let flush_due = |delay| Command::After {
            delay,
            msg: Msg::FlushDue {
                workspace: key.clone(),
                tab: id.clone(),
            },
        };

        match inner.pending.on_timer(self.clock.now(), profile) {
            TimerAction::Idle => Vec::new(),
            TimerAction::Rearm(delay) => vec![flush_due(delay)],
            TimerAction::Flush => {
                let (chunk, more) = inner.pending.take_chunk(self.config.flush_chunk);
                inner.model.write(&chunk);

                // Replies go to whichever process the tab holds right now.
                for reply in inner.model.take_pty_writes() {
                    if let Err(e) = inner.write_to_process(reply.as_bytes()) {
                        log::debug!("engine: dropped terminal reply for {key}/{id}: {e}");
                    }
                }

                let dropped = inner.pending.take_unreported_drops();
                if dropped > 0 {
                    log::warn!("engine: {key}/{id} overflowed, dropped {dropped} oldest bytes");
                }

                let mut commands = Vec::new();
                if more {
                    commands.push(flush_due(self.config.flush_follow_up));
                }
                commands.extend(model_events(&key, id, &mut inner));
                commands
            }
        }
    }

    // --- reader supervision ------------------------------------------------

    /// Start a reader against the tab's current process, replacing any
    /// previous one.
    fn start_reader(
        &self,
        key: &WorkspaceKey,
        id: &TabId,
        inner: &mut TabInner,
    ) -> Result<(), PtyError> {
        inner.stop_reader();
        let reader = match inner.process.as_ref() {
            Some(process) => process.clone_reader()?,
            None => return Err(PtyError::Closed),
        };
        let epoch = inner.reader_epoch;
        let inbox = self.inbox.clone();
        let workspace = key.clone();
        let tab = id.clone();

        let control = start_pipeline(id.as_str(), reader, self.pipeline, move |event| {
            let msg = match event {
                PipelineEvent::Output(data) => Msg::Output {
                    workspace: workspace.clone(),
                    tab: tab.clone(),
                    data,
                },
                PipelineEvent::Stopped(error) => Msg::ReaderStopped {
                    workspace: workspace.clone(),
                    tab: tab.clone(),
                    epoch,
                    error,
                },
            };
            inbox.blocking_send(msg).is_ok()
        })?;
        inner.reader = Some(control);
        inner.last_input_at = None;
        log::debug!("engine: reader {epoch} started for {key}/{id}");
        Ok(())
    }

    /// Start a reader, handing the tab to the supervisor if that fails.
    fn start_or_supervise(
        &self,
        key: &WorkspaceKey,
        id: &TabId,
        inner: &mut TabInner,
    ) -> Vec<Command> {
        match self.start_reader(key, id, inner) {
            Ok(()) => Vec::new(),
            Err(e) => {
                log::warn!("engine: failed to start reader for {key}/{id}: {e}");
                self.supervise(key, id, inner, e.to_string())
            }
        }
    }

    /// Decide between restarting, giving up, and detaching after a reader stopped.
    fn supervise(
        &self,
        key: &WorkspaceKey,
        id: &TabId,
        inner: &mut TabInner,
        reason: String,
    ) -> Vec<Command> {
        let process_closed = inner.process_closed();
        let decision = inner
            .restart
            .on_stopped(&self.config.restart, self.clock.now(), process_closed);

        match decision {
            Decision::Restart {
                after,
                attempt,
                epoch,
            } => {
                log::warn!(
                    "engine: reader for {key}/{id} stopped ({reason}); \
                     restart {attempt} in {after:?}"
                );
                vec![
                    Command::After {
                        delay: after,
                        msg: Msg::RestartDue {
                            workspace: key.clone(),
                            tab: id.clone(),
                            epoch,
                        },
                    },
                    Command::Emit(Event::RestartScheduled {
                        workspace: key.to_string(),
                        tab_id: id.clone(),
                        attempt,
                        delay_ms: after.as_millis() as u64,
                    }),
                ]
            }
            Decision::GiveUp => {
                log::error!("engine: {key}/{id} keeps failing, giving up ({reason})");
                inner.detach(false);
                vec![
                    disconnected(key, id, "restart limit reached", false),
                    notify(format!(
                        "Terminal stopped repeatedly and was disconnected: {reason}"
                    )),
                ]
            }
            Decision::ProcessClosed => {
                log::info!("engine: process for {key}/{id} is gone ({reason})");
                inner.detach(false);
                vec![disconnected(key, id, "process exited", false)]
            }
        }
    }

    fn on_reader_stopped(
        &mut self,
        workspace: &WorkspaceKey,
        id: &TabId,
        epoch: u64,
        error: Option<String>,
    ) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let mut inner = tab.state.lock();
        if epoch != inner.reader_epoch {
            log::debug!("engine: ignoring stop of stale reader {epoch} for {key}/{id}");
            return Vec::new();
        }
        if let Some(reader) = inner.reader.take() {
            reader.stop();
        }

        let mut commands = vec![Command::Emit(Event::ReaderStopped {
            workspace: key.to_string(),
            tab_id: id.clone(),
            error: error.clone(),
        })];
        if !inner.running {
            return commands;
        }
        let reason = error.unwrap_or_else(|| "end of output".to_string());
        commands.extend(self.supervise(&key, id, &mut inner, reason));
        commands
    }

    fn on_restart_due(&mut self, workspace: &WorkspaceKey, id: &TabId, epoch: u64) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let mut inner = tab.state.lock();
        if !inner.restart.is_current(epoch) || !inner.running || inner.reader.is_some() {
            return Vec::new();
        }
        log::info!("engine: restarting reader for {key}/{id}");
        self.start_or_supervise(&key, id, &mut inner)
    }

    /// Force a restart of readers that produced nothing for a while after input.
    fn on_watchdog(&mut self) -> Vec<Command> {
        let now = self.clock.now();
        let mut commands = vec![Command::After {
            delay: self.config.watchdog_interval,
            msg: Msg::WatchdogTick,
        }];

        for (key, tab) in self.registry.all_tabs() {
            let mut inner = tab.state.lock();
            // A cleared heartbeat means the reader already ended and will report it.
            let alive = inner
                .reader
                .as_ref()
                .is_some_and(|r| r.heartbeat.last().is_some());
            let Some(input_at) = inner.last_input_at else {
                continue;
            };
            let answered = inner
                .pending
                .last_output_at()
                .is_some_and(|output_at| output_at >= input_at);
            let waited = now.saturating_duration_since(input_at);
            if !alive || answered || waited < self.config.stall_timeout {
                continue;
            }

            log::warn!("engine: reader for {key}/{} stalled", tab.id);
            inner.stop_reader();
            inner.last_input_at = None;
            commands.push(Command::Emit(Event::ReaderStopped {
                workspace: key.to_string(),
                tab_id: tab.id.clone(),
                error: Some("reader stalled".to_string()),
            }));
            commands.extend(self.supervise(key, &tab.id, &mut inner, "reader stalled".to_string()));
        }
        commands
    }

    // --- creation and attachment -------------------------------------------

    fn create_tab(&mut self, record: &WorkspaceRecord, name: Option<String>) -> Vec<Command> {
        let key = self.registry.resolve(&record.key());
        if !self.registry.begin_create(&key) {
            log::debug!("engine: creation already in flight for {key}");
            return Vec::new();
        }
        let workspace_id = self.registry.ensure(record).record.id.clone();
        let cwd = self
            .registry
            .get(&key)
            .map(|ws| ws.record.canonical_root());

        let id = TabId::new();
        let name = name.unwrap_or_else(|| self.registry.next_tab_name());
        let (cols, rows) = (self.config.cols, self.config.rows);
        let model = (self.models)(cols, rows);
        let tab = TerminalTab::new(
            id.clone(),
            &name,
            session_name(&workspace_id, id.as_str()),
            model,
        );
        self.registry.add_tab(&key, tab);
        log::info!("engine: creating tab {id} in {key}");

        vec![
            Command::Emit(Event::TabCreated {
                workspace: key.to_string(),
                tab_id: id.clone(),
                name,
            }),
            Command::Emit(Event::ActiveTabChanged {
                workspace: key.to_string(),
                tab_id: id.clone(),
            }),
            Command::Job(Job::Create {
                workspace: key,
                request: CreateRequest {
                    workspace_id,
                    tab_id: id,
                    cwd,
                    cols,
                    rows,
                },
                restart: false,
            }),
        ]
    }

    fn on_focus(&mut self, record: &WorkspaceRecord) -> Vec<Command> {
        let key = self.registry.resolve(&record.key());
        let has_tabs = self
            .registry
            .get(&key)
            .is_some_and(|ws| !ws.tabs.is_empty());
        if has_tabs || self.registry.is_creating(&key) {
            return Vec::new();
        }
        self.create_tab(record, None)
    }

    fn on_creation_finished(
        &mut self,
        workspace: &WorkspaceKey,
        id: &TabId,
        restart: bool,
        result: Result<Attached, LifecycleError>,
    ) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        if !restart {
            self.registry.finish_create(&key);
        }

        let Some(tab) = self.registry.tab(&key, id) else {
            // Closed while the session was being created.
            return match result {
                Ok(mut attached) => {
                    attached.process.close();
                    vec![Command::Job(Job::Kill {
                        session_name: attached.session_name,
                    })]
                }
                Err(_) => Vec::new(),
            };
        };

        let mut inner = tab.state.lock();
        match result {
            Ok(attached) => {
                if inner.running {
                    log::debug!("engine: {key}/{id} already running, dropping extra client");
                    let mut process = attached.process;
                    process.close();
                    return Vec::new();
                }
                self.attach(&key, id, &mut inner, attached, Event::CreationSucceeded {
                    workspace: key.to_string(),
                    tab_id: id.clone(),
                    session_name: tab.state.session_name.clone(),
                })
            }
            Err(e) => {
                log::error!("engine: creating session for {key}/{id} failed: {e}");
                inner.detach(false);
                vec![
                    Command::Emit(Event::CreationFailed {
                        workspace: key.to_string(),
                        tab_id: id.clone(),
                        error: e.to_string(),
                    }),
                    disconnected(&key, id, &e.to_string(), false),
                    notify(format!("Could not start terminal: {e}")),
                ]
            }
        }
    }

    fn on_reattach_finished(
        &mut self,
        workspace: &WorkspaceKey,
        id: &TabId,
        result: Result<Attached, LifecycleError>,
    ) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            if let Ok(mut attached) = result {
                attached.process.close();
            }
            return Vec::new();
        };

        let mut inner = tab.state.lock();
        match result {
            Ok(attached) => {
                if inner.running {
                    let mut process = attached.process;
                    process.close();
                    return Vec::new();
                }
                self.attach(&key, id, &mut inner, attached, Event::ReattachSucceeded {
                    workspace: key.to_string(),
                    tab_id: id.clone(),
                })
            }
            Err(e) => {
                log::warn!("engine: reattaching {key}/{id} failed: {e}");
                vec![
                    Command::Emit(Event::ReattachFailed {
                        workspace: key.to_string(),
                        tab_id: id.clone(),
                        error: e.to_string(),
                        offer_restart: e.offers_restart(),
                    }),
                    notify(format!("Could not reattach terminal: {e}")),
                ]
            }
        }
    }

    /// Install an attached client: replay preload, sync size, start reading.
    fn attach(
        &self,
        key: &WorkspaceKey,
        id: &TabId,
        inner: &mut TabInner,
        attached: Attached,
        success: Event,
    ) -> Vec<Command> {
        let mut commands = vec![Command::Emit(success)];

        if !attached.preload.is_empty() {
            inner.model.write(&attached.preload);
            commands.extend(model_events(key, id, inner));
        }
        inner.attach(attached.process);

        let (cols, rows) = inner.size;
        if let Some(process) = inner.process.as_ref() {
            if let Err(e) = process.resize(cols, rows) {
                log::debug!("engine: initial resize of {key}/{id} failed: {e}");
            }
        }

        commands.extend(self.start_or_supervise(key, id, inner));
        commands
    }

    // --- user requests -----------------------------------------------------

    fn on_select_tab(&mut self, workspace: &WorkspaceKey, id: &TabId) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        if !self.registry.set_active(&key, id) {
            return Vec::new();
        }
        vec![Command::Emit(Event::ActiveTabChanged {
            workspace: key.to_string(),
            tab_id: id.clone(),
        })]
    }

    fn on_input(&mut self, workspace: &WorkspaceKey, id: &TabId, data: &[u8]) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let mut inner = tab.state.lock();
        match inner.write_to_process(data) {
            Ok(()) => inner.last_input_at = Some(self.clock.now()),
            Err(e) => log::debug!("engine: input for {key}/{id} dropped: {e}"),
        }
        Vec::new()
    }

    fn on_resize(
        &mut self,
        workspace: &WorkspaceKey,
        id: &TabId,
        cols: u16,
        rows: u16,
    ) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let (cols, rows) = (cols.max(1), rows.max(1));
        let mut inner = tab.state.lock();
        if inner.size == (cols, rows) {
            return Vec::new();
        }
        inner.size = (cols, rows);
        inner.model.resize(cols, rows);
        if let Some(process) = inner.process.as_ref() {
            if let Err(e) = process.resize(cols, rows) {
                log::warn!("engine: resizing {key}/{id} failed: {e}");
            }
        }
        Vec::new()
    }

    fn on_mouse(
        &mut self,
        workspace: &WorkspaceKey,
        id: &TabId,
        kind: MouseKind,
        x: i32,
        y: i32,
    ) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let mut guard = tab.state.lock();
        let inner = &mut *guard;
        let before = inner.model.content_version();

        let effect = match kind {
            MouseKind::Press => {
                self.selection
                    .press(&mut inner.selection, inner.model.as_mut(), x, y);
                None
            }
            MouseKind::Drag => self
                .selection
                .drag(&mut inner.selection, inner.model.as_mut(), x, y),
            MouseKind::Release => self
                .selection
                .release(&mut inner.selection, inner.model.as_mut(), x, y),
        };

        let mut commands = selection_commands(&key, id, effect);
        if inner.model.content_version() != before {
            commands.push(output_available(&key, id, inner));
        }
        commands
    }

    fn on_selection_tick(
        &mut self,
        workspace: &WorkspaceKey,
        id: &TabId,
        generation: u64,
    ) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let mut guard = tab.state.lock();
        let inner = &mut *guard;
        let effect = self
            .selection
            .tick(&mut inner.selection, inner.model.as_mut(), generation);
        if effect.is_none() {
            return Vec::new();
        }
        let mut commands = selection_commands(&key, id, effect);
        commands.push(output_available(&key, id, inner));
        commands
    }

    fn on_detach(&mut self, workspace: &WorkspaceKey, id: &TabId) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        if !self.config.persistent {
            return vec![notify(
                "Detaching needs persistent sessions; the shell would be lost.".to_string(),
            )];
        }
        let mut inner = tab.state.lock();
        if !inner.running {
            return Vec::new();
        }
        inner.detach(true);
        log::info!("engine: detached {key}/{id}");
        vec![disconnected(&key, id, "detached", true)]
    }

    fn on_reattach(&mut self, workspace: &WorkspaceKey, id: &TabId) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.tab(&key, id) else {
            return Vec::new();
        };
        let inner = tab.state.lock();
        if inner.running {
            return Vec::new();
        }
        let (cols, rows) = inner.size;
        vec![Command::Job(Job::Reattach {
            workspace: key.clone(),
            tab: id.clone(),
            session_name: tab.state.session_name.clone(),
            cols,
            rows,
        })]
    }

    fn on_restart(&mut self, workspace: &WorkspaceKey, id: &TabId) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(ws) = self.registry.get(&key) else {
            return Vec::new();
        };
        let Some(tab) = ws.tab(id) else {
            return Vec::new();
        };
        let mut inner = tab.state.lock();
        inner.detach(false);
        inner.restart.reset();
        let (cols, rows) = inner.size;
        log::info!("engine: restarting {key}/{id}");

        vec![Command::Job(Job::Create {
            workspace: key.clone(),
            request: CreateRequest {
                workspace_id: ws.record.id.clone(),
                tab_id: id.clone(),
                cwd: Some(ws.record.canonical_root()),
                cols,
                rows,
            },
            restart: true,
        })]
    }

    fn on_close_tab(&mut self, workspace: &WorkspaceKey, id: &TabId) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(tab) = self.registry.remove_tab(&key, id) else {
            return Vec::new();
        };
        log::info!("engine: closing {key}/{id}");

        let mut commands = teardown(&tab, self.config.persistent);
        commands.push(Command::Emit(Event::TabClosed {
            workspace: key.to_string(),
            tab_id: id.clone(),
        }));
        if let Some(active) = self.registry.get(&key).and_then(|ws| ws.active_tab()) {
            commands.push(Command::Emit(Event::ActiveTabChanged {
                workspace: key.to_string(),
                tab_id: active.id.clone(),
            }));
        }
        commands
    }

    fn on_workspace_deleted(&mut self, workspace: &WorkspaceKey) -> Vec<Command> {
        let key = self.registry.resolve(workspace);
        let Some(ws) = self.registry.remove(&key) else {
            return Vec::new();
        };
        log::info!("engine: workspace {key} deleted, closing {} tabs", ws.tabs.len());

        let mut commands: Vec<Command> = ws
            .tabs
            .iter()
            .flat_map(|tab| teardown(tab, self.config.persistent))
            .collect();
        if self.config.persistent {
            commands.push(Command::Job(Job::KillWorkspaceSessions {
                workspace_id: ws.record.id.clone(),
            }));
        }
        commands.push(Command::Emit(Event::WorkspaceRemoved {
            workspace: key.to_string(),
        }));
        commands
    }

    fn on_rebind(&mut self, old: &WorkspaceRecord, new: &WorkspaceRecord) -> Vec<Command> {
        let Some(outcome) = rebind(&mut self.registry, old, new) else {
            return Vec::new();
        };

        // Same session name is owned by the surviving tab; only the extra
        // local client goes away.
        for tab in &outcome.dropped {
            let mut inner = tab.state.lock();
            inner.stop_reader();
            if let Some(mut process) = inner.process.take() {
                process.close();
            }
        }

        let mut commands = Vec::new();
        if let Some(ws) = self.registry.get(&outcome.to) {
            for id in &outcome.running {
                let Some(tab) = ws.tab(id) else {
                    continue;
                };
                let mut inner = tab.state.lock();
                commands.extend(self.start_or_supervise(&outcome.to, id, &mut inner));
            }
        }
        commands.push(Command::Emit(Event::WorkspaceRebound {
            from: outcome.from.to_string(),
            to: outcome.to.to_string(),
        }));
        commands
    }
}

/// Stop a tab for good and end its session.
fn teardown(tab: &TerminalTab, persistent: bool) -> Vec<Command> {
    let mut inner = tab.state.lock();
    inner.stop_reader();
    if let Some(mut process) = inner.process.take() {
        process.close();
    }
    inner.running = false;
    inner.pending.clear();
    inner.selection.clear();

    if persistent {
        vec![Command::Job(Job::Kill {
            session_name: tab.state.session_name.clone(),
        })]
    } else {
        Vec::new()
    }
}

fn output_available(key: &WorkspaceKey, id: &TabId, inner: &TabInner) -> Command {
    Command::Emit(Event::OutputAvailable {
        workspace: key.to_string(),
        tab_id: id.clone(),
        content_version: inner.model.content_version(),
    })
}

/// Events following a write into the model.
fn model_events(key: &WorkspaceKey, id: &TabId, inner: &mut TabInner) -> Vec<Command> {
    let mut commands = vec![output_available(key, id, inner)];

    let title = inner.model.title();
    if title != inner.last_title {
        inner.last_title = title.clone();
        if let Some(title) = title {
            commands.push(Command::Emit(Event::TitleChanged {
                workspace: key.to_string(),
                tab_id: id.clone(),
                title,
            }));
        }
    }
    if inner.model.take_bell() {
        commands.push(Command::Emit(Event::Bell {
            workspace: key.to_string(),
            tab_id: id.clone(),
        }));
    }
    commands
}

fn selection_commands(
    key: &WorkspaceKey,
    id: &TabId,
    effect: Option<SelectionEffect>,
) -> Vec<Command> {
    match effect {
        Some(SelectionEffect::ScheduleTick { generation, after }) => vec![Command::After {
            delay: after,
            msg: Msg::SelectionTick {
                workspace: key.clone(),
                tab: id.clone(),
                generation,
            },
        }],
        Some(SelectionEffect::Copy(text)) => vec![Command::Copy(text)],
        None => Vec::new(),
    }
}

fn disconnected(key: &WorkspaceKey, id: &TabId, reason: &str, user_requested: bool) -> Command {
    Command::Emit(Event::Disconnected {
        workspace: key.to_string(),
        tab_id: id.clone(),
        reason: reason.to_string(),
        user_requested,
    })
}

fn notify(message: String) -> Command {
    Command::Emit(Event::Notification { message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::flush::FlushProfile;
    use crate::model::testing::{ModelLog, RecordingModel};
    use crate::model::TerminalModel;
    use harbor_pty::testing::{FakeProcess, FakeProcessHandle};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::{Duration, Instant};

    struct Harness {
        engine: Engine,
        clock: Arc<ManualClock>,
        rx: mpsc::Receiver<Msg>,
        models: Arc<Mutex<Vec<Arc<Mutex<ModelLog>>>>>,
        timers: Vec<(Instant, Msg)>,
        events: Vec<Event>,
        jobs: Vec<Job>,
        copies: Vec<String>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(EngineConfig::default())
        }

        fn with_config(config: EngineConfig) -> Self {
            let clock = ManualClock::shared();
            let (tx, rx) = mpsc::channel(1024);
            let models = Arc::new(Mutex::new(Vec::new()));
            let factory: ModelFactory = {
                let models = Arc::clone(&models);
                Box::new(move |cols: u16, rows: u16| -> Box<dyn TerminalModel> {
                    let (model, log) = RecordingModel::new(cols, rows, 100);
                    models.lock().unwrap().push(log);
                    Box::new(model)
                })
            };
            let shared: SharedClock = clock.clone();
            Self {
                engine: Engine::new(config, shared, tx, factory),
                clock,
                rx,
                models,
                timers: Vec::new(),
                events: Vec::new(),
                jobs: Vec::new(),
                copies: Vec::new(),
            }
        }

        fn send(&mut self, msg: Msg) {
            let commands = self.engine.handle(msg);
            for command in commands {
                match command {
                    Command::After { delay, msg } => {
                        self.timers.push((self.clock.now() + delay, msg))
                    }
                    Command::Job(job) => self.jobs.push(job),
                    Command::Emit(event) => self.events.push(event),
                    Command::Copy(text) => self.copies.push(text),
                }
            }
        }

        /// Deliver every timer that is due, earliest first.
        fn fire_due(&mut self) {
            loop {
                let now = self.clock.now();
                let due = self
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, (at, _))| *at <= now)
                    .min_by_key(|(_, (at, _))| *at)
                    .map(|(i, _)| i);
                match due {
                    Some(i) => {
                        let (_, msg) = self.timers.remove(i);
                        self.send(msg);
                    }
                    None => return,
                }
            }
        }

        fn advance(&mut self, duration: Duration) {
            let step = Duration::from_millis(1);
            let mut left = duration;
            while !left.is_zero() {
                let s = left.min(step);
                self.clock.advance(s);
                left -= s;
                self.fire_due();
            }
        }

        /// Feed reader messages into the engine until `done` holds.
        fn pump_until(&mut self, done: impl Fn(&Harness) -> bool) {
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            loop {
                while let Ok(msg) = self.rx.try_recv() {
                    self.send(msg);
                }
                if done(self) {
                    return;
                }
                assert!(std::time::Instant::now() < deadline, "timed out pumping");
                std::thread::sleep(Duration::from_millis(2));
            }
        }

        fn model(&self, index: usize) -> Arc<Mutex<ModelLog>> {
            Arc::clone(&self.models.lock().unwrap()[index])
        }

        fn take_create_job(&mut self) -> (WorkspaceKey, CreateRequest) {
            let index = self
                .jobs
                .iter()
                .position(|job| matches!(job, Job::Create { .. }))
                .expect("a create job");
            match self.jobs.remove(index) {
                Job::Create {
                    workspace, request, ..
                } => (workspace, request),
                _ => unreachable!(),
            }
        }

        fn finish_creation(
            &mut self,
            workspace: &WorkspaceKey,
            request: &CreateRequest,
        ) -> FakeProcessHandle {
            let (process, handle) = FakeProcess::new(request.cols, request.rows);
            self.send(Msg::CreationFinished {
                workspace: workspace.clone(),
                tab: request.tab_id.clone(),
                restart: false,
                result: Ok(Attached {
                    session_name: request.session_name(),
                    process: Box::new(process),
                    preload: Vec::new(),
                }),
            });
            handle
        }

        /// Create a tab in `record` and attach a fake process to it.
        fn open_tab(
            &mut self,
            record: &WorkspaceRecord,
        ) -> (WorkspaceKey, TabId, FakeProcessHandle) {
            self.send(Msg::CreateTab {
                record: record.clone(),
                name: None,
            });
            let (workspace, request) = self.take_create_job();
            let handle = self.finish_creation(&workspace, &request);
            (workspace, request.tab_id, handle)
        }

        fn inner(&self, key: &WorkspaceKey, id: &TabId) -> MutexGuard<'_, TabInner> {
            self.engine.registry().tab(key, id).expect("tab").state.lock()
        }

        fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
            self.events.iter().filter(|e| pred(e)).count()
        }
    }

    fn record() -> WorkspaceRecord {
        WorkspaceRecord::new("ws1", "/tmp/harbor-engine-test")
    }

    fn output(key: &WorkspaceKey, id: &TabId, data: &[u8]) -> Msg {
        Msg::Output {
            workspace: key.clone(),
            tab: id.clone(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_burst_is_flushed_in_bounded_chunks_in_order() {
        let mut h = Harness::new();
        let (key, id, _handle) = h.open_tab(&record());
        let input: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();

        for piece in input.chunks(9) {
            h.send(output(&key, &id, piece));
            h.clock.advance(Duration::from_micros(20));
            h.fire_due();
        }
        h.advance(Duration::from_secs(1));

        let model = h.model(0);
        let log = model.lock().unwrap();
        assert!(log.writes.iter().all(|w| w.len() <= 32 * 1024));
        assert_eq!(log.written(), input);
        drop(log);
        assert!(h.count(|e| matches!(e, Event::OutputAvailable { .. })) > 0);
        assert!(h.timers.is_empty());
    }

    #[test]
    fn test_reader_output_reaches_the_model() {
        let mut h = Harness::new();
        let (_key, _id, handle) = h.open_tab(&record());
        assert!(h.count(|e| matches!(e, Event::CreationSucceeded { .. })) == 1);

        handle.emit(b"hello");
        h.pump_until(|h| !h.timers.is_empty());
        h.advance(Duration::from_millis(20));

        assert_eq!(h.model(0).lock().unwrap().written(), b"hello");
    }

    #[test]
    fn test_alt_screen_output_waits_longer() {
        let mut h = Harness::new();
        let (key, id, _handle) = h.open_tab(&record());
        h.model(0).lock().unwrap().alt_screen = true;

        h.send(output(&key, &id, b"\x1b[H"));
        let (due, _) = &h.timers[0];
        assert_eq!(*due - h.clock.now(), FlushProfile::SLOW.quiet);

        h.advance(Duration::from_millis(29));
        assert!(h.model(0).lock().unwrap().writes.is_empty());
        h.advance(Duration::from_millis(1));
        assert_eq!(h.model(0).lock().unwrap().written(), b"\x1b[H");
    }

    #[test]
    fn test_title_and_bell_are_reported_after_flush() {
        let mut h = Harness::new();
        let (key, id, _handle) = h.open_tab(&record());
        {
            let model = h.model(0);
            let mut log = model.lock().unwrap();
            log.title = Some("vim".to_string());
            log.bell = true;
        }
        h.send(output(&key, &id, b"x"));
        h.advance(Duration::from_millis(12));

        assert_eq!(
            h.count(|e| matches!(e, Event::TitleChanged { title, .. } if title == "vim")),
            1
        );
        assert_eq!(h.count(|e| matches!(e, Event::Bell { .. })), 1);

        // Unchanged title is not reported again.
        h.send(output(&key, &id, b"y"));
        h.advance(Duration::from_millis(12));
        assert_eq!(h.count(|e| matches!(e, Event::TitleChanged { .. })), 1);
    }

    #[test]
    fn test_terminal_replies_go_to_the_current_process() {
        let mut h = Harness::new();
        let (key, id, first) = h.open_tab(&record());

        h.send(Msg::Detach {
            workspace: key.clone(),
            tab: id.clone(),
        });
        assert!(first.is_closed());
        h.send(Msg::Reattach {
            workspace: key.clone(),
            tab: id.clone(),
        });
        assert!(matches!(h.jobs.last(), Some(Job::Reattach { .. })));

        let (process, second) = FakeProcess::new(80, 24);
        h.send(Msg::ReattachFinished {
            workspace: key.clone(),
            tab: id.clone(),
            result: Ok(Attached {
                session_name: "harbor-ws1-x".into(),
                process: Box::new(process),
                preload: Vec::new(),
            }),
        });
        assert_eq!(h.count(|e| matches!(e, Event::ReattachSucceeded { .. })), 1);

        h.model(0).lock().unwrap().pty_replies.push("\x1b[1;3R".to_string());
        h.send(output(&key, &id, b"ab\x1b[6n"));
        h.advance(Duration::from_millis(12));

        assert_eq!(second.written(), b"\x1b[1;3R");
        assert!(first.written().is_empty());
    }

    #[test]
    fn test_reader_restarts_with_backoff_then_gives_up() {
        let mut h = Harness::new();
        let (key, id, handle) = h.open_tab(&record());

        for attempt in 1..=5usize {
            handle.hang_up_readers();
            h.pump_until(|h| h.count(|e| matches!(e, Event::RestartScheduled { .. })) == attempt);
            h.advance(Duration::from_secs(4));
            assert_eq!(handle.readers_cloned(), attempt + 1);
        }

        handle.hang_up_readers();
        h.pump_until(|h| h.count(|e| matches!(e, Event::Disconnected { .. })) == 1);
        assert_eq!(h.count(|e| matches!(e, Event::RestartScheduled { .. })), 5);
        assert_eq!(h.count(|e| matches!(e, Event::Notification { .. })), 1);

        let delays: Vec<u64> = h
            .events
            .iter()
            .filter_map(|e| match e {
                Event::RestartScheduled { delay_ms, .. } => Some(*delay_ms),
                _ => None,
            })
            .collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 3200]);

        h.advance(Duration::from_secs(10));
        assert_eq!(handle.readers_cloned(), 6);
        let inner = h.inner(&key, &id);
        assert!(!inner.running);
        assert!(inner.detached);
        assert!(!inner.user_detached);
    }

    #[test]
    fn test_stale_reader_stop_is_ignored() {
        let mut h = Harness::new();
        let (key, id, _handle) = h.open_tab(&record());
        let epoch = h.inner(&key, &id).reader_epoch;
        h.events.clear();

        h.send(Msg::ReaderStopped {
            workspace: key.clone(),
            tab: id.clone(),
            epoch: epoch.wrapping_sub(1),
            error: Some("old".into()),
        });
        assert!(h.events.is_empty());
        assert!(h.timers.is_empty());
        assert!(h.inner(&key, &id).reader.is_some());
    }

    #[test]
    fn test_exited_process_is_not_restarted() {
        let mut h = Harness::new();
        let (_key, _id, handle) = h.open_tab(&record());

        handle.exit();
        h.pump_until(|h| h.count(|e| matches!(e, Event::Disconnected { .. })) == 1);

        assert_eq!(h.count(|e| matches!(e, Event::RestartScheduled { .. })), 0);
        assert!(h.events.iter().any(|e| matches!(
            e,
            Event::Disconnected { reason, user_requested: false, .. } if reason == "process exited"
        )));
    }

    #[test]
    fn test_stalled_reader_is_restarted() {
        let mut h = Harness::new();
        let (key, id, handle) = h.open_tab(&record());
        h.send(Msg::WatchdogTick);

        h.send(Msg::Input {
            workspace: key.clone(),
            tab: id.clone(),
            data: b"ls\r".to_vec(),
        });
        assert_eq!(handle.written(), b"ls\r");

        h.advance(Duration::from_secs(9));
        assert_eq!(h.count(|e| matches!(e, Event::ReaderStopped { .. })), 0);

        h.advance(Duration::from_secs(4));
        assert_eq!(
            h.count(|e| matches!(
                e,
                Event::ReaderStopped { error: Some(err), .. } if err == "reader stalled"
            )),
            1
        );
        assert_eq!(handle.readers_cloned(), 2);

        // The fresh reader starts with a clean slate.
        h.advance(Duration::from_secs(20));
        assert_eq!(h.count(|e| matches!(e, Event::ReaderStopped { .. })), 1);
    }

    #[test]
    fn test_answered_input_is_not_a_stall() {
        let mut h = Harness::new();
        let (key, id, handle) = h.open_tab(&record());
        h.send(Msg::WatchdogTick);

        h.send(Msg::Input {
            workspace: key.clone(),
            tab: id.clone(),
            data: b"x".to_vec(),
        });
        h.advance(Duration::from_millis(5));
        h.send(output(&key, &id, b"x"));
        h.advance(Duration::from_secs(15));

        assert_eq!(h.count(|e| matches!(e, Event::ReaderStopped { .. })), 0);
        assert_eq!(handle.readers_cloned(), 1);
    }

    #[test]
    fn test_reattach_of_ended_session_offers_restart() {
        let mut h = Harness::new();
        let (key, id, _handle) = h.open_tab(&record());
        h.send(Msg::Detach {
            workspace: key.clone(),
            tab: id.clone(),
        });
        assert!(h.events.iter().any(|e| matches!(
            e,
            Event::Disconnected { user_requested: true, .. }
        )));
        h.jobs.clear();

        h.send(Msg::ReattachFinished {
            workspace: key.clone(),
            tab: id.clone(),
            result: Err(LifecycleError::SessionEnded("harbor-ws1-x".into())),
        });

        assert!(h.events.iter().any(|e| matches!(
            e,
            Event::ReattachFailed { offer_restart: true, .. }
        )));
        assert!(h.jobs.is_empty());
        assert!(!h.inner(&key, &id).running);
    }

    #[test]
    fn test_restart_recreates_the_session() {
        let mut h = Harness::new();
        let (key, id, first) = h.open_tab(&record());

        h.send(Msg::Restart {
            workspace: key.clone(),
            tab: id.clone(),
        });
        assert!(first.is_closed());
        assert!(matches!(h.jobs.last(), Some(Job::Create { restart: true, .. })));

        let (process, second) = FakeProcess::new(80, 24);
        h.send(Msg::CreationFinished {
            workspace: key.clone(),
            tab: id.clone(),
            restart: true,
            result: Ok(Attached {
                session_name: "harbor-ws1-x".into(),
                process: Box::new(process),
                preload: b"old screen".to_vec(),
            }),
        });

        assert!(h.inner(&key, &id).running);
        assert_eq!(second.readers_cloned(), 1);
        assert_eq!(h.model(0).lock().unwrap().written(), b"old screen");
    }

    #[test]
    fn test_detach_without_persistence_only_notifies() {
        let mut h = Harness::with_config(EngineConfig {
            persistent: false,
            ..EngineConfig::default()
        });
        let (key, id, handle) = h.open_tab(&record());

        h.send(Msg::Detach {
            workspace: key.clone(),
            tab: id.clone(),
        });
        assert!(!handle.is_closed());
        assert!(h.inner(&key, &id).running);
        assert_eq!(h.count(|e| matches!(e, Event::Notification { .. })), 1);
    }

    #[test]
    fn test_input_and_resize_reach_process_and_model() {
        let mut h = Harness::new();
        let (key, id, handle) = h.open_tab(&record());

        h.send(Msg::Resize {
            workspace: key.clone(),
            tab: id.clone(),
            cols: 120,
            rows: 40,
        });
        assert_eq!(handle.size(), (120, 40));
        assert_eq!(h.model(0).lock().unwrap().size, (120, 40));

        h.send(Msg::Input {
            workspace: key.clone(),
            tab: id.clone(),
            data: b"echo hi\r".to_vec(),
        });
        assert_eq!(handle.written(), b"echo hi\r");
    }

    #[test]
    fn test_focus_creates_the_first_tab_once() {
        let mut h = Harness::new();
        let ws = record();

        h.send(Msg::Focus { record: ws.clone() });
        h.send(Msg::Focus { record: ws.clone() });
        h.send(Msg::CreateTab {
            record: ws.clone(),
            name: Some("extra".into()),
        });
        assert_eq!(h.jobs.len(), 1);
        assert_eq!(h.count(|e| matches!(e, Event::TabCreated { .. })), 1);

        let (key, request) = h.take_create_job();
        assert_eq!(request.session_name(), format!("harbor-ws1-{}", request.tab_id));
        h.finish_creation(&key, &request);
        assert!(!h.engine.registry().is_creating(&key));

        h.send(Msg::Focus { record: ws.clone() });
        assert!(h.jobs.is_empty());
        h.send(Msg::CreateTab {
            record: ws,
            name: None,
        });
        assert_eq!(h.jobs.len(), 1);
    }

    #[test]
    fn test_creation_failure_disconnects_the_tab() {
        let mut h = Harness::new();
        h.send(Msg::CreateTab {
            record: record(),
            name: None,
        });
        let (key, request) = h.take_create_job();

        h.send(Msg::CreationFinished {
            workspace: key.clone(),
            tab: request.tab_id.clone(),
            restart: false,
            result: Err(LifecycleError::ToolUnavailable("tmux".into())),
        });

        assert_eq!(h.count(|e| matches!(e, Event::CreationFailed { .. })), 1);
        assert_eq!(h.count(|e| matches!(e, Event::Notification { .. })), 1);
        assert!(!h.engine.registry().is_creating(&key));
        let inner = h.inner(&key, &request.tab_id);
        assert!(inner.detached);
        assert!(!inner.running);
    }

    #[test]
    fn test_tab_closed_during_creation_ends_the_new_session() {
        let mut h = Harness::new();
        h.send(Msg::CreateTab {
            record: record(),
            name: None,
        });
        let (key, request) = h.take_create_job();
        h.send(Msg::CloseTab {
            workspace: key.clone(),
            tab: request.tab_id.clone(),
        });
        h.jobs.clear();

        let handle = h.finish_creation(&key, &request);
        assert!(handle.is_closed());
        assert_eq!(
            h.jobs,
            vec![Job::Kill {
                session_name: request.session_name()
            }]
        );
    }

    #[test]
    fn test_close_tab_kills_its_session() {
        let mut h = Harness::new();
        let ws = record();
        let (key, first, first_handle) = h.open_tab(&ws);
        let (_, second, _) = h.open_tab(&ws);

        h.send(Msg::CloseTab {
            workspace: key.clone(),
            tab: second.clone(),
        });
        assert_eq!(
            h.jobs,
            vec![Job::Kill {
                session_name: session_name("ws1", second.as_str())
            }]
        );
        assert_eq!(h.count(|e| matches!(e, Event::TabClosed { .. })), 1);
        assert!(matches!(
            h.events.last(),
            Some(Event::ActiveTabChanged { tab_id, .. }) if *tab_id == first
        ));
        assert!(!first_handle.is_closed());
    }

    #[test]
    fn test_deleted_workspace_tears_down_all_tabs() {
        let mut h = Harness::new();
        let ws = record();
        let (key, _, a) = h.open_tab(&ws);
        let (_, _, b) = h.open_tab(&ws);

        h.send(Msg::WorkspaceDeleted {
            workspace: key.clone(),
        });

        assert!(a.is_closed() && b.is_closed());
        assert_eq!(h.jobs.iter().filter(|j| matches!(j, Job::Kill { .. })).count(), 2);
        assert_eq!(
            h.jobs.last(),
            Some(&Job::KillWorkspaceSessions {
                workspace_id: "ws1".to_string()
            })
        );
        assert_eq!(h.count(|e| matches!(e, Event::WorkspaceRemoved { .. })), 1);
        assert!(h.engine.registry().get(&key).is_none());
    }

    #[test]
    fn test_rebind_restarts_readers_under_the_new_key() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir(&root).unwrap();
        let old = WorkspaceRecord::new("ws1", root.join("."));
        let new = WorkspaceRecord::new("ws1", &root);

        let mut h = Harness::new();
        let (old_key, id, handle) = h.open_tab(&old);
        h.send(Msg::Rebind {
            old: old.clone(),
            new: new.clone(),
        });
        assert_eq!(h.count(|e| matches!(e, Event::WorkspaceRebound { .. })), 1);
        assert_eq!(handle.readers_cloned(), 2);
        assert!(!handle.is_closed());

        handle.emit(b"still here");
        h.pump_until(|h| !h.timers.is_empty());
        h.advance(Duration::from_millis(20));
        assert_eq!(h.model(0).lock().unwrap().written(), b"still here");

        // Requests addressed to the retired key still land.
        h.send(Msg::Input {
            workspace: old_key.clone(),
            tab: id.clone(),
            data: b"pwd\r".to_vec(),
        });
        assert_eq!(handle.written(), b"pwd\r");
        h.send(Msg::Resize {
            workspace: old_key,
            tab: id,
            cols: 132,
            rows: 50,
        });
        assert_eq!(handle.size(), (132, 50));
    }

    #[test]
    fn test_drag_past_edge_scrolls_and_release_copies() {
        let mut h = Harness::new();
        let (key, id, _handle) = h.open_tab(&record());
        let mouse = |kind, x, y| Msg::Mouse {
            workspace: key.clone(),
            tab: id.clone(),
            kind,
            x,
            y,
        };

        h.send(mouse(MouseKind::Press, 5, 5));
        h.send(mouse(MouseKind::Drag, 5, -3));
        assert_eq!(h.timers.len(), 1);

        h.advance(Duration::from_millis(125));
        assert_eq!(h.model(0).lock().unwrap().offset, 3);

        h.send(mouse(MouseKind::Release, 5, -3));
        assert_eq!(h.copies.len(), 1);
        // The pending tick is stale once the button is up.
        h.advance(Duration::from_millis(100));
        assert_eq!(h.model(0).lock().unwrap().offset, 3);
    }
}
