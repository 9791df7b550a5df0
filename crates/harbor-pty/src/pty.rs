use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

/// Errors from PTY operations.
#[derive(Debug)]
pub enum PtyError {
    SpawnFailed(String),
    IoError(std::io::Error),
    ResizeFailed(String),
    /// The process handle was already closed.
    Closed,
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed(msg) => write!(f, "PTY spawn failed: {msg}"),
            PtyError::IoError(err) => write!(f, "PTY I/O error: {err}"),
            PtyError::ResizeFailed(msg) => write!(f, "PTY resize failed: {msg}"),
            PtyError::Closed => write!(f, "PTY is closed"),
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PtyError {
    fn from(err: std::io::Error) -> Self {
        PtyError::IoError(err)
    }
}

/// What to run inside a new pseudo-terminal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Program to run. `None` means the user's default shell.
    pub program: Option<String>,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Variables removed from the inherited environment.
    pub env_remove: Vec<String>,
}

impl SpawnSpec {
    /// The user's login shell in `cwd`.
    pub fn shell(cwd: Option<PathBuf>) -> Self {
        Self {
            cwd,
            ..Self::default()
        }
    }

    /// An explicit program with arguments.
    pub fn command<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: Some(program.to_string()),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn without_env(mut self, key: &str) -> Self {
        self.env_remove.push(key.to_string());
        self
    }
}

/// A running process attached to a pseudo-terminal.
///
/// This is the capability a tab holds: write input, resize, hand out
/// readers for the output pipeline, and close. A reader cloned from a
/// process stays valid until the process is closed, so a new reader can be
/// started against the same handle after the previous one stopped.
pub trait Process: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError>;
    fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError>;
    fn clone_reader(&self) -> Result<Box<dyn Read + Send>, PtyError>;
    /// Terminate the process. Idempotent.
    fn close(&mut self);
    /// Whether the process has been closed or has exited on its own.
    fn is_closed(&mut self) -> bool;
}

/// Starts processes on pseudo-terminals.
pub trait Spawner: Send + Sync {
    fn spawn(&self, spec: &SpawnSpec, cols: u16, rows: u16) -> Result<Box<dyn Process>, PtyError>;
}

/// Spawns processes on the host's native PTY system.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeSpawner;

impl Spawner for NativeSpawner {
    fn spawn(&self, spec: &SpawnSpec, cols: u16, rows: u16) -> Result<Box<dyn Process>, PtyError> {
        Ok(Box::new(PtyHandle::spawn(spec, cols, rows)?))
    }
}

/// Owns a portable-pty child process, master pair, and writer.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    closed: bool,
}

impl PtyHandle {
    /// Spawn a new PTY running `spec` with the given dimensions.
    pub fn spawn(spec: &SpawnSpec, cols: u16, rows: u16) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(cols, rows))
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = match spec.program.as_deref() {
            Some(program) => CommandBuilder::new(program),
            None => CommandBuilder::new(default_shell()),
        };
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.cwd(cwd);
        }
        for key in &spec.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn command: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: pair.master,
            writer: Some(writer),
            child,
            closed: false,
        })
    }

    /// Get the child process exit status if it has exited.
    pub fn try_wait(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }
}

impl Process for PtyHandle {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        let writer = self.writer.as_mut().ok_or(PtyError::Closed)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        if self.closed {
            return Err(PtyError::Closed);
        }
        self.master
            .resize(pty_size(cols, rows))
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    fn clone_reader(&self) -> Result<Box<dyn Read + Send>, PtyError> {
        if self.closed {
            return Err(PtyError::Closed);
        }
        self.master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.writer = None;
        if self.try_wait().is_none() {
            if let Err(e) = self.child.kill() {
                log::debug!("kill on close failed: {e}");
            }
            // Reap so the child does not linger as a zombie.
            let _ = self.child.wait();
        }
    }

    fn is_closed(&mut self) -> bool {
        self.closed || self.try_wait().is_some()
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows: rows.max(1),
        cols: cols.max(1),
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}
