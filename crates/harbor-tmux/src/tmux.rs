use std::path::Path;
use std::process::{Command, Output};

use harbor_pty::SpawnSpec;

/// Errors from the external multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// The multiplexer binary could not be run at all.
    Unavailable(String),
    /// The multiplexer ran and reported a failure.
    CommandFailed(String),
    /// The named session does not exist.
    NoSuchSession(String),
}

impl std::fmt::Display for MuxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuxError::Unavailable(msg) => write!(f, "multiplexer unavailable: {msg}"),
            MuxError::CommandFailed(msg) => write!(f, "multiplexer command failed: {msg}"),
            MuxError::NoSuchSession(name) => write!(f, "no such session: {name}"),
        }
    }
}

impl std::error::Error for MuxError {}

/// Control surface of an out-of-process session multiplexer.
///
/// Sessions are addressed by name. Tags are string options stored on the
/// session itself, so they survive this program's restarts.
pub trait Multiplexer: Send + Sync {
    /// Whether the multiplexer binary can be run.
    fn is_available(&self) -> bool;

    fn has_session(&self, name: &str) -> Result<bool, MuxError>;

    /// Whether the session exists and at least one of its panes still runs
    /// a process.
    fn has_live_pane(&self, name: &str) -> Result<bool, MuxError>;

    /// Create a detached session running the default shell.
    fn new_session(
        &self,
        name: &str,
        cwd: Option<&Path>,
        cols: u16,
        rows: u16,
    ) -> Result<(), MuxError>;

    /// The command a local client runs to attach to `name`.
    fn attach_spec(&self, name: &str) -> SpawnSpec;

    fn kill_session(&self, name: &str) -> Result<(), MuxError>;

    fn list_sessions(&self) -> Result<Vec<String>, MuxError>;

    fn set_tag(&self, name: &str, key: &str, value: &str) -> Result<(), MuxError>;

    /// Read a tag. `Ok(None)` when the tag is unset.
    fn get_tag(&self, name: &str, key: &str) -> Result<Option<String>, MuxError>;

    /// Up to `lines` lines of history plus the visible screen, with escape
    /// sequences preserved.
    fn capture_history(&self, name: &str, lines: usize) -> Result<Vec<u8>, MuxError>;
}

/// [`Multiplexer`] backed by the `tmux` command-line client.
#[derive(Clone, Debug)]
pub struct TmuxCli {
    binary: String,
}

impl Default for TmuxCli {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxCli {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn run(&self, args: &[String]) -> Result<Output, MuxError> {
        Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| MuxError::Unavailable(format!("failed to run {}: {e}", self.binary)))
    }

    /// Run and require success, returning stdout.
    fn run_ok(&self, args: &[String]) -> Result<Vec<u8>, MuxError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(classify_failure(&output.stderr));
        }
        Ok(output.stdout)
    }
}

impl Multiplexer for TmuxCli {
    fn is_available(&self) -> bool {
        self.run(&strings(&["-V"]))
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        let output = self.run(&has_session_args(name))?;
        Ok(output.status.success())
    }

    fn has_live_pane(&self, name: &str) -> Result<bool, MuxError> {
        let output = self.run(&list_panes_args(name))?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(any_live_pane(&String::from_utf8_lossy(&output.stdout)))
    }

    fn new_session(
        &self,
        name: &str,
        cwd: Option<&Path>,
        cols: u16,
        rows: u16,
    ) -> Result<(), MuxError> {
        self.run_ok(&new_session_args(name, cwd, cols, rows))?;
        Ok(())
    }

    fn attach_spec(&self, name: &str) -> SpawnSpec {
        SpawnSpec::command(&self.binary, attach_args(name)).without_env("TMUX")
    }

    fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        self.run_ok(&strings(&["kill-session", "-t", &exact(name)]))?;
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        let output = self.run(&strings(&["list-sessions", "-F", "#{session_name}"]))?;
        if !output.status.success() {
            // No server running means no sessions.
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("error connecting") {
                return Ok(Vec::new());
            }
            return Err(MuxError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn set_tag(&self, name: &str, key: &str, value: &str) -> Result<(), MuxError> {
        self.run_ok(&set_tag_args(name, key, value))?;
        Ok(())
    }

    fn get_tag(&self, name: &str, key: &str) -> Result<Option<String>, MuxError> {
        let output = self.run(&get_tag_args(name, key))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_session(&stderr) {
                return Err(MuxError::NoSuchSession(name.to_string()));
            }
            // Unset user options are reported as failures; treat as absent.
            return Ok(None);
        }
        let value = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    fn capture_history(&self, name: &str, lines: usize) -> Result<Vec<u8>, MuxError> {
        self.run_ok(&capture_args(name, lines))
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Target a session by exact name rather than tmux's prefix matching.
fn exact(name: &str) -> String {
    format!("={name}")
}

/// Exact session target for commands that resolve a pane. Without the
/// trailing colon tmux reads `=name` as a window or pane and fails.
fn exact_pane(name: &str) -> String {
    format!("={name}:")
}

fn has_session_args(name: &str) -> Vec<String> {
    strings(&["has-session", "-t", &exact(name)])
}

fn list_panes_args(name: &str) -> Vec<String> {
    strings(&["list-panes", "-s", "-t", &exact(name), "-F", "#{pane_dead}"])
}

fn new_session_args(name: &str, cwd: Option<&Path>, cols: u16, rows: u16) -> Vec<String> {
    let mut args = strings(&[
        "new-session",
        "-d",
        "-s",
        name,
        "-x",
        &cols.to_string(),
        "-y",
        &rows.to_string(),
    ]);
    if let Some(dir) = cwd {
        args.push("-c".to_string());
        args.push(dir.to_string_lossy().to_string());
    }
    args
}

fn attach_args(name: &str) -> Vec<String> {
    strings(&["attach-session", "-t", &exact(name)])
}

fn set_tag_args(name: &str, key: &str, value: &str) -> Vec<String> {
    strings(&["set-option", "-t", &exact_pane(name), &option_name(key), value])
}

fn get_tag_args(name: &str, key: &str) -> Vec<String> {
    strings(&["show-options", "-v", "-t", &exact_pane(name), &option_name(key)])
}

fn capture_args(name: &str, lines: usize) -> Vec<String> {
    strings(&[
        "capture-pane",
        "-p",
        "-e",
        "-J",
        "-t",
        &exact_pane(name),
        "-S",
        &format!("-{lines}"),
    ])
}

/// tmux user options must start with `@`.
fn option_name(key: &str) -> String {
    if key.starts_with('@') {
        key.to_string()
    } else {
        format!("@{key}")
    }
}

fn any_live_pane(list_panes_output: &str) -> bool {
    list_panes_output.lines().any(|line| line.trim() == "0")
}

fn is_missing_session(stderr: &str) -> bool {
    stderr.contains("can't find session")
        || stderr.contains("no such session")
        || stderr.contains("no server running")
        || stderr.contains("session not found")
}

fn classify_failure(stderr: &[u8]) -> MuxError {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    if is_missing_session(&stderr) {
        MuxError::NoSuchSession(stderr)
    } else {
        MuxError::CommandFailed(stderr)
    }
}
