//! Engine tunables and their persistence in the settings table.

use std::str::FromStr;
use std::time::Duration;

use harbor_db::settings;
use rusqlite::Connection;

use crate::flush::FlushProfile;
use crate::supervisor::RestartPolicy;

pub const SETTING_FAST_QUIET_MS: &str = "terminal.flush_fast_quiet_ms";
pub const SETTING_FAST_MAX_MS: &str = "terminal.flush_fast_max_ms";
pub const SETTING_SLOW_QUIET_MS: &str = "terminal.flush_slow_quiet_ms";
pub const SETTING_SLOW_MAX_MS: &str = "terminal.flush_slow_max_ms";
pub const SETTING_FLUSH_CHUNK: &str = "terminal.flush_chunk_bytes";
pub const SETTING_OVERFLOW_CAP: &str = "terminal.overflow_cap_bytes";
pub const SETTING_RESTART_INITIAL_MS: &str = "terminal.restart_initial_ms";
pub const SETTING_RESTART_MAX_MS: &str = "terminal.restart_max_ms";
pub const SETTING_RESTART_WINDOW_SECS: &str = "terminal.restart_window_secs";
pub const SETTING_RESTART_CAP: &str = "terminal.restart_max_attempts";
pub const SETTING_TAG_VERIFY_ATTEMPTS: &str = "terminal.tag_verify_attempts";
pub const SETTING_TAG_VERIFY_INTERVAL_MS: &str = "terminal.tag_verify_interval_ms";
pub const SETTING_PRELOAD_LINES: &str = "terminal.preload_lines";
pub const SETTING_SCROLLBACK_LINES: &str = "terminal.scrollback_lines";
pub const SETTING_AUTOSCROLL_MS: &str = "terminal.autoscroll_interval_ms";
pub const SETTING_WATCHDOG_MS: &str = "terminal.watchdog_interval_ms";
pub const SETTING_STALL_TIMEOUT_MS: &str = "terminal.stall_timeout_ms";
pub const SETTING_COLS: &str = "terminal.default_cols";
pub const SETTING_ROWS: &str = "terminal.default_rows";
pub const SETTING_SHELL: &str = "terminal.shell";
pub const SETTING_TMUX_BINARY: &str = "terminal.tmux_binary";
pub const SETTING_PERSISTENT: &str = "terminal.persistent_sessions";

/// Every tunable of the terminal engine.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub fast: FlushProfile,
    pub slow: FlushProfile,
    /// Largest single write into the terminal model.
    pub flush_chunk: usize,
    /// Delay before the next chunk of a large flush.
    pub flush_follow_up: Duration,
    /// Buffered-but-unflushed bytes kept per tab before the oldest are dropped.
    pub overflow_cap: usize,
    pub restart: RestartPolicy,
    pub tag_verify_attempts: u32,
    pub tag_verify_interval: Duration,
    /// Lines of an existing session's history replayed into a new client.
    pub preload_lines: usize,
    pub scrollback_lines: usize,
    pub autoscroll_interval: Duration,
    pub watchdog_interval: Duration,
    pub stall_timeout: Duration,
    pub cols: u16,
    pub rows: u16,
    /// Shell override; `None` uses the user's login shell.
    pub shell: Option<String>,
    pub tmux_binary: String,
    /// Keep shells in tmux so they survive restarts of this program.
    pub persistent: bool,
    /// Screen cell where the terminal grid starts, for mouse translation.
    pub grid_origin: (u16, u16),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fast: FlushProfile::FAST,
            slow: FlushProfile::SLOW,
            flush_chunk: 32 * 1024,
            flush_follow_up: Duration::from_millis(1),
            overflow_cap: 4 * 1024 * 1024,
            restart: RestartPolicy::default(),
            tag_verify_attempts: 10,
            tag_verify_interval: Duration::from_millis(200),
            preload_lines: 2000,
            scrollback_lines: 10_000,
            autoscroll_interval: Duration::from_millis(40),
            watchdog_interval: Duration::from_secs(2),
            stall_timeout: Duration::from_secs(10),
            cols: 80,
            rows: 24,
            shell: None,
            tmux_binary: "tmux".to_string(),
            persistent: true,
            grid_origin: (0, 0),
        }
    }
}

impl EngineConfig {
    /// Read the configuration from the settings table.
    ///
    /// Missing or unparsable values keep their defaults.
    pub fn load(conn: &Connection) -> Self {
        let mut config = Self::default();

        config.fast.quiet = read_ms(conn, SETTING_FAST_QUIET_MS, config.fast.quiet);
        config.fast.max = read_ms(conn, SETTING_FAST_MAX_MS, config.fast.max);
        config.slow.quiet = read_ms(conn, SETTING_SLOW_QUIET_MS, config.slow.quiet);
        config.slow.max = read_ms(conn, SETTING_SLOW_MAX_MS, config.slow.max);
        config.flush_chunk = read(conn, SETTING_FLUSH_CHUNK, config.flush_chunk).max(1);
        config.overflow_cap = read(conn, SETTING_OVERFLOW_CAP, config.overflow_cap);

        config.restart.initial_backoff =
            read_ms(conn, SETTING_RESTART_INITIAL_MS, config.restart.initial_backoff);
        config.restart.max_backoff =
            read_ms(conn, SETTING_RESTART_MAX_MS, config.restart.max_backoff);
        config.restart.window = Duration::from_secs(read(
            conn,
            SETTING_RESTART_WINDOW_SECS,
            config.restart.window.as_secs(),
        ));
        config.restart.max_attempts = read(conn, SETTING_RESTART_CAP, config.restart.max_attempts);

        config.tag_verify_attempts =
            read(conn, SETTING_TAG_VERIFY_ATTEMPTS, config.tag_verify_attempts);
        config.tag_verify_interval =
            read_ms(conn, SETTING_TAG_VERIFY_INTERVAL_MS, config.tag_verify_interval);
        config.preload_lines = read(conn, SETTING_PRELOAD_LINES, config.preload_lines);
        config.scrollback_lines = read(conn, SETTING_SCROLLBACK_LINES, config.scrollback_lines);
        config.autoscroll_interval =
            read_ms(conn, SETTING_AUTOSCROLL_MS, config.autoscroll_interval);
        config.watchdog_interval = read_ms(conn, SETTING_WATCHDOG_MS, config.watchdog_interval);
        config.stall_timeout = read_ms(conn, SETTING_STALL_TIMEOUT_MS, config.stall_timeout);
        config.cols = read(conn, SETTING_COLS, config.cols).max(1);
        config.rows = read(conn, SETTING_ROWS, config.rows).max(1);

        config.shell = read_string(conn, SETTING_SHELL).filter(|s| !s.trim().is_empty());
        if let Some(binary) = read_string(conn, SETTING_TMUX_BINARY) {
            config.tmux_binary = binary;
        }
        config.persistent = read(conn, SETTING_PERSISTENT, config.persistent);

        config
    }

    /// Write every value to the settings table.
    pub fn store(&self, conn: &Connection) -> rusqlite::Result<()> {
        let ms = |d: Duration| d.as_millis().to_string();

        settings::set(conn, SETTING_FAST_QUIET_MS, &ms(self.fast.quiet))?;
        settings::set(conn, SETTING_FAST_MAX_MS, &ms(self.fast.max))?;
        settings::set(conn, SETTING_SLOW_QUIET_MS, &ms(self.slow.quiet))?;
        settings::set(conn, SETTING_SLOW_MAX_MS, &ms(self.slow.max))?;
        settings::set(conn, SETTING_FLUSH_CHUNK, &self.flush_chunk.to_string())?;
        settings::set(conn, SETTING_OVERFLOW_CAP, &self.overflow_cap.to_string())?;
        settings::set(conn, SETTING_RESTART_INITIAL_MS, &ms(self.restart.initial_backoff))?;
        settings::set(conn, SETTING_RESTART_MAX_MS, &ms(self.restart.max_backoff))?;
        settings::set(
            conn,
            SETTING_RESTART_WINDOW_SECS,
            &self.restart.window.as_secs().to_string(),
        )?;
        settings::set(conn, SETTING_RESTART_CAP, &self.restart.max_attempts.to_string())?;
        settings::set(
            conn,
            SETTING_TAG_VERIFY_ATTEMPTS,
            &self.tag_verify_attempts.to_string(),
        )?;
        settings::set(conn, SETTING_TAG_VERIFY_INTERVAL_MS, &ms(self.tag_verify_interval))?;
        settings::set(conn, SETTING_PRELOAD_LINES, &self.preload_lines.to_string())?;
        settings::set(conn, SETTING_SCROLLBACK_LINES, &self.scrollback_lines.to_string())?;
        settings::set(conn, SETTING_AUTOSCROLL_MS, &ms(self.autoscroll_interval))?;
        settings::set(conn, SETTING_WATCHDOG_MS, &ms(self.watchdog_interval))?;
        settings::set(conn, SETTING_STALL_TIMEOUT_MS, &ms(self.stall_timeout))?;
        settings::set(conn, SETTING_COLS, &self.cols.to_string())?;
        settings::set(conn, SETTING_ROWS, &self.rows.to_string())?;
        match &self.shell {
            Some(shell) => settings::set(conn, SETTING_SHELL, shell)?,
            None => settings::remove(conn, SETTING_SHELL)?,
        }
        settings::set(conn, SETTING_TMUX_BINARY, &self.tmux_binary)?;
        settings::set(conn, SETTING_PERSISTENT, &self.persistent.to_string())?;
        Ok(())
    }

    /// Timing profile for a tab, depending on whether it shows the alternate screen.
    pub fn profile(&self, alt_screen: bool) -> FlushProfile {
        if alt_screen {
            self.slow
        } else {
            self.fast
        }
    }
}

fn read_string(conn: &Connection, key: &str) -> Option<String> {
    settings::get(conn, key).ok().flatten()
}

fn read<T: FromStr>(conn: &Connection, key: &str, default: T) -> T {
    read_string(conn, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn read_ms(conn: &Connection, key: &str, default: Duration) -> Duration {
    read_string(conn, key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.fast.quiet, Duration::from_millis(12));
        assert_eq!(config.fast.max, Duration::from_millis(50));
        assert_eq!(config.slow.quiet, Duration::from_millis(30));
        assert_eq!(config.slow.max, Duration::from_millis(120));
        assert_eq!(config.flush_chunk, 32 * 1024);
        assert_eq!(config.restart.max_attempts, 5);
        assert_eq!(config.autoscroll_interval, Duration::from_millis(40));
    }

    #[test]
    fn test_empty_database_yields_defaults() {
        let conn = harbor_db::open_in_memory().unwrap();
        assert_eq!(EngineConfig::load(&conn), EngineConfig::default());
    }

    #[test]
    fn test_store_then_load_preserves_changes() {
        let conn = harbor_db::open_in_memory().unwrap();
        let config = EngineConfig {
            shell: Some("/bin/zsh".to_string()),
            persistent: false,
            restart: RestartPolicy {
                max_attempts: 3,
                ..RestartPolicy::default()
            },
            cols: 132,
            ..EngineConfig::default()
        };
        config.store(&conn).unwrap();

        assert_eq!(EngineConfig::load(&conn), config);
    }

    #[test]
    fn test_bad_values_fall_back_to_defaults() {
        let conn = harbor_db::open_in_memory().unwrap();
        settings::set(&conn, SETTING_FAST_QUIET_MS, "soon").unwrap();
        settings::set(&conn, SETTING_RESTART_CAP, "-1").unwrap();
        settings::set(&conn, SETTING_ROWS, "0").unwrap();
        settings::set(&conn, SETTING_SHELL, "  ").unwrap();

        let config = EngineConfig::load(&conn);
        assert_eq!(config.fast.quiet, Duration::from_millis(12));
        assert_eq!(config.restart.max_attempts, 5);
        assert_eq!(config.rows, 1, "zero rows is clamped");
        assert_eq!(config.shell, None);
    }

    #[test]
    fn test_alt_screen_selects_slow_profile() {
        let config = EngineConfig::default();
        assert_eq!(config.profile(true), FlushProfile::SLOW);
        assert_eq!(config.profile(false), FlushProfile::FAST);
    }
}
