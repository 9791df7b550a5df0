//! harbor-vt: terminal model for Harbor tabs.
//!
//! Provides a small Rust API over `alacritty_terminal`: raw PTY bytes go in,
//! and callers read back cursor state, damaged rows, alternate-screen mode,
//! a monotonic content version, scrollback position and selected text.
//! Styled rendering lives elsewhere; this crate only tracks grid state.

pub mod screen;
pub mod terminal;

pub use screen::{CursorState, DamageInfo, DamagedRow, GridPoint, ScreenView};
pub use terminal::VtTerminal;
