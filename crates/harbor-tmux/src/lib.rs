//! harbor-tmux: control surface for the external session multiplexer.
//!
//! Shells started inside a tmux session outlive this program. This crate
//! wraps the `tmux` CLI behind the [`Multiplexer`] trait, derives stable
//! session names from workspace and tab ids, and defines the metadata tags
//! written onto each session.

pub mod naming;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tmux;

pub use naming::{session_name, SessionTags};
pub use tmux::{Multiplexer, MuxError, TmuxCli};
