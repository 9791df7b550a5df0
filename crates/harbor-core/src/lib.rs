//! harbor-core: the terminal session engine.
//!
//! One [`Engine`] owns every tab. It is driven by a single consumer that
//! feeds it [`Msg`]s and executes the [`Command`]s it returns; background
//! readers and blocking lifecycle jobs only talk to it through that inbox.
//! [`Runtime`] is the tokio implementation of that consumer.
//!
//! # Modules
//!
//! - [`registry`]: tabs per workspace, active tab, creation guard.
//! - [`flush`]: coalescing reader output into timed model writes.
//! - [`supervisor`]: restart backoff and budget.
//! - [`lifecycle`]: create, reattach, restart and kill against tmux.
//! - [`selection`]: mouse selection with auto-scroll ticks.
//! - [`rebind`]: moving tabs when a workspace's key changes.

pub mod clipboard;
pub mod clock;
pub mod config;
pub mod engine;
pub mod flush;
pub mod lifecycle;
pub mod message;
pub mod model;
pub mod rebind;
pub mod registry;
pub mod runtime;
pub mod selection;
pub mod state;
pub mod supervisor;

pub use clipboard::{ClipboardSink, MemoryClipboard, SystemClipboard};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::EngineConfig;
pub use engine::Engine;
pub use lifecycle::{LifecycleError, SessionLifecycleManager};
pub use message::{Command, Event, Job, MouseKind, Msg};
pub use model::{vt_factory, ModelFactory, TerminalModel};
pub use runtime::Runtime;
pub use state::TabId;
