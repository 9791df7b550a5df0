//! harbor-pty: pseudo-terminal processes and the per-tab output pipeline.
//!
//! # Architecture
//!
//! - [`Process`] and [`Spawner`]: the capability a tab holds over its shell
//!   process, and the factory that creates it. [`PtyHandle`] and
//!   [`NativeSpawner`] are the `portable-pty` implementations.
//! - [`start_pipeline`]: the blocking reader and merge/forward workers that
//!   move process output to the single-threaded consumer.

pub mod pipeline;
pub mod pty;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use pipeline::{
    start_pipeline, Heartbeat, PipelineConfig, PipelineEvent, ReaderControl, StopSignal,
};
pub use pty::{default_shell, NativeSpawner, Process, PtyError, PtyHandle, SpawnSpec, Spawner};
