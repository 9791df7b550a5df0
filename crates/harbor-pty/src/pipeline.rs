//! Per-tab output pipeline: a blocking reader worker and a merge/forward worker.
//!
//! PTY reads block, so each tab gets a dedicated reader thread that reads
//! fixed-size chunks and pushes them into a small bounded queue. A second
//! thread drains that queue, concatenates whatever chunks are already
//! waiting, and hands the merged chunk to the consumer through a sink
//! callback. Neither thread touches tab state directly.
//!
//! EOF or a read error closes the queue. The forward worker treats the
//! closed queue as "stopped" and reports the captured error, if any.
//!
//! Cancellation is cooperative. [`StopSignal::stop`] can be called any
//! number of times; both workers check it at every hand-off. A reader
//! parked inside `read()` cannot be interrupted, so it may linger until its
//! next read returns, but nothing it reads after the stop is forwarded.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::pty::PtyError;

/// Bytes requested per blocking read.
pub const DEFAULT_READ_CHUNK: usize = 32 * 1024;

/// Chunks the reader may queue ahead of the forward worker.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Upper bound on a single merged chunk handed to the consumer.
pub const DEFAULT_MAX_MERGE: usize = 256 * 1024;

/// How often an idle forward worker re-checks the stop signal.
const STOP_POLL: Duration = Duration::from_millis(50);

/// One-shot stop request shared by a pipeline's workers.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the workers to exit. Safe to call repeatedly.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Liveness timestamp refreshed on every chunk the reader produces.
///
/// Cleared when the pipeline stops, so `None` means "no live reader".
#[derive(Clone, Debug, Default)]
pub struct Heartbeat(Arc<Mutex<Option<Instant>>>);

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat(&self) {
        if let Ok(mut last) = self.0.lock() {
            *last = Some(Instant::now());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut last) = self.0.lock() {
            *last = None;
        }
    }

    pub fn last(&self) -> Option<Instant> {
        self.0.lock().ok().and_then(|last| *last)
    }
}

/// Handles the owner keeps to control a running pipeline.
#[derive(Clone, Debug)]
pub struct ReaderControl {
    pub stop: StopSignal,
    pub heartbeat: Heartbeat,
}

impl ReaderControl {
    /// Request the pipeline to stop.
    pub fn stop(&self) {
        self.stop.stop();
    }
}

/// Events delivered to the pipeline's sink.
#[derive(Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    /// One or more reader chunks, concatenated in read order.
    Output(Vec<u8>),
    /// The reader hit EOF (`None`) or failed with the given error.
    Stopped(Option<String>),
}

/// Sizing knobs for a pipeline.
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub read_chunk: usize,
    pub queue_depth: usize,
    pub max_merge: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_merge: DEFAULT_MAX_MERGE,
        }
    }
}

/// Start the reader and forward workers for one tab.
///
/// `sink` runs on the forward thread and returns `false` once the consumer
/// is gone, which ends the pipeline. `Stopped` is only delivered when the
/// pipeline ended on its own, never after [`StopSignal::stop`].
pub fn start_pipeline<F>(
    label: &str,
    reader: Box<dyn Read + Send>,
    config: PipelineConfig,
    sink: F,
) -> Result<ReaderControl, PtyError>
where
    F: FnMut(PipelineEvent) -> bool + Send + 'static,
{
    let control = ReaderControl {
        stop: StopSignal::new(),
        heartbeat: Heartbeat::new(),
    };
    let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(config.queue_depth.max(1));
    let failure = Arc::new(Mutex::new(None::<String>));

    // Start with a beat so a freshly started reader does not look stalled.
    control.heartbeat.beat();

    {
        let control = control.clone();
        let failure = Arc::clone(&failure);
        let chunk = config.read_chunk.max(1);
        std::thread::Builder::new()
            .name(format!("pty-read-{label}"))
            .spawn(move || read_loop(reader, chunk, tx, &control, &failure))
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn reader thread: {e}")))?;
    }

    {
        let fwd_control = control.clone();
        let max_merge = config.max_merge.max(1);
        let spawned = std::thread::Builder::new()
            .name(format!("pty-fwd-{label}"))
            .spawn(move || forward_loop(rx, max_merge, sink, &fwd_control, &failure));
        if let Err(e) = spawned {
            control.stop();
            return Err(PtyError::SpawnFailed(format!(
                "failed to spawn forward thread: {e}"
            )));
        }
    }

    Ok(control)
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    chunk: usize,
    tx: mpsc::SyncSender<Vec<u8>>,
    control: &ReaderControl,
    failure: &Mutex<Option<String>>,
) {
    let mut buf = vec![0u8; chunk];

    loop {
        if control.stop.is_stopped() {
            break;
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if let Ok(mut slot) = failure.lock() {
                    *slot = Some(e.to_string());
                }
                break;
            }
        };

        control.heartbeat.beat();

        // Blocks while the queue is full; this is the backpressure point.
        if tx.send(buf[..n].to_vec()).is_err() {
            break;
        }
    }
    // Dropping `tx` closes the queue.
}

fn forward_loop<F>(
    rx: mpsc::Receiver<Vec<u8>>,
    max_merge: usize,
    mut sink: F,
    control: &ReaderControl,
    failure: &Mutex<Option<String>>,
) where
    F: FnMut(PipelineEvent) -> bool,
{
    loop {
        let mut merged = match rx.recv_timeout(STOP_POLL) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => {
                if control.stop.is_stopped() {
                    control.heartbeat.clear();
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        while merged.len() < max_merge {
            match rx.try_recv() {
                Ok(chunk) => merged.extend_from_slice(&chunk),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        if control.stop.is_stopped() {
            control.heartbeat.clear();
            return;
        }
        if !sink(PipelineEvent::Output(merged)) {
            control.stop();
            control.heartbeat.clear();
            return;
        }
    }

    control.heartbeat.clear();
    if control.stop.is_stopped() {
        return;
    }
    let err = failure.lock().ok().and_then(|mut slot| slot.take());
    sink(PipelineEvent::Stopped(err));
}
