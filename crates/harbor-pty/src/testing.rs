//! In-memory stand-ins for [`Process`] and [`Spawner`].
//!
//! Enabled for this crate's tests and for dependents through the `testing`
//! feature.

use std::io::Read;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::pty::{Process, PtyError, SpawnSpec, Spawner};

#[derive(Default)]
struct FakeState {
    written: Vec<u8>,
    size: (u16, u16),
    closed: bool,
    exited: bool,
    feeds: Vec<Sender<Vec<u8>>>,
    readers_cloned: usize,
}

/// Test-side handle to a [`FakeProcess`] that was handed to the code under test.
#[derive(Clone, Default)]
pub struct FakeProcessHandle(Arc<Mutex<FakeState>>);

impl FakeProcessHandle {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make `bytes` readable from the most recently cloned reader.
    pub fn emit(&self, bytes: &[u8]) {
        let state = self.state();
        if let Some(feed) = state.feeds.last() {
            let _ = feed.send(bytes.to_vec());
        }
    }

    /// End output on every reader (EOF) without closing the process.
    pub fn hang_up_readers(&self) {
        self.state().feeds.clear();
    }

    /// Simulate the process exiting on its own.
    pub fn exit(&self) {
        let mut state = self.state();
        state.exited = true;
        state.feeds.clear();
    }

    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub fn size(&self) -> (u16, u16) {
        self.state().size
    }

    pub fn is_closed(&self) -> bool {
        let state = self.state();
        state.closed || state.exited
    }

    pub fn readers_cloned(&self) -> usize {
        self.state().readers_cloned
    }
}

/// A process whose output is scripted through its [`FakeProcessHandle`].
pub struct FakeProcess {
    handle: FakeProcessHandle,
}

impl FakeProcess {
    pub fn new(cols: u16, rows: u16) -> (Self, FakeProcessHandle) {
        let handle = FakeProcessHandle::default();
        handle.state().size = (cols, rows);
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl Process for FakeProcess {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        let mut state = self.handle.state();
        if state.closed {
            return Err(PtyError::Closed);
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        let mut state = self.handle.state();
        if state.closed {
            return Err(PtyError::Closed);
        }
        state.size = (cols, rows);
        Ok(())
    }

    fn clone_reader(&self) -> Result<Box<dyn Read + Send>, PtyError> {
        let mut state = self.handle.state();
        if state.closed || state.exited {
            return Err(PtyError::Closed);
        }
        let (tx, rx) = mpsc::channel();
        state.feeds.push(tx);
        state.readers_cloned += 1;
        Ok(Box::new(FeedReader {
            rx,
            pending: Vec::new(),
        }))
    }

    fn close(&mut self) {
        let mut state = self.handle.state();
        state.closed = true;
        state.feeds.clear();
    }

    fn is_closed(&mut self) -> bool {
        self.handle.is_closed()
    }
}

struct FeedReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for FeedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Spawner that hands out [`FakeProcess`]es and remembers what it was asked for.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    inner: Arc<Mutex<FakeSpawnerState>>,
}

#[derive(Default)]
struct FakeSpawnerState {
    specs: Vec<SpawnSpec>,
    handles: Vec<FakeProcessHandle>,
    fail_next: Option<String>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeSpawnerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make the next spawn fail with `msg`.
    pub fn fail_next(&self, msg: &str) {
        self.state().fail_next = Some(msg.to_string());
    }

    pub fn specs(&self) -> Vec<SpawnSpec> {
        self.state().specs.clone()
    }

    pub fn handles(&self) -> Vec<FakeProcessHandle> {
        self.state().handles.clone()
    }

    pub fn last_handle(&self) -> Option<FakeProcessHandle> {
        self.state().handles.last().cloned()
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, spec: &SpawnSpec, cols: u16, rows: u16) -> Result<Box<dyn Process>, PtyError> {
        let mut state = self.state();
        state.specs.push(spec.clone());
        if let Some(msg) = state.fail_next.take() {
            return Err(PtyError::SpawnFailed(msg));
        }
        let (process, handle) = FakeProcess::new(cols, rows);
        state.handles.push(handle);
        Ok(Box::new(process))
    }
}
