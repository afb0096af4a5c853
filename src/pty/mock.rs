//! In-memory PTY provider
//!
//! Lets tests and headless hosts drive a "process" by hand: push output,
//! inspect what was written to stdin and which resizes arrived, and decide
//! when and how it exits.

use super::handle::PtyError;
use super::provider::{PtyChild, PtyControl, PtyProvider, SpawnRequest, SpawnedPty};
use anyhow::anyhow;
use parking_lot::Mutex;
use portable_pty::PtySize;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use tokio::sync::mpsc;

/// Exit code reported when a mock process is killed
pub const KILLED_EXIT_CODE: u32 = 137;

#[derive(Default)]
struct Shared {
    stdout: Mutex<Option<std_mpsc::Sender<Vec<u8>>>>,
    stderr: Mutex<Option<std_mpsc::Sender<Vec<u8>>>>,
    exit: Mutex<Option<std_mpsc::Sender<u32>>>,
    stdin: Mutex<Vec<u8>>,
    resizes: Mutex<Vec<(u16, u16)>>,
    kills: AtomicUsize,
    exited: AtomicBool,
}

impl Shared {
    fn finish(&self, code: u32) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stdout.lock().take();
        self.stderr.lock().take();
        if let Some(exit) = self.exit.lock().take() {
            let _ = exit.send(code);
        }
    }
}

/// Test-side view of one spawned mock process
#[derive(Clone)]
pub struct MockPty {
    request: SpawnRequest,
    initial_size: (u16, u16),
    shared: Arc<Shared>,
}

impl MockPty {
    pub fn request(&self) -> &SpawnRequest {
        &self.request
    }

    /// `(columns, rows)` the process was spawned with
    pub fn initial_size(&self) -> (u16, u16) {
        self.initial_size
    }

    /// Emit a stdout chunk
    pub fn send_stdout(&self, data: impl AsRef<[u8]>) {
        if let Some(tx) = self.shared.stdout.lock().as_ref() {
            let _ = tx.send(data.as_ref().to_vec());
        }
    }

    /// Emit a stderr chunk
    pub fn send_stderr(&self, data: impl AsRef<[u8]>) {
        if let Some(tx) = self.shared.stderr.lock().as_ref() {
            let _ = tx.send(data.as_ref().to_vec());
        }
    }

    /// Close the output streams and exit with `code`
    pub fn exit(&self, code: u32) {
        self.shared.finish(code);
    }

    pub fn has_exited(&self) -> bool {
        self.shared.exited.load(Ordering::SeqCst)
    }

    /// Everything written to stdin so far
    pub fn stdin(&self) -> Vec<u8> {
        self.shared.stdin.lock().clone()
    }

    /// Resize calls received, as `(columns, rows)`
    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.shared.resizes.lock().clone()
    }

    pub fn kill_count(&self) -> usize {
        self.shared.kills.load(Ordering::SeqCst)
    }
}

struct ChannelReader {
    rx: std_mpsc::Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending.extend(chunk),
                // Every sender dropped: the process is gone
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

struct SharedWriter(Arc<Shared>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.0.exited.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "process exited"));
        }
        self.0.stdin.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct MockControl(Arc<Shared>);

impl PtyControl for MockControl {
    fn resize(&self, size: PtySize) -> Result<(), PtyError> {
        if self.0.exited.load(Ordering::SeqCst) {
            return Err(PtyError::Resize(anyhow!("process exited")));
        }
        self.0.resizes.lock().push((size.cols, size.rows));
        Ok(())
    }

    fn kill(&self) -> Result<(), PtyError> {
        self.0.kills.fetch_add(1, Ordering::SeqCst);
        self.0.finish(KILLED_EXIT_CODE);
        Ok(())
    }
}

struct MockChild(std_mpsc::Receiver<u32>);

impl PtyChild for MockChild {
    fn wait(&mut self) -> Result<u32, PtyError> {
        self.0
            .recv()
            .map_err(|_| PtyError::Wait(anyhow!("mock process dropped")))
    }
}

/// Provider producing [`MockPty`] processes
pub struct MockPtyProvider {
    failure: Mutex<Option<String>>,
    spawned_tx: mpsc::UnboundedSender<MockPty>,
    spawned_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPty>>,
    spawn_count: AtomicUsize,
}

impl MockPtyProvider {
    pub fn new() -> Self {
        let (spawned_tx, spawned_rx) = mpsc::unbounded_channel();
        Self {
            failure: Mutex::new(None),
            spawned_tx,
            spawned_rx: tokio::sync::Mutex::new(spawned_rx),
            spawn_count: AtomicUsize::new(0),
        }
    }

    /// Provider whose spawns always fail with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        let provider = Self::new();
        *provider.failure.lock() = Some(message.into());
        provider
    }

    /// Number of spawn attempts, failed ones included
    pub fn spawn_count(&self) -> usize {
        self.spawn_count.load(Ordering::SeqCst)
    }

    /// Wait for the next successfully spawned process
    pub async fn next_spawned(&self) -> Option<MockPty> {
        self.spawned_rx.lock().await.recv().await
    }
}

impl Default for MockPtyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PtyProvider for MockPtyProvider {
    fn spawn(&self, request: &SpawnRequest, size: PtySize) -> Result<SpawnedPty, PtyError> {
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().clone() {
            return Err(PtyError::Spawn(anyhow!(message)));
        }

        let (stdout_tx, stdout_rx) = std_mpsc::channel();
        let (stderr_tx, stderr_rx) = std_mpsc::channel();
        let (exit_tx, exit_rx) = std_mpsc::channel();
        let shared = Arc::new(Shared {
            stdout: Mutex::new(Some(stdout_tx)),
            stderr: Mutex::new(Some(stderr_tx)),
            exit: Mutex::new(Some(exit_tx)),
            ..Default::default()
        });

        let _ = self.spawned_tx.send(MockPty {
            request: request.clone(),
            initial_size: (size.cols, size.rows),
            shared: Arc::clone(&shared),
        });

        Ok(SpawnedPty {
            stdout: Box::new(ChannelReader {
                rx: stdout_rx,
                pending: VecDeque::new(),
            }),
            stderr: Some(Box::new(ChannelReader {
                rx: stderr_rx,
                pending: VecDeque::new(),
            })),
            stdin: Box::new(SharedWriter(Arc::clone(&shared))),
            control: Box::new(MockControl(shared)),
            child: Box::new(MockChild(exit_rx)),
        })
    }
}
