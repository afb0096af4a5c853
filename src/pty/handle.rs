//! PTY handle: one shell process and its lifecycle
//!
//! `Starting → Running → Exited(code) | Errored(cause)`. Spawning happens on a
//! background thread, so a failed start shows up as an `Errored` outcome on the
//! returned handle rather than as an error from [`PtyHandle::spawn`].

use super::provider::{PtyChild, PtyControl, PtyProvider, SpawnRequest, SpawnedPty};
use parking_lot::Mutex;
use portable_pty::PtySize;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to create PTY: {0}")]
    Create(#[source] anyhow::Error),
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] anyhow::Error),
    #[error("failed to clone reader: {0}")]
    CloneReader(#[source] anyhow::Error),
    #[error("failed to get writer: {0}")]
    Writer(#[source] anyhow::Error),
    #[error("failed to resize PTY: {0}")]
    Resize(#[source] anyhow::Error),
    #[error("failed to kill process: {0}")]
    Kill(#[source] anyhow::Error),
    #[error("failed to wait for process: {0}")]
    Wait(#[source] anyhow::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle state of a [`PtyHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyStatus {
    Starting,
    Running,
    Exited(u32),
    Errored(String),
}

impl PtyStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PtyStatus::Exited(_) | PtyStatus::Errored(_))
    }
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyExit {
    Exited(u32),
    Errored(String),
}

/// Which stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtyStream {
    Stdout,
    Stderr,
}

/// A chunk of process output, delivered in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyChunk {
    pub stream: PtyStream,
    pub data: Vec<u8>,
}

/// Receiving end of a handle's output
pub type PtyOutput = mpsc::UnboundedReceiver<PtyChunk>;

enum Stdin {
    /// Process not started yet; writes are queued
    Pending(Vec<u8>),
    Ready(Box<dyn Write + Send>),
    Closed,
}

struct Inner {
    status: watch::Sender<PtyStatus>,
    control: Mutex<Option<Box<dyn PtyControl>>>,
    stdin: Mutex<Stdin>,
    size: Mutex<PtySize>,
    kill_requested: AtomicBool,
}

impl Inner {
    /// Move to `next` unless a terminal state was already reached
    fn transition(&self, next: PtyStatus) -> bool {
        self.status.send_if_modified(|status| {
            if status.is_terminal() {
                return false;
            }
            *status = next;
            true
        })
    }

    fn settle(&self, outcome: PtyStatus) {
        if self.transition(outcome) {
            *self.stdin.lock() = Stdin::Closed;
            self.control.lock().take();
        }
    }

    fn start(&self, spawned: SpawnedPty, spawned_size: PtySize, tx: mpsc::UnboundedSender<PtyChunk>) {
        let SpawnedPty {
            stdout,
            stderr,
            stdin,
            control,
            child,
        } = spawned;

        {
            let mut guard = self.stdin.lock();
            let mut writer = stdin;
            if let Stdin::Pending(queued) = &*guard {
                if !queued.is_empty() {
                    if let Err(e) = writer.write_all(queued).and_then(|_| writer.flush()) {
                        warn!("Failed to flush queued input: {}", e);
                    }
                }
            }
            *guard = Stdin::Ready(writer);
        }

        {
            // `resize` stores the size before taking this lock, so any size
            // stored after the read below is applied by `resize` itself
            let mut slot = self.control.lock();
            let wanted = *self.size.lock();
            if !same_size(&wanted, &spawned_size) {
                if let Err(e) = control.resize(wanted) {
                    debug!("Resize after spawn failed: {}", e);
                }
            }
            *slot = Some(control);
        }
        self.transition(PtyStatus::Running);

        if self.kill_requested.load(Ordering::SeqCst) {
            self.kill_now();
        }

        let stderr_thread = stderr.map(|reader| {
            let tx = tx.clone();
            std::thread::spawn(move || pump_reader(reader, PtyStream::Stderr, tx))
        });

        pump_reader(stdout, PtyStream::Stdout, tx);
        if let Some(thread) = stderr_thread {
            let _ = thread.join();
        }

        self.settle(wait_child(child));
    }

    fn kill_now(&self) {
        if let Some(control) = self.control.lock().as_ref() {
            if let Err(e) = control.kill() {
                debug!("Kill failed (process likely gone): {}", e);
            }
        }
    }
}

fn same_size(a: &PtySize, b: &PtySize) -> bool {
    a.rows == b.rows && a.cols == b.cols
}

fn pump_reader(mut reader: Box<dyn Read + Send>, stream: PtyStream, tx: mpsc::UnboundedSender<PtyChunk>) {
    let mut buffer = [0u8; 4096];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                debug!("PTY {:?} EOF", stream);
                break;
            }
            Ok(n) => {
                let chunk = PtyChunk {
                    stream,
                    data: buffer[..n].to_vec(),
                };
                if tx.send(chunk).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                // EIO is how Linux reports a closed PTY
                debug!("PTY {:?} read ended: {}", stream, e);
                break;
            }
        }
    }
}

fn wait_child(mut child: Box<dyn PtyChild>) -> PtyStatus {
    match child.wait() {
        Ok(code) => {
            info!("Shell exited with code {}", code);
            PtyStatus::Exited(code)
        }
        Err(e) => {
            error!("Failed to wait for shell: {}", e);
            PtyStatus::Errored(e.to_string())
        }
    }
}

/// Handle to one spawned shell process.
///
/// Cloning shares the same process. The exit/error outcome is settled exactly
/// once; [`outcome`](Self::outcome) resolves immediately when awaited after the
/// fact.
#[derive(Clone)]
pub struct PtyHandle {
    inner: Arc<Inner>,
}

impl PtyHandle {
    /// Start `request` in the background and return its handle plus output stream.
    ///
    /// Never blocks; spawn failures surface through [`outcome`](Self::outcome).
    pub fn spawn(provider: Arc<dyn PtyProvider>, request: SpawnRequest, size: PtySize) -> (Self, PtyOutput) {
        let (status, _) = watch::channel(PtyStatus::Starting);
        let inner = Arc::new(Inner {
            status,
            control: Mutex::new(None),
            stdin: Mutex::new(Stdin::Pending(Vec::new())),
            size: Mutex::new(size),
            kill_requested: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = Arc::clone(&inner);
        let spawned = std::thread::Builder::new()
            .name("pty-session".into())
            .spawn(move || match provider.spawn(&request, size) {
                Ok(spawned) => worker.start(spawned, size, tx),
                Err(e) => {
                    warn!("Failed to spawn {}: {}", request.executable, e);
                    worker.settle(PtyStatus::Errored(e.to_string()));
                }
            });
        if let Err(e) = spawned {
            error!("Failed to start PTY thread: {}", e);
            inner.settle(PtyStatus::Errored(e.to_string()));
        }

        (Self { inner }, rx)
    }

    pub fn status(&self) -> PtyStatus {
        self.inner.status.borrow().clone()
    }

    pub fn is_alive(&self) -> bool {
        !self.status().is_terminal()
    }

    /// Last requested dimensions as `(columns, rows)`
    pub fn size(&self) -> (u16, u16) {
        let size = self.inner.size.lock();
        (size.cols, size.rows)
    }

    /// Wait for the process to end
    pub async fn outcome(&self) -> PtyExit {
        let mut rx = self.inner.status.subscribe();
        let status = match rx.wait_for(PtyStatus::is_terminal).await {
            Ok(status) => status.clone(),
            // Sender lives in `inner`, which we hold
            Err(_) => PtyStatus::Errored("status channel closed".into()),
        };
        match status {
            PtyStatus::Exited(code) => PtyExit::Exited(code),
            PtyStatus::Errored(cause) => PtyExit::Errored(cause),
            PtyStatus::Starting | PtyStatus::Running => PtyExit::Errored("unsettled".into()),
        }
    }

    /// Resize the PTY. A no-op once the process has ended; while starting the
    /// size is applied as soon as the process is up.
    pub async fn resize(&self, columns: u16, rows: u16) -> Result<(), PtyError> {
        if self.status().is_terminal() {
            return Ok(());
        }
        let size = PtySize {
            rows,
            cols: columns,
            pixel_width: 0,
            pixel_height: 0,
        };
        *self.inner.size.lock() = size;
        match self.inner.control.lock().as_ref() {
            Some(control) => control.resize(size),
            None => Ok(()),
        }
    }

    /// Terminate the process. Idempotent.
    pub fn kill(&self) {
        if self.status().is_terminal() {
            return;
        }
        if !self.inner.kill_requested.swap(true, Ordering::SeqCst) {
            debug!("Killing shell");
        }
        self.inner.kill_now();
    }

    /// Write to the process' stdin, queueing while it is still starting.
    /// Writes after exit are dropped.
    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        let mut stdin = self.inner.stdin.lock();
        match &mut *stdin {
            Stdin::Pending(queued) => {
                queued.extend_from_slice(data);
                Ok(())
            }
            Stdin::Ready(writer) => {
                writer.write_all(data)?;
                writer.flush()?;
                Ok(())
            }
            Stdin::Closed => {
                debug!("Dropping {} bytes of input for ended process", data.len());
                Ok(())
            }
        }
    }
}
