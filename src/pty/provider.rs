//! PTY providers
//!
//! A provider turns a [`SpawnRequest`] into the raw pieces of a running
//! process. [`NativePtyProvider`] uses portable-pty; tests use
//! [`MockPtyProvider`](super::mock::MockPtyProvider).

use super::handle::PtyError;
use anyhow::anyhow;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::info;

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub executable: String,
    pub cwd: PathBuf,
    pub args: Vec<String>,
}

impl SpawnRequest {
    pub fn new(executable: impl Into<String>, cwd: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            cwd: cwd.into(),
            args,
        }
    }
}

/// Resize and kill access to a spawned process
pub trait PtyControl: Send + Sync {
    fn resize(&self, size: PtySize) -> Result<(), PtyError>;
    fn kill(&self) -> Result<(), PtyError>;
}

/// The spawned child, used only to collect its exit code
pub trait PtyChild: Send {
    /// Block until the child exits
    fn wait(&mut self) -> Result<u32, PtyError>;
}

/// Raw pieces of a started process
pub struct SpawnedPty {
    pub stdout: Box<dyn Read + Send>,
    /// Separate error stream; PTY-backed processes merge it into `stdout`
    pub stderr: Option<Box<dyn Read + Send>>,
    pub stdin: Box<dyn Write + Send>,
    pub control: Box<dyn PtyControl>,
    pub child: Box<dyn PtyChild>,
}

/// Platform process-spawning primitive
pub trait PtyProvider: Send + Sync + 'static {
    /// Start the process. Called off the caller's thread, may block.
    fn spawn(&self, request: &SpawnRequest, size: PtySize) -> Result<SpawnedPty, PtyError>;
}

/// Provider backed by the operating system's PTY facility
#[derive(Debug, Default, Clone)]
pub struct NativePtyProvider;

struct NativeControl {
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
}

impl PtyControl for NativeControl {
    fn resize(&self, size: PtySize) -> Result<(), PtyError> {
        self.master.lock().resize(size).map_err(PtyError::Resize)
    }

    fn kill(&self) -> Result<(), PtyError> {
        self.killer
            .lock()
            .kill()
            .map_err(|e| PtyError::Kill(anyhow!(e)))
    }
}

struct NativeChild(Box<dyn Child + Send + Sync>);

impl PtyChild for NativeChild {
    fn wait(&mut self) -> Result<u32, PtyError> {
        let status = self.0.wait().map_err(|e| PtyError::Wait(anyhow!(e)))?;
        Ok(status.exit_code())
    }
}

impl PtyProvider for NativePtyProvider {
    fn spawn(&self, request: &SpawnRequest, size: PtySize) -> Result<SpawnedPty, PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system.openpty(size).map_err(PtyError::Create)?;

        let mut cmd = CommandBuilder::new(&request.executable);
        for arg in &request.args {
            cmd.arg(arg);
        }

        if !request.cwd.as_os_str().is_empty() {
            cmd.cwd(&request.cwd);
        } else if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        info!("Starting shell: {} {:?}", request.executable, request.args);

        let child = pair.slave.spawn_command(cmd).map_err(PtyError::Spawn)?;
        // The reader only sees EOF once every slave handle is closed
        drop(pair.slave);

        let stdout = pair
            .master
            .try_clone_reader()
            .map_err(PtyError::CloneReader)?;
        let stdin = pair.master.take_writer().map_err(PtyError::Writer)?;
        let killer = child.clone_killer();

        Ok(SpawnedPty {
            stdout,
            stderr: None,
            stdin,
            control: Box::new(NativeControl {
                master: Mutex::new(pair.master),
                killer: Mutex::new(killer),
            }),
            child: Box::new(NativeChild(child)),
        })
    }
}
