//! Session controller
//!
//! Wires one shell process to one emulator buffer for the lifetime of a
//! panel: `Uninitialized → Attaching → Live → Closed`.
//!
//! All host capabilities come in through [`PanelHost`] and all process
//! creation through [`PtyProvider`], so a session runs the same against a
//! real window and against the in-memory mock.

use crate::core::config::{Config, NoticeConfig};
use crate::core::debounce::Debouncer;
use crate::core::events::{Notice, NoticeKind, PanelHost};
use crate::core::state::PanelState;
use crate::pty::{PtyExit, PtyHandle, PtyOutput, PtyProvider, PtySize, PtyStream, SpawnRequest};
use crate::terminal::{
    BufferSerializer, CellMetrics, ContainerGeometry, InputSender, OutputFilter, ResizeCoordinator,
    ResizeRequest, ShellPaneTermConfig, TerminalBuffer,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a [`SessionController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Attaching,
    Live,
    Closed,
}

/// Move `phase` forward; `Closed` is final
fn advance(phase: &Mutex<SessionPhase>, next: SessionPhase) {
    let mut phase = phase.lock();
    if *phase != SessionPhase::Closed {
        *phase = next;
    }
}

/// State shared between the controller and its background tasks
struct Shared {
    phase: Mutex<SessionPhase>,
    /// Set once teardown starts; suppresses the exit notice
    closing: AtomicBool,
    buffer: Arc<Mutex<TerminalBuffer>>,
    host: Arc<dyn PanelHost>,
    save: Debouncer,
    notices: NoticeConfig,
}

/// One terminal panel's session.
///
/// `attach` must be called from within a tokio runtime.
pub struct SessionController {
    id: Uuid,
    config: Config,
    provider: Arc<dyn PtyProvider>,
    shared: Arc<Shared>,
    input_tx: InputSender,
    input_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    state: PanelState,
    pty: Option<PtyHandle>,
    resize: ResizeCoordinator,
    /// Forwards input to the shell; the output pump runs detached
    input_task: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(config: Config, provider: Arc<dyn PtyProvider>, host: Arc<dyn PanelHost>) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let buffer = Arc::new(Mutex::new(TerminalBuffer::new(
            config.terminal.default_columns,
            config.terminal.default_rows,
            ShellPaneTermConfig::from(&config.terminal),
            input_tx.clone(),
        )));
        let resize = ResizeCoordinator::new(
            CellMetrics::from(&config.terminal),
            config.terminal.resize_debounce(),
            Arc::clone(&buffer),
            Arc::clone(&host),
        );
        let shared = Arc::new(Shared {
            phase: Mutex::new(SessionPhase::Uninitialized),
            closing: AtomicBool::new(false),
            buffer,
            host,
            save: Debouncer::new(config.terminal.save_debounce()),
            notices: config.notices.clone(),
        });

        Self {
            id: Uuid::new_v4(),
            config,
            provider,
            shared,
            input_tx,
            input_rx: Some(input_rx),
            state: PanelState::default(),
            pty: None,
            resize,
            input_task: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        *self.shared.phase.lock()
    }

    /// The panel record this session was attached with
    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn pty(&self) -> Option<&PtyHandle> {
        self.pty.as_ref()
    }

    pub fn buffer(&self) -> Arc<Mutex<TerminalBuffer>> {
        Arc::clone(&self.shared.buffer)
    }

    /// Attach host-provided panel state. Returns `false`, leaving the
    /// session untouched, for foreign or malformed state and when a session
    /// is already attached.
    pub fn attach(&mut self, value: &Value) -> bool {
        match PanelState::from_value(value) {
            Some(state) => self.attach_state(state),
            None => {
                debug!(session = %self.id, "Nothing to attach");
                false
            }
        }
    }

    /// Attach a parsed panel record. See [`attach`](Self::attach).
    pub fn attach_state(&mut self, state: PanelState) -> bool {
        if self.pty.is_some() || self.phase() != SessionPhase::Uninitialized {
            debug!(session = %self.id, "Ignoring duplicate attach");
            return false;
        }
        advance(&self.shared.phase, SessionPhase::Attaching);

        let executable = if state.executable.is_empty() {
            self.config.shell.resolved_executable()
        } else {
            state.executable.clone()
        };
        let (columns, rows) = match &state.serial {
            Some(snapshot) => (snapshot.columns, snapshot.rows),
            None => {
                let buffer = self.shared.buffer.lock();
                (buffer.columns(), buffer.rows())
            }
        };
        info!(
            session = %self.id,
            "Attaching {} in {:?} at {}x{}",
            executable, state.cwd, columns, rows
        );

        let request = SpawnRequest::new(executable, state.cwd.clone(), state.args.clone());
        let size = PtySize {
            rows,
            cols: columns,
            pixel_width: 0,
            pixel_height: 0,
        };
        let (pty, output) = PtyHandle::spawn(Arc::clone(&self.provider), request, size);

        // Restored content must be in place before any live output lands
        let filter = match &state.serial {
            Some(snapshot) => {
                BufferSerializer::deserialize(&mut self.shared.buffer.lock(), snapshot);
                OutputFilter::pass_through()
            }
            None => OutputFilter::fresh(
                self.config.terminal.skips_startup_banner(),
                self.config.terminal.clear_on_start,
            ),
        };

        self.resize.set_pty(pty.clone());
        advance(&self.shared.phase, SessionPhase::Live);

        tokio::spawn(pump_output(
            self.id,
            Arc::clone(&self.shared),
            pty.clone(),
            output,
            filter,
        ));
        if let Some(input_rx) = self.input_rx.take() {
            self.input_task = Some(tokio::spawn(forward_input(self.id, pty.clone(), input_rx)));
        }

        self.state = state;
        self.pty = Some(pty);
        true
    }

    /// Current record with a freshly captured snapshot. Valid in every phase.
    pub fn get_persistable_state(&mut self) -> PanelState {
        let snapshot = BufferSerializer::serialize(&mut self.shared.buffer.lock());
        self.state.serial = Some(snapshot);
        self.state.clone()
    }

    /// Send user input to the shell; queued until the process is up
    pub fn send_input(&self, data: impl AsRef<[u8]>) {
        let _ = self.input_tx.send(data.as_ref().to_vec());
    }

    /// Container geometry changed
    pub fn on_ui_resize(&self, geometry: ContainerGeometry) {
        self.resize.on_ui_resize(geometry);
    }

    /// Request explicit dimensions, debounced like UI resizes
    pub fn request_resize(&self, columns: u16, rows: u16) {
        self.resize.request(ResizeRequest { columns, rows });
    }

    /// Scrollback and visible rows as an HTML document
    pub fn export_html(&self) -> String {
        BufferSerializer::to_html(&mut self.shared.buffer.lock())
    }

    /// Suggested file name for [`export_html`](Self::export_html)
    pub fn export_file_name(&self) -> String {
        let name = self.state.display_name();
        if name.is_empty() {
            "terminal.html".to_string()
        } else {
            format!("{}.html", name)
        }
    }

    /// Tear the session down. Safe to call repeatedly.
    ///
    /// Kills the process and stops forwarding input. Output the process wrote
    /// before it died still reaches the buffer: the output pump keeps running
    /// until the streams end, without saving or notifying. The buffer itself
    /// is released with the controller, so a final
    /// [`get_persistable_state`](Self::get_persistable_state) still sees it.
    pub fn close(&mut self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session = %self.id, "Closing session");
        self.resize.cancel();
        self.shared.save.cancel();
        if let Some(pty) = &self.pty {
            pty.kill();
        }
        if let Some(task) = self.input_task.take() {
            task.abort();
        }
        *self.shared.phase.lock() = SessionPhase::Closed;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.close();
    }
}

/// Feed process output into the buffer until the streams end, then report
/// how the process ended.
async fn pump_output(
    id: Uuid,
    shared: Arc<Shared>,
    pty: PtyHandle,
    mut output: PtyOutput,
    mut filter: OutputFilter,
) {
    while let Some(chunk) = output.recv().await {
        let written = {
            let mut buffer = shared.buffer.lock();
            match chunk.stream {
                PtyStream::Stdout => {
                    let rows = buffer.rows();
                    match filter.process(&chunk.data, rows) {
                        Some(bytes) => {
                            buffer.advance_bytes(&bytes);
                            true
                        }
                        None => {
                            debug!(session = %id, "Discarded startup chunk ({} bytes)", chunk.data.len());
                            false
                        }
                    }
                }
                PtyStream::Stderr => {
                    buffer.advance_bytes(&chunk.data);
                    true
                }
            }
        };
        if written && !shared.closing.load(Ordering::SeqCst) {
            let host = Arc::clone(&shared.host);
            shared.save.schedule(async move { host.request_save_layout() });
        }
    }

    let outcome = pty.outcome().await;
    shared.save.cancel();
    advance(&shared.phase, SessionPhase::Closed);

    if shared.closing.load(Ordering::SeqCst) {
        debug!(session = %id, "Process ended after teardown: {:?}", outcome);
        return;
    }

    let notice = match outcome {
        PtyExit::Exited(code) => {
            info!(session = %id, "Shell exited with code {}", code);
            Notice {
                kind: NoticeKind::TerminalExited { code },
                timeout: shared
                    .notices
                    .is_success(code)
                    .then(|| shared.notices.timeout()),
            }
        }
        PtyExit::Errored(error) => {
            warn!(session = %id, "Shell failed: {}", error);
            Notice {
                kind: NoticeKind::SpawnFailed { error },
                timeout: None,
            }
        }
    };
    shared.host.close_panel();
    shared.host.notify(notice);
}

/// Forward emulator replies and user input to the shell's stdin
async fn forward_input(id: Uuid, pty: PtyHandle, mut input: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = input.recv().await {
        if let Err(e) = pty.write(&data) {
            debug!(session = %id, "Input write failed: {}", e);
        }
    }
}
