//! Resize coordination
//!
//! UI geometry changes arrive in bursts (window drags, split moves). They are
//! turned into cell dimensions, debounced, and the settled size is applied to
//! the PTY first and then to the emulator buffer.

use crate::core::config::TerminalConfig;
use crate::core::debounce::Debouncer;
use crate::core::events::PanelHost;
use crate::pty::PtyHandle;
use crate::terminal::buffer::TerminalBuffer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pixel size of the container the terminal is laid out in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerGeometry {
    pub width: f32,
    pub height: f32,
}

impl ContainerGeometry {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Settled terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub columns: u16,
    pub rows: u16,
}

/// Cell and padding sizes used to fit a grid into a container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub cell_width: f32,
    pub cell_height: f32,
    /// Inner margin on each side
    pub padding: f32,
}

impl CellMetrics {
    /// Dimensions that fit `geometry`, or `None` while the container has
    /// no area yet. Never proposes a zero dimension.
    pub fn propose(&self, geometry: ContainerGeometry) -> Option<ResizeRequest> {
        if !(geometry.width > 0.0 && geometry.height > 0.0) {
            return None;
        }
        if !(self.cell_width > 0.0 && self.cell_height > 0.0) {
            return None;
        }
        let margin = self.padding.max(0.0) * 2.0;
        let columns = ((geometry.width - margin) / self.cell_width).floor();
        let rows = ((geometry.height - margin) / self.cell_height).floor();
        Some(ResizeRequest {
            columns: columns.clamp(1.0, u16::MAX as f32) as u16,
            rows: rows.clamp(1.0, u16::MAX as f32) as u16,
        })
    }
}

impl From<&TerminalConfig> for CellMetrics {
    fn from(config: &TerminalConfig) -> Self {
        Self {
            cell_width: config.cell_width,
            cell_height: config.cell_height,
            padding: config.padding,
        }
    }
}

/// Collapses resize bursts into one applied resize carrying the last
/// proposed dimensions.
pub struct ResizeCoordinator {
    metrics: CellMetrics,
    debouncer: Debouncer,
    buffer: Arc<Mutex<TerminalBuffer>>,
    host: Arc<dyn PanelHost>,
    pty: Arc<Mutex<Option<PtyHandle>>>,
}

impl ResizeCoordinator {
    pub fn new(
        metrics: CellMetrics,
        delay: Duration,
        buffer: Arc<Mutex<TerminalBuffer>>,
        host: Arc<dyn PanelHost>,
    ) -> Self {
        Self {
            metrics,
            debouncer: Debouncer::new(delay),
            buffer,
            host,
            pty: Arc::new(Mutex::new(None)),
        }
    }

    /// Attach the process that resizes are forwarded to
    pub fn set_pty(&self, pty: PtyHandle) {
        *self.pty.lock() = Some(pty);
    }

    /// Handle a container geometry change. Ignored while the container has
    /// zero width or height. Must be called from within a tokio runtime.
    pub fn on_ui_resize(&self, geometry: ContainerGeometry) {
        match self.metrics.propose(geometry) {
            Some(request) => self.request(request),
            None => debug!(
                "Ignoring resize for unlaid-out container {}x{}",
                geometry.width, geometry.height
            ),
        }
    }

    /// Schedule `request`, superseding any pending one
    pub fn request(&self, request: ResizeRequest) {
        let buffer = Arc::clone(&self.buffer);
        let host = Arc::clone(&self.host);
        let pty = Arc::clone(&self.pty);
        self.debouncer.schedule(async move {
            let pty = pty.lock().clone();
            apply(request, pty, &buffer, host.as_ref()).await;
        });
    }

    /// Drop a pending resize
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }
}

async fn apply(
    request: ResizeRequest,
    pty: Option<PtyHandle>,
    buffer: &Mutex<TerminalBuffer>,
    host: &dyn PanelHost,
) {
    let ResizeRequest { columns, rows } = request;
    if let Some(pty) = pty {
        if let Err(e) = pty.resize(columns, rows).await {
            debug!("PTY resize to {}x{} failed: {}", columns, rows, e);
        }
    }
    buffer.lock().resize(columns, rows);
    debug!("Resized terminal to {}x{}", columns, rows);
    host.request_save_layout();
}
