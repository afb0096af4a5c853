//! Host-facing event definitions
//!
//! Everything a session needs from the panel that hosts it goes through
//! [`PanelHost`], so the session can run without a real host.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// What a notice is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// The shell exited with the given code
    TerminalExited { code: u32 },
    /// The shell could not be started
    SpawnFailed { error: String },
}

/// User-visible notice raised by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    /// How long to show it; `None` keeps it until dismissed
    pub timeout: Option<Duration>,
}

impl Notice {
    pub fn is_persistent(&self) -> bool {
        self.timeout.is_none()
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NoticeKind::TerminalExited { code } => write!(f, "Terminal exited with code {}", code),
            NoticeKind::SpawnFailed { error } => write!(f, "Error spawning terminal: {}", error),
        }
    }
}

/// Capabilities the hosting panel provides to a session
pub trait PanelHost: Send + Sync + 'static {
    /// Ask the host to persist its layout (and with it our panel state)
    fn request_save_layout(&self);

    /// Ask the host to close the panel owning the session
    fn close_panel(&self);

    /// Show a notice to the user
    fn notify(&self, notice: Notice);
}

/// Events emitted towards the host by [`EventSender`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    SaveLayout,
    ClosePanel,
    Notice(Notice),
}

/// Channel-backed host: every request becomes a [`HostEvent`] for the
/// host's event loop to handle.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self { tx }
    }

    /// Create a sender together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: HostEvent) {
        // Host gone means nobody is left to act on the event
        let _ = self.tx.send(event);
    }
}

impl PanelHost for EventSender {
    fn request_save_layout(&self) {
        self.send(HostEvent::SaveLayout);
    }

    fn close_panel(&self) {
        self.send(HostEvent::ClosePanel);
    }

    fn notify(&self, notice: Notice) {
        self.send(HostEvent::Notice(notice));
    }
}
