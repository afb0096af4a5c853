//! ShellPane
//!
//! An embeddable terminal session: a shell running in a pseudo-terminal,
//! rendered into a wezterm-term emulator buffer that survives restarts.
//!
//! # Features
//! - PTY lifecycle with a one-shot exit/error outcome
//! - Startup output filtering (console banner skip, scrollback-preserving clear)
//! - Buffer snapshots with scrollback, restored before live output resumes
//! - Debounced resize of PTY and emulator
//! - HTML export of the buffer

pub mod core;
pub mod pty;
pub mod session;
pub mod terminal;

pub use core::config::Config;
pub use core::events::{EventSender, HostEvent, Notice, NoticeKind, PanelHost};
pub use core::layout::LayoutStore;
pub use core::state::{BufferSnapshot, PanelState};
pub use session::{SessionController, SessionPhase};
