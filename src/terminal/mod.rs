//! Terminal module - emulator side of a shell pane
//!
//! This module provides:
//! - `TerminalBuffer`: wezterm-term emulator holding cells and scrollback
//! - `AltScreenScanner`: tracks switches to the alternate screen in raw output
//! - `OutputFilter`: one-time startup transformations of fresh shell output
//! - `BufferSerializer`: snapshot capture/restore and HTML export
//! - `ResizeCoordinator`: debounced resize of PTY and buffer

mod alt_screen;
mod buffer;
mod config;
mod filter;
mod resize;
mod serializer;

pub use alt_screen::{AltScreenEvent, AltScreenScanner};
pub use buffer::{InputSender, TerminalBuffer};
pub use config::ShellPaneTermConfig;
pub use filter::{clear_preserving_scrollback, FilterPhase, OutputFilter};
pub use resize::{CellMetrics, ContainerGeometry, ResizeCoordinator, ResizeRequest};
pub use serializer::BufferSerializer;
