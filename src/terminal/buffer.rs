//! Emulator buffer wrapping WezTerm's Terminal
//!
//! Holds the cell grid and scrollback of one pane. Bytes the emulator itself
//! produces (device status replies, encoded keys) go to an input channel that
//! the session forwards to the shell's stdin.

use crate::terminal::alt_screen::{AltScreenEvent, AltScreenScanner};
use crate::terminal::config::ShellPaneTermConfig;
use crate::terminal::serializer::render_screen;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use wezterm_term::color::ColorPalette;
use wezterm_term::{CursorPosition, Terminal, TerminalSize};

/// Sending end for input bytes produced by the emulator
pub type InputSender = mpsc::UnboundedSender<Vec<u8>>;

/// Writer handed to the emulator; forwards everything to the input channel
struct InputWriter {
    tx: InputSender,
}

impl Write for InputWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        // No session listening means there is no process to receive input
        let _ = self.tx.send(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn terminal_size(columns: u16, rows: u16) -> TerminalSize {
    let cols = columns.max(1) as usize;
    let rows = rows.max(1) as usize;
    TerminalSize {
        rows,
        cols,
        pixel_width: cols * 8,
        pixel_height: rows * 16,
        dpi: 96,
    }
}

fn new_terminal(columns: u16, rows: u16, config: &Arc<ShellPaneTermConfig>, input: &InputSender) -> Terminal {
    Terminal::new(
        terminal_size(columns, rows),
        config.clone(),
        "ShellPane",
        env!("CARGO_PKG_VERSION"),
        Box::new(InputWriter { tx: input.clone() }),
    )
}

/// The emulator state of one terminal pane.
pub struct TerminalBuffer {
    terminal: Terminal,
    config: Arc<ShellPaneTermConfig>,
    input: InputSender,
    alt_screen: AltScreenScanner,
    /// Replay stream of the primary screen, captured on entering the
    /// alternate screen. The primary cannot change until it is left again.
    saved_primary: Option<String>,
}

impl TerminalBuffer {
    /// Create a buffer with the given dimensions
    pub fn new(columns: u16, rows: u16, config: ShellPaneTermConfig, input: InputSender) -> Self {
        let config = Arc::new(config);
        let terminal = new_terminal(columns, rows, &config, &input);
        Self {
            terminal,
            config,
            input,
            alt_screen: AltScreenScanner::new(),
            saved_primary: None,
        }
    }

    /// Replace the emulator with an empty one of the given size, dropping all
    /// content and scrollback
    pub fn reset(&mut self, columns: u16, rows: u16) {
        self.terminal = new_terminal(columns, rows, &self.config, &self.input);
        self.alt_screen = AltScreenScanner::new();
        self.saved_primary = None;
    }

    /// Buffer whose emulator-generated input is discarded
    pub fn detached(columns: u16, rows: u16) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self::new(columns, rows, ShellPaneTermConfig::default(), tx)
    }

    pub fn palette(&self) -> &ColorPalette {
        self.config.palette()
    }

    /// Process bytes from PTY output
    pub fn advance_bytes(&mut self, data: &[u8]) {
        let mut fed = 0;
        for event in self.alt_screen.scan(data) {
            match event {
                AltScreenEvent::Enter { end } => {
                    // Everything but the final byte, so the primary screen
                    // is still the active one when it is captured
                    let last = end - 1;
                    self.terminal.advance_bytes(&data[fed..last]);
                    fed = last;
                    self.saved_primary = Some(render_screen(&mut self.terminal));
                }
                AltScreenEvent::Exit { .. } => self.saved_primary = None,
            }
        }
        self.terminal.advance_bytes(&data[fed..]);
    }

    /// Whether a full-screen program has switched to the alternate screen
    pub fn is_alt_screen(&self) -> bool {
        self.alt_screen.is_active()
    }

    /// The primary screen as it was when the alternate screen was entered
    pub(crate) fn saved_primary(&self) -> Option<&str> {
        self.saved_primary.as_deref()
    }

    pub fn cursor_pos(&self) -> CursorPosition {
        self.terminal.cursor_pos()
    }

    pub fn columns(&self) -> u16 {
        self.terminal.screen().physical_cols as u16
    }

    pub fn rows(&self) -> u16 {
        self.terminal.screen().physical_rows as u16
    }

    /// Scrollback plus visible rows
    pub fn total_lines(&self) -> usize {
        self.terminal.screen().scrollback_rows()
    }

    pub fn resize(&mut self, columns: u16, rows: u16) {
        self.terminal.resize(terminal_size(columns, rows));
    }

    /// Access the terminal mutably.
    pub fn with_terminal_mut<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Terminal) -> R,
    {
        f(&mut self.terminal)
    }

    /// Text of every physical line of the active screen (scrollback first),
    /// trailing blanks trimmed. The alternate screen has no scrollback.
    pub fn line_texts(&mut self) -> Vec<String> {
        let screen = self.terminal.screen_mut();
        let total = screen.scrollback_rows();
        (0..total)
            .map(|idx| {
                let line = screen.line_mut(idx);
                let mut text = String::new();
                for cell in line.visible_cells() {
                    text.push_str(cell.str());
                }
                text.trim_end().to_string()
            })
            .collect()
    }

    /// Text of the visible rows only
    pub fn visible_texts(&mut self) -> Vec<String> {
        let rows = self.rows() as usize;
        let lines = self.line_texts();
        let start = lines.len().saturating_sub(rows);
        lines[start..].to_vec()
    }
}
