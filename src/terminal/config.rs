//! Terminal configuration for WezTerm's Terminal
//!
//! Implements the TerminalConfiguration trait required by wezterm-term.

use crate::core::config::TerminalConfig;
use wezterm_term::color::ColorPalette;
use wezterm_term::config::TerminalConfiguration;

/// Emulator configuration for a shell pane.
#[derive(Debug, Clone)]
pub struct ShellPaneTermConfig {
    /// Number of lines to keep in scrollback buffer
    pub scrollback_size: usize,
    /// Color palette for this terminal
    palette: ColorPalette,
}

impl ShellPaneTermConfig {
    pub fn new(scrollback_size: usize, palette: ColorPalette) -> Self {
        Self {
            scrollback_size,
            palette,
        }
    }

    pub fn palette(&self) -> &ColorPalette {
        &self.palette
    }
}

impl From<&TerminalConfig> for ShellPaneTermConfig {
    fn from(config: &TerminalConfig) -> Self {
        Self::new(config.scrollback_size, ColorPalette::default())
    }
}

impl Default for ShellPaneTermConfig {
    fn default() -> Self {
        Self::from(&TerminalConfig::default())
    }
}

impl TerminalConfiguration for ShellPaneTermConfig {
    fn scrollback_size(&self) -> usize {
        self.scrollback_size
    }

    fn color_palette(&self) -> ColorPalette {
        self.palette.clone()
    }
}
