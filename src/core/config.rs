//! Configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Terminal emulator and session pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Number of lines to keep in scrollback buffer
    #[serde(default = "default_scrollback_size")]
    pub scrollback_size: usize,
    /// Columns used before the first layout pass
    #[serde(default = "default_columns")]
    pub default_columns: u16,
    /// Rows used before the first layout pass
    #[serde(default = "default_rows")]
    pub default_rows: u16,
    /// Quiet window for collapsing UI resize bursts, in milliseconds
    #[serde(default = "default_resize_debounce")]
    pub resize_debounce_ms: u64,
    /// Quiet window for collapsing layout-save requests from output, in milliseconds
    #[serde(default = "default_save_debounce")]
    pub save_debounce_ms: u64,
    /// Discard the first output chunk of a fresh session (console host banner).
    /// Unset means "only on Windows".
    #[serde(default)]
    pub skip_startup_banner: Option<bool>,
    /// Clear the visible rows (keeping scrollback) before the first forwarded chunk
    #[serde(default = "default_true")]
    pub clear_on_start: bool,
    /// Width of one cell in logical pixels
    #[serde(default = "default_cell_width")]
    pub cell_width: f32,
    /// Height of one cell in logical pixels
    #[serde(default = "default_cell_height")]
    pub cell_height: f32,
    /// Padding around the grid on each side, in logical pixels
    #[serde(default = "default_padding")]
    pub padding: f32,
}

fn default_scrollback_size() -> usize {
    10_000
}
fn default_columns() -> u16 {
    80
}
fn default_rows() -> u16 {
    24
}
fn default_resize_debounce() -> u64 {
    100
}
fn default_save_debounce() -> u64 {
    250
}
fn default_true() -> bool {
    true
}
fn default_cell_width() -> f32 {
    8.0
}
fn default_cell_height() -> f32 {
    16.0
}
fn default_padding() -> f32 {
    8.0
}

impl TerminalConfig {
    /// Whether the startup banner chunk is expected on this platform
    pub fn skips_startup_banner(&self) -> bool {
        self.skip_startup_banner.unwrap_or(cfg!(windows))
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            scrollback_size: default_scrollback_size(),
            default_columns: default_columns(),
            default_rows: default_rows(),
            resize_debounce_ms: default_resize_debounce(),
            save_debounce_ms: default_save_debounce(),
            skip_startup_banner: None,
            clear_on_start: true,
            cell_width: default_cell_width(),
            cell_height: default_cell_height(),
            padding: default_padding(),
        }
    }
}

/// Shell launched for new panels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Path to the shell executable (empty = platform default)
    #[serde(default)]
    pub executable: String,
    /// Arguments passed to the shell
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory (empty = current directory)
    #[serde(default)]
    pub cwd: String,
}

impl ShellConfig {
    /// Resolve the executable, falling back to the user's shell
    pub fn resolved_executable(&self) -> String {
        if !self.executable.is_empty() {
            return self.executable.clone();
        }
        #[cfg(windows)]
        {
            std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
        }
        #[cfg(not(windows))]
        {
            std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
        }
    }
}

/// User-visible notice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeConfig {
    /// How long ephemeral notices stay visible, in milliseconds
    #[serde(default = "default_notice_timeout")]
    pub timeout_ms: u64,
    /// Exit codes that count as a clean exit
    #[serde(default = "default_success_exit_codes")]
    pub success_exit_codes: Vec<u32>,
}

fn default_notice_timeout() -> u64 {
    5000
}
fn default_success_exit_codes() -> Vec<u32> {
    vec![0]
}

impl NoticeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_success(&self, code: u32) -> bool {
        self.success_exit_codes.contains(&code)
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_notice_timeout(),
            success_exit_codes: default_success_exit_codes(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Terminal configuration
    #[serde(default)]
    pub terminal: TerminalConfig,
    /// Shell configuration
    #[serde(default)]
    pub shell: ShellConfig,
    /// Notice configuration
    #[serde(default)]
    pub notices: NoticeConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "shellpane", "ShellPane")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Get the default configuration embedded in the binary
    pub fn default_config_str() -> &'static str {
        include_str!("../../config/default.toml")
    }
}
