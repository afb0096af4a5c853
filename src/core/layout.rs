//! Layout persistence
//!
//! Saves and loads panel records between app sessions so a terminal can be
//! restored with its scrollback after a restart.

use super::state::PanelState;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted layout: the panels open when the layout was last saved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default)]
    pub panels: Vec<serde_json::Value>,
}

impl Layout {
    /// Our panel records, skipping foreign or malformed entries
    pub fn terminal_panels(&self) -> Vec<PanelState> {
        self.panels.iter().filter_map(PanelState::from_value).collect()
    }
}

/// File-backed layout store
#[derive(Debug, Clone)]
pub struct LayoutStore {
    path: PathBuf,
}

impl LayoutStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform data directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "shellpane", "ShellPane")
            .context("Failed to determine state directory")?;
        Ok(proj_dirs.data_dir().join("layout.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the layout, returning an empty one when no file exists
    pub fn load(&self) -> Result<Layout> {
        if !self.path.exists() {
            return Ok(Layout::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read layout file: {:?}", self.path))?;
        let layout: Layout = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse layout file: {:?}", self.path))?;
        Ok(layout)
    }

    /// Save the layout
    pub fn save(&self, layout: &Layout) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(layout).context("Failed to serialize layout")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write layout file: {:?}", self.path))?;
        Ok(())
    }

    /// Replace the stored layout with a single terminal panel
    pub fn save_panel(&self, state: &PanelState) -> Result<()> {
        self.save(&Layout {
            panels: vec![state.to_value()],
        })
    }
}
