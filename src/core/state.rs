//! Persisted panel state
//!
//! The record a host stores in its layout and hands back on restore. Old
//! records without a `serial` field restore as an empty buffer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Captured emulator contents and dimensions.
///
/// `data` is an opaque replay stream produced by
/// [`BufferSerializer`](crate::terminal::BufferSerializer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    pub columns: u16,
    pub rows: u16,
    pub data: String,
}

/// Layout record for one terminal panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelState {
    /// Discriminant separating our records from foreign panel state
    #[serde(rename = "__type")]
    pub kind: String,
    pub executable: String,
    pub cwd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<BufferSnapshot>,
}

impl PanelState {
    /// Discriminant written into every record
    pub const TYPE: &'static str = "8d54e44a-32e7-4297-8ae2-cff88e92ce28";

    pub fn new(executable: impl Into<String>, cwd: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind: Self::TYPE.to_string(),
            executable: executable.into(),
            cwd: cwd.into(),
            args,
            serial: None,
        }
    }

    /// Interpret host-provided state, returning `None` for anything that is
    /// not one of our records.
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("__type").and_then(Value::as_str) != Some(Self::TYPE) {
            debug!("Ignoring panel state without terminal discriminant");
            return None;
        }
        match serde_json::from_value::<PanelState>(value.clone()) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!("Ignoring malformed terminal panel state: {}", e);
                None
            }
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Executable basename without extension, used as the panel title
    pub fn display_name(&self) -> String {
        Path::new(&self.executable)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl Default for PanelState {
    fn default() -> Self {
        Self::new(String::new(), String::new(), Vec::new())
    }
}
