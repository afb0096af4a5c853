//! PTY module - shell process lifecycle
//!
//! This module provides:
//! - `PtyHandle`: one spawned shell with one-shot exit/error outcome
//! - `PtyProvider`: the seam to the platform spawning primitive
//! - `MockPtyProvider`: in-memory provider for tests and headless hosts

mod handle;
pub mod mock;
mod provider;

pub use handle::{PtyChunk, PtyError, PtyExit, PtyHandle, PtyOutput, PtyStatus, PtyStream};
pub use mock::{MockPty, MockPtyProvider};
pub use provider::{NativePtyProvider, PtyChild, PtyControl, PtyProvider, SpawnRequest, SpawnedPty};
pub use portable_pty::PtySize;
