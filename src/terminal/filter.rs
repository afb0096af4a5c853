//! Startup output filter
//!
//! Sits between a fresh shell's stdout and the emulator buffer. It drops the
//! console host's startup chunk (where one is expected) and clears the
//! visible rows once, keeping scrollback, before the first forwarded chunk.
//! Restored sessions start in pass-through.

use std::borrow::Cow;

/// Where the filter is in its one-way progression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    /// Next chunk is the startup banner and is discarded
    AwaitingMarker,
    /// Next chunk is preceded by a scrollback-preserving clear
    AwaitingClear,
    PassThrough,
}

#[derive(Debug, Clone)]
pub struct OutputFilter {
    phase: FilterPhase,
    clear_on_start: bool,
}

impl OutputFilter {
    /// Filter for a freshly spawned session
    pub fn fresh(skip_banner: bool, clear_on_start: bool) -> Self {
        let phase = match (skip_banner, clear_on_start) {
            (true, _) => FilterPhase::AwaitingMarker,
            (false, true) => FilterPhase::AwaitingClear,
            (false, false) => FilterPhase::PassThrough,
        };
        Self {
            phase,
            clear_on_start,
        }
    }

    /// Filter for a session restored from a snapshot
    pub fn pass_through() -> Self {
        Self {
            phase: FilterPhase::PassThrough,
            clear_on_start: false,
        }
    }

    pub fn phase(&self) -> FilterPhase {
        self.phase
    }

    /// Process one stdout chunk. Returns the bytes to write into a buffer
    /// with `rows` visible rows, or `None` when the chunk is swallowed.
    pub fn process<'a>(&mut self, chunk: &'a [u8], rows: u16) -> Option<Cow<'a, [u8]>> {
        match self.phase {
            FilterPhase::AwaitingMarker => {
                self.phase = if self.clear_on_start {
                    FilterPhase::AwaitingClear
                } else {
                    FilterPhase::PassThrough
                };
                None
            }
            FilterPhase::AwaitingClear => {
                self.phase = FilterPhase::PassThrough;
                let mut out = clear_preserving_scrollback(rows);
                out.extend_from_slice(chunk);
                Some(Cow::Owned(out))
            }
            FilterPhase::PassThrough => Some(Cow::Borrowed(chunk)),
        }
    }
}

/// Push every visible row into scrollback by erasing row after row, then home
/// the cursor. Unlike a full reset this keeps history intact.
pub fn clear_preserving_scrollback(rows: u16) -> Vec<u8> {
    let mut out = b"\n\x1b[K".repeat(rows as usize);
    out.extend_from_slice(b"\x1b[H");
    out
}
