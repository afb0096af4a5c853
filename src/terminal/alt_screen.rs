//! Alternate screen tracking
//!
//! Scans raw PTY output for `CSI ? <modes> h/l` and reports where a switch
//! to or from the alternate screen (modes 47, 1047, 1049) completes. State
//! persists between calls so sequences split across chunks are still seen.

/// Modes that select the alternate screen
const ALT_SCREEN_MODES: &[u16] = &[47, 1047, 1049];

/// A completed alternate screen switch. `end` is the offset just past the
/// sequence's final byte within the scanned chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltScreenEvent {
    Enter { end: usize },
    Exit { end: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Ground,
    Esc,
    Csi,
    DecParam,
}

/// Byte-level scanner for alternate screen switches.
#[derive(Debug)]
pub struct AltScreenScanner {
    state: ScanState,
    params: Vec<u16>,
    current_param: u16,
    active: bool,
}

impl AltScreenScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Ground,
            params: Vec::new(),
            current_param: 0,
            active: false,
        }
    }

    /// Whether the last completed switch selected the alternate screen
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Scan a chunk and return the switches that change the active screen.
    /// Entering while already on the alternate screen (or leaving while on
    /// the primary) is not reported.
    pub fn scan(&mut self, data: &[u8]) -> Vec<AltScreenEvent> {
        let mut events = Vec::new();

        for (idx, &byte) in data.iter().enumerate() {
            match self.state {
                ScanState::Ground => {
                    if byte == 0x1b {
                        self.state = ScanState::Esc;
                    }
                }

                ScanState::Esc => match byte {
                    b'[' => self.state = ScanState::Csi,
                    // RIS puts the emulator back on the primary screen
                    b'c' => {
                        self.clear();
                        if self.active {
                            self.active = false;
                            events.push(AltScreenEvent::Exit { end: idx + 1 });
                        }
                    }
                    0x1b => {}
                    _ => self.clear(),
                },

                ScanState::Csi => {
                    if byte == b'?' {
                        self.state = ScanState::DecParam;
                        self.params.clear();
                        self.current_param = 0;
                    } else {
                        self.clear();
                    }
                }

                ScanState::DecParam => match byte {
                    b'0'..=b'9' => {
                        self.current_param = self
                            .current_param
                            .saturating_mul(10)
                            .saturating_add((byte - b'0') as u16);
                    }
                    b';' => {
                        self.params.push(self.current_param);
                        self.current_param = 0;
                    }
                    b'h' | b'l' => {
                        self.params.push(self.current_param);
                        let alt = self.params.iter().any(|m| ALT_SCREEN_MODES.contains(m));
                        self.clear();
                        if !alt {
                            continue;
                        }
                        let enter = byte == b'h';
                        if enter != self.active {
                            self.active = enter;
                            let end = idx + 1;
                            events.push(if enter {
                                AltScreenEvent::Enter { end }
                            } else {
                                AltScreenEvent::Exit { end }
                            });
                        }
                    }
                    _ => self.clear(),
                },
            }
        }

        events
    }

    fn clear(&mut self) {
        self.state = ScanState::Ground;
        self.params.clear();
        self.current_param = 0;
    }
}

impl Default for AltScreenScanner {
    fn default() -> Self {
        Self::new()
    }
}
