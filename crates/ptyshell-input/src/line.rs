//! Reconstruct the line being typed from raw keystroke bytes
//!
//! The shell owns the real line editor; this is a shadow copy good enough to
//! drive suggestions, diagnostics and history recording. Keys whose effect
//! only the shell knows (Tab completion, history recall) mark the shadow line
//! as out of sync until the next commit or clear.

/// Something the tracker noticed while consuming input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Enter was pressed. `in_sync` is false when the shell may have edited
    /// the line in ways the tracker could not follow.
    Commit { line: String, in_sync: bool },
    /// The line was abandoned with Ctrl-C
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EscapeState {
    #[default]
    Ground,
    Escape,
    Csi,
    Ss3,
}

#[derive(Debug, Default)]
pub struct LineTracker {
    text: String,
    /// Cursor position in chars
    cursor: usize,
    in_sync: bool,
    escape: EscapeState,
    csi_params: Vec<u8>,
    pending_utf8: Vec<u8>,
}

impl LineTracker {
    pub fn new() -> Self {
        Self {
            in_sync: true,
            ..Default::default()
        }
    }

    /// Current shadow line
    pub fn line(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_in_sync(&self) -> bool {
        self.in_sync
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.in_sync = true;
        self.pending_utf8.clear();
    }

    /// Insert text at the cursor, as when a suggestion is accepted
    pub fn insert_str(&mut self, s: &str) {
        for ch in s.chars() {
            self.insert(ch);
        }
    }

    /// Consume raw input bytes, returning commit/cancel events in order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<LineEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            if let Some(event) = self.feed_byte(byte) {
                events.push(event);
            }
        }
        events
    }

    fn feed_byte(&mut self, byte: u8) -> Option<LineEvent> {
        match self.escape {
            EscapeState::Escape => {
                self.escape = match byte {
                    b'[' => {
                        self.csi_params.clear();
                        EscapeState::Csi
                    }
                    b'O' => EscapeState::Ss3,
                    _ => {
                        // Alt+key; the shell may act on it
                        self.in_sync = false;
                        EscapeState::Ground
                    }
                };
                return None;
            }
            EscapeState::Csi => {
                if (0x40..=0x7e).contains(&byte) {
                    self.escape = EscapeState::Ground;
                    self.apply_csi(byte);
                } else {
                    self.csi_params.push(byte);
                }
                return None;
            }
            EscapeState::Ss3 => {
                self.escape = EscapeState::Ground;
                self.apply_csi(byte);
                return None;
            }
            EscapeState::Ground => {}
        }

        match byte {
            b'\r' | b'\n' => {
                let line = std::mem::take(&mut self.text);
                let in_sync = self.in_sync;
                self.clear();
                Some(LineEvent::Commit { line, in_sync })
            }
            0x03 => {
                self.clear();
                Some(LineEvent::Cancel)
            }
            0x1b => {
                self.escape = EscapeState::Escape;
                None
            }
            0x7f | 0x08 => {
                self.backspace();
                None
            }
            // Ctrl-U
            0x15 => {
                self.remove_range(0, self.cursor);
                None
            }
            // Ctrl-W
            0x17 => {
                self.delete_word();
                None
            }
            // Ctrl-A / Ctrl-E
            0x01 => {
                self.cursor = 0;
                None
            }
            0x05 => {
                self.cursor = self.len();
                None
            }
            // Ctrl-K
            0x0b => {
                self.remove_range(self.cursor, self.len());
                None
            }
            // Tab completion and the rest of the control range are the shell's business
            0x00..=0x1f => {
                self.in_sync = false;
                None
            }
            _ => {
                self.push_utf8(byte);
                None
            }
        }
    }

    fn apply_csi(&mut self, final_byte: u8) {
        match (final_byte, self.csi_params.as_slice()) {
            (b'C', _) => self.cursor = (self.cursor + 1).min(self.len()),
            (b'D', _) => self.cursor = self.cursor.saturating_sub(1),
            (b'H', _) => self.cursor = 0,
            (b'F', _) => self.cursor = self.len(),
            (b'~', b"3") => {
                if self.cursor < self.len() {
                    self.remove_range(self.cursor, self.cursor + 1);
                }
            }
            // Bracketed paste delimiters from the host terminal
            (b'~', b"200") | (b'~', b"201") => {}
            // Up/Down recall shell history we cannot see
            (b'A', _) | (b'B', _) => {
                self.text.clear();
                self.cursor = 0;
                self.in_sync = false;
            }
            _ => {}
        }
        self.csi_params.clear();
    }

    fn push_utf8(&mut self, byte: u8) {
        self.pending_utf8.push(byte);
        match std::str::from_utf8(&self.pending_utf8) {
            Ok(s) => {
                let decoded = s.to_string();
                self.pending_utf8.clear();
                self.insert_str(&decoded);
            }
            Err(e) if e.error_len().is_some() => {
                let decoded = String::from_utf8_lossy(&self.pending_utf8).to_string();
                self.pending_utf8.clear();
                self.insert_str(&decoded);
            }
            // Incomplete sequence, wait for more bytes
            Err(_) => {}
        }
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_pos(&self, char_pos: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    fn insert(&mut self, c: char) {
        let pos = self.byte_pos(self.cursor);
        self.text.insert(pos, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            self.remove_range(self.cursor - 1, self.cursor);
        }
    }

    fn delete_word(&mut self) {
        let chars: Vec<char> = self.text.chars().collect();
        let mut pos = self.cursor;
        while pos > 0 && chars[pos - 1].is_whitespace() {
            pos -= 1;
        }
        while pos > 0 && !chars[pos - 1].is_whitespace() {
            pos -= 1;
        }
        self.remove_range(pos, self.cursor);
    }

    /// Remove chars in `start..end` and leave the cursor at `start`
    fn remove_range(&mut self, start: usize, end: usize) {
        let start_byte = self.byte_pos(start);
        let end_byte = self.byte_pos(end);
        self.text.replace_range(start_byte..end_byte, "");
        self.cursor = start;
    }
}
