//! Idle-prompt detection from shell output
//!
//! Readline-based shells switch bracketed-paste mode on while they wait for a
//! line and off again before running it. Those two markers are the only
//! signal used. A shell that never emits them is always reported as being at
//! its prompt.

use ptyshell_types::PromptState;

const PASTE_ENABLE: &[u8] = b"\x1b[?2004h";
const PASTE_DISABLE: &[u8] = b"\x1b[?2004l";
const MARKER_LEN: usize = 8;

#[derive(Debug, Default)]
pub struct PromptTracker {
    state: PromptState,
    /// Trailing bytes of the previous chunk, for markers split across reads
    tail: Vec<u8>,
}

impl PromptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PromptState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = PromptState::AtPrompt;
        self.tail.clear();
    }

    /// Consume an output chunk; the last marker seen decides the state
    pub fn feed(&mut self, bytes: &[u8]) -> PromptState {
        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(bytes);

        let last = window
            .windows(MARKER_LEN)
            .rev()
            .find_map(|w| match w {
                PASTE_ENABLE => Some(PromptState::AtPrompt),
                PASTE_DISABLE => Some(PromptState::Executing),
                _ => None,
            });
        if let Some(state) = last {
            self.state = state;
        }

        // A shorter tail can never hold a whole marker, so nothing is counted twice
        let keep = window.len().min(MARKER_LEN - 1);
        self.tail = window.split_off(window.len() - keep);
        self.state
    }
}
