//! Input analysis for the shell console
//!
//! Pure, synchronous helpers that run on every keystroke: the tokenizer,
//! well-formedness diagnostics, and the shadow line tracker.

pub mod diagnostics;
pub mod line;
pub mod tokenizer;

pub use diagnostics::{diagnostics, first_diagnostic, Diagnostic, DiagnosticKind};
pub use line::{LineEvent, LineTracker};
pub use tokenizer::{split_words, strip_background_marker, tokenize, Token, TokenKind};
