//! Well-formedness hints for the current input line
//!
//! Diagnostics are advisory. They are computed by counting characters, not
//! from the token stream, and never prevent a line from being submitted.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnmatchedSingleQuote,
    UnmatchedDoubleQuote,
    UnbalancedParentheses,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind) -> Self {
        let message = match kind {
            DiagnosticKind::UnmatchedSingleQuote => "Unmatched single quote",
            DiagnosticKind::UnmatchedDoubleQuote => "Unmatched double quote",
            DiagnosticKind::UnbalancedParentheses => "Unbalanced parentheses",
        };
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// All diagnostics for `input`, in a fixed order: single quote, double quote, parentheses
pub fn diagnostics(input: &str) -> Vec<Diagnostic> {
    let mut single = 0usize;
    let mut double = 0usize;
    let mut open = 0usize;
    let mut close = 0usize;

    for ch in input.chars() {
        match ch {
            '\'' => single += 1,
            '"' => double += 1,
            '(' => open += 1,
            ')' => close += 1,
            _ => {}
        }
    }

    let mut found = Vec::new();
    if single % 2 != 0 {
        found.push(Diagnostic::new(DiagnosticKind::UnmatchedSingleQuote));
    }
    if double % 2 != 0 {
        found.push(Diagnostic::new(DiagnosticKind::UnmatchedDoubleQuote));
    }
    if open != close {
        found.push(Diagnostic::new(DiagnosticKind::UnbalancedParentheses));
    }
    found
}

/// The diagnostic shown to the user, if any. Only the first one is surfaced.
pub fn first_diagnostic(input: &str) -> Option<Diagnostic> {
    diagnostics(input).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unmatched_single_quote() {
        let diag = first_diagnostic("echo 'foo").unwrap();
        assert_eq!(diag.kind, DiagnosticKind::UnmatchedSingleQuote);
        assert!(diag.message.contains("single quote"));
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let diag = first_diagnostic("echo (foo").unwrap();
        assert!(diag.message.contains("parentheses"));
    }

    #[test]
    fn test_well_formed_input() {
        assert!(diagnostics("echo 'foo' \"bar\" (baz)").is_empty());
        assert!(diagnostics("").is_empty());
    }

    #[test]
    fn test_only_first_is_surfaced() {
        let all = diagnostics("echo \"a (b");
        assert_eq!(all.len(), 2);
        assert_eq!(first_diagnostic("echo \"a (b").unwrap().kind, DiagnosticKind::UnmatchedDoubleQuote);
    }

    #[test]
    fn test_counting_ignores_nesting() {
        // A lone apostrophe inside double quotes still counts; the check is a heuristic
        assert_eq!(
            first_diagnostic("echo \"it's\"").map(|d| d.kind),
            Some(DiagnosticKind::UnmatchedSingleQuote)
        );
    }
}
