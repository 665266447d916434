//! Decide whether a committed line may enter the history log
//!
//! Both checks are heuristics. A shell that never emits bracketed-paste
//! markers looks permanently idle, and a long single-token command that is
//! not a secret is still kept out of history.

use ptyshell_types::PromptState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    /// Enter was pressed while a program other than the shell had the terminal
    Executing,
    /// Looks like a pasted password or token
    Suspicious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDecision {
    Record,
    Skip(SkipReason),
}

/// A line longer than `threshold` chars with no internal whitespace
pub fn is_suspicious(line: &str, threshold: usize) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() > threshold && !trimmed.chars().any(char::is_whitespace)
}

pub fn should_record(line: &str, prompt_state: PromptState, threshold: usize) -> RecordDecision {
    if line.trim().is_empty() {
        RecordDecision::Skip(SkipReason::Empty)
    } else if prompt_state == PromptState::Executing {
        RecordDecision::Skip(SkipReason::Executing)
    } else if is_suspicious(line, threshold) {
        RecordDecision::Skip(SkipReason::Suspicious)
    } else {
        RecordDecision::Record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptyshell_types::SUSPICIOUS_INPUT_LENGTH;

    #[test]
    fn test_normal_line_is_recorded() {
        assert_eq!(
            should_record("git status", PromptState::AtPrompt, SUSPICIOUS_INPUT_LENGTH),
            RecordDecision::Record
        );
    }

    #[test]
    fn test_executing_line_is_skipped() {
        assert_eq!(
            should_record("hunter2", PromptState::Executing, SUSPICIOUS_INPUT_LENGTH),
            RecordDecision::Skip(SkipReason::Executing)
        );
    }

    #[test]
    fn test_long_single_token_is_suspicious() {
        let token = "x".repeat(51);
        assert!(is_suspicious(&token, SUSPICIOUS_INPUT_LENGTH));
        assert!(is_suspicious(&format!("  {}  ", token), SUSPICIOUS_INPUT_LENGTH));
        assert_eq!(
            should_record(&token, PromptState::AtPrompt, SUSPICIOUS_INPUT_LENGTH),
            RecordDecision::Skip(SkipReason::Suspicious)
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(!is_suspicious(&"x".repeat(50), SUSPICIOUS_INPUT_LENGTH));
    }

    #[test]
    fn test_long_line_with_spaces_is_fine() {
        let line = format!("echo {}", "x".repeat(80));
        assert!(!is_suspicious(&line, SUSPICIOUS_INPUT_LENGTH));
    }

    #[test]
    fn test_long_legitimate_command_is_still_excluded() {
        // Known limitation of the heuristic
        let url = "https://example.com/a/really/long/path/to/some/resource/index.html";
        assert!(is_suspicious(url, SUSPICIOUS_INPUT_LENGTH));
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(
            should_record("   ", PromptState::AtPrompt, SUSPICIOUS_INPUT_LENGTH),
            RecordDecision::Skip(SkipReason::Empty)
        );
    }
}
