//! Case-insensitive fuzzy subsequence matching
//!
//! A query matches when its characters appear in the target in order, not
//! necessarily next to each other.

/// How strongly a target matched a query. Ordered best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    /// The query appears as a contiguous substring
    Substring,
    /// The query appears only as a scattered subsequence
    Subsequence,
}

/// True when every character of `query` occurs in `text`, in order
pub fn fuzzy_match(text: &str, query: &str) -> bool {
    let text = text.to_lowercase();
    let query = query.to_lowercase();
    is_subsequence(&text, &query)
}

/// Classify a match, or `None` when `query` is not a subsequence of `text`
pub fn match_kind(text: &str, query: &str) -> Option<MatchKind> {
    let text = text.to_lowercase();
    let query = query.to_lowercase();
    if text.contains(&query) {
        Some(MatchKind::Substring)
    } else if is_subsequence(&text, &query) {
        Some(MatchKind::Subsequence)
    } else {
        None
    }
}

fn is_subsequence(text: &str, query: &str) -> bool {
    let mut text_chars = text.chars();
    query.chars().all(|q| text_chars.any(|t| t == q))
}
