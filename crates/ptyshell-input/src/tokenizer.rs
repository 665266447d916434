//! Lexical scanner for shell input lines
//!
//! The tokenizer never fails: malformed input (an unterminated quote) is
//! annotated with an `Error` token instead of being rejected. Every character
//! of the input lands in exactly one token, whitespace included, so the
//! token values always concatenate back to the original text.

use serde::Serialize;

/// Two-character operators, checked before the single-character set
const TWO_CHAR_OPERATORS: [&str; 4] = [">>", "&&", "||", "2>"];

const OPERATOR_CHARS: [char; 7] = ['|', '>', '<', '&', ';', '(', ')'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Command,
    Argument,
    String,
    Operator,
    Whitespace,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// Byte offset of the token in the input
    pub start: usize,
}

impl Token {
    fn new(kind: TokenKind, input: &str, start: usize, end: usize) -> Self {
        Self {
            kind,
            value: input[start..end].to_string(),
            start,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Whitespace
    }
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Scan a quoted span starting at the opening quote.
    /// Returns true if the closing quote was found.
    fn scan_quoted(&mut self, quote: char) -> bool {
        self.bump();
        while let Some(ch) = self.bump() {
            if ch == '\\' {
                self.bump();
            } else if ch == quote {
                return true;
            }
        }
        false
    }

    fn scan_word(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == '\'' || ch == '"' || OPERATOR_CHARS.contains(&ch) {
                break;
            }
            self.bump();
            if ch == '\\' {
                self.bump();
            }
        }
    }

    fn scan_operator(&mut self) -> bool {
        if let Some(op) = TWO_CHAR_OPERATORS.iter().find(|op| self.rest().starts_with(*op)) {
            self.pos += op.len();
            return true;
        }
        match self.peek() {
            Some(ch) if OPERATOR_CHARS.contains(&ch) => {
                self.bump();
                true
            }
            _ => false,
        }
    }
}

/// Split an input line into classified tokens.
///
/// The first word is the `Command`, every later word an `Argument`.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut scanner = Scanner::new(input);
    let mut seen_word = false;

    while let Some(ch) = scanner.peek() {
        let start = scanner.pos;

        if ch.is_whitespace() {
            while scanner.peek().is_some_and(char::is_whitespace) {
                scanner.bump();
            }
            tokens.push(Token::new(TokenKind::Whitespace, input, start, scanner.pos));
            continue;
        }

        if ch == '\'' || ch == '"' {
            let kind = if scanner.scan_quoted(ch) {
                TokenKind::String
            } else {
                TokenKind::Error
            };
            seen_word = true;
            tokens.push(Token::new(kind, input, start, scanner.pos));
            continue;
        }

        if scanner.scan_operator() {
            tokens.push(Token::new(TokenKind::Operator, input, start, scanner.pos));
            continue;
        }

        scanner.scan_word();
        let kind = if seen_word {
            TokenKind::Argument
        } else {
            TokenKind::Command
        };
        seen_word = true;
        tokens.push(Token::new(kind, input, start, scanner.pos));
    }

    tokens
}

/// Split a line into shell words with quotes removed.
///
/// Adjacent words and quoted spans join into one word (`foo"bar"` is `foobar`);
/// operators become words of their own.
pub fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current: Option<String> = None;

    for token in tokenize(input) {
        match token.kind {
            TokenKind::Whitespace => {
                if let Some(word) = current.take() {
                    words.push(word);
                }
            }
            TokenKind::Operator => {
                if let Some(word) = current.take() {
                    words.push(word);
                }
                words.push(token.value);
            }
            TokenKind::Command | TokenKind::Argument => {
                current.get_or_insert_with(String::new).push_str(&unescape(&token.value));
            }
            TokenKind::String | TokenKind::Error => {
                current.get_or_insert_with(String::new).push_str(&unquote(&token.value));
            }
        }
    }

    if let Some(word) = current {
        words.push(word);
    }
    words
}

/// Strip a trailing background marker (`&`, but not `&&`).
///
/// Returns the remaining command line when the marker is present.
pub fn strip_background_marker(input: &str) -> Option<&str> {
    let tokens = tokenize(input);
    let last = tokens.iter().rev().find(|t| !t.is_whitespace())?;
    if last.kind == TokenKind::Operator && last.value == "&" {
        let rest = input[..last.start].trim_end();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    } else {
        None
    }
}

fn unescape(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn unquote(span: &str) -> String {
    let mut chars = span.chars();
    let quote = match chars.next() {
        Some(q) => q,
        None => return String::new(),
    };
    let mut inner: String = chars.collect();
    if inner.ends_with(quote) {
        inner.pop();
    }
    if quote == '"' {
        unescape(&inner)
    } else {
        inner
    }
}
