//! Document paths.
//!
//! A path addresses one slot in the document tree as a sequence of typed
//! segments: object keys and decimal list indices. The wire form is an
//! RFC 6901 JSON Pointer string; parsing classifies each token and
//! unescapes in a single pass, rejecting malformed escapes.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PointerError {
    #[error("pointer {0:?} does not start at the document root")]
    NotRooted(String),
    #[error("malformed escape in pointer token {0:?}")]
    BadEscape(String),
}

/// One step of a document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// An object property name, held unescaped.
    Key(String),
    /// A list position. Only canonical decimals (no leading zeros) parse
    /// as indices; anything else stays a key.
    Index(usize),
}

impl Segment {
    pub fn key(text: impl Into<String>) -> Self {
        Segment::Key(text.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(key) => Some(key),
            Segment::Index(_) => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Segment::Index(index) => Some(*index),
            Segment::Key(_) => None,
        }
    }

    /// The key text a map parent stores this segment under.
    pub fn key_text(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }

    fn parse(token: &str) -> Result<Segment, PointerError> {
        let canonical_decimal = !token.is_empty()
            && token.bytes().all(|b| b.is_ascii_digit())
            && (token.len() == 1 || !token.starts_with('0'));
        if canonical_decimal {
            if let Ok(index) = token.parse() {
                return Ok(Segment::Index(index));
            }
        }
        let mut key = String::with_capacity(token.len());
        let mut chars = token.chars();
        while let Some(ch) = chars.next() {
            if ch != '~' {
                key.push(ch);
                continue;
            }
            match chars.next() {
                Some('0') => key.push('~'),
                Some('1') => key.push('/'),
                _ => return Err(PointerError::BadEscape(token.to_string())),
            }
        }
        Ok(Segment::Key(key))
    }

    fn write_escaped(&self, out: &mut String) {
        match self {
            Segment::Index(index) => out.push_str(&index.to_string()),
            Segment::Key(key) => {
                for ch in key.chars() {
                    match ch {
                        '~' => out.push_str("~0"),
                        '/' => out.push_str("~1"),
                        other => out.push(other),
                    }
                }
            }
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = String::new();
        self.write_escaped(&mut buf);
        f.write_str(&buf)
    }
}

/// Parse a pointer string into typed segments. The empty string is the
/// document root.
pub fn parse_pointer(pointer: &str) -> Result<Vec<Segment>, PointerError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let rooted = pointer
        .strip_prefix('/')
        .ok_or_else(|| PointerError::NotRooted(pointer.to_string()))?;
    rooted.split('/').map(Segment::parse).collect()
}

/// Render segments back into a pointer string.
pub fn format_pointer(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        segment.write_escaped(&mut out);
    }
    out
}
