//! Query normalization and passage text cleanup.

use std::fmt;

/// Punctuation that survives normalization.
const ALLOWED_PUNCTUATION: &[char] = &[',', '.', '!', '?', ';', ':', '(', ')', '-', '\'', '"'];

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(&c)
}

/// A user query, normalized once at construction and immutable afterwards.
///
/// The raw text is kept alongside for the generation fallback, which answers
/// the question exactly as the user asked it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    raw: String,
    normalized: String,
}

impl Query {
    /// Normalize `raw` into a query.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize_query(&raw);
        Self { raw, normalized }
    }

    /// The text exactly as supplied.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The normalized text used for backend calls and similarity scoring.
    pub fn text(&self) -> &str {
        &self.normalized
    }

    /// Whether normalization left nothing behind.
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Strip unsupported symbols, collapse whitespace, trim, and make sure the
/// text ends with sentence punctuation.
pub fn normalize_query(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|c| is_allowed(*c)).collect();
    let mut text = clean_text(&stripped);
    if !text.is_empty() && !text.ends_with(['.', '!', '?']) {
        text.push('.');
    }
    text
}

/// Collapse whitespace runs to single spaces and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
