//! Sentence blocks and directive-line classification

use std::fmt;
use std::sync::Arc;

/// Prefix of a namespace declaration line
pub const NAMESPACE_DIRECTIVE: &str = "@prefix";

/// Collapse runs of tabs and spaces into one space and trim the line
pub fn normalize_line(line: &str) -> String {
    let mut normalized = String::with_capacity(line.len());
    let mut pending_space = false;

    for ch in line.trim().chars() {
        if ch == ' ' || ch == '\t' {
            pending_space = true;
            continue;
        }
        if pending_space {
            normalized.push(' ');
            pending_space = false;
        }
        normalized.push(ch);
    }

    normalized
}

/// A comment (`#`) or directive (`@`) line
pub fn is_directive(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('@')
}

/// A comment line
pub fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// A namespace declaration line
pub fn is_namespace_declaration(line: &str) -> bool {
    line.trim_start().starts_with(NAMESPACE_DIRECTIVE)
}

/// One sentence record plus its leading directive lines
///
/// Blocks are immutable and cheap to clone, so the same block can sit in the
/// lookahead window of one context and the lookback window of another.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SentenceBlock {
    text: Arc<str>,
}

impl SentenceBlock {
    /// Wrap raw block text
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self { text: text.into() }
    }

    /// The raw text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Comment lines, trimmed, in original order
    pub fn comments(&self) -> impl Iterator<Item = &str> {
        self.text
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('#'))
    }
}

impl fmt::Debug for SentenceBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SentenceBlock")
            .field(&format!("<{} bytes>", self.text.len()))
            .finish()
    }
}

impl From<&str> for SentenceBlock {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for SentenceBlock {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
