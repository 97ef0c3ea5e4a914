//! Source location tracking for diagnostics.
//!
//! Provides [`Span`] to track where an expression or command starts, and
//! [`CodeString`], the span-carrying text slice handed to the semantic core by
//! the recognizer front end.

use std::fmt;

/// A span of source code, represented by its starting position.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, byte-based).
    pub col: u32,
    /// Length in bytes.
    pub len: u32,
}

impl Span {
    /// Create a new span from a line, column, and length.
    #[inline]
    pub fn new(line: u32, col: u32, len: u32) -> Self {
        Self { line, col, len }
    }

    /// Create a zero-length span at a position.
    #[inline]
    pub fn point(line: u32, col: u32) -> Self {
        Self { line, col, len: 0 }
    }

    /// Whether this span is empty (zero length).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The length of this span in bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether this span points at real source (line 0 is never produced by the front end).
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.line != 0
    }

    /// Merge two spans into one that starts at the first span and covers both.
    ///
    /// Spans on different lines keep the first position and add the lengths.
    #[inline]
    pub fn merge(self, other: Span) -> Span {
        if !self.is_valid() {
            return other;
        }
        if !other.is_valid() {
            return self;
        }

        if self.line == other.line {
            let start_col = self.col.min(other.col);
            let end_col = (other.col + other.len).max(self.col + self.len);
            Span {
                line: self.line,
                col: start_col,
                len: end_col - start_col,
            }
        } else {
            Span {
                line: self.line,
                col: self.col,
                len: self.len + other.len,
            }
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

// ============================================================================
// CodeString
// ============================================================================

/// A piece of source text together with the span it was taken from.
///
/// Single-line only: substring columns are computed by byte offset from
/// `span.col`.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct CodeString {
    text: String,
    span: Span,
}

impl CodeString {
    pub fn new(text: impl Into<String>, span: Span) -> Self {
        Self {
            text: text.into(),
            span,
        }
    }

    /// A code string whose span is derived from its text, starting at `line:col`.
    pub fn at(text: impl Into<String>, line: u32, col: u32) -> Self {
        let text = text.into();
        let len = text.len() as u32;
        Self {
            text,
            span: Span::new(line, col, len),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn span(&self) -> Span {
        self.span
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.span.is_valid()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Take `len` bytes starting at byte `start`. Out-of-range requests are clamped.
    pub fn substring(&self, start: usize, len: usize) -> CodeString {
        let start = start.min(self.text.len());
        let end = (start + len).min(self.text.len());
        let text = self.text.get(start..end).unwrap_or_default().to_string();
        let span = Span::new(
            self.span.line,
            self.span.col + start as u32,
            (end - start) as u32,
        );
        CodeString { text, span }
    }

    /// Everything from byte `start` to the end.
    pub fn substring_from(&self, start: usize) -> CodeString {
        let len = self.text.len().saturating_sub(start);
        self.substring(start, len)
    }

    /// Strip leading and trailing whitespace, adjusting the span.
    pub fn trim(&self) -> CodeString {
        let leading = self.text.len() - self.text.trim_start().len();
        let trimmed_len = self.text.trim().len();
        self.substring(leading, trimmed_len)
    }

    /// Byte position of the first occurrence of `ch`.
    pub fn find(&self, ch: char) -> Option<usize> {
        self.text.find(ch)
    }
}

impl fmt::Debug for CodeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.text, self.span)
    }
}

impl fmt::Display for CodeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
