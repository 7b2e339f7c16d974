//! # Source Positions
//!
//! Byte spans, 1-based line/column positions, and the line index that maps
//! between them. Diagnostics carry [`SourceRange`]s; fix suggestions carry
//! [`ByteSpan`]s because hosts apply edits to the raw text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 1-based line/column position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line number, starting at 1.
    pub line: usize,
    /// Column number in characters, starting at 1.
    pub column: usize,
}

impl Position {
    /// The first character of the document.
    pub const DOCUMENT_START: Position = Position { line: 1, column: 1 };

    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A start/end pair of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

impl SourceRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-width range at a single position.
    pub fn point(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    /// The fallback range used when nothing more precise is known.
    pub fn document_start() -> Self {
        Self::point(Position::DOCUMENT_START)
    }
}

impl Default for SourceRange {
    fn default() -> Self {
        Self::document_start()
    }
}

/// A half-open byte range `[start, end)` into the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} past end {end}");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Shift both ends forward by `delta` bytes.
    pub fn offset(self, delta: usize) -> Self {
        Self {
            start: self.start + delta,
            end: self.end + delta,
        }
    }
}

impl fmt::Display for ByteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Converts absolute byte offsets into 1-based line/column positions.
///
/// Built once per document. Lines are terminated by `\n`; a preceding `\r`
/// counts as an ordinary character of the line it ends.
#[derive(Debug, Clone)]
pub struct LineIndex {
    text: String,
    /// Byte offset of the first character of each line. Always starts with 0.
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            text: text.to_string(),
            line_starts,
        }
    }

    /// Number of lines in the indexed text (a trailing newline opens a new, empty line).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where the given 1-based line begins.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        line.checked_sub(1)
            .and_then(|i| self.line_starts.get(i))
            .copied()
    }

    /// Position of the character at `offset`. Offsets past the end clamp to
    /// the end of the text.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line_idx = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line_idx];
        let column = match self.text.get(line_start..offset) {
            Some(prefix) => prefix.chars().count(),
            // Not on a char boundary; fall back to the byte distance.
            None => offset - line_start,
        };
        Position::new(line_idx + 1, column + 1)
    }

    /// Start and end positions of a byte span.
    pub fn range(&self, span: ByteSpan) -> SourceRange {
        SourceRange::new(self.position(span.start), self.position(span.end))
    }

    /// The indexed text.
    pub fn text(&self) -> &str {
        &self.text
    }
}
