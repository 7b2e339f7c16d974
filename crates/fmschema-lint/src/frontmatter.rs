//! # Frontmatter Parsing
//!
//! The metadata block is the `---`-fenced YAML at the very top of a
//! document:
//!
//! ```text
//! ---
//! title: Hello
//! ---
//!
//! # Body
//! ```
//!
//! The closing fence may also be `...`. A document that does not open with a
//! fence, or never closes it, has no frontmatter: its [`ParsedMetadata`] has
//! no `block` and the lint rule skips it. An empty fenced block parses as
//! `{}`.
//!
//! [`MetadataParser`] is the seam hosts can replace; [`YamlFrontmatterParser`]
//! is the built-in implementation.

use fmschema_core::{ByteSpan, LineIndex, Position};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ast::MetadataNode;
use crate::locate::locate;

/// The metadata block is not valid YAML.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid YAML frontmatter at {position}: {message}")]
pub struct SyntaxError {
    /// Absolute byte offset of the error in the document.
    pub offset: usize,
    pub position: Position,
    pub message: String,
}

/// Everything the pipeline needs from a parsed document.
#[derive(Debug, Clone)]
pub struct ParsedMetadata {
    /// Span-carrying tree, for locating errors.
    pub ast: MetadataNode,
    /// The metadata as data, for validation.
    pub value: Value,
    /// Line index over the full document text.
    pub lines: LineIndex,
    /// The block including its fences, if the document has one.
    pub block: Option<ByteSpan>,
}

/// Produces metadata from raw document text.
pub trait MetadataParser {
    /// # Errors
    ///
    /// Returns [`SyntaxError`] when the metadata block cannot be parsed.
    fn parse(&self, text: &str) -> Result<ParsedMetadata, SyntaxError>;
}

/// Location of a fenced block within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frontmatter<'a> {
    /// Text between the fences.
    pub content: &'a str,
    /// Absolute offset of `content`.
    pub content_offset: usize,
    /// Opening fence through the end of the closing fence.
    pub block: ByteSpan,
}

/// Find the frontmatter block at the top of `text`.
pub fn extract(text: &str) -> Option<Frontmatter<'_>> {
    let start = if text.starts_with('\u{feff}') { '\u{feff}'.len_utf8() } else { 0 };
    let mut lines = LineSlices::new(text, start);

    let (_, opening) = lines.next()?;
    if opening.trim_end() != "---" {
        return None;
    }
    let content_offset = lines.at;

    for (line_start, line) in lines {
        let fence = line.trim_end();
        if fence == "---" || fence == "..." {
            return Some(Frontmatter {
                content: &text[content_offset..line_start],
                content_offset,
                block: ByteSpan::new(start, line_start + line.len()),
            });
        }
    }
    None
}

/// Lines of `text` from `start`, each with its offset and without the
/// terminator (`\r` is kept and trimmed by callers).
struct LineSlices<'a> {
    text: &'a str,
    at: usize,
}

impl<'a> LineSlices<'a> {
    fn new(text: &'a str, at: usize) -> Self {
        Self { text, at }
    }
}

impl<'a> Iterator for LineSlices<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.at >= self.text.len() {
            return None;
        }
        let start = self.at;
        let rest = &self.text[start..];
        let line = match rest.find('\n') {
            Some(i) => {
                self.at = start + i + 1;
                &rest[..i]
            }
            None => {
                self.at = self.text.len();
                rest
            }
        };
        Some((start, line))
    }
}

/// Front-matter parser backed by `serde_yaml` for values and the span
/// locator for positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFrontmatterParser;

impl MetadataParser for YamlFrontmatterParser {
    fn parse(&self, text: &str) -> Result<ParsedMetadata, SyntaxError> {
        let lines = LineIndex::new(text);
        let Some(frontmatter) = extract(text) else {
            return Ok(ParsedMetadata {
                ast: MetadataNode::empty_mapping(),
                value: Value::Object(Map::new()),
                lines,
                block: None,
            });
        };

        let value = if is_blank(frontmatter.content) {
            Value::Null
        } else {
            serde_yaml::from_str::<Value>(frontmatter.content).map_err(|e| {
                let offset = frontmatter.content_offset
                    + e.location().map_or(0, |location| location.index());
                SyntaxError {
                    offset,
                    position: lines.position(offset),
                    message: e.to_string(),
                }
            })?
        };
        let value = match value {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        Ok(ParsedMetadata {
            ast: locate(frontmatter.content, frontmatter.content_offset),
            value,
            lines,
            block: Some(frontmatter.block),
        })
    }
}

/// Only whitespace and comments.
fn is_blank(content: &str) -> bool {
    content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOC: &str = "---\ntitle: Hello\ncount: 2\n---\n\n# Body\n";

    #[test]
    fn extracts_fenced_block() {
        let fm = extract(DOC).unwrap();
        assert_eq!(fm.content, "title: Hello\ncount: 2\n");
        assert_eq!(fm.content_offset, 4);
        assert_eq!(&DOC[fm.block.start..fm.block.end], "---\ntitle: Hello\ncount: 2\n---");
    }

    #[test]
    fn dots_close_the_block() {
        let fm = extract("---\na: 1\n...\nbody").unwrap();
        assert_eq!(fm.content, "a: 1\n");
    }

    #[test]
    fn crlf_fences() {
        let fm = extract("---\r\na: 1\r\n---\r\nbody").unwrap();
        assert_eq!(fm.content, "a: 1\r\n");
        assert_eq!(fm.content_offset, 5);
    }

    #[test]
    fn empty_block() {
        let fm = extract("---\n---\n").unwrap();
        assert_eq!(fm.content, "");
    }

    #[test]
    fn no_frontmatter() {
        assert!(extract("# Title\n---\na: 1\n---\n").is_none());
        assert!(extract("").is_none());
        assert!(extract("----\na: 1\n----\n").is_none());
    }

    #[test]
    fn unterminated_block_is_not_frontmatter() {
        assert!(extract("---\na: 1\n\nbody\n").is_none());
    }

    #[test]
    fn byte_order_mark_is_skipped() {
        let text = "\u{feff}---\na: 1\n---\n";
        let fm = extract(text).unwrap();
        assert_eq!(fm.content, "a: 1\n");
        assert_eq!(fm.block.start, 3);
    }

    #[test]
    fn parses_value_and_positions() {
        let parsed = YamlFrontmatterParser.parse(DOC).unwrap();
        assert_eq!(parsed.value, json!({ "title": "Hello", "count": 2 }));

        let span = parsed.ast.get("count").and_then(|n| n.span).unwrap();
        assert_eq!(&DOC[span.start..span.end], "2");
        assert_eq!(parsed.lines.position(span.start), Position::new(3, 8));
    }

    #[test]
    fn missing_or_empty_frontmatter_is_empty_object() {
        for text in ["# Just a body\n", "---\n---\n", "---\n# nothing here\n---\n", "---\n~\n---\n"] {
            let parsed = YamlFrontmatterParser.parse(text).unwrap();
            assert_eq!(parsed.value, json!({}), "for {text:?}");
        }
    }

    #[test]
    fn syntax_error_is_positioned_in_the_document() {
        let text = "---\ntitle: ok\nlist: [a, b\n---\n";
        let err = YamlFrontmatterParser.parse(text).unwrap_err();
        assert!(err.offset >= 4, "offset {} is inside the block", err.offset);
        assert!(err.position.line >= 2);
        assert!(!err.message.is_empty());
    }
}
