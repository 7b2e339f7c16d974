//! # Span Locator
//!
//! Builds a [`MetadataNode`] tree with byte spans for a YAML frontmatter
//! block. `serde_yaml` produces the values but keeps no positions, so this
//! module re-reads the block structure: block mappings and sequences,
//! plain and quoted scalars, block scalars (`|`, `>`), flow collections,
//! comments, anchors and tags. Explicit `? key` entries are skipped as a
//! whole, since a complex key cannot be named by an instance path.
//!
//! The locator runs only on text the deserializer has already accepted. It
//! never fails: anything it cannot place gets no span, and the diagnostic
//! falls back to the document start.

use fmschema_core::ByteSpan;

use crate::ast::{MappingEntry, MetadataNode, NodeKind};

/// Locate every node of `content`, whose first byte is at `base` in the
/// document.
pub fn locate(content: &str, base: usize) -> MetadataNode {
    let mut locator = Locator::new(content, base);
    locator.skip_ignorable();
    let Some(line) = locator.lines.get(locator.pos) else {
        return MetadataNode::empty_mapping();
    };
    let indent = line.indent;
    locator.block_node(indent, None)
}

#[derive(Debug)]
struct Line<'a> {
    /// Offset of the line within the block.
    start: usize,
    /// Line text without its terminator.
    text: &'a str,
    /// Leading spaces.
    indent: usize,
}

impl Line<'_> {
    fn is_ignorable(&self) -> bool {
        let trimmed = self.text.trim_start();
        trimmed.is_empty() || trimmed.starts_with('#')
    }
}

struct Locator<'a> {
    src: &'a str,
    base: usize,
    lines: Vec<Line<'a>>,
    /// Next unconsumed line.
    pos: usize,
}

impl<'a> Locator<'a> {
    fn new(src: &'a str, base: usize) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for raw in src.split('\n') {
            let text = raw.strip_suffix('\r').unwrap_or(raw);
            let indent = text.len() - text.trim_start_matches(' ').len();
            lines.push(Line {
                start,
                text,
                indent,
            });
            start += raw.len() + 1;
        }
        Self {
            src,
            base,
            lines,
            pos: 0,
        }
    }

    fn span(&self, start: usize, end: usize) -> ByteSpan {
        ByteSpan::new(self.base + start, self.base + end)
    }

    fn skip_ignorable(&mut self) {
        while self.lines.get(self.pos).is_some_and(Line::is_ignorable) {
            self.pos += 1;
        }
    }

    /// The next significant line, without consuming it.
    fn peek(&mut self) -> Option<&Line<'a>> {
        self.skip_ignorable();
        self.lines.get(self.pos)
    }

    fn line_of(&self, offset: usize) -> usize {
        self.lines
            .partition_point(|line| line.start <= offset)
            .saturating_sub(1)
    }

    /// Rest of the current line from byte `col`.
    fn rest(&self, col: usize) -> &'a str {
        self.lines
            .get(self.pos)
            .and_then(|line| line.text.get(col..))
            .unwrap_or("")
    }

    /// A block node starting at column `col` of the current line. Lines that
    /// belong to it are more indented than `parent` (or anything, at the top).
    fn block_node(&mut self, col: usize, parent: Option<usize>) -> MetadataNode {
        let rest = self.rest(col);
        if is_sequence_entry(rest) {
            return self.sequence(col);
        }
        if rest.starts_with('[') || rest.starts_with('{') {
            return self.flow_at(col);
        }
        if rest.starts_with('|') || rest.starts_with('>') {
            return self.block_scalar(col, parent);
        }
        if rest.starts_with('&') || rest.starts_with('!') {
            return self.with_properties(col, parent);
        }
        if is_explicit_key(rest) || mapping_colon(rest).is_some() {
            return self.mapping(col);
        }
        self.scalar(col, parent)
    }

    /// A value that follows `key:` on the same line.
    fn inline_value(&mut self, col: usize, parent: usize) -> MetadataNode {
        let rest = self.rest(col);
        if rest.starts_with('[') || rest.starts_with('{') {
            return self.flow_at(col);
        }
        if rest.starts_with('|') || rest.starts_with('>') {
            return self.block_scalar(col, Some(parent));
        }
        if rest.starts_with('&') || rest.starts_with('!') {
            return self.with_properties(col, Some(parent));
        }
        self.scalar(col, Some(parent))
    }

    /// Skip anchors and tags, then read the node they decorate.
    fn with_properties(&mut self, col: usize, parent: Option<usize>) -> MetadataNode {
        let rest = self.rest(col);
        let mut offset = 0;
        while rest[offset..].starts_with('&') || rest[offset..].starts_with('!') {
            let token = rest[offset..]
                .find(char::is_whitespace)
                .unwrap_or(rest.len() - offset);
            offset += token;
            offset += rest[offset..].len() - rest[offset..].trim_start().len();
        }
        let remaining = &rest[offset..];
        if remaining.is_empty() || remaining.starts_with('#') {
            // The decorated node starts on a following line.
            self.pos += 1;
            return self.nested_value(parent);
        }
        match parent {
            Some(parent) if !is_sequence_entry(remaining) && mapping_colon(remaining).is_none() => {
                self.inline_value(col + offset, parent)
            }
            _ => self.block_node(col + offset, parent),
        }
    }

    /// The value on the lines after a `key:` or `-` with nothing after it.
    fn nested_value(&mut self, parent: Option<usize>) -> MetadataNode {
        let Some(line) = self.peek() else {
            return MetadataNode::null();
        };
        let indent = line.indent;
        let deeper = parent.map_or(true, |p| indent > p);
        // `key:` followed by `- item` lines at the key's own indentation.
        let compact_sequence = parent == Some(indent) && is_sequence_entry(&line.text[indent..]);
        if deeper || compact_sequence {
            self.block_node(indent, parent)
        } else {
            MetadataNode::null()
        }
    }

    fn mapping(&mut self, col: usize) -> MetadataNode {
        let first_line = self.pos;
        let mut entries = Vec::new();
        let mut end = self.lines[first_line].start + col;

        loop {
            let rest = self.rest(col);
            if is_explicit_key(rest) {
                // Complex keys have no path segment; skip the whole entry.
                self.skip_explicit_entry(col);
            } else if let Some((key, key_len, colon)) = mapping_key(rest) {
                let line_start = self.lines[self.pos].start;
                let key_span = self.span(line_start + col, line_start + col + key_len);

                let after = col + colon + 1;
                let value_rest = self.rest(after);
                let value_col = after + (value_rest.len() - value_rest.trim_start().len());
                let value_text = self.rest(value_col);
                let value = if value_text.is_empty() || value_text.starts_with('#') {
                    self.pos += 1;
                    self.nested_value(Some(col))
                } else {
                    self.inline_value(value_col, col)
                };
                end = value
                    .span
                    .map_or(key_span.end - self.base, |span| span.end - self.base);
                entries.push(MappingEntry {
                    key,
                    key_span,
                    value,
                });
            } else {
                break;
            }

            match self.peek() {
                Some(line) if line.indent == col && !is_sequence_entry(&line.text[col..]) => {}
                _ => break,
            }
        }

        let start = self.lines[first_line].start + col;
        MetadataNode::new(Some(self.span(start, end)), NodeKind::Mapping(entries))
    }

    /// Consume a `? key` line, its `: value` line, and everything nested
    /// under either.
    fn skip_explicit_entry(&mut self, col: usize) {
        self.pos += 1;
        while self.peek().is_some_and(|line| line.indent > col) {
            self.pos += 1;
        }
        if self
            .peek()
            .is_some_and(|line| line.indent == col && is_explicit_value(&line.text[col..]))
        {
            self.pos += 1;
            while self.peek().is_some_and(|line| line.indent > col) {
                self.pos += 1;
            }
        }
    }

    fn sequence(&mut self, col: usize) -> MetadataNode {
        let start = self.lines[self.pos].start + col;
        let mut items = Vec::new();
        let mut end;

        loop {
            let after_dash = self.rest(col + 1);
            let item_col = col + 1 + (after_dash.len() - after_dash.trim_start().len());
            let item_text = self.rest(item_col);
            let line_start = self.lines[self.pos].start;
            let item = if item_text.is_empty() || item_text.starts_with('#') {
                self.pos += 1;
                self.nested_value(Some(col))
            } else {
                self.block_node(item_col, Some(col))
            };
            end = item.span.map_or(line_start + col + 1, |span| span.end - self.base);
            items.push(item);

            match self.peek() {
                Some(line)
                    if line.indent == col && is_sequence_entry(&line.text[col..]) => {}
                _ => break,
            }
        }

        MetadataNode::new(Some(self.span(start, end)), NodeKind::Sequence(items))
    }

    /// A plain or quoted scalar, including multi-line continuations.
    fn scalar(&mut self, col: usize, parent: Option<usize>) -> MetadataNode {
        let line_start = self.lines[self.pos].start;
        let start = line_start + col;
        let rest = self.rest(col);

        if rest.starts_with('"') || rest.starts_with('\'') {
            let end = quoted_end(self.src, start).unwrap_or(line_start + self.lines[self.pos].text.len());
            self.pos = self.line_of(end.saturating_sub(1)) + 1;
            return MetadataNode::scalar(self.span(start, end));
        }

        let mut end = start + plain_len(rest);
        self.pos += 1;
        // Plain scalars continue on more-indented lines.
        loop {
            let mut probe = self.pos;
            while self.lines.get(probe).is_some_and(|l| l.text.trim().is_empty()) {
                probe += 1;
            }
            let Some(line) = self.lines.get(probe) else {
                break;
            };
            let deeper = parent.map_or(line.indent > 0, |p| line.indent > p);
            if !deeper || line.text.trim_start().starts_with('#') {
                break;
            }
            let text = &line.text[line.indent..];
            end = line.start + line.indent + plain_len(text);
            self.pos = probe + 1;
        }
        MetadataNode::scalar(self.span(start, end))
    }

    /// `|` or `>` scalars: the indicator line plus every deeper line.
    fn block_scalar(&mut self, col: usize, parent: Option<usize>) -> MetadataNode {
        let start = self.lines[self.pos].start + col;
        let header = self.rest(col);
        let mut end = start + plain_len(header);
        self.pos += 1;
        while let Some(line) = self.lines.get(self.pos) {
            if line.text.trim().is_empty() {
                self.pos += 1;
                continue;
            }
            if !parent.map_or(true, |p| line.indent > p) {
                break;
            }
            end = line.start + line.text.trim_end().len();
            self.pos += 1;
        }
        // Trailing blank lines belong to whatever follows.
        while self.pos > 0
            && self
                .lines
                .get(self.pos - 1)
                .is_some_and(|line| line.text.trim().is_empty() && line.start > end)
        {
            self.pos -= 1;
        }
        MetadataNode::scalar(self.span(start, end))
    }

    fn flow_at(&mut self, col: usize) -> MetadataNode {
        let start = self.lines[self.pos].start + col;
        let mut flow = Flow {
            src: self.src,
            at: start,
            base: self.base,
        };
        let node = flow.node();
        self.pos = self.line_of(flow.at.saturating_sub(1).max(start)) + 1;
        node
    }
}

/// `-` followed by whitespace or the end of the line.
fn is_sequence_entry(rest: &str) -> bool {
    rest == "-" || rest.starts_with("- ") || rest.starts_with("-\t")
}

/// `? ` opening an explicit mapping key.
fn is_explicit_key(rest: &str) -> bool {
    rest == "?" || rest.starts_with("? ") || rest.starts_with("?\t")
}

/// `: ` introducing the value of an explicit key.
fn is_explicit_value(rest: &str) -> bool {
    rest == ":" || rest.starts_with(": ") || rest.starts_with(":\t")
}

/// Byte length of a plain value on one line, without a trailing comment or
/// whitespace.
fn plain_len(text: &str) -> usize {
    let mut previous_is_space = true;
    for (i, c) in text.char_indices() {
        if c == '#' && previous_is_space && i > 0 {
            return text[..i].trim_end().len();
        }
        previous_is_space = c == ' ' || c == '\t';
    }
    text.trim_end().len()
}

/// Offset just past the closing quote of the scalar opening at `start`.
fn quoted_end(src: &str, start: usize) -> Option<usize> {
    let quote = src[start..].chars().next()?;
    let mut chars = src[start + 1..].char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let at = start + 1 + i;
        match (quote, c) {
            ('"', '\\') => {
                chars.next();
            }
            ('\'', '\'') if chars.peek().is_some_and(|(_, next)| *next == '\'') => {
                chars.next();
            }
            (q, c) if c == q => return Some(at + c.len_utf8()),
            _ => {}
        }
    }
    None
}

/// Byte index of the `:` that makes `rest` a `key: value` line.
fn mapping_colon(rest: &str) -> Option<usize> {
    mapping_key(rest).map(|(_, _, colon)| colon)
}

/// Key text, key length in bytes, and colon index of a `key: value` line.
fn mapping_key(rest: &str) -> Option<(String, usize, usize)> {
    if rest.starts_with('"') || rest.starts_with('\'') {
        let close = quoted_end(rest, 0)?;
        let after = &rest[close..];
        let colon = close + (after.len() - after.trim_start().len());
        if !is_indicator_colon(rest, colon) {
            return None;
        }
        let key = serde_yaml::from_str::<String>(&rest[..close])
            .unwrap_or_else(|_| rest[1..close - 1].to_string());
        return Some((key, close, colon));
    }
    if rest.starts_with('#') || rest.starts_with('[') || rest.starts_with('{') {
        return None;
    }
    let mut previous_is_space = false;
    for (i, c) in rest.char_indices() {
        if c == '#' && previous_is_space {
            return None;
        }
        if c == ':' && is_indicator_colon(rest, i) {
            let key = rest[..i].trim_end();
            return Some((key.to_string(), key.len(), i));
        }
        previous_is_space = c == ' ' || c == '\t';
    }
    None
}

/// A `:` at `i` that is followed by whitespace or the end of the line.
fn is_indicator_colon(text: &str, i: usize) -> bool {
    text[i..].starts_with(':')
        && matches!(text[i + 1..].chars().next(), None | Some(' ' | '\t'))
}

/// Reader for flow collections, which may span lines.
struct Flow<'a> {
    src: &'a str,
    at: usize,
    base: usize,
}

impl Flow<'_> {
    fn span(&self, start: usize, end: usize) -> ByteSpan {
        ByteSpan::new(self.base + start, self.base + end)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.at..].chars().next()
    }

    fn skip_space(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.at += c.len_utf8();
            } else if c == '#' {
                let line_end = self.src[self.at..].find('\n').map_or(self.src.len(), |i| self.at + i);
                self.at = line_end;
            } else {
                break;
            }
        }
    }

    fn node(&mut self) -> MetadataNode {
        self.skip_space();
        match self.peek() {
            Some('[') => self.sequence(),
            Some('{') => self.mapping(),
            Some(_) => self.scalar(),
            None => MetadataNode::null(),
        }
    }

    fn sequence(&mut self) -> MetadataNode {
        let start = self.at;
        self.at += 1;
        let mut items = Vec::new();
        loop {
            self.skip_space();
            match self.peek() {
                Some(']') => {
                    self.at += 1;
                    break;
                }
                Some(',') => {
                    self.at += 1;
                }
                None => break,
                Some(_) => {
                    let before = self.at;
                    let item = self.node();
                    self.skip_space();
                    // `[key: value]` is a single-pair mapping.
                    let item = if self.peek() == Some(':') {
                        self.at += 1;
                        let value = self.value();
                        let end = value.span.or(item.span).map_or(self.at, |s| s.end - self.base);
                        MetadataNode::new(
                            Some(self.span(before, end)),
                            NodeKind::Mapping(vec![MappingEntry {
                                key: flow_key(self.src, &item, self.base),
                                key_span: item.span.unwrap_or_else(|| self.span(before, before)),
                                value,
                            }]),
                        )
                    } else {
                        item
                    };
                    items.push(item);
                    if self.at == before {
                        self.at += self.peek().map_or(1, char::len_utf8);
                    }
                }
            }
        }
        MetadataNode::new(Some(self.span(start, self.at)), NodeKind::Sequence(items))
    }

    fn mapping(&mut self) -> MetadataNode {
        let start = self.at;
        self.at += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_space();
            match self.peek() {
                Some('}') => {
                    self.at += 1;
                    break;
                }
                Some(',') => {
                    self.at += 1;
                }
                None => break,
                Some(_) => {
                    let before = self.at;
                    let key_node = self.scalar();
                    self.skip_space();
                    let value = if self.peek() == Some(':') {
                        self.at += 1;
                        self.value()
                    } else {
                        MetadataNode::null()
                    };
                    entries.push(MappingEntry {
                        key: flow_key(self.src, &key_node, self.base),
                        key_span: key_node.span.unwrap_or_else(|| self.span(before, before)),
                        value,
                    });
                    if self.at == before {
                        self.at += self.peek().map_or(1, char::len_utf8);
                    }
                }
            }
        }
        MetadataNode::new(Some(self.span(start, self.at)), NodeKind::Mapping(entries))
    }

    /// The value after a `:`, which may be empty.
    fn value(&mut self) -> MetadataNode {
        self.skip_space();
        match self.peek() {
            Some(',' | '}' | ']') | None => MetadataNode::null(),
            Some(_) => self.node(),
        }
    }

    fn scalar(&mut self) -> MetadataNode {
        let start = self.at;
        if matches!(self.peek(), Some('"' | '\'')) {
            let end = quoted_end(self.src, start).unwrap_or(self.src.len());
            self.at = end;
            return MetadataNode::scalar(self.span(start, end));
        }
        let rest = &self.src[start..];
        let mut end = rest.len();
        for (i, c) in rest.char_indices() {
            let stop = match c {
                ',' | ']' | '}' | '\n' => true,
                ':' => matches!(
                    rest[i + 1..].chars().next(),
                    None | Some(' ' | '\t' | '\n' | '\r' | ',' | ']' | '}')
                ),
                '#' => i > 0 && rest[..i].ends_with([' ', '\t']),
                _ => false,
            };
            if stop {
                end = i;
                break;
            }
        }
        let text = rest[..end].trim_end();
        self.at = start + end;
        if text.is_empty() {
            return MetadataNode::null();
        }
        MetadataNode::scalar(self.span(start, start + text.len()))
    }
}

/// The key string of a flow mapping entry.
fn flow_key(src: &str, node: &MetadataNode, base: usize) -> String {
    let Some(span) = node.span else {
        return String::new();
    };
    let raw = &src[span.start - base..span.end - base];
    if raw.starts_with('"') || raw.starts_with('\'') {
        serde_yaml::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string())
    } else {
        raw.to_string()
    }
}
