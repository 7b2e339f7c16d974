//! # Metadata AST
//!
//! A minimal tree over the frontmatter that remembers where each node sits
//! in the document. It exists only to answer "where is the value at this
//! instance path?"; values themselves come from the YAML deserializer.

use fmschema_core::ByteSpan;

/// A node of the metadata tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataNode {
    /// Absolute byte span of the node in the document. `None` when the node
    /// has no source text, e.g. an implicit null (`key:` with no value).
    pub span: Option<ByteSpan>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Mapping(Vec<MappingEntry>),
    Sequence(Vec<MetadataNode>),
    /// A scalar; the span covers quotes and block indicators.
    Scalar,
    /// No value at all.
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// The key as the deserializer sees it (quotes removed).
    pub key: String,
    pub key_span: ByteSpan,
    pub value: MetadataNode,
}

impl MetadataNode {
    pub fn new(span: Option<ByteSpan>, kind: NodeKind) -> Self {
        Self { span, kind }
    }

    pub fn scalar(span: ByteSpan) -> Self {
        Self::new(Some(span), NodeKind::Scalar)
    }

    pub fn null() -> Self {
        Self::new(None, NodeKind::Null)
    }

    /// The tree of a document without frontmatter.
    pub fn empty_mapping() -> Self {
        Self::new(None, NodeKind::Mapping(Vec::new()))
    }

    /// Child by mapping key or sequence index. The last entry wins for
    /// duplicate keys, as in the deserialized value.
    pub fn get(&self, segment: &str) -> Option<&MetadataNode> {
        match &self.kind {
            NodeKind::Mapping(entries) => entries
                .iter()
                .rev()
                .find(|entry| entry.key == segment)
                .map(|entry| &entry.value),
            NodeKind::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            NodeKind::Scalar | NodeKind::Null => None,
        }
    }

    /// Walk a path of segments from this node.
    pub fn get_in<S: AsRef<str>>(&self, path: &[S]) -> Option<&MetadataNode> {
        path.iter()
            .try_fold(self, |node, segment| node.get(segment.as_ref()))
    }
}
