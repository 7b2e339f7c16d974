//! Property tests for the frontmatter parser and span locator.
//!
//! Arbitrary YAML-ish input must never panic, and every span the locator
//! reports must be a valid slice of the document.

use fmschema_lint::locate::locate;
use fmschema_lint::{MetadataNode, MetadataParser, NodeKind, YamlFrontmatterParser};
use proptest::prelude::*;

fn assert_spans_valid(node: &MetadataNode, text: &str) {
    if let Some(span) = node.span {
        assert!(span.start <= span.end && span.end <= text.len(), "{span:?} in {text:?}");
        assert!(text.is_char_boundary(span.start) && text.is_char_boundary(span.end));
    }
    match &node.kind {
        NodeKind::Mapping(entries) => {
            for entry in entries {
                assert!(entry.key_span.end <= text.len());
                assert_spans_valid(&entry.value, text);
            }
        }
        NodeKind::Sequence(items) => items.iter().for_each(|item| assert_spans_valid(item, text)),
        NodeKind::Scalar | NodeKind::Null => {}
    }
}

fn yamlish() -> impl Strategy<Value = String> {
    let line = prop::string::string_regex(r"( {0,4})(- )?([a-zé$]{1,6}: ?)?([\[\]{},'\x22#|>a-z0-9 ]{0,12})")
        .unwrap();
    prop::collection::vec(line, 0..12).prop_map(|lines| lines.join("\n"))
}

proptest! {
    #[test]
    fn locator_spans_are_in_bounds(content in yamlish()) {
        let node = locate(&content, 0);
        assert_spans_valid(&node, &content);
    }

    #[test]
    fn parser_never_panics(content in yamlish()) {
        let text = format!("---\n{content}\n---\nbody\n");
        match YamlFrontmatterParser.parse(&text) {
            Ok(parsed) => {
                prop_assert!(!parsed.value.is_null());
                assert_spans_valid(&parsed.ast, &text);
            }
            Err(e) => prop_assert!(e.offset <= text.len()),
        }
    }
}
