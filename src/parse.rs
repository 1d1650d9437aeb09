//! HTML parsing module.
//!
//! Feeds page source through a real HTML5 parser and copies the resulting
//! tree into the arena [`Document`]:
//! - Elements keep their tag names and attributes in source order
//! - Text nodes arrive entity-decoded
//! - Doctype, comments, and processing instructions are dropped
//!
//! Parsing never fails: malformed markup is repaired the way browsers
//! repair it, so downstream code always sees a well-formed tree.

use ego_tree::NodeRef;
use scraper::{Html, Node as HtmlNode};

use crate::dom::{Document, NodeId};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse page source into a [`Document`].
pub fn parse(source: &str) -> Document {
    let html = Html::parse_document(source);
    let mut doc = Document::new();
    let root = doc.root();
    for child in html.tree.root().children() {
        copy_node(&mut doc, root, child);
    }
    doc
}

fn copy_node(doc: &mut Document, parent: NodeId, node: NodeRef<'_, HtmlNode>) {
    match node.value() {
        HtmlNode::Element(el) => {
            let attrs = el
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            let id = doc.create_element(parent, el.name(), attrs);
            for child in node.children() {
                copy_node(doc, id, child);
            }
        }
        HtmlNode::Text(text) => {
            let content: &str = text;
            doc.create_text(parent, content);
        }
        // Nothing else carries content the viewer renders or wires.
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
