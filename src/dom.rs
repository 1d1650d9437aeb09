//! HTML page tree.
//!
//! Holds a parsed page as a flat arena of nodes:
//! - Element nodes keep a lowercase tag name and attributes in source order
//! - Text nodes keep their character data
//! - An id index supports fragment lookups without walking the tree
//!
//! The selector engine lives here too. It parses the small CSS subset the
//! behavior layer is configured with (tag names, ids, classes, attribute
//! tests, descendant combinators) and rejects everything else up front, so
//! a bad configuration fails before any page is loaded.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Node arena
// ---------------------------------------------------------------------------

/// Index of a node within a [`Document`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// An element node: lowercase tag name plus attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    attrs: Vec<(String, String)>,
}

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// A parsed page held as a flat node arena.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    id_index: HashMap<String, NodeId>,
}

impl Document {
    /// Create an empty document containing only the document node.
    pub fn new() -> Document {
        let root = NodeId(0);
        Document {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root,
            id_index: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Append a new element under `parent` and return its id.
    ///
    /// Attribute names are stored lowercased. The first element created with
    /// a given `id` attribute wins the id index; later attribute edits do not
    /// reindex.
    pub fn create_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: Vec<(String, String)>,
    ) -> NodeId {
        let attrs: Vec<(String, String)> = attrs
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        let id = NodeId(self.nodes.len());
        if let Some((_, value)) = attrs.iter().find(|(name, _)| name == "id") {
            self.id_index.entry(value.clone()).or_insert(id);
        }
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind: NodeKind::Element(Element {
                tag: tag.to_ascii_lowercase(),
                attrs,
            }),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append a new text node under `parent` and return its id.
    pub fn create_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind: NodeKind::Text(text.to_string()),
        });
        self.nodes[parent.0].children.push(id);
        id
    }
}

impl Default for Document {
    fn default() -> Document {
        Document::new()
    }
}

// ---------------------------------------------------------------------------
// Tree access
// ---------------------------------------------------------------------------

impl Document {
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    /// Look up an element by the value of its `id` attribute.
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        self.id_index.get(value).copied()
    }

    /// Walk all descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack = self.nodes[id.0].children.clone();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    /// Subtree text flattened to a single line, whitespace collapsed.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut raw = String::new();
        for n in self.descendants(id) {
            if let NodeKind::Text(t) = self.kind(n) {
                raw.push_str(t);
            }
        }
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Preorder traversal over a subtree. See [`Document::descendants`].
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        // Push children in reverse so the leftmost child pops first.
        for &child in self.doc.nodes[id.0].children.iter().rev() {
            self.stack.push(child);
        }
        Some(id)
    }
}

// ---------------------------------------------------------------------------
// Attributes and classes
// ---------------------------------------------------------------------------

impl Document {
    /// Attribute value by name (names compare case-insensitively).
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing any existing value.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element(el) = &mut self.nodes[id.0].kind {
            let existing = el
                .attrs
                .iter_mut()
                .find(|(n, _)| n.eq_ignore_ascii_case(name));
            match existing {
                Some((_, v)) => *v = value.to_string(),
                None => el.attrs.push((name.to_ascii_lowercase(), value.to_string())),
            }
        }
    }

    /// Remove an attribute if present.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeKind::Element(el) = &mut self.nodes[id.0].kind {
            el.attrs.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
    }

    /// Whether the element's `class` attribute contains `class` as a
    /// whitespace-separated token.
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        match self.attr(id, "class") {
            Some(list) => list.split_ascii_whitespace().any(|c| c == class),
            None => false,
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let updated = match self.attr(id, "class") {
            Some(list) if !list.trim().is_empty() => format!("{list} {class}"),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", &updated);
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if let Some(list) = self.attr(id, "class") {
            let updated = list
                .split_ascii_whitespace()
                .filter(|c| *c != class)
                .collect::<Vec<_>>()
                .join(" ");
            self.set_attr(id, "class", &updated);
        }
    }

    /// Toggle a class token and report whether it is present afterwards.
    pub fn toggle_class(&mut self, id: NodeId, class: &str) -> bool {
        if self.has_class(id, class) {
            self.remove_class(id, class);
            false
        } else {
            self.add_class(id, class);
            true
        }
    }

    /// Whether the element carries the `hidden` attribute.
    pub fn hidden(&self, id: NodeId) -> bool {
        self.attr(id, "hidden").is_some()
    }

    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        if hidden {
            self.set_attr(id, "hidden", "");
        } else {
            self.remove_attr(id, "hidden");
        }
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// How an attribute test compares against an element's attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrOp {
    Present,
    Equals(String),
    StartsWith(String),
}

/// One compound selector; every constraint applies to the same element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SelectorPart {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, AttrOp)>,
}

/// A parsed selector: compound parts joined by descendant combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    parts: Vec<SelectorPart>,
}

impl Selector {
    /// Parse a selector string.
    ///
    /// Supported: tag names, `#id`, `.class`, `[attr]`, `[attr=value]`,
    /// `[attr^=value]`, and descendant combinators. Anything else is an
    /// error naming the offending syntax.
    pub fn parse(input: &str) -> Result<Selector, String> {
        if input.trim().is_empty() {
            return Err("empty selector".to_string());
        }
        let mut parts = Vec::new();
        for compound in split_compounds(input) {
            parts.push(parse_compound(compound, input)?);
        }
        Ok(Selector { parts })
    }

    /// Test whether `node` matches this selector within `doc`.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some((last, ancestors)) = self.parts.split_last() else {
            return false;
        };
        if !part_matches(doc, last, node) {
            return false;
        }
        // Remaining parts must match ancestors, nearest first. Ancestors
        // form a single chain, so the greedy walk is complete for
        // descendant combinators.
        let mut current = doc.parent(node);
        for part in ancestors.iter().rev() {
            loop {
                let candidate = match current {
                    Some(c) => c,
                    None => return false,
                };
                current = doc.parent(candidate);
                if part_matches(doc, part, candidate) {
                    break;
                }
            }
        }
        true
    }
}

impl Document {
    /// First element under `scope` (in document order) matching `selector`.
    pub fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope).find(|&n| selector.matches(self, n))
    }

    /// All elements under `scope` (in document order) matching `selector`.
    pub fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .filter(|&n| selector.matches(self, n))
            .collect()
    }
}

fn part_matches(doc: &Document, part: &SelectorPart, node: NodeId) -> bool {
    let el = match doc.element(node) {
        Some(el) => el,
        None => return false,
    };
    if let Some(tag) = &part.tag {
        if el.tag != *tag {
            return false;
        }
    }
    if let Some(id) = &part.id {
        if doc.attr(node, "id") != Some(id.as_str()) {
            return false;
        }
    }
    if !part.classes.iter().all(|c| doc.has_class(node, c)) {
        return false;
    }
    part.attrs.iter().all(|(name, op)| {
        let value = doc.attr(node, name);
        match op {
            AttrOp::Present => value.is_some(),
            AttrOp::Equals(expected) => value == Some(expected.as_str()),
            // An empty expected prefix never matches.
            AttrOp::StartsWith(prefix) => {
                !prefix.is_empty() && value.is_some_and(|v| v.starts_with(prefix.as_str()))
            }
        }
    })
}

/// Split on whitespace outside `[...]` groups, so quoted attribute values
/// may contain spaces.
fn split_compounds(input: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    for (i, c) in input.char_indices() {
        if c.is_whitespace() && depth == 0 {
            if let Some(s) = start.take() {
                out.push(&input[s..i]);
            }
            continue;
        }
        if start.is_none() {
            start = Some(i);
        }
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push(&input[s..]);
    }
    out
}

fn parse_compound(compound: &str, input: &str) -> Result<SelectorPart, String> {
    let mut part = SelectorPart::default();
    let mut rest = compound;

    // Optional leading tag name.
    let tag_end = rest
        .find(|c: char| !is_ident_char(c))
        .unwrap_or(rest.len());
    if tag_end > 0 {
        part.tag = Some(rest[..tag_end].to_ascii_lowercase());
        rest = &rest[tag_end..];
    }

    while let Some(ch) = rest.chars().next() {
        match ch {
            '#' => {
                let (name, tail) = take_ident(&rest[1..]);
                if name.is_empty() {
                    return Err(format!("invalid selector '{input}': expected id after '#'"));
                }
                part.id = Some(name.to_string());
                rest = tail;
            }
            '.' => {
                let (name, tail) = take_ident(&rest[1..]);
                if name.is_empty() {
                    return Err(format!(
                        "invalid selector '{input}': expected class after '.'"
                    ));
                }
                part.classes.push(name.to_string());
                rest = tail;
            }
            '[' => {
                let close = match rest.find(']') {
                    Some(close) => close,
                    None => return Err(format!("invalid selector '{input}': unclosed '['")),
                };
                part.attrs.push(parse_attr_test(&rest[1..close], input)?);
                rest = &rest[close + 1..];
            }
            _ => {
                return Err(format!("unsupported selector syntax '{ch}' in '{input}'"));
            }
        }
    }
    Ok(part)
}

fn parse_attr_test(body: &str, input: &str) -> Result<(String, AttrOp), String> {
    let body = body.trim();
    let eq = match body.find('=') {
        Some(eq) => eq,
        None => {
            if body.is_empty() || !body.chars().all(is_ident_char) {
                return Err(format!("invalid attribute test '[{body}]' in '{input}'"));
            }
            return Ok((body.to_ascii_lowercase(), AttrOp::Present));
        }
    };
    let (name_side, prefix_match) = match body[..eq].chars().last() {
        Some('^') => (body[..eq - 1].trim_end(), true),
        Some(c) if c == '$' || c == '*' || c == '~' || c == '|' => {
            return Err(format!("unsupported attribute operator '{c}=' in '{input}'"));
        }
        _ => (body[..eq].trim_end(), false),
    };
    if name_side.is_empty() || !name_side.chars().all(is_ident_char) {
        return Err(format!("invalid attribute test '[{body}]' in '{input}'"));
    }
    let value = unquote(body[eq + 1..].trim());
    let op = if prefix_match {
        AttrOp::StartsWith(value)
    } else {
        AttrOp::Equals(value)
    };
    Ok((name_side.to_ascii_lowercase(), op))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !is_ident_char(c)).unwrap_or(s.len());
    (&s[..end], &s[end..])
}

fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    /// header > (button.nav-toggle, nav#primary-nav > (a, a)), section[data-accordion] > button.faq-question
    fn sample_doc() -> Document {
        let mut doc = Document::new();
        let root = doc.root();
        let html = doc.create_element(root, "html", vec![]);
        let body = doc.create_element(html, "body", vec![]);
        let header = doc.create_element(body, "header", attrs(&[("class", "site-header")]));
        doc.create_element(
            header,
            "button",
            attrs(&[("class", "nav-toggle"), ("aria-expanded", "false")]),
        );
        let nav = doc.create_element(header, "nav", attrs(&[("id", "primary-nav")]));
        doc.create_element(nav, "a", attrs(&[("href", "#features")]));
        doc.create_element(nav, "a", attrs(&[("href", "about.html")]));
        let section = doc.create_element(body, "section", attrs(&[("data-accordion", "")]));
        doc.create_element(
            section,
            "button",
            attrs(&[("class", "faq-question"), ("aria-controls", "faq-a1")]),
        );
        doc
    }

    // --- tree and attributes ---

    #[test]
    fn class_tokens_split_on_whitespace() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.create_element(root, "div", attrs(&[("class", "alpha  beta\tgamma")]));
        assert!(doc.has_class(el, "alpha"));
        assert!(doc.has_class(el, "beta"));
        assert!(doc.has_class(el, "gamma"));
        assert!(!doc.has_class(el, "alph"));
    }

    #[test]
    fn add_class_is_idempotent() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.create_element(root, "div", vec![]);
        doc.add_class(el, "open");
        doc.add_class(el, "open");
        assert_eq!(doc.attr(el, "class"), Some("open"));
    }

    #[test]
    fn remove_class_keeps_others() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.create_element(root, "div", attrs(&[("class", "a b c")]));
        doc.remove_class(el, "b");
        assert_eq!(doc.attr(el, "class"), Some("a c"));
    }

    #[test]
    fn toggle_class_reports_new_state() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.create_element(root, "header", vec![]);
        assert!(doc.toggle_class(el, "nav-open"));
        assert!(doc.has_class(el, "nav-open"));
        assert!(!doc.toggle_class(el, "nav-open"));
        assert!(!doc.has_class(el, "nav-open"));
    }

    #[test]
    fn hidden_tracks_attribute_presence() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.create_element(root, "div", attrs(&[("hidden", "")]));
        assert!(doc.hidden(el));
        doc.set_hidden(el, false);
        assert!(!doc.hidden(el));
        assert_eq!(doc.attr(el, "hidden"), None);
        doc.set_hidden(el, true);
        assert!(doc.hidden(el));
    }

    #[test]
    fn first_element_with_id_wins() {
        let mut doc = Document::new();
        let root = doc.root();
        let first = doc.create_element(root, "div", attrs(&[("id", "dup")]));
        let _second = doc.create_element(root, "span", attrs(&[("id", "dup")]));
        assert_eq!(doc.element_by_id("dup"), Some(first));
    }

    #[test]
    fn attr_names_compare_case_insensitively() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.create_element(root, "div", attrs(&[("DATA-Accordion", "x")]));
        assert_eq!(doc.attr(el, "data-accordion"), Some("x"));
        assert_eq!(doc.attr(el, "DATA-ACCORDION"), Some("x"));
    }

    #[test]
    fn text_content_flattens_subtree() {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.create_element(root, "p", vec![]);
        doc.create_text(p, "  What ");
        let em = doc.create_element(p, "em", vec![]);
        doc.create_text(em, "is");
        doc.create_text(p, "  it?  ");
        assert_eq!(doc.text_content(p), "What is it?");
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let doc = sample_doc();
        let tags: Vec<&str> = doc
            .descendants(doc.root())
            .filter_map(|n| doc.tag(n))
            .collect();
        assert_eq!(
            tags,
            vec!["html", "body", "header", "button", "nav", "a", "a", "section", "button"]
        );
    }

    // --- selector parsing ---

    #[test]
    fn parses_compound_selector() {
        let sel = Selector::parse("nav#primary-nav.open").unwrap();
        assert_eq!(sel.parts.len(), 1);
        assert_eq!(sel.parts[0].tag.as_deref(), Some("nav"));
        assert_eq!(sel.parts[0].id.as_deref(), Some("primary-nav"));
        assert_eq!(sel.parts[0].classes, vec!["open".to_string()]);
    }

    #[test]
    fn parses_attribute_operators() {
        let sel = Selector::parse("a[href^=\"#\"]").unwrap();
        assert_eq!(
            sel.parts[0].attrs,
            vec![("href".to_string(), AttrOp::StartsWith("#".to_string()))]
        );

        let sel = Selector::parse("[data-accordion]").unwrap();
        assert_eq!(
            sel.parts[0].attrs,
            vec![("data-accordion".to_string(), AttrOp::Present)]
        );

        let sel = Selector::parse("input[type='checkbox']").unwrap();
        assert_eq!(
            sel.parts[0].attrs,
            vec![("type".to_string(), AttrOp::Equals("checkbox".to_string()))]
        );
    }

    #[test]
    fn descendant_chain_splits_outside_brackets() {
        let sel = Selector::parse("[data-accordion] .faq-question").unwrap();
        assert_eq!(sel.parts.len(), 2);

        let sel = Selector::parse("[data-label=\"a b\"] span").unwrap();
        assert_eq!(sel.parts.len(), 2);
        assert_eq!(
            sel.parts[0].attrs,
            vec![("data-label".to_string(), AttrOp::Equals("a b".to_string()))]
        );
    }

    #[test]
    fn rejects_unsupported_syntax() {
        for bad in ["ul > li", "a + b", "h1 ~ p", "a, b", "li:first-child", "*"] {
            let err = Selector::parse(bad).unwrap_err();
            assert!(
                err.contains("unsupported"),
                "expected unsupported error for {bad:?}, got {err:?}"
            );
        }
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("[href").is_err());
        assert!(Selector::parse("a[href$=\".pdf\"]").is_err());
    }

    // --- matching and queries ---

    #[test]
    fn matches_class_and_attr_tests() {
        let doc = sample_doc();
        let toggle = doc
            .query(doc.root(), &Selector::parse(".nav-toggle").unwrap())
            .unwrap();
        assert_eq!(doc.tag(toggle), Some("button"));
        assert!(Selector::parse("button[aria-expanded=false]")
            .unwrap()
            .matches(&doc, toggle));
        assert!(!Selector::parse("button[aria-expanded=true]")
            .unwrap()
            .matches(&doc, toggle));
    }

    #[test]
    fn descendant_combinator_matches_any_ancestor_depth() {
        let doc = sample_doc();
        let sel = Selector::parse("header a").unwrap();
        assert_eq!(doc.query_all(doc.root(), &sel).len(), 2);

        let sel = Selector::parse("[data-accordion] .faq-question").unwrap();
        let hits = doc.query_all(doc.root(), &sel);
        assert_eq!(hits.len(), 1);
        assert_eq!(doc.attr(hits[0], "aria-controls"), Some("faq-a1"));

        // The nav links are not inside the accordion section.
        let sel = Selector::parse("[data-accordion] a").unwrap();
        assert!(doc.query(doc.root(), &sel).is_none());
    }

    #[test]
    fn prefix_test_matches_fragment_links_only() {
        let doc = sample_doc();
        let sel = Selector::parse("a[href^=\"#\"]").unwrap();
        let hits = doc.query_all(doc.root(), &sel);
        assert_eq!(hits.len(), 1);
        assert_eq!(doc.attr(hits[0], "href"), Some("#features"));
    }

    #[test]
    fn empty_prefix_never_matches() {
        let doc = sample_doc();
        let sel = Selector::parse("a[href^=\"\"]").unwrap();
        assert!(doc.query(doc.root(), &sel).is_none());
    }

    #[test]
    fn query_scoped_to_subtree() {
        let doc = sample_doc();
        let header = doc
            .query(doc.root(), &Selector::parse(".site-header").unwrap())
            .unwrap();
        let sel = Selector::parse("button").unwrap();
        // Scoped under the header, the accordion trigger is out of reach.
        let hits = doc.query_all(header, &sel);
        assert_eq!(hits.len(), 1);
        assert!(doc.has_class(hits[0], "nav-toggle"));
    }
}
