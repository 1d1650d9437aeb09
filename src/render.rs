//! Page rendering module.
//!
//! Flattens a [`Document`] into styled ratatui [`Text`] for the terminal
//! viewport, and records where the interesting parts landed:
//! - Interactive elements (links and buttons) with their line and column
//!   extents, for focus cycling and highlighting
//! - Anchor lines for every element carrying an id, for fragment scrolling
//!
//! Hidden subtrees, `head` content, and a collapsed nav panel are omitted,
//! so the rendered text always reflects the page's current visual state.

use std::collections::HashMap;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};

use crate::dom::{Document, NodeId, NodeKind};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What kind of element an [`Interactive`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractiveKind {
    Link,
    Button,
}

/// A focusable element and where its rendered label landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interactive {
    pub node: NodeId,
    pub kind: InteractiveKind,
    /// 0-based line index in the rendered text.
    pub line: usize,
    /// Character columns of the rendered label on that line.
    pub col_start: usize,
    pub col_end: usize,
    /// Flattened label text, for the status bar.
    pub label: String,
    pub href: Option<String>,
}

/// A page rendered to styled text, plus the positions the shell needs.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub text: Text<'static>,
    /// Interactive elements in reading order.
    pub interactives: Vec<Interactive>,
    anchors: HashMap<NodeId, usize>,
}

impl RenderedPage {
    /// Line where `node`'s rendered content starts. `None` when the node
    /// was not rendered (hidden, collapsed, or empty at the very end).
    pub fn anchor_line(&self, node: NodeId) -> Option<usize> {
        self.anchors.get(&node).copied()
    }

    pub fn line_count(&self) -> usize {
        self.text.lines.len()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render a page to styled text.
///
/// `collapsed_panel` names a subtree to omit even though it carries no
/// `hidden` attribute; the shell passes the closed nav panel here.
pub fn render_page(doc: &Document, collapsed_panel: Option<NodeId>) -> RenderedPage {
    let mut renderer = Renderer {
        doc,
        collapsed_panel,
        lines: Vec::new(),
        current: Vec::new(),
        current_len: 0,
        last_space: false,
        quote_depth: 0,
        list_stack: Vec::new(),
        pending_anchors: Vec::new(),
        anchors: HashMap::new(),
        open_links: Vec::new(),
        interactives: Vec::new(),
    };
    renderer.render_children(doc.root(), Style::default());
    renderer.finish()
}

// ---------------------------------------------------------------------------
// Styles
// ---------------------------------------------------------------------------

fn heading_style(level: u8) -> Style {
    let base = Style::default().add_modifier(Modifier::BOLD);
    match level {
        1 => base.fg(Color::Magenta),
        2 => base.fg(Color::Cyan),
        3 => base.fg(Color::Green),
        4 => base.fg(Color::Yellow),
        _ => base.fg(Color::White),
    }
}

fn heading_prefix(level: u8) -> &'static str {
    match level {
        1 => "# ",
        2 => "## ",
        3 => "### ",
        4 => "#### ",
        5 => "##### ",
        6 => "###### ",
        _ => "# ",
    }
}

fn heading_level(tag: &str) -> u8 {
    match tag {
        "h1" => 1,
        "h2" => 2,
        "h3" => 3,
        "h4" => 4,
        "h5" => 5,
        "h6" => 6,
        _ => 6,
    }
}

fn link_style() -> Style {
    Style::default()
        .fg(Color::Blue)
        .add_modifier(Modifier::UNDERLINED)
}

fn button_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

fn bullet_style() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

fn border_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn code_style() -> Style {
    Style::default().fg(Color::Green).bg(Color::Black)
}

const QUOTE_BAR: &str = "  ▌ ";
const RULE: &str = "────────────────────────────────────────";

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Unordered,
    Ordered(usize),
}

struct OpenLink {
    node: NodeId,
    href: String,
    start_line: usize,
    start_col: usize,
    label: String,
}

struct Renderer<'d> {
    doc: &'d Document,
    collapsed_panel: Option<NodeId>,
    lines: Vec<Line<'static>>,
    /// Spans of the line being assembled.
    current: Vec<Span<'static>>,
    /// Character length of the line being assembled.
    current_len: usize,
    last_space: bool,
    quote_depth: usize,
    list_stack: Vec<ListKind>,
    /// Elements with ids awaiting their first rendered line.
    pending_anchors: Vec<NodeId>,
    anchors: HashMap<NodeId, usize>,
    open_links: Vec<OpenLink>,
    interactives: Vec<Interactive>,
}

impl Renderer<'_> {
    fn render_children(&mut self, node: NodeId, style: Style) {
        let doc = self.doc;
        for &child in doc.children(node) {
            self.render_node(child, style);
        }
    }

    fn render_node(&mut self, node: NodeId, style: Style) {
        let doc = self.doc;
        let el = match doc.kind(node) {
            NodeKind::Text(text) => {
                self.push_text(text, style);
                return;
            }
            NodeKind::Element(el) => el,
            NodeKind::Document => return,
        };
        if self.collapsed_panel == Some(node) || doc.hidden(node) {
            return;
        }
        if doc.attr(node, "id").is_some() {
            self.pending_anchors.push(node);
        }
        match el.tag.as_str() {
            "head" | "script" | "style" | "template" | "title" | "meta" | "link" => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.render_heading(node, heading_level(&el.tag))
            }
            "p" => {
                self.begin_block();
                self.render_children(node, style);
                self.flush();
            }
            "blockquote" => {
                self.begin_block();
                self.quote_depth += 1;
                let quoted =
                    style.patch(Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC));
                self.render_children(node, quoted);
                self.flush();
                self.quote_depth -= 1;
            }
            "pre" => self.render_pre(node),
            "hr" => {
                self.begin_block();
                self.push_raw_line(Line::from(Span::styled(RULE, border_style())));
            }
            "br" => self.flush(),
            "ul" => self.render_list(node, style, ListKind::Unordered),
            "ol" => self.render_list(node, style, ListKind::Ordered(0)),
            "li" => self.render_list_item(node, style),
            "table" => {
                self.begin_block();
                self.render_children(node, style);
                self.flush();
            }
            "tr" => {
                self.flush();
                self.render_children(node, style);
                self.flush();
            }
            "td" | "th" => {
                self.push_span("  ", Style::default());
                let cell = if el.tag == "th" {
                    style.add_modifier(Modifier::BOLD)
                } else {
                    style
                };
                self.render_children(node, cell);
            }
            "a" => match doc.attr(node, "href") {
                Some(href) => self.render_link(node, href, style),
                None => self.render_children(node, style),
            },
            "button" => self.render_button(node),
            "img" => self.render_image(node),
            "strong" | "b" => self.render_children(node, style.add_modifier(Modifier::BOLD)),
            "em" | "i" => self.render_children(node, style.add_modifier(Modifier::ITALIC)),
            "u" => self.render_children(node, style.add_modifier(Modifier::UNDERLINED)),
            "code" | "kbd" | "samp" => self.render_children(node, style.patch(code_style())),
            "html" | "body" | "div" | "main" | "section" | "article" | "header" | "footer"
            | "nav" | "aside" | "figure" | "figcaption" | "form" | "fieldset" | "details"
            | "summary" | "thead" | "tbody" | "tfoot" | "caption" | "address" => {
                self.flush();
                self.render_children(node, style);
                self.flush();
            }
            // Unknown tags render as transparent inline wrappers.
            _ => self.render_children(node, style),
        }
    }

    fn render_heading(&mut self, node: NodeId, level: u8) {
        self.begin_block();
        let style = heading_style(level);
        self.push_span(heading_prefix(level), style);
        self.render_children(node, style);
        self.flush();
    }

    fn render_link(&mut self, node: NodeId, href: &str, style: Style) {
        self.line_prefix();
        self.open_links.push(OpenLink {
            node,
            href: href.to_string(),
            start_line: self.lines.len(),
            start_col: self.current_len,
            label: String::new(),
        });
        self.render_children(node, style.patch(link_style()));
        self.close_link();
    }

    fn close_link(&mut self) {
        if let Some(open) = self.open_links.pop() {
            let (line, col_start, col_end) = if self.lines.len() == open.start_line {
                (open.start_line, open.start_col, self.current_len)
            } else if self.current_len > 0 {
                // Flushed mid-link; keep the trailing segment's extent.
                (self.lines.len(), 0, self.current_len)
            } else {
                // Block content closed its own line. Fall back to the last
                // flushed line so the extent still covers the label.
                match self.last_link_line(open.start_line) {
                    Some((idx, width)) => {
                        let col = if idx == open.start_line {
                            open.start_col
                        } else {
                            0
                        };
                        (idx, col, width)
                    }
                    None => (open.start_line, open.start_col, open.start_col),
                }
            };
            self.interactives.push(Interactive {
                node: open.node,
                kind: InteractiveKind::Link,
                line,
                col_start,
                col_end,
                label: open.label.trim().to_string(),
                href: Some(open.href),
            });
        }
    }

    /// Last non-empty flushed line at or after `start_line`, with its
    /// character width.
    fn last_link_line(&self, start_line: usize) -> Option<(usize, usize)> {
        let idx = self.lines.iter().rposition(|l| !l.spans.is_empty())?;
        if idx < start_line {
            return None;
        }
        let width = self.lines[idx]
            .spans
            .iter()
            .map(|s| s.content.chars().count())
            .sum();
        Some((idx, width))
    }

    fn render_button(&mut self, node: NodeId) {
        let label = self.doc.text_content(node);
        let display = if label.is_empty() {
            "[ button ]".to_string()
        } else {
            format!("[ {label} ]")
        };
        self.line_prefix();
        let line = self.lines.len();
        let col_start = self.current_len;
        self.push_span(&display, button_style());
        self.interactives.push(Interactive {
            node,
            kind: InteractiveKind::Button,
            line,
            col_start,
            col_end: self.current_len,
            label,
            href: None,
        });
    }

    fn render_image(&mut self, node: NodeId) {
        let alt = match self.doc.attr(node, "alt") {
            Some(alt) if !alt.trim().is_empty() => alt.trim().to_string(),
            _ => "image".to_string(),
        };
        self.push_span(
            &format!("[{alt}]"),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        );
    }

    fn render_pre(&mut self, node: NodeId) {
        self.begin_block();
        let mut raw = String::new();
        for n in self.doc.descendants(node) {
            if let NodeKind::Text(t) = self.doc.kind(n) {
                raw.push_str(t);
            }
        }
        // The newline right after the opening tag is presentational.
        let content = raw.strip_prefix('\n').unwrap_or(&raw);
        self.push_raw_line(Line::from(Span::styled("┌───", border_style())));
        for code_line in content.lines() {
            self.push_raw_line(Line::from(vec![
                Span::styled("│ ", border_style()),
                Span::styled(code_line.to_string(), code_style()),
            ]));
        }
        self.push_raw_line(Line::from(Span::styled("└───", border_style())));
    }

    fn render_list(&mut self, node: NodeId, style: Style, kind: ListKind) {
        if self.list_stack.is_empty() {
            self.begin_block();
        } else {
            self.flush();
        }
        self.list_stack.push(kind);
        self.render_children(node, style);
        self.list_stack.pop();
        self.flush();
    }

    fn render_list_item(&mut self, node: NodeId, style: Style) {
        self.flush();
        let depth = self.list_stack.len().saturating_sub(1);
        let indent = "  ".repeat(depth + 1);
        let marker = match self.list_stack.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                format!("{indent}{n}. ")
            }
            _ => format!("{indent}• "),
        };
        self.push_span(&marker, bullet_style());
        self.render_children(node, style);
        self.flush();
    }

    // --- line assembly ---

    /// Append text with HTML whitespace collapsing: runs of whitespace
    /// become one space, and nothing leads a fresh line.
    fn push_text(&mut self, text: &str, style: Style) {
        let mut cleaned = String::new();
        let mut has_content = self.current_len > 0;
        let mut last_space = self.last_space;
        for ch in text.chars() {
            if ch.is_whitespace() {
                if last_space || !has_content {
                    continue;
                }
                cleaned.push(' ');
                last_space = true;
            } else {
                cleaned.push(ch);
                has_content = true;
                last_space = false;
            }
        }
        self.last_space = last_space;
        if cleaned.is_empty() {
            return;
        }
        self.line_prefix();
        self.current_len += cleaned.chars().count();
        for open in &mut self.open_links {
            open.label.push_str(&cleaned);
        }
        self.current.push(Span::styled(cleaned, style));
    }

    /// Append a literal span, bypassing whitespace collapsing and labels.
    fn push_span(&mut self, text: &str, style: Style) {
        self.line_prefix();
        self.current_len += text.chars().count();
        self.last_space = text.ends_with(' ');
        self.current.push(Span::styled(text.to_string(), style));
    }

    /// Open a fresh line with the quote bar when inside a blockquote.
    fn line_prefix(&mut self) {
        if !self.current.is_empty() || self.quote_depth == 0 {
            return;
        }
        for _ in 0..self.quote_depth {
            self.current.push(Span::styled(QUOTE_BAR, border_style()));
            self.current_len += QUOTE_BAR.chars().count();
        }
    }

    fn flush(&mut self) {
        self.last_space = false;
        if self.current.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.current);
        self.current_len = 0;
        self.push_raw_line(Line::from(spans));
    }

    /// Push a finished line and resolve anchors waiting for content.
    fn push_raw_line(&mut self, line: Line<'static>) {
        let idx = self.lines.len();
        for node in self.pending_anchors.drain(..) {
            self.anchors.entry(node).or_insert(idx);
        }
        self.lines.push(line);
    }

    fn begin_block(&mut self) {
        self.flush();
        // Blank line between blocks, never at the top.
        if let Some(last) = self.lines.last() {
            if !last.spans.is_empty() {
                self.lines.push(Line::default());
            }
        }
    }

    fn finish(mut self) -> RenderedPage {
        self.flush();
        let total = self.lines.len();
        self.interactives.retain(|i| i.line < total);
        self.interactives.sort_by_key(|i| (i.line, i.col_start));
        RenderedPage {
            text: Text::from(self.lines),
            interactives: self.interactives,
            anchors: self.anchors,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn rendered_lines(page: &RenderedPage) -> Vec<String> {
        page.text.lines.iter().map(|l| l.to_string()).collect()
    }

    fn joined(page: &RenderedPage) -> String {
        rendered_lines(page).join("\n")
    }

    #[test]
    fn headings_prefixed_and_blocks_separated() {
        let doc = parse("<h1>Title</h1><p>Body text.</p>");
        let page = render_page(&doc, None);
        let lines = rendered_lines(&page);
        assert_eq!(lines[0], "# Title");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "Body text.");
    }

    #[test]
    fn heading_levels_use_matching_prefixes() {
        let doc = parse("<h2>Two</h2><h3>Three</h3>");
        let page = render_page(&doc, None);
        let out = joined(&page);
        assert!(out.contains("## Two"));
        assert!(out.contains("### Three"));
    }

    #[test]
    fn inline_whitespace_collapses() {
        let doc = parse("<p>Fish\n      and\t\tchips</p>");
        let page = render_page(&doc, None);
        assert_eq!(rendered_lines(&page)[0], "Fish and chips");
    }

    #[test]
    fn nav_links_flow_on_one_line() {
        let doc = parse(
            r##"<nav id="primary-nav">
                <a href="#features">Features</a>
                <a href="#faq">FAQ</a>
                <a href="about.html">About</a>
            </nav>"##,
        );
        let page = render_page(&doc, None);
        let lines = rendered_lines(&page);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].trim_end(), "Features FAQ About");
    }

    #[test]
    fn head_scripts_and_styles_are_dropped() {
        let doc = parse(
            "<html><head><title>T</title><style>p{}</style></head>\
             <body><script>let x=1;</script><p>visible</p></body></html>",
        );
        let page = render_page(&doc, None);
        let out = joined(&page);
        assert!(out.contains("visible"));
        assert!(!out.contains("let x"));
        assert!(!out.contains("p{}"));
        assert!(!out.contains('T'));
    }

    #[test]
    fn hidden_subtrees_are_omitted() {
        let doc = parse(r#"<div id="panel" hidden><p>secret</p></div><p>shown</p>"#);
        let page = render_page(&doc, None);
        assert!(!joined(&page).contains("secret"));
        assert!(joined(&page).contains("shown"));
        let panel = doc.element_by_id("panel").unwrap();
        assert_eq!(page.anchor_line(panel), None);
    }

    #[test]
    fn collapsed_panel_is_omitted() {
        let doc = parse(r##"<nav id="primary-nav"><a href="#x">X</a></nav><p>after</p>"##);
        let panel = doc.element_by_id("primary-nav").unwrap();

        let closed = render_page(&doc, Some(panel));
        assert!(!joined(&closed).contains('X'));
        assert!(closed.interactives.is_empty());

        let open = render_page(&doc, None);
        assert!(joined(&open).contains('X'));
        assert_eq!(open.interactives.len(), 1);
    }

    #[test]
    fn pre_blocks_are_bordered_and_verbatim() {
        let doc = parse("<pre>\nlet a = 1;\n  indented</pre>");
        let page = render_page(&doc, None);
        let lines = rendered_lines(&page);
        assert_eq!(lines[0], "┌───");
        assert_eq!(lines[1], "│ let a = 1;");
        assert_eq!(lines[2], "│   indented");
        assert_eq!(lines[3], "└───");
    }

    #[test]
    fn lists_render_bullets_and_numbers() {
        let doc = parse("<ul><li>alpha</li><li>beta</li></ul><ol><li>one</li><li>two</li></ol>");
        let page = render_page(&doc, None);
        let out = joined(&page);
        assert!(out.contains("  • alpha"));
        assert!(out.contains("  • beta"));
        assert!(out.contains("  1. one"));
        assert!(out.contains("  2. two"));
    }

    #[test]
    fn blockquote_carries_a_bar() {
        let doc = parse("<blockquote><p>quoted words</p></blockquote>");
        let page = render_page(&doc, None);
        assert!(joined(&page).contains("  ▌ quoted words"));
    }

    #[test]
    fn buttons_render_bracketed_with_label() {
        let doc = parse(r#"<button class="nav-toggle" aria-expanded="false">  Menu  </button>"#);
        let page = render_page(&doc, None);
        assert_eq!(rendered_lines(&page)[0], "[ Menu ]");
        assert_eq!(page.interactives.len(), 1);
        let button = &page.interactives[0];
        assert_eq!(button.kind, InteractiveKind::Button);
        assert_eq!(button.label, "Menu");
        assert_eq!(button.href, None);
        assert_eq!((button.col_start, button.col_end), (0, 8));
    }

    #[test]
    fn link_extents_cover_their_text() {
        let doc = parse(r##"<p>See <a href="#faq">the FAQ</a> below.</p>"##);
        let page = render_page(&doc, None);
        let line = rendered_lines(&page)[0].clone();
        assert_eq!(line, "See the FAQ below.");
        let link = &page.interactives[0];
        assert_eq!(link.kind, InteractiveKind::Link);
        assert_eq!(&line[link.col_start..link.col_end], "the FAQ");
        assert_eq!(link.label, "the FAQ");
        assert_eq!(link.href.as_deref(), Some("#faq"));
    }

    #[test]
    fn block_label_links_keep_a_visible_extent() {
        // A link wrapping block content closes after its line has flushed;
        // the extent falls back to that line instead of an empty 0..0 span.
        let doc = parse(r##"<a href="about.html"><h2>About the viewer</h2></a>"##);
        let page = render_page(&doc, None);
        let line = rendered_lines(&page)[0].clone();
        assert_eq!(line, "## About the viewer");
        assert_eq!(page.interactives.len(), 1);
        let link = &page.interactives[0];
        assert_eq!(link.line, 0);
        assert_eq!(&line[link.col_start..link.col_end], "## About the viewer");
        assert_eq!(link.label, "About the viewer");

        // Same when content follows: the extent stays on the label's line,
        // not on the blank separator after it.
        let doc = parse(r##"<a href="about.html"><h2>About</h2></a><p>after</p>"##);
        let page = render_page(&doc, None);
        let link = &page.interactives[0];
        assert_eq!(link.line, 0);
        assert_eq!(
            &rendered_lines(&page)[0][link.col_start..link.col_end],
            "## About"
        );
    }

    #[test]
    fn interactives_in_reading_order() {
        let doc = parse(
            r##"<nav><a href="#a">First</a></nav>
            <button aria-controls="x">Second</button>
            <p><a href="other.html">Third</a></p>"##,
        );
        let page = render_page(&doc, None);
        let labels: Vec<&str> = page.interactives.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn anchors_point_at_first_content_line() {
        let doc = parse(
            r#"<p>intro</p><section id="features"><h2>Features</h2><p>stuff</p></section>"#,
        );
        let page = render_page(&doc, None);
        let section = doc.element_by_id("features").unwrap();
        let line = page.anchor_line(section).unwrap();
        assert_eq!(rendered_lines(&page)[line], "## Features");
    }

    #[test]
    fn anchor_only_elements_resolve_to_following_content() {
        let doc = parse(r#"<p>first</p><span id="mark"></span><p>second</p>"#);
        let page = render_page(&doc, None);
        let mark = doc.element_by_id("mark").unwrap();
        let line = page.anchor_line(mark).unwrap();
        assert_eq!(rendered_lines(&page)[line], "second");
    }

    #[test]
    fn anchorless_link_is_not_interactive() {
        let doc = parse(r#"<p><a id="top"></a>text <a>no href</a></p>"#);
        let page = render_page(&doc, None);
        assert!(page.interactives.is_empty());
    }

    #[test]
    fn empty_document_renders_empty() {
        let page = render_page(&parse(""), None);
        assert_eq!(page.line_count(), 0);
        assert!(page.interactives.is_empty());
    }
}
