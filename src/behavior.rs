//! Page behavior wiring.
//!
//! Reproduces the enhancement layer of the pages this viewer targets:
//! - Navigation toggle: a header button opens and closes the primary nav,
//!   with `aria-expanded` mirroring the open state; activating a link
//!   inside the nav closes it again
//! - Accordion triggers: each trigger independently toggles its own
//!   `aria-expanded` and shows or hides the panel named by `aria-controls`
//! - Fragment links: activating `a[href^="#"]` scrolls to the target when
//!   the fragment resolves, and otherwise falls through to default link
//!   handling
//!
//! Wiring happens once per loaded page. Handlers hold no element state;
//! everything is looked up against the document at activation time, so the
//! page tree stays the single source of truth.

use std::collections::HashMap;

use serde::Deserialize;

use crate::dom::{Document, NodeId, Selector};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Selector configuration for the behavior layer.
///
/// The defaults match the markup conventions of the pages this tool was
/// built for; a JSON config can override any subset of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Selectors {
    /// Element carrying the nav-open marker class.
    pub header: String,
    /// Button that opens and closes the nav.
    pub nav_toggle: String,
    /// The nav panel itself.
    pub nav_panel: String,
    /// Links inside the nav panel that close it on activation.
    pub nav_links: String,
    /// Accordion trigger buttons.
    pub accordion_triggers: String,
    /// In-page links eligible for scroll interception.
    pub fragment_links: String,
    /// Class toggled on the header while the nav is open.
    pub nav_open_class: String,
}

impl Default for Selectors {
    fn default() -> Selectors {
        Selectors {
            header: ".site-header".to_string(),
            nav_toggle: ".nav-toggle".to_string(),
            nav_panel: "#primary-nav".to_string(),
            nav_links: "a".to_string(),
            accordion_triggers: "[data-accordion] .faq-question".to_string(),
            fragment_links: "a[href^=\"#\"]".to_string(),
            nav_open_class: "nav-open".to_string(),
        }
    }
}

impl Selectors {
    /// Parse a JSON override. Missing fields keep their defaults; unknown
    /// fields are an error so typos do not silently disable behaviors.
    pub fn from_json(source: &str) -> Result<Selectors, String> {
        serde_json::from_str(source).map_err(|e| format!("invalid selector config: {e}"))
    }

    /// Compile every selector up front, so a bad configuration fails before
    /// any page is parsed or wired.
    pub fn compile(&self) -> Result<CompiledSelectors, String> {
        Ok(CompiledSelectors {
            header: compile_one("header", &self.header)?,
            nav_toggle: compile_one("nav_toggle", &self.nav_toggle)?,
            nav_panel: compile_one("nav_panel", &self.nav_panel)?,
            nav_links: compile_one("nav_links", &self.nav_links)?,
            accordion_triggers: compile_one("accordion_triggers", &self.accordion_triggers)?,
            fragment_links: compile_one("fragment_links", &self.fragment_links)?,
            nav_open_class: self.nav_open_class.clone(),
        })
    }
}

fn compile_one(field: &str, source: &str) -> Result<Selector, String> {
    Selector::parse(source).map_err(|e| format!("selector '{field}': {e}"))
}

/// Parsed selectors plus the class marking an open nav.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    header: Selector,
    nav_toggle: Selector,
    nav_panel: Selector,
    nav_links: Selector,
    accordion_triggers: Selector,
    fragment_links: Selector,
    nav_open_class: String,
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// A behavior attached to one element. Handlers carry no element refs;
/// collaborators are resolved against the document at activation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    NavToggle,
    NavLinkClose,
    AccordionToggle,
    FragmentScroll,
}

/// The three nav collaborators. Present only when all three resolved.
#[derive(Debug, Clone)]
struct NavBinding {
    header: NodeId,
    toggle: NodeId,
    panel: NodeId,
}

/// Handlers attached to a parsed page, in registration order per element.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    handlers: HashMap<NodeId, Vec<Handler>>,
    nav: Option<NavBinding>,
    missing_nav: Vec<&'static str>,
    accordion_triggers: Vec<NodeId>,
    fragment_links: Vec<NodeId>,
    open_class: String,
}

/// Attach behavior to a parsed page.
///
/// Registration order matters for elements collecting several handlers:
/// nav handlers attach first, accordion triggers next, fragment links last,
/// and [`Wiring::activate`] runs them in that order. Nav wiring is all or
/// nothing: if the header, toggle, or panel is missing, none of the nav
/// handlers attach and the other behaviors are unaffected.
pub fn wire(doc: &Document, selectors: &CompiledSelectors) -> Wiring {
    let root = doc.root();
    let mut wiring = Wiring {
        open_class: selectors.nav_open_class.clone(),
        ..Wiring::default()
    };

    let header = doc.query(root, &selectors.header);
    let toggle = doc.query(root, &selectors.nav_toggle);
    let panel = doc.query(root, &selectors.nav_panel);
    if header.is_none() {
        wiring.missing_nav.push("header");
    }
    if toggle.is_none() {
        wiring.missing_nav.push("nav_toggle");
    }
    if panel.is_none() {
        wiring.missing_nav.push("nav_panel");
    }
    if let (Some(header), Some(toggle), Some(panel)) = (header, toggle, panel) {
        wiring.push(toggle, Handler::NavToggle);
        for link in doc.query_all(panel, &selectors.nav_links) {
            wiring.push(link, Handler::NavLinkClose);
        }
        wiring.nav = Some(NavBinding {
            header,
            toggle,
            panel,
        });
    }

    for trigger in doc.query_all(root, &selectors.accordion_triggers) {
        wiring.push(trigger, Handler::AccordionToggle);
        wiring.accordion_triggers.push(trigger);
    }

    for link in doc.query_all(root, &selectors.fragment_links) {
        wiring.push(link, Handler::FragmentScroll);
        wiring.fragment_links.push(link);
    }

    wiring
}

impl Wiring {
    fn push(&mut self, node: NodeId, handler: Handler) {
        self.handlers.entry(node).or_default().push(handler);
    }

    /// Whether the nav toggle behavior attached.
    pub fn nav_wired(&self) -> bool {
        self.nav.is_some()
    }

    /// Nav collaborators that failed to resolve, by config field name.
    pub fn missing_nav(&self) -> &[&'static str] {
        &self.missing_nav
    }

    pub fn accordion_triggers(&self) -> &[NodeId] {
        &self.accordion_triggers
    }

    pub fn fragment_links(&self) -> &[NodeId] {
        &self.fragment_links
    }

    /// The wired nav panel while the nav is closed, or `None` when the nav
    /// is open or unwired. Rendering collapses this subtree.
    pub fn collapsed_nav_panel(&self, doc: &Document) -> Option<NodeId> {
        let nav = self.nav.as_ref()?;
        if doc.has_class(nav.header, &self.open_class) {
            None
        } else {
            Some(nav.panel)
        }
    }
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

/// What activating an element did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Activation {
    /// Whether default handling (following the link) was suppressed.
    pub default_prevented: bool,
    /// Resolved in-page scroll target, when a fragment link was intercepted.
    pub scroll_to: Option<NodeId>,
    /// Whether any document state changed.
    pub changed: bool,
}

impl Wiring {
    /// Run every handler attached to `node`, in registration order.
    ///
    /// Elements without handlers produce a no-op activation, which callers
    /// treat as "apply default handling".
    pub fn activate(&self, doc: &mut Document, node: NodeId) -> Activation {
        let mut outcome = Activation::default();
        let handlers = match self.handlers.get(&node) {
            Some(handlers) => handlers,
            None => return outcome,
        };
        for handler in handlers {
            match handler {
                Handler::NavToggle => self.run_nav_toggle(doc, &mut outcome),
                Handler::NavLinkClose => self.run_nav_close(doc, &mut outcome),
                Handler::AccordionToggle => run_accordion(doc, node, &mut outcome),
                Handler::FragmentScroll => run_fragment(doc, node, &mut outcome),
            }
        }
        outcome
    }

    fn run_nav_toggle(&self, doc: &mut Document, outcome: &mut Activation) {
        if let Some(nav) = &self.nav {
            let open = doc.toggle_class(nav.header, &self.open_class);
            doc.set_attr(nav.toggle, "aria-expanded", bool_str(open));
            outcome.changed = true;
        }
    }

    fn run_nav_close(&self, doc: &mut Document, outcome: &mut Activation) {
        if let Some(nav) = &self.nav {
            // Closing is conditional on the open class. A closed nav stays
            // untouched, even when aria-expanded disagrees with it.
            if doc.has_class(nav.header, &self.open_class) {
                doc.remove_class(nav.header, &self.open_class);
                doc.set_attr(nav.toggle, "aria-expanded", "false");
                outcome.changed = true;
            }
        }
    }

    /// Accordion triggers that must be activated so `target` becomes
    /// visible, outermost first. A trigger qualifies when it is collapsed
    /// and controls a hidden element on the target's ancestor path.
    pub fn reveal_triggers(&self, doc: &Document, target: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = Some(target);
        while let Some(node) = current {
            if doc.hidden(node) {
                for &trigger in &self.accordion_triggers {
                    if aria_controls_target(doc, trigger) == Some(node)
                        && doc.attr(trigger, "aria-expanded") != Some("true")
                    {
                        out.push(trigger);
                        break;
                    }
                }
            }
            current = doc.parent(node);
        }
        out.reverse();
        out
    }
}

fn run_accordion(doc: &mut Document, trigger: NodeId, outcome: &mut Activation) {
    // Anything other than the exact string "true" counts as collapsed,
    // including a missing attribute.
    let expanded = doc.attr(trigger, "aria-expanded") == Some("true");
    doc.set_attr(trigger, "aria-expanded", bool_str(!expanded));
    // The trigger state flips even when the panel is missing.
    if let Some(panel) = aria_controls_target(doc, trigger) {
        doc.set_hidden(panel, expanded);
    }
    outcome.changed = true;
}

fn run_fragment(doc: &Document, link: NodeId, outcome: &mut Activation) {
    let href = match doc.attr(link, "href") {
        Some(href) => href,
        None => return,
    };
    if let Some(target) = fragment_target(doc, href) {
        outcome.default_prevented = true;
        outcome.scroll_to = Some(target);
    }
}

/// Resolve a fragment href to its target element. A bare `#` resolves to
/// nothing, as does a fragment naming no element.
pub fn fragment_target(doc: &Document, href: &str) -> Option<NodeId> {
    let id = href.strip_prefix('#')?;
    if id.is_empty() {
        return None;
    }
    doc.element_by_id(id)
}

/// Resolve a trigger's `aria-controls` to its panel. Only the first
/// whitespace-separated token is honored.
pub(crate) fn aria_controls_target(doc: &Document, trigger: NodeId) -> Option<NodeId> {
    let controls = doc.attr(trigger, "aria-controls")?;
    let first = controls.split_ascii_whitespace().next()?;
    doc.element_by_id(first)
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
