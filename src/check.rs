//! Page checking module.
//!
//! `htmv check` parses a page and wires its behaviors without entering the
//! TUI, then reports what attached and what dangles:
//! - Whether the nav toggle wired, and which collaborators were missing
//! - Accordion triggers whose `aria-controls` resolves to no panel
//! - Fragment links pointing at ids the page does not define
//!
//! The report is pure data so it can be asserted on; `run` adds the file
//! IO and the printed summary.

use std::fs;
use std::path::Path;

use crate::behavior::{aria_controls_target, fragment_target, wire, CompiledSelectors, Selectors};
use crate::dom::Document;
use crate::parse;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Everything `check` learned about a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub nav_wired: bool,
    /// Nav collaborators that failed to resolve, by config field name.
    pub missing_nav: Vec<String>,
    pub trigger_count: usize,
    /// `aria-controls` values that resolve to no panel.
    pub orphan_triggers: Vec<String>,
    pub fragment_count: usize,
    /// Fragment hrefs naming ids the page does not define.
    pub dangling: Vec<String>,
}

impl CheckReport {
    /// A page passes when every named fragment resolves. Missing nav
    /// collaborators and orphaned triggers degrade gracefully at runtime,
    /// so they are reported without failing the check.
    pub fn clean(&self) -> bool {
        self.dangling.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Inspect a parsed page against a compiled selector configuration.
pub fn inspect(doc: &Document, selectors: &CompiledSelectors) -> CheckReport {
    let wiring = wire(doc, selectors);

    let missing_nav = wiring
        .missing_nav()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut orphan_triggers = Vec::new();
    for &trigger in wiring.accordion_triggers() {
        match doc.attr(trigger, "aria-controls") {
            None => orphan_triggers.push("(no aria-controls)".to_string()),
            Some(value) => {
                if aria_controls_target(doc, trigger).is_none() {
                    orphan_triggers.push(value.to_string());
                }
            }
        }
    }

    let mut dangling = Vec::new();
    for &link in wiring.fragment_links() {
        if let Some(href) = doc.attr(link, "href") {
            // A lone "#" is conventional; only named fragments can dangle.
            if href != "#" && fragment_target(doc, href).is_none() {
                dangling.push(href.to_string());
            }
        }
    }

    CheckReport {
        nav_wired: wiring.nav_wired(),
        missing_nav,
        trigger_count: wiring.accordion_triggers().len(),
        orphan_triggers,
        fragment_count: wiring.fragment_links().len(),
        dangling,
    }
}

/// Check one file: parse, wire, and print the report. Returns whether the
/// page came out clean.
pub fn run(path: &Path, selectors: &Selectors) -> Result<bool, String> {
    let compiled = selectors.compile()?;
    let source = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let doc = parse::parse(&source);
    let elements = doc
        .descendants(doc.root())
        .filter(|&n| doc.element(n).is_some())
        .count();
    eprintln!("[parse] {} elements={}", path.display(), elements);

    let report = inspect(&doc, &compiled);
    if report.nav_wired {
        eprintln!("[wire] nav ok");
    } else {
        eprintln!("[wire] nav skipped missing={}", report.missing_nav.join(","));
    }
    eprintln!(
        "[wire] accordion triggers={} orphans={}",
        report.trigger_count,
        report.orphan_triggers.len()
    );
    eprintln!("[wire] fragment links={}", report.fragment_count);
    for href in &report.dangling {
        eprintln!("[anchors] dangling {href}");
    }

    let nav = if report.nav_wired { "wired" } else { "skipped" };
    println!(
        "{}: nav {}, triggers {}, fragment links {}, dangling {}",
        path.display(),
        nav,
        report.trigger_count,
        report.fragment_count,
        report.dangling.len()
    );
    for href in &report.dangling {
        println!("  dangling {href}");
    }
    for value in &report.orphan_triggers {
        println!("  orphan trigger {value}");
    }

    Ok(report.clean())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
