mod behavior;
mod check;
mod dom;
mod parse;
mod render;

use std::{
    fs, io,
    path::{Path, PathBuf},
    process,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::Span,
    widgets::Paragraph,
    DefaultTerminal, Frame,
};

use behavior::{CompiledSelectors, Selectors, Wiring};
use dom::Document;
use render::{InteractiveKind, RenderedPage};

/// An in-flight smooth scroll toward an anchor line.
struct ScrollAnim {
    origin: usize,
    target: usize,
    started: Instant,
}

/// How long a smooth fragment scroll takes.
const SCROLL_ANIM_MS: u64 = 160;

/// Saved navigation state for back-navigation when following links.
struct NavigationEntry {
    file_path: PathBuf,
    scroll_offset: usize,
    focused: Option<usize>,
}

/// A freshly loaded page: parsed, wired, rendered, and positioned.
struct LoadedPage {
    doc: Document,
    wiring: Wiring,
    rendered: RenderedPage,
    scroll_offset: usize,
}

/// Explicit subcommands.
#[derive(Subcommand)]
enum Commands {
    /// View an HTML page in TUI mode (equivalent to legacy positional form)
    View {
        /// Path to the HTML page, optionally with a #fragment
        file: String,
        /// Load the page without wiring its behaviors
        #[arg(long)]
        no_enhance: bool,
        /// Path to a JSON selector configuration
        #[arg(long)]
        config: Option<String>,
    },
    /// Report a page's wiring and dangling fragment links
    Check {
        /// Path to the HTML page
        file: String,
        /// Path to a JSON selector configuration
        #[arg(long)]
        config: Option<String>,
    },
}

/// Full CLI with explicit subcommands.
#[derive(Parser)]
#[command(
    name = "htmv",
    version,
    about = "A TUI viewer for static HTML pages and their interactive behaviors",
    after_help = "INVOCATION FORMS:\n  htmv <file>                      View page in TUI mode (legacy)\n  htmv view [OPTIONS] <file>       View page in TUI mode\n  htmv check [OPTIONS] <file>      Report wiring and dangling fragment links"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Legacy positional form: htmv <file>
#[derive(Parser)]
#[command(
    name = "htmv",
    version,
    about = "A TUI viewer for static HTML pages and their interactive behaviors"
)]
struct LegacyCli {
    /// Path to an HTML page to view
    file: String,
}

/// Resolved dispatch mode after CLI argument parsing.
enum DispatchMode {
    Legacy {
        file: String,
    },
    View {
        file: String,
        no_enhance: bool,
        config: Option<String>,
    },
    Check {
        file: String,
        config: Option<String>,
    },
}

fn resolve_dispatch_mode() -> DispatchMode {
    match Cli::try_parse() {
        Ok(cli) => match cli.command {
            Commands::View {
                file,
                no_enhance,
                config,
            } => DispatchMode::View {
                file,
                no_enhance,
                config,
            },
            Commands::Check { file, config } => DispatchMode::Check { file, config },
        },
        Err(clap_err) => {
            // Pass --help, --version, and subcommand-level help through to the full Cli handler.
            use clap::error::ErrorKind;
            if matches!(
                clap_err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                clap_err.exit();
            }
            // Fall back to legacy positional parse: htmv <file>
            match LegacyCli::try_parse() {
                Ok(legacy) => DispatchMode::Legacy { file: legacy.file },
                Err(legacy_err) => legacy_err.exit(),
            }
        }
    }
}

fn main() -> io::Result<()> {
    match resolve_dispatch_mode() {
        DispatchMode::Legacy { file } => {
            eprintln!("[legacy] TUI viewer dispatched for: {file}");
            run_tui_file(&file, false, None)
        }
        DispatchMode::View {
            file,
            no_enhance,
            config,
        } => {
            eprintln!("[view] TUI viewer dispatched for: {file}");
            run_tui_file(&file, no_enhance, config.as_deref())
        }
        DispatchMode::Check { file, config } => run_check_file(&file, config.as_deref()),
    }
}

/// Validate the page extension up front, before attempting to read.
fn ensure_page_extension(file_arg: &str, exit_code: i32) {
    match Path::new(file_arg).extension().and_then(|e| e.to_str()) {
        Some("html" | "htm" | "xhtml") => {}
        Some(ext) => {
            eprintln!("Error: '{ext}' is not a recognized page extension.");
            eprintln!("Expected an HTML page (.html, .htm, .xhtml).");
            process::exit(exit_code);
        }
        None => {
            eprintln!("Error: '{file_arg}' has no file extension.");
            eprintln!("Expected an HTML page (.html, .htm, .xhtml).");
            process::exit(exit_code);
        }
    }
}

/// Load the selector configuration, with defaults when no path is given.
fn load_selectors(config_arg: Option<&str>) -> Result<Selectors, String> {
    match config_arg {
        Some(path) => {
            let source =
                fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))?;
            Selectors::from_json(&source)
        }
        None => Ok(Selectors::default()),
    }
}

fn run_check_file(file_arg: &str, config_arg: Option<&str>) -> io::Result<()> {
    ensure_page_extension(file_arg, 2);
    let selectors = load_selectors(config_arg).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(2);
    });
    match check::run(Path::new(file_arg), &selectors) {
        Ok(true) => Ok(()),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}

fn run_tui_file(file_arg: &str, no_enhance: bool, config_arg: Option<&str>) -> io::Result<()> {
    let (path_part, fragment) = split_file_fragment(file_arg);
    ensure_page_extension(path_part, 1);

    let selectors = load_selectors(config_arg).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });
    let compiled = selectors.compile().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    let source = fs::read_to_string(path_part).unwrap_or_else(|e| {
        match e.kind() {
            io::ErrorKind::NotFound => {
                eprintln!("Error: file not found: {path_part}");
            }
            io::ErrorKind::PermissionDenied => {
                eprintln!("Error: permission denied: {path_part}");
            }
            _ => {
                eprintln!("Error reading '{path_part}': {e}");
            }
        }
        process::exit(1);
    });
    let canonical = fs::canonicalize(path_part).unwrap_or_else(|_| PathBuf::from(path_part));
    let fragment = fragment.map(str::to_string);

    ratatui::run(|terminal| run(terminal, &canonical, source, fragment, no_enhance, &compiled))
}

/// Parse, wire, and render a page. When `fragment` is given, collapsed
/// accordion panels on the target's path are expanded first and the scroll
/// offset starts at the target's line.
fn load_page(
    source: &str,
    compiled: &CompiledSelectors,
    no_enhance: bool,
    fragment: Option<&str>,
    viewport_height: usize,
) -> LoadedPage {
    let mut doc = parse::parse(source);
    let wiring = if no_enhance {
        Wiring::default()
    } else {
        behavior::wire(&doc, compiled)
    };
    if let Some(fragment) = fragment {
        if let Some(target) = doc.element_by_id(fragment) {
            for trigger in wiring.reveal_triggers(&doc, target) {
                wiring.activate(&mut doc, trigger);
            }
        }
    }
    let rendered = render::render_page(&doc, wiring.collapsed_nav_panel(&doc));
    let total = rendered.line_count();
    let scroll_offset = fragment
        .and_then(|f| doc.element_by_id(f))
        .and_then(|target| rendered.anchor_line(target))
        .map(|line| line.min(total.saturating_sub(viewport_height)))
        .unwrap_or(0);
    LoadedPage {
        doc,
        wiring,
        rendered,
        scroll_offset,
    }
}

fn run(
    terminal: &mut DefaultTerminal,
    initial_path: &Path,
    initial_source: String,
    initial_fragment: Option<String>,
    no_enhance: bool,
    compiled: &CompiledSelectors,
) -> io::Result<()> {
    let viewport_hint = terminal.size()?.height.saturating_sub(1) as usize;
    let mut current_path = initial_path.to_path_buf();
    let page = load_page(
        &initial_source,
        compiled,
        no_enhance,
        initial_fragment.as_deref(),
        viewport_hint,
    );
    let mut doc = page.doc;
    let mut wiring = page.wiring;
    let mut rendered = page.rendered;
    let mut scroll_offset = page.scroll_offset;
    let mut total_lines = rendered.line_count();
    let mut focused: Option<usize> = None;
    let mut nav_stack: Vec<NavigationEntry> = Vec::new();
    let mut scroll_anim: Option<ScrollAnim> = None;

    loop {
        terminal.draw(|frame| {
            ui(
                frame,
                &rendered,
                scroll_offset,
                total_lines,
                focused,
                &current_path,
                !nav_stack.is_empty(),
            );
        })?;

        // While a scroll animation runs, tick instead of blocking so the
        // view keeps moving between key presses.
        let event = if scroll_anim.is_some() {
            if event::poll(Duration::from_millis(16))? {
                Some(event::read()?)
            } else {
                None
            }
        } else {
            Some(event::read()?)
        };

        // Recalculate bounds and clamp scroll offset on every pass,
        // including Event::Resize, so the view stays valid after terminal resize.
        let viewport_height = terminal.size()?.height.saturating_sub(1) as usize;
        let max_scroll = total_lines.saturating_sub(viewport_height);
        scroll_offset = scroll_offset.min(max_scroll);

        if let Some(anim) = &scroll_anim {
            let (pos, done) = anim_position(anim, Instant::now());
            scroll_offset = pos.min(max_scroll);
            if done {
                scroll_anim = None;
            }
        }

        let event = match event {
            Some(event) => event,
            None => continue,
        };

        if let Event::Key(key) = event {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            // Any key press lands a running animation immediately.
            if let Some(anim) = scroll_anim.take() {
                scroll_offset = anim.target.min(max_scroll);
            }

            match key.code {
                KeyCode::Char('q') => return Ok(()),

                // Single line down
                KeyCode::Char('j') | KeyCode::Down => {
                    scroll_offset = (scroll_offset + 1).min(max_scroll);
                    focused = None;
                }

                // Single line up
                KeyCode::Char('k') | KeyCode::Up => {
                    scroll_offset = scroll_offset.saturating_sub(1);
                    focused = None;
                }

                // Half page down
                KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    let half = viewport_height / 2;
                    scroll_offset = (scroll_offset + half).min(max_scroll);
                    focused = None;
                }
                KeyCode::PageDown => {
                    let half = viewport_height / 2;
                    scroll_offset = (scroll_offset + half).min(max_scroll);
                    focused = None;
                }

                // Half page up
                KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    let half = viewport_height / 2;
                    scroll_offset = scroll_offset.saturating_sub(half);
                    focused = None;
                }
                KeyCode::PageUp => {
                    let half = viewport_height / 2;
                    scroll_offset = scroll_offset.saturating_sub(half);
                    focused = None;
                }

                // Jump to top
                KeyCode::Char('g') | KeyCode::Home => {
                    scroll_offset = 0;
                    focused = None;
                }

                // Jump to bottom
                KeyCode::Char('G') | KeyCode::End => {
                    scroll_offset = max_scroll;
                    focused = None;
                }

                // Next interactive element (Tab)
                KeyCode::Tab => {
                    let count = rendered.interactives.len();
                    if count > 0 {
                        focused = Some(match focused {
                            Some(idx) => (idx + 1) % count,
                            None => {
                                // Find first interactive at or after current scroll position
                                rendered
                                    .interactives
                                    .iter()
                                    .position(|i| i.line >= scroll_offset)
                                    .unwrap_or(0)
                            }
                        });
                        // Auto-scroll to bring the focused element into view
                        if let Some(item) = focused.and_then(|idx| rendered.interactives.get(idx))
                        {
                            let line = item.line;
                            if line < scroll_offset || line >= scroll_offset + viewport_height {
                                scroll_offset =
                                    line.saturating_sub(viewport_height / 3).min(max_scroll);
                            }
                        }
                    }
                }

                // Previous interactive element (Shift-Tab)
                KeyCode::BackTab => {
                    let count = rendered.interactives.len();
                    if count > 0 {
                        focused = Some(match focused {
                            Some(0) => count - 1,
                            Some(idx) => idx - 1,
                            None => {
                                // Find last interactive at or before current scroll + viewport
                                let visible_end = scroll_offset + viewport_height;
                                rendered
                                    .interactives
                                    .iter()
                                    .rposition(|i| i.line < visible_end)
                                    .unwrap_or(count - 1)
                            }
                        });
                        // Auto-scroll to bring the focused element into view
                        if let Some(item) = focused.and_then(|idx| rendered.interactives.get(idx))
                        {
                            let line = item.line;
                            if line < scroll_offset || line >= scroll_offset + viewport_height {
                                scroll_offset =
                                    line.saturating_sub(viewport_height / 3).min(max_scroll);
                            }
                        }
                    }
                }

                // Activate the focused element (Enter)
                KeyCode::Enter => {
                    let target = focused
                        .and_then(|idx| rendered.interactives.get(idx))
                        .map(|item| (item.node, item.href.clone()));
                    if let Some((node, href)) = target {
                        let outcome = wiring.activate(&mut doc, node);

                        if outcome.changed {
                            rendered =
                                render::render_page(&doc, wiring.collapsed_nav_panel(&doc));
                            total_lines = rendered.line_count();
                            // Keep focus on the element when it survived the re-render.
                            focused = rendered.interactives.iter().position(|i| i.node == node);
                        }
                        let max_scroll = total_lines.saturating_sub(viewport_height);
                        scroll_offset = scroll_offset.min(max_scroll);

                        if let Some(anchor) = outcome.scroll_to {
                            // Smooth scroll, but only to anchors that are
                            // actually rendered.
                            if let Some(line) = rendered.anchor_line(anchor) {
                                let landing = line.min(max_scroll);
                                if landing != scroll_offset {
                                    scroll_anim = Some(ScrollAnim {
                                        origin: scroll_offset,
                                        target: landing,
                                        started: Instant::now(),
                                    });
                                }
                            }
                        } else if !outcome.default_prevented {
                            if let Some(href) = href {
                                if is_external_url(&href) {
                                    open_url_in_browser(&href);
                                } else if href.starts_with('#') {
                                    // Unintercepted fragments jump without animation.
                                    if let Some(line) = behavior::fragment_target(&doc, &href)
                                        .and_then(|t| rendered.anchor_line(t))
                                    {
                                        scroll_offset = line.min(max_scroll);
                                    }
                                } else if let Some((target_path, target_fragment)) =
                                    resolve_page_link(&current_path, &href)
                                {
                                    if let Ok(new_source) = fs::read_to_string(&target_path) {
                                        nav_stack.push(NavigationEntry {
                                            file_path: current_path.clone(),
                                            scroll_offset,
                                            focused,
                                        });
                                        current_path = target_path;
                                        let page = load_page(
                                            &new_source,
                                            compiled,
                                            no_enhance,
                                            target_fragment.as_deref(),
                                            viewport_height,
                                        );
                                        doc = page.doc;
                                        wiring = page.wiring;
                                        rendered = page.rendered;
                                        scroll_offset = page.scroll_offset;
                                        total_lines = rendered.line_count();
                                        focused = None;
                                        scroll_anim = None;
                                    }
                                }
                            }
                        }
                    }
                }

                // Navigate back (Backspace)
                KeyCode::Backspace => {
                    if let Some(entry) = nav_stack.pop() {
                        if let Ok(new_source) = fs::read_to_string(&entry.file_path) {
                            current_path = entry.file_path;
                            let page =
                                load_page(&new_source, compiled, no_enhance, None, viewport_height);
                            doc = page.doc;
                            wiring = page.wiring;
                            rendered = page.rendered;
                            total_lines = rendered.line_count();
                            scroll_offset = entry
                                .scroll_offset
                                .min(total_lines.saturating_sub(viewport_height));
                            focused = entry
                                .focused
                                .filter(|&idx| idx < rendered.interactives.len());
                            scroll_anim = None;
                        }
                    }
                }

                // Escape clears element focus
                KeyCode::Esc => {
                    focused = None;
                }

                _ => {}
            }
        }
    }
}

/// Split `page.html#section` into the file part and an optional fragment.
fn split_file_fragment(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once('#') {
        Some((file, frag)) if !frag.is_empty() => (file, Some(frag)),
        Some((file, _)) => (file, None),
        None => (arg, None),
    }
}

/// Ease-out progress for a smooth scroll, in `0.0..=1.0`.
fn ease_out(t: f64) -> f64 {
    1.0 - (1.0 - t) * (1.0 - t)
}

/// Interpolated scroll line for an animation at `now`, plus completion.
fn anim_position(anim: &ScrollAnim, now: Instant) -> (usize, bool) {
    let elapsed = now.duration_since(anim.started).as_millis() as f64;
    let t = (elapsed / SCROLL_ANIM_MS as f64).min(1.0);
    let eased = ease_out(t);
    let from = anim.origin as f64;
    let to = anim.target as f64;
    let pos = (from + (to - from) * eased).round();
    (pos.max(0.0) as usize, t >= 1.0)
}

/// Check if a URL is an external URL (http/https/mailto).
fn is_external_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("mailto:")
}

/// Resolve a link URL to a local page path plus an optional fragment.
/// Returns None if the link is not a resolvable local page.
fn resolve_page_link(current_file: &Path, url: &str) -> Option<(PathBuf, Option<String>)> {
    // Fragment-only links are handled in place, not as navigation.
    if url.starts_with('#') {
        return None;
    }

    let (path_part, fragment) = split_file_fragment(url);
    if path_part.is_empty() {
        return None;
    }

    // Resolve relative to the directory containing the current file
    let base_dir = current_file.parent()?;
    let target = base_dir.join(path_part);

    // Check if it's a page file
    let ext = target.extension()?.to_str()?;
    if !matches!(ext, "html" | "htm" | "xhtml") {
        return None;
    }

    // Check if file exists
    if target.is_file() {
        let canonical = fs::canonicalize(&target).unwrap_or(target);
        Some((canonical, fragment.map(str::to_string)))
    } else {
        None
    }
}

/// Open an external URL in the system browser.
fn open_url_in_browser(url: &str) {
    let program = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let _ = std::process::Command::new(program)
        .arg(url)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn();
}

fn ui(
    frame: &mut Frame,
    rendered: &RenderedPage,
    scroll_offset: usize,
    total_lines: usize,
    focused: Option<usize>,
    current_file: &Path,
    can_go_back: bool,
) {
    let area = frame.area();

    // Minimum usable terminal size: need width for content and height for viewport + status bar
    const MIN_WIDTH: u16 = 20;
    const MIN_HEIGHT: u16 = 5;
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = "Terminal too small";
        let msg_len = msg.len() as u16;
        let x = area.x + area.width.saturating_sub(msg_len) / 2;
        let y = area.y + area.height / 2;
        let w = msg_len.min(area.width);
        if w > 0 && area.height > 0 {
            frame.render_widget(
                Paragraph::new(Span::styled(
                    msg,
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Rect::new(x, y, w, 1),
            );
        }
        return;
    }

    let chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(area);

    let viewport_height = chunks[0].height as usize;

    // Render scrolled content
    let widget = Paragraph::new(rendered.text.clone()).scroll((scroll_offset as u16, 0));
    frame.render_widget(widget, chunks[0]);

    // Apply focus highlight overlay on the focused element
    if let Some(item) = focused.and_then(|idx| rendered.interactives.get(idx)) {
        let rel_line = item.line as isize - scroll_offset as isize;
        if rel_line >= 0 && (rel_line as usize) < viewport_height {
            let row = chunks[0].y + rel_line as u16;
            let focused_style = Style::default()
                .fg(Color::White)
                .bg(Color::Blue)
                .add_modifier(Modifier::BOLD);
            for col in item.col_start..item.col_end {
                let pos = Position::new(chunks[0].x + col as u16, row);
                if let Some(cell) = frame.buffer_mut().cell_mut(pos) {
                    cell.set_style(focused_style);
                }
            }
        }
    }

    // Render status bar with scroll position indicator
    let position = if total_lines == 0 {
        "Empty".to_owned()
    } else if total_lines <= viewport_height {
        "All".to_owned()
    } else if scroll_offset == 0 {
        "Top".to_owned()
    } else if scroll_offset >= total_lines.saturating_sub(viewport_height) {
        "Bot".to_owned()
    } else {
        let pct = (scroll_offset * 100) / total_lines;
        format!("{pct}%")
    };

    let focus_info = focused
        .and_then(|idx| rendered.interactives.get(idx))
        .map(|item| match (item.kind, &item.href) {
            (InteractiveKind::Link, Some(href)) => format!(" -> {href}"),
            _ => format!(" [{}]", item.label),
        })
        .unwrap_or_default();

    let nav_info = if can_go_back {
        let name = current_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("?");
        format!("  \u{2190} {}", name)
    } else {
        String::new()
    };

    let status = format!(
        " Line {}/{} \u{2014} {}{}{}",
        scroll_offset + 1,
        total_lines,
        position,
        nav_info,
        focus_info,
    );
    let status_bar = Paragraph::new(Span::styled(
        status,
        Style::default().fg(Color::Black).bg(Color::White),
    ))
    .style(Style::default().bg(Color::White));
    frame.render_widget(status_bar, chunks[1]);
}
