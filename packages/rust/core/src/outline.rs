//! Heading tree builder.
//!
//! Parses flat Markdown into a [`SectionNode`] tree by ATX heading depth.
//! The parse is a single pass over the lines with an explicit stack of open
//! sections, so documents that jump from `#` straight to `###` still produce
//! a tree in which every child sits exactly one level below its parent.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use papersplit_shared::SectionNode;

/// Title given to headings whose text is empty after cleaning.
pub const UNTITLED: &str = "Untitled";

/// ATX heading: up to six `#`, then either end of line or whitespace and text.
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})(?:[ \t]+(.*?))?[ \t]*$").expect("valid regex")
});

/// Pandoc attribute block: `{#sec:intro}`, `{.unnumbered}`, `{-}`.
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\{\s*[#.\-][^{}]*\}").expect("valid regex")
});

/// Optional closing sequence of an ATX heading (`## Title ##`).
static CLOSING_HASHES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[ \t]+)#+$").expect("valid regex")
});

/// Build the section tree for `md`.
///
/// Headings with more than `max_level` markers are kept as body text. Text
/// before the first heading becomes the root's body.
#[instrument(skip_all, fields(md_len = md.len(), max_level = max_level))]
pub fn build_tree(md: &str, max_level: usize) -> SectionNode {
    // Open sections, root at the bottom.
    let mut stack: Vec<SectionNode> = vec![SectionNode::root()];
    let mut fence: Option<String> = None;
    let mut headings = 0usize;

    for line in md.lines() {
        if let Some(open) = &fence {
            if closes_fence(line, open) {
                fence = None;
            }
            push_body(&mut stack, line);
            continue;
        }

        if let Some(marker) = fence_marker(line) {
            fence = Some(marker);
            push_body(&mut stack, line);
            continue;
        }

        match parse_heading(line, max_level) {
            Some((marker_level, title)) => {
                headings += 1;
                close_sections(&mut stack, marker_level);
                let depth = stack.last().map_or(0, |top| top.level) + 1;
                stack.push(SectionNode::new(title, depth, marker_level));
            }
            None => push_body(&mut stack, line),
        }
    }

    close_sections(&mut stack, 0);
    let mut root = stack.pop().unwrap_or_else(SectionNode::root);
    trim_blank_edges(&mut root.body);

    debug!(
        headings,
        top_level = root.children.len(),
        nodes = root.descendant_count(),
        "section tree built"
    );
    root
}

/// Strip attribute blocks and closing hashes from raw heading text.
pub fn clean_title(raw: &str) -> String {
    let without_attrs = ATTRIBUTE_RE.replace_all(raw, "");
    let without_closing = CLOSING_HASHES_RE.replace(without_attrs.trim(), "");
    let title = without_closing.split_whitespace().collect::<Vec<_>>().join(" ");

    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

// ---------------------------------------------------------------------------
// Stack handling
// ---------------------------------------------------------------------------

/// Pop every open section whose marker is at or below `marker_level`,
/// attaching each one to the section beneath it. `0` closes everything but
/// the root.
fn close_sections(stack: &mut Vec<SectionNode>, marker_level: usize) {
    while stack.len() > 1 {
        let should_close = stack
            .last()
            .is_some_and(|top| marker_level == 0 || top.marker_level >= marker_level);
        if !should_close {
            break;
        }

        let Some(mut node) = stack.pop() else { break };
        trim_blank_edges(&mut node.body);
        if let Some(parent) = stack.last_mut() {
            parent.push_child(node);
        }
    }
}

fn push_body(stack: &mut [SectionNode], line: &str) {
    if let Some(top) = stack.last_mut() {
        top.body.push(line.to_string());
    }
}

fn trim_blank_edges(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();
    lines.drain(..leading);
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

fn parse_heading(line: &str, max_level: usize) -> Option<(usize, String)> {
    let caps = HEADING_RE.captures(line)?;
    let marker_level = caps.get(1)?.as_str().len();
    if marker_level > max_level {
        return None;
    }
    let raw = caps.get(2).map_or("", |m| m.as_str());
    Some((marker_level, clean_title(raw)))
}

/// The opening fence (run of backticks or tildes) if `line` starts a code block.
fn fence_marker(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let first = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.chars().take_while(|c| *c == first).count();
    (run >= 3).then(|| first.to_string().repeat(run))
}

fn closes_fence(line: &str, open: &str) -> bool {
    let trimmed = line.trim();
    let Some(fence_char) = open.chars().next() else {
        return false;
    };
    let run = trimmed.chars().take_while(|c| *c == fence_char).count();
    run >= open.len() && trimmed.chars().all(|c| c == fence_char)
}
