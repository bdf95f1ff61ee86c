//! Post-conversion cleanup pipeline for Markdown output.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! Heading lines are never altered here; the tree builder depends on them
//! exactly as the engine produced them.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Directory, relative to a paper's output root, that holds all figures.
pub const FIGURES_DIR: &str = "figures";

/// Markdown image target: `![caption](path ...)`. Group 1 is everything up to
/// the opening parenthesis, group 2 the path.
pub(crate) static MD_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!\[.*?\]\()\s*<?([^)\s>]+)>?").expect("valid regex")
});

/// HTML image target emitted by the engine for some formats (`<embed src="x.pdf" />`).
pub(crate) static HTML_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<(?:img|embed)\b[^>]*?\bsrc=")([^"]+)""#).expect("valid regex")
});

/// Run the full cleanup pipeline on raw engine output.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = rewrite_figure_paths(&result);
    result = clean_blank_lines(&result);
    result = normalize_whitespace(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Flatten figure paths
// ---------------------------------------------------------------------------

/// Point every local image reference at `figures/<basename>`.
///
/// The engine keeps whatever nested path the LaTeX source used
/// (`img/results/plot.pdf`); the output tree stores figures flat.
fn rewrite_figure_paths(md: &str) -> String {
    let md = MD_IMAGE_RE.replace_all(md, |caps: &Captures| {
        format!("{}{}", &caps[1], flat_figure_target(&caps[2]))
    });

    HTML_IMAGE_RE
        .replace_all(&md, |caps: &Captures| {
            format!("{}{}\"", &caps[1], flat_figure_target(&caps[2]))
        })
        .into_owned()
}

/// The flat `figures/` target for `path`, or `path` itself for remote targets.
fn flat_figure_target(path: &str) -> String {
    match figure_basename(path) {
        Some(name) => format!("{FIGURES_DIR}/{name}"),
        None => path.to_string(),
    }
}

/// Basename of a local figure path; `None` for URLs and data URIs.
pub(crate) fn figure_basename(path: &str) -> Option<&str> {
    if path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("data:")
        || path.starts_with('#')
    {
        return None;
    }

    path.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

// ---------------------------------------------------------------------------
// Pass 2: Clean up excessive blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\n{4,}").expect("valid regex")
    });

    MULTI_BLANK_RE.replace_all(md, "\n\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Normalize whitespace
// ---------------------------------------------------------------------------

/// Clean up trailing whitespace on lines and normalize line endings.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Ensure trailing newline
// ---------------------------------------------------------------------------

/// Ensure the file ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_figure_paths_flattens_nested_dirs() {
        let input = "![Model overview](img/arch/overview.pdf){#fig:overview width=\"80%\"}";
        let result = rewrite_figure_paths(input);
        assert_eq!(
            result,
            "![Model overview](figures/overview.pdf){#fig:overview width=\"80%\"}"
        );
    }

    #[test]
    fn rewrite_figure_paths_handles_brackets_in_caption() {
        let input = "![Loss on $[0,1]$](plots/loss.png)";
        let result = rewrite_figure_paths(input);
        assert_eq!(result, "![Loss on $[0,1]$](figures/loss.png)");
    }

    #[test]
    fn rewrite_figure_paths_handles_html_embeds() {
        let input = "<embed src=\"figs/sub/heatmap.pdf\" style=\"width:50%\" />";
        let result = rewrite_figure_paths(input);
        assert_eq!(
            result,
            "<embed src=\"figures/heatmap.pdf\" style=\"width:50%\" />"
        );
    }

    #[test]
    fn rewrite_figure_paths_leaves_remote_and_links() {
        let input = "![logo](https://example.com/logo.png) and [code](src/main.py)";
        let result = rewrite_figure_paths(input);
        assert_eq!(result, input);
    }

    #[test]
    fn rewrite_figure_paths_is_stable() {
        let once = rewrite_figure_paths("![a](x/y/z.png)");
        let twice = rewrite_figure_paths(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn clean_blank_lines_collapses_excess() {
        let input = "Line 1\n\n\n\n\nLine 2";
        let result = clean_blank_lines(input);
        assert_eq!(result, "Line 1\n\n\nLine 2");
    }

    #[test]
    fn clean_blank_lines_keeps_double() {
        let input = "Line 1\n\nLine 2";
        let result = clean_blank_lines(input);
        assert_eq!(result, input);
    }

    #[test]
    fn normalize_whitespace_trims_trailing() {
        let input = "Line 1   \nLine 2\t\nLine 3";
        let result = normalize_whitespace(input);
        assert_eq!(result, "Line 1\nLine 2\nLine 3");
    }

    #[test]
    fn ensure_trailing_newline_normalizes_multiple() {
        assert_eq!(ensure_trailing_newline("Content"), "Content\n");
        assert_eq!(ensure_trailing_newline("Content\n\n\n"), "Content\n");
    }

    #[test]
    fn full_pipeline_keeps_headings() {
        let input = "# Introduction {#sec:intro}\n\n\n\n\n\nText   \n\n![](figs/a.png)\n\n## Setup\n";
        let result = run_pipeline(input);

        assert!(result.starts_with("# Introduction {#sec:intro}\n"));
        assert!(result.contains("## Setup"));
        assert!(result.contains("![](figures/a.png)"));
        assert!(!result.contains("\n\n\n\n"));
        assert!(result.ends_with("## Setup\n"));
    }
}
