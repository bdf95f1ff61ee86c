//! Paper directory materializer.
//!
//! Takes the final section tree and the figure pool, then writes the paper's
//! output directory to disk. The whole directory is built in a hidden staging
//! sibling and swapped into place at the end, so a failed run never leaves a
//! half-written tree behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use papersplit_markdown::{FIGURES_DIR, figure_refs};
use papersplit_shared::{
    CURRENT_SCHEMA_VERSION, FigureRef, Outline, OutlineEntry, PaperSplitError, Result,
    SectionNode,
};

use crate::figures::FigurePool;

/// Directory holding the section tree inside a paper's output.
pub const SECTIONS_DIR: &str = "sections";

/// Manifest file describing the written tree.
pub const OUTLINE_FILE: &str = "outline.json";

/// Title of the section emitted for text before the first heading.
pub const PREAMBLE_TITLE: &str = "Preamble";

/// Slug used when a title has no usable characters.
const FALLBACK_SLUG: &str = "section";

/// Upper bound on slug length, in characters.
const MAX_SLUG_CHARS: usize = 80;

/// Output from a successful materialization.
#[derive(Debug, Clone)]
pub struct MaterializeResult {
    /// Path to the paper's output directory.
    pub path: PathBuf,
    /// Number of section directories written.
    pub section_count: usize,
    /// Number of section Markdown files written.
    pub file_count: usize,
    /// The outline that was written to `outline.json`.
    pub outline: Outline,
}

/// Configuration for materializing one paper.
#[derive(Debug, Clone)]
pub struct MaterializeConfig {
    /// Final output directory (`<output_dir>/<paper>`).
    pub dest: PathBuf,
    /// Paper name recorded in the outline.
    pub paper: String,
    /// Tool version string.
    pub tool_version: String,
}

/// Write the paper directory for `root`.
///
/// Creates the following layout:
/// ```text
/// <dest>/
/// ├── outline.json
/// ├── figures/
/// │   └── overview.pdf
/// └── sections/
///     ├── 0_abstract/
///     │   └── 0_abstract.md
///     ├── 1_introduction/
///     │   ├── 1_introduction.md      (only when the section has its own text)
///     │   └── 0_background/
///     │       └── 0_background.md
///     └── ...
/// ```
///
/// Any previous content of `dest` is replaced only once the new tree has been
/// written completely.
#[instrument(skip_all, fields(dest = %config.dest.display(), paper = %config.paper))]
pub fn materialize(
    config: &MaterializeConfig,
    root: &SectionNode,
    pool: &FigurePool,
) -> Result<MaterializeResult> {
    let (parent, name) = split_dest(&config.dest)?;
    std::fs::create_dir_all(&parent).map_err(|e| PaperSplitError::io(&parent, e))?;

    let staging = parent.join(format!(".{name}.staging-{}", uuid::Uuid::now_v7()));
    info!(staging = %staging.display(), "materializing paper");

    let written = match write_tree(&staging, config, root, pool) {
        Ok(written) => written,
        Err(e) => {
            discard(&staging);
            return Err(e);
        }
    };

    if let Err(e) = swap_into_place(&staging, &config.dest, &parent, &name) {
        discard(&staging);
        return Err(e);
    }

    info!(
        sections = written.section_count,
        files = written.file_count,
        figures = written.outline.figures.len(),
        missing_figures = written.outline.missing_figures.len(),
        "paper materialized"
    );

    Ok(MaterializeResult {
        path: config.dest.clone(),
        ..written
    })
}

/// Filesystem-safe rendering of a section title.
///
/// Attribute blocks and LaTeX commands are dropped, the rest is lowercased,
/// punctuation is removed and whitespace becomes `-`.
pub fn slugify(title: &str) -> String {
    static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\{\s*[#.\-][^{}]*\}").expect("valid regex")
    });
    static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\\[A-Za-z]+\*?").expect("valid regex")
    });
    static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[^\w\s-]").expect("valid regex")
    });
    static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[\s_]+").expect("valid regex")
    });
    static DASHES_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"-{2,}").expect("valid regex")
    });

    let text = ATTRIBUTE_RE.replace_all(title, "");
    let text = COMMAND_RE.replace_all(&text, " ");
    let text = text.to_lowercase();
    let text = NON_WORD_RE.replace_all(&text, "");
    let text = SEPARATOR_RE.replace_all(&text, "-");
    let text = DASHES_RE.replace_all(&text, "-");

    let slug: String = text.trim_matches('-').chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tree writing
// ---------------------------------------------------------------------------

/// Everything written into the staging directory.
struct TreeWriter<'a> {
    sections_dir: PathBuf,
    /// Figure references whose copied file name differs from the reference.
    renamed: &'a HashMap<String, String>,
    section_count: usize,
    file_count: usize,
}

fn write_tree(
    staging: &Path,
    config: &MaterializeConfig,
    root: &SectionNode,
    pool: &FigurePool,
) -> Result<MaterializeResult> {
    let sections_dir = staging.join(SECTIONS_DIR);
    let figures_dir = staging.join(FIGURES_DIR);
    for dir in [&sections_dir, &figures_dir] {
        std::fs::create_dir_all(dir).map_err(|e| PaperSplitError::io(dir, e))?;
    }

    let figures = copy_figures(root, pool, &figures_dir)?;

    let preamble = root.has_body().then(|| {
        let mut node = SectionNode::new(PREAMBLE_TITLE, root.level + 1, 1);
        node.body = root.body.clone();
        node
    });
    let top_level: Vec<&SectionNode> = preamble.iter().chain(root.children.iter()).collect();

    let mut writer = TreeWriter {
        sections_dir,
        renamed: &figures.renamed,
        section_count: 0,
        file_count: 0,
    };
    let sections = writer.write_siblings(&top_level, "")?;

    let outline = Outline {
        schema_version: CURRENT_SCHEMA_VERSION,
        paper: config.paper.clone(),
        tool_version: config.tool_version.clone(),
        generated_at: Utc::now(),
        sections,
        figures: figures.copied,
        missing_figures: figures.missing,
    };
    write_json(&staging.join(OUTLINE_FILE), &outline)?;

    Ok(MaterializeResult {
        path: staging.to_path_buf(),
        section_count: writer.section_count,
        file_count: writer.file_count,
        outline,
    })
}

impl TreeWriter<'_> {
    /// Write `nodes` as siblings under `prefix` (relative to `sections/`).
    fn write_siblings(&mut self, nodes: &[&SectionNode], prefix: &str) -> Result<Vec<OutlineEntry>> {
        nodes
            .iter()
            .enumerate()
            .map(|(index, node)| self.write_node(index, node, prefix))
            .collect()
    }

    fn write_node(&mut self, index: usize, node: &SectionNode, prefix: &str) -> Result<OutlineEntry> {
        let dir_name = format!("{index}_{}", slugify(&node.title));
        let rel_dir = if prefix.is_empty() {
            dir_name.clone()
        } else {
            format!("{prefix}/{dir_name}")
        };

        let dir = self.sections_dir.join(&rel_dir);
        std::fs::create_dir_all(&dir).map_err(|e| PaperSplitError::io(&dir, e))?;
        self.section_count += 1;

        let file = if node.is_leaf() || node.has_body() {
            let file_name = format!("{dir_name}.md");
            let path = dir.join(&file_name);
            std::fs::write(&path, self.render(node))
                .map_err(|e| PaperSplitError::io(&path, e))?;
            self.file_count += 1;
            debug!(path = %rel_dir, title = %node.title, "wrote section");
            Some(format!("{rel_dir}/{file_name}"))
        } else {
            None
        };

        let children: Vec<&SectionNode> = node.children.iter().collect();
        let children = self.write_siblings(&children, &rel_dir)?;

        Ok(OutlineEntry {
            title: node.title.clone(),
            path: rel_dir,
            file,
            children,
        })
    }

    /// `# {title}` followed by the section's own text.
    fn render(&self, node: &SectionNode) -> String {
        if !node.has_body() {
            return format!("# {}\n", node.title);
        }

        let mut body = node.body_text();
        for (reference, copied) in self.renamed {
            for closer in [')', '"'] {
                body = body.replace(
                    &format!("{FIGURES_DIR}/{reference}{closer}"),
                    &format!("{FIGURES_DIR}/{copied}{closer}"),
                );
            }
        }
        format!("# {}\n\n{}\n", node.title, body.trim_end())
    }
}

// ---------------------------------------------------------------------------
// Figures
// ---------------------------------------------------------------------------

struct CopiedFigures {
    copied: Vec<String>,
    missing: Vec<String>,
    renamed: HashMap<String, String>,
}

/// Copy every distinct figure referenced anywhere in the tree into `figures_dir`.
fn copy_figures(root: &SectionNode, pool: &FigurePool, figures_dir: &Path) -> Result<CopiedFigures> {
    let mut refs: Vec<FigureRef> = Vec::new();
    collect_figure_refs(root, &mut refs);

    let mut figures = CopiedFigures {
        copied: Vec::new(),
        missing: Vec::new(),
        renamed: HashMap::new(),
    };

    for figure in refs {
        let Some(source) = pool.resolve(&figure) else {
            warn!(figure = %figure, "referenced figure not found in source tree, skipping");
            figures.missing.push(figure.to_string());
            continue;
        };

        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(figure.file_name())
            .to_string();
        // Recorded for every reference, even when the file is already copied.
        if file_name != figure.file_name() {
            figures.renamed.insert(figure.to_string(), file_name.clone());
        }
        if figures.copied.contains(&file_name) {
            continue;
        }

        let target = figures_dir.join(&file_name);
        std::fs::copy(source, &target).map_err(|e| PaperSplitError::io(&target, e))?;
        debug!(figure = %figure, source = %source.display(), "copied figure");
        figures.copied.push(file_name);
    }

    Ok(figures)
}

fn collect_figure_refs(node: &SectionNode, refs: &mut Vec<FigureRef>) {
    for figure in figure_refs(&node.body_text()) {
        if !refs.contains(&figure) {
            refs.push(figure);
        }
    }
    for child in &node.children {
        collect_figure_refs(child, refs);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parent directory and final component of `dest`.
fn split_dest(dest: &Path) -> Result<(PathBuf, String)> {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            PaperSplitError::validation(format!(
                "output path {} has no usable directory name",
                dest.display()
            ))
        })?;

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name.to_string()))
}

/// Replace `dest` with `staging`.
///
/// The previous output is moved aside first and restored if the final rename
/// fails.
fn swap_into_place(staging: &Path, dest: &Path, parent: &Path, name: &str) -> Result<()> {
    let previous = if dest.exists() {
        let aside = parent.join(format!(".{name}.previous-{}", uuid::Uuid::now_v7()));
        std::fs::rename(dest, &aside).map_err(|e| PaperSplitError::io(dest, e))?;
        Some(aside)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staging, dest) {
        if let Some(aside) = &previous {
            restore_previous(aside, dest);
        }
        return Err(PaperSplitError::io(dest, e));
    }

    if let Some(aside) = previous {
        discard(&aside);
    }
    Ok(())
}

/// Move the set-aside output back to `dest`. Returns `false` when it stays stranded.
fn restore_previous(aside: &Path, dest: &Path) -> bool {
    match std::fs::rename(aside, dest) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                aside = %aside.display(),
                dest = %dest.display(),
                error = %e,
                "could not restore previous output; it remains in the aside directory"
            );
            false
        }
    }
}

fn discard(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        debug!(path = %dir.display(), error = %e, "could not remove directory");
    }
}

/// Write a JSON file (pretty-printed).
fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(|e| {
        PaperSplitError::validation(format!("JSON serialization failed: {e}"))
    })?;
    std::fs::write(path, json).map_err(|e| PaperSplitError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{list_tree, temp_dir, write};

    fn make_config(dest: &Path) -> MaterializeConfig {
        MaterializeConfig {
            dest: dest.to_path_buf(),
            paper: "2401.00001".into(),
            tool_version: "0.1.0-test".into(),
        }
    }

    fn section(title: &str, level: usize, body: &[&str]) -> SectionNode {
        let mut node = SectionNode::new(title, level, level);
        node.body = body.iter().map(|l| l.to_string()).collect();
        node
    }

    fn make_tree() -> SectionNode {
        let mut root = SectionNode::root();
        root.push_child(section("Abstract", 1, &["We split papers."]));

        let mut intro = section("Introduction", 1, &["Intro text.", "", "![Overview](figures/overview.pdf)"]);
        intro.push_child(section("Background", 2, &["History."]));
        root.push_child(intro);

        let mut method = section("Method", 1, &[]);
        method.push_child(section("Setup", 2, &["![](figures/arch)"]));
        root.push_child(method);

        root
    }

    #[test]
    fn materialize_writes_section_tree() {
        let tmp = temp_dir("ps-assembler");
        let dest = tmp.join("out").join("2401.00001");

        let result = materialize(&make_config(&dest), &make_tree(), &FigurePool::default()).unwrap();

        assert_eq!(result.path, dest);
        assert_eq!(result.section_count, 5);
        assert_eq!(result.file_count, 4);
        assert_eq!(
            list_tree(&dest.join(SECTIONS_DIR)),
            vec![
                "0_abstract/0_abstract.md",
                "1_introduction/0_background/0_background.md",
                "1_introduction/1_introduction.md",
                "2_method/0_setup/0_setup.md",
            ]
        );

        let abstract_md =
            std::fs::read_to_string(dest.join("sections/0_abstract/0_abstract.md")).unwrap();
        assert_eq!(abstract_md, "# Abstract\n\nWe split papers.\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn leaf_without_body_gets_title_only() {
        let tmp = temp_dir("ps-assembler");
        let dest = tmp.join("paper");
        let mut root = SectionNode::root();
        root.push_child(section("Empty", 1, &[]));

        materialize(&make_config(&dest), &root, &FigurePool::default()).unwrap();

        let md = std::fs::read_to_string(dest.join("sections/0_empty/0_empty.md")).unwrap();
        assert_eq!(md, "# Empty\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn preamble_shifts_top_level_indices() {
        let tmp = temp_dir("ps-assembler");
        let dest = tmp.join("paper");
        let mut root = make_tree();
        root.body = vec!["Title block".into()];

        let result = materialize(&make_config(&dest), &root, &FigurePool::default()).unwrap();

        let top: Vec<&str> = result.outline.sections.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(top, vec!["0_preamble", "1_abstract", "2_introduction", "3_method"]);
        let md = std::fs::read_to_string(dest.join("sections/0_preamble/0_preamble.md")).unwrap();
        assert_eq!(md, "# Preamble\n\nTitle block\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn figures_are_copied_flat_and_missing_recorded() {
        let tmp = temp_dir("ps-assembler");
        let src = tmp.join("src");
        write(&src, "img/deep/overview.pdf", "PDF");
        write(&src, "img/arch.png", "PNG");
        let pool = FigurePool::scan(&src).unwrap();

        let mut root = make_tree();
        root.children[0].body.push("![](figures/missing.png)".into());

        let dest = tmp.join("paper");
        let result = materialize(&make_config(&dest), &root, &pool).unwrap();

        assert_eq!(result.outline.figures, vec!["overview.pdf", "arch.png"]);
        assert_eq!(result.outline.missing_figures, vec!["missing.png"]);
        assert!(dest.join("figures/overview.pdf").is_file());
        assert!(dest.join("figures/arch.png").is_file());

        // Extension-less references point at the copied file.
        let setup = std::fs::read_to_string(dest.join("sections/2_method/0_setup/0_setup.md")).unwrap();
        assert!(setup.contains("![](figures/arch.png)"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn extensionless_reference_after_full_name_is_rewritten() {
        let tmp = temp_dir("ps-assembler");
        let src = tmp.join("src");
        write(&src, "img/arch.png", "PNG");
        let pool = FigurePool::scan(&src).unwrap();

        let mut root = SectionNode::root();
        root.push_child(section("A", 1, &["![](figures/arch.png)"]));
        root.push_child(section("B", 1, &["![](figures/arch)"]));

        let dest = tmp.join("paper");
        let result = materialize(&make_config(&dest), &root, &pool).unwrap();

        assert_eq!(result.outline.figures, vec!["arch.png"]);
        let b = std::fs::read_to_string(dest.join("sections/1_b/1_b.md")).unwrap();
        assert_eq!(b, "# B\n\n![](figures/arch.png)\n");
        assert!(!dest.join("figures/arch").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn restore_previous_reports_failure() {
        let tmp = temp_dir("ps-assembler");
        let dest = tmp.join("paper");

        assert!(!restore_previous(&tmp.join(".paper.previous-gone"), &dest));
        assert!(!dest.exists());

        let aside = tmp.join(".paper.previous-kept");
        write(&aside, "sections/0_a/0_a.md", "# A\n");
        assert!(restore_previous(&aside, &dest));
        assert!(dest.join("sections/0_a/0_a.md").is_file());
        assert!(!aside.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn outline_json_describes_tree() {
        let tmp = temp_dir("ps-assembler");
        let dest = tmp.join("paper");
        materialize(&make_config(&dest), &make_tree(), &FigurePool::default()).unwrap();

        let json = std::fs::read_to_string(dest.join(OUTLINE_FILE)).unwrap();
        let outline: Outline = serde_json::from_str(&json).unwrap();

        assert_eq!(outline.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(outline.paper, "2401.00001");
        assert_eq!(outline.sections.len(), 3);
        let intro = &outline.sections[1];
        assert_eq!(intro.file.as_deref(), Some("1_introduction/1_introduction.md"));
        assert_eq!(intro.children[0].path, "1_introduction/0_background");
        assert_eq!(outline.sections[2].file, None);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn materialize_replaces_previous_output() {
        let tmp = temp_dir("ps-assembler");
        let dest = tmp.join("paper");
        write(&dest, "sections/9_stale/9_stale.md", "old");

        materialize(&make_config(&dest), &make_tree(), &FigurePool::default()).unwrap();
        let first = list_tree(&dest);
        materialize(&make_config(&dest), &make_tree(), &FigurePool::default()).unwrap();
        let second = list_tree(&dest);

        assert!(!dest.join("sections/9_stale").exists());
        assert_eq!(first, second);

        // No staging or backup directories are left behind.
        let leftovers: Vec<_> = std::fs::read_dir(&tmp)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn slugify_handles_common_titles() {
        assert_eq!(slugify("Introduction"), "introduction");
        assert_eq!(slugify("Related Work {#sec:related}"), "related-work");
        assert_eq!(slugify("3.1 Data & Pre-processing"), "31-data-pre-processing");
        assert_eq!(slugify("Results: \\emph{Main} findings"), "results-main-findings");
        assert_eq!(slugify("snake_case  title"), "snake-case-title");
        assert_eq!(slugify("--- ??? ---"), "section");
        assert_eq!(slugify(""), "section");
    }

    #[test]
    fn slugify_truncates_long_titles() {
        let slug = slugify(&"word ".repeat(40));
        assert!(slug.chars().count() <= MAX_SLUG_CHARS);
        assert!(!slug.ends_with('-'));
    }
}
