//! Core domain types for papersplit: the section tree and the written outline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for the `outline.json` format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// SectionNode
// ---------------------------------------------------------------------------

/// One section of a paper, built from a Markdown heading.
///
/// `level` is the depth in the tree (root = 0, so every child sits exactly one
/// level below its parent). `marker_level` is the number of `#` characters the
/// heading was written with; the two differ when a document skips levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    /// Cleaned heading text.
    pub title: String,
    /// Tree depth, 1 for top-level sections.
    pub level: usize,
    /// Heading marker depth as written (`##` = 2).
    pub marker_level: usize,
    /// Markdown lines that belong directly to this section.
    pub body: Vec<String>,
    /// Subsections in document order.
    pub children: Vec<SectionNode>,
    /// Zero-based position among siblings.
    pub order_index: usize,
}

impl SectionNode {
    /// The synthetic level-0 root that owns the top-level sections.
    pub fn root() -> Self {
        Self::new("", 0, 0)
    }

    /// A fresh section with an empty body and no children.
    pub fn new(title: impl Into<String>, level: usize, marker_level: usize) -> Self {
        Self {
            title: title.into(),
            level,
            marker_level,
            body: Vec::new(),
            children: Vec::new(),
            order_index: 0,
        }
    }

    /// Whether this node has no subsections.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the body holds anything besides blank lines.
    pub fn has_body(&self) -> bool {
        self.body.iter().any(|line| !line.trim().is_empty())
    }

    /// The body joined back into Markdown text.
    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }

    /// Append `child` as the last subsection, assigning its `order_index`.
    pub fn push_child(&mut self, mut child: SectionNode) {
        child.order_index = self.children.len();
        self.children.push(child);
    }

    /// Set this node's depth to `level` and shift the whole subtree with it.
    pub fn set_level(&mut self, level: usize) {
        self.level = level;
        for child in &mut self.children {
            child.set_level(level + 1);
        }
    }

    /// Number of nodes in this subtree, excluding `self`.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// FigureRef
// ---------------------------------------------------------------------------

/// A figure file referenced from section text, identified by its basename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FigureRef(pub String);

impl FigureRef {
    /// The referenced file name (e.g. `overview.pdf`).
    pub fn file_name(&self) -> &str {
        &self.0
    }

    /// Whether the reference carries a file extension.
    pub fn has_extension(&self) -> bool {
        std::path::Path::new(&self.0).extension().is_some()
    }
}

impl std::fmt::Display for FigureRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// A single entry in `outline.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Section title.
    pub title: String,
    /// Directory of the section relative to `sections/`.
    pub path: String,
    /// Markdown file relative to `sections/`, absent when nothing was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Nested subsections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineEntry>,
}

/// Root structure for `outline.json`, written beside `sections/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Paper name (output directory name).
    pub paper: String,
    /// Tool version that wrote the output.
    pub tool_version: String,
    /// When the output was generated.
    pub generated_at: DateTime<Utc>,
    /// Top-level sections.
    pub sections: Vec<OutlineEntry>,
    /// Figures copied into `figures/`.
    #[serde(default)]
    pub figures: Vec<String>,
    /// Referenced figures that were not found in the source tree.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_figures: Vec<String>,
}
