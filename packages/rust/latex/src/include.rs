//! Recursive resolution of file-inclusion directives.
//!
//! Every `\input{..}`, `\include{..}`, `\subfile{..}` and brace-less
//! `\input name` is replaced by the fully resolved lines of the file it names,
//! depth-first and in source order. A directive that would re-enter a file on
//! the active resolution path, or that names a file that does not exist, is
//! dropped and logged.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use papersplit_shared::{PaperSplitError, Result};

/// Matches the inclusion directives we inline.
///
/// Group 1/2: braced form (`\input{sections/intro}`); group 3: `\input intro`.
static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:(input|include|subfile)\s*\{\s*([^{}]*?)\s*\}|input\s+([^\s{}%\\]+))")
        .expect("directive regex")
});

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A paper's LaTeX source flattened into a single sequence of lines.
#[derive(Debug, Clone)]
pub struct MergedDocument {
    /// The root file the merge started from.
    pub root: PathBuf,
    /// Lines in final order.
    pub lines: Vec<String>,
    /// Files that were inlined, in the order they were first entered.
    pub included: Vec<PathBuf>,
}

impl MergedDocument {
    /// The merged lines joined into one string.
    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// One LaTeX file read from disk.
struct SourceDocument {
    path: PathBuf,
    lines: Vec<String>,
}

impl SourceDocument {
    fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(Self {
            path: path.to_path_buf(),
            lines: text.lines().map(str::to_string).collect(),
        })
    }

    fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Resolve all inclusion directives reachable from `root`.
///
/// Fails only when `root` itself cannot be read; problems with included files
/// are logged and the offending directive is dropped.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn resolve_includes(root: &Path) -> Result<MergedDocument> {
    let root_path = canonical(root);
    let source = SourceDocument::read(&root_path).map_err(|e| PaperSplitError::io(root, e))?;

    let mut resolver = Resolver {
        root_dir: source.dir().to_path_buf(),
        active: HashSet::new(),
        included: Vec::new(),
    };

    let mut lines = Vec::new();
    resolver.expand(source, &mut lines);

    debug!(
        lines = lines.len(),
        included = resolver.included.len(),
        "include resolution complete"
    );

    Ok(MergedDocument {
        root: root_path,
        lines,
        included: resolver.included,
    })
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

struct Resolver {
    /// Directory of the root file; the fallback base for relative names.
    root_dir: PathBuf,
    /// Files on the current resolution path.
    active: HashSet<PathBuf>,
    included: Vec<PathBuf>,
}

impl Resolver {
    /// Append the resolved lines of `source` to `out`.
    fn expand(&mut self, source: SourceDocument, out: &mut Vec<String>) {
        self.active.insert(source.path.clone());

        let dir = source.dir().to_path_buf();
        for line in &source.lines {
            self.expand_line(line, &dir, out);
        }

        self.active.remove(&source.path);
    }

    fn expand_line(&mut self, line: &str, dir: &Path, out: &mut Vec<String>) {
        let (code, comment) = split_comment(line);

        if !DIRECTIVE_RE.is_match(code) {
            out.push(line.to_string());
            return;
        }

        let mut cursor = 0;
        for caps in DIRECTIVE_RE.captures_iter(code) {
            let Some(whole) = caps.get(0) else { continue };

            let before = &code[cursor..whole.start()];
            if !before.trim().is_empty() {
                out.push(before.to_string());
            }
            cursor = whole.end();

            let name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            self.include(name, dir, whole.as_str(), out);
        }

        let rest = format!("{}{comment}", &code[cursor..]);
        if !rest.trim().is_empty() {
            out.push(rest);
        }
    }

    /// Inline the file `name` referenced from a file in `dir`.
    fn include(&mut self, name: &str, dir: &Path, directive: &str, out: &mut Vec<String>) {
        if name.is_empty() {
            warn!(directive, "empty inclusion directive, dropping");
            return;
        }

        let Some(path) = self.locate(name, dir) else {
            warn!(directive, dir = %dir.display(), "included file not found, dropping directive");
            return;
        };

        if self.active.contains(&path) {
            warn!(directive, path = %path.display(), "inclusion cycle detected, dropping directive");
            return;
        }

        match SourceDocument::read(&path) {
            Ok(source) => {
                debug!(path = %path.display(), "inlining");
                if !self.included.contains(&path) {
                    self.included.push(path);
                }
                self.expand(source, out);
            }
            Err(e) => {
                warn!(directive, path = %path.display(), error = %e, "included file unreadable, dropping directive");
            }
        }
    }

    /// Find the file `name` refers to, trying the including file's directory
    /// first and the root file's directory second.
    fn locate(&self, name: &str, dir: &Path) -> Option<PathBuf> {
        let bases = [dir, self.root_dir.as_path()];
        for (i, base) in bases.iter().enumerate() {
            if i > 0 && *base == dir {
                continue;
            }
            let exact = base.join(name);
            if exact.is_file() {
                return Some(canonical(&exact));
            }
            let with_ext = base.join(format!("{name}.tex"));
            if with_ext.is_file() {
                return Some(canonical(&with_ext));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Split a line at its first unescaped `%` into (code, comment).
fn split_comment(line: &str) -> (&str, &str) {
    let mut backslashes = 0;
    for (i, c) in line.char_indices() {
        match c {
            '\\' => backslashes += 1,
            '%' if backslashes % 2 == 0 => return (&line[..i], &line[i..]),
            _ => backslashes = 0,
        }
    }
    (line, "")
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
