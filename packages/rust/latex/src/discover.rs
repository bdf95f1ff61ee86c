//! Root file discovery for an extracted source tree.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use papersplit_shared::{PaperSplitError, Result};

/// A `\documentclass` that is not commented out.
static DOCUMENTCLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^%\n]*\\documentclass\b").expect("documentclass regex")
});

/// Find the root LaTeX file under `dir`.
///
/// The root is the `.tex` file declaring `\documentclass`. When several do
/// (standalone figures, templates), the shallowest one wins, then the
/// lexicographically smallest path.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn find_main_tex(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(PaperSplitError::latex(format!(
            "source directory {} does not exist",
            dir.display()
        )));
    }

    let mut candidates: Vec<(usize, PathBuf)> = Vec::new();
    let mut pending: Vec<(PathBuf, usize)> = vec![(dir.to_path_buf(), 0)];

    while let Some((current, depth)) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| PaperSplitError::io(&current, e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push((path, depth + 1));
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("tex") {
                continue;
            }
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            if DOCUMENTCLASS_RE.is_match(&String::from_utf8_lossy(&bytes)) {
                candidates.push((depth, path));
            }
        }
    }

    candidates.sort();
    debug!(candidates = candidates.len(), "root file candidates");

    candidates
        .into_iter()
        .next()
        .map(|(_, path)| path)
        .ok_or_else(|| {
            PaperSplitError::latex(format!(
                "no .tex file with \\documentclass found in {}",
                dir.display()
            ))
        })
}
