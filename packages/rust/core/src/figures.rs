//! Figure pool: locates the files that figure references point at.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use papersplit_shared::{FigureRef, PaperSplitError, Result};

/// Extensions tried, in order, for references written without one
/// (`\includegraphics{plot}`).
pub const FIGURE_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "eps", "svg"];

/// Index of the files in a source tree, keyed by basename.
#[derive(Debug, Clone, Default)]
pub struct FigurePool {
    files: HashMap<String, PathBuf>,
}

impl FigurePool {
    /// Index every file under `dir`.
    ///
    /// When a basename occurs more than once the shallowest file wins, then
    /// the lexicographically smallest path. Hidden directories are skipped.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut found: Vec<(usize, PathBuf)> = Vec::new();
        let mut pending: Vec<(PathBuf, usize)> = vec![(dir.to_path_buf(), 0)];

        while let Some((current, depth)) = pending.pop() {
            let entries =
                std::fs::read_dir(&current).map_err(|e| PaperSplitError::io(&current, e))?;

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    let hidden = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with('.'));
                    if !hidden {
                        pending.push((path, depth + 1));
                    }
                    continue;
                }
                found.push((depth, path));
            }
        }

        found.sort();

        let mut files = HashMap::new();
        for (_, path) in found {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.entry(name.to_string()).or_insert(path);
            }
        }

        debug!(files = files.len(), "figure pool indexed");
        Ok(Self { files })
    }

    /// The file `figure` refers to, if present.
    pub fn resolve(&self, figure: &FigureRef) -> Option<&Path> {
        if let Some(path) = self.files.get(figure.file_name()) {
            return Some(path.as_path());
        }
        if figure.has_extension() {
            return None;
        }

        FIGURE_EXTENSIONS.iter().find_map(|ext| {
            self.files
                .get(&format!("{}.{ext}", figure.file_name()))
                .map(PathBuf::as_path)
        })
    }

    /// Number of indexed files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
