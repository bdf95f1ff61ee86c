//! LaTeX source assembly.
//!
//! Turns an extracted paper source tree into one linear LaTeX document:
//! - [`find_main_tex`] locates the root file (the one with `\documentclass`)
//! - [`resolve_includes`] recursively inlines `\input` / `\include` / `\subfile`
//! - [`preprocess`] rewrites environments the conversion engine would drop

mod discover;
mod include;
mod preprocess;

pub use discover::find_main_tex;
pub use include::{MergedDocument, resolve_includes};
pub use preprocess::preprocess;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    /// A fresh, empty directory under the system temp dir.
    pub fn temp_dir(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Write `content` to `dir/rel`, creating parent directories.
    pub fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }
}
