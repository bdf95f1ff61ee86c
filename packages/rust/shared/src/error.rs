//! Error types for papersplit.
//!
//! Library crates use [`PaperSplitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all papersplit operations.
#[derive(Debug, thiserror::Error)]
pub enum PaperSplitError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while downloading a source bundle.
    #[error("network error: {0}")]
    Network(String),

    /// Source archive could not be unpacked.
    #[error("archive error: {0}")]
    Archive(String),

    /// LaTeX source tree problem (no root file, unreadable root, ...).
    #[error("latex error: {message}")]
    Latex { message: String },

    /// The external LaTeX-to-Markdown engine failed.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad paper id, malformed output, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PaperSplitError>;

impl PaperSplitError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a LaTeX source error from any displayable message.
    pub fn latex(msg: impl Into<String>) -> Self {
        Self::Latex {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
