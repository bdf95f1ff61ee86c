//! LaTeX-to-Markdown normalization.
//!
//! The conversion itself is delegated to an external engine behind the
//! [`ConversionEngine`] trait ([`PandocEngine`] by default). This crate feeds
//! the merged document to the engine, reads back its Markdown, and runs a
//! small cleanup pipeline that flattens figure references into `figures/`.

mod cleanup;

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, instrument};

use papersplit_shared::{EngineConfig, FigureRef, PaperSplitError, Result};

pub use cleanup::FIGURES_DIR;

// ---------------------------------------------------------------------------
// Engine seam
// ---------------------------------------------------------------------------

/// An external LaTeX-to-Markdown transformer.
pub trait ConversionEngine: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Convert a complete LaTeX document into Markdown.
    fn convert(&self, latex: &str) -> Result<String>;
}

/// Runs an external program (pandoc by default) with the document on stdin.
#[derive(Debug, Clone)]
pub struct PandocEngine {
    program: String,
    args: Vec<String>,
}

impl PandocEngine {
    /// Create an engine that runs `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl From<&EngineConfig> for PandocEngine {
    fn from(config: &EngineConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

impl ConversionEngine for PandocEngine {
    fn name(&self) -> &str {
        &self.program
    }

    #[instrument(skip_all, fields(program = %self.program, input_len = latex.len()))]
    fn convert(&self, latex: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PaperSplitError::Conversion(format!(
                    "failed to spawn `{}`: {e}. Is it installed?",
                    self.program
                ))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            PaperSplitError::Conversion("failed to capture engine stdin".into())
        })?;

        // Feed stdin from a separate thread so a full stdout pipe can't deadlock us.
        let input = latex.to_owned();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output().map_err(|e| {
            PaperSplitError::Conversion(format!("failed to wait for `{}`: {e}", self.program))
        })?;

        let write_result = writer
            .join()
            .map_err(|_| PaperSplitError::Conversion("engine stdin writer panicked".into()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PaperSplitError::Conversion(format!(
                "`{}` exited with status {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        write_result.map_err(|e| {
            PaperSplitError::Conversion(format!("failed to write document to engine: {e}"))
        })?;

        debug!(output_len = output.stdout.len(), "engine finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Convert a merged LaTeX document into flat, cleaned Markdown.
///
/// Engine failures are returned as [`PaperSplitError::Conversion`] and are
/// not retried.
#[instrument(skip_all, fields(engine = engine.name()))]
pub fn normalize(latex: &str, engine: &dyn ConversionEngine) -> Result<String> {
    let raw = engine.convert(latex)?;
    debug!(raw_len = raw.len(), "engine conversion complete");

    let cleaned = cleanup::run_pipeline(&raw);
    debug!(final_len = cleaned.len(), "cleanup complete");

    Ok(cleaned)
}

/// Distinct local figure files referenced by `md`, in order of first appearance.
pub fn figure_refs(md: &str) -> Vec<FigureRef> {
    let mut found: Vec<(usize, &str)> = Vec::new();

    for caps in cleanup::MD_IMAGE_RE.captures_iter(md) {
        if let Some(target) = caps.get(2) {
            found.push((target.start(), target.as_str()));
        }
    }
    for caps in cleanup::HTML_IMAGE_RE.captures_iter(md) {
        if let Some(target) = caps.get(2) {
            found.push((target.start(), target.as_str()));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut refs: Vec<FigureRef> = Vec::new();
    for (_, target) in found {
        if let Some(name) = cleanup::figure_basename(target) {
            let figure = FigureRef(name.to_string());
            if !refs.contains(&figure) {
                refs.push(figure);
            }
        }
    }
    refs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
