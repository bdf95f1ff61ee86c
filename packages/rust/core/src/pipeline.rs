//! End-to-end pipeline: paper id → fetch → resolve → convert → split → output tree.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use papersplit_fetch::Fetcher;
use papersplit_latex::{find_main_tex, preprocess, resolve_includes};
use papersplit_markdown::{ConversionEngine, normalize};
use papersplit_shared::{FetchConfig, PaperSplitError, Result, SplitConfig};

use crate::appendix::reclassify;
use crate::assembler::{MaterializeConfig, materialize};
use crate::figures::FigurePool;
use crate::outline::build_tree;

/// Flat Markdown of the whole paper, kept next to the LaTeX sources.
pub const FULL_PAPER_FILE: &str = "full_paper.md";

/// One local source tree to split.
#[derive(Debug, Clone)]
pub struct PaperJob {
    /// Paper name, used for the outline.
    pub name: String,
    /// Directory holding the extracted LaTeX sources.
    pub source_dir: PathBuf,
    /// Output directory for this paper.
    pub dest: PathBuf,
    /// Tree-building and appendix rules.
    pub split: SplitConfig,
    /// Tool version string.
    pub tool_version: String,
}

/// Result of splitting one paper.
#[derive(Debug, Clone)]
pub struct PaperResult {
    /// Paper name.
    pub name: String,
    /// Path to the written output directory.
    pub output_path: PathBuf,
    /// The root LaTeX file that was used.
    pub main_tex: PathBuf,
    /// Number of files inlined into the root file.
    pub included_files: usize,
    /// Number of section directories written.
    pub section_count: usize,
    /// Number of section Markdown files written.
    pub file_count: usize,
    /// Number of figures copied.
    pub figures: usize,
    /// Number of referenced figures that were not found.
    pub missing_figures: usize,
    /// Whether trailing sections were moved under an appendix.
    pub appendix_created: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Configuration for [`run_batch`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Where source trees are downloaded and extracted.
    pub data_dir: PathBuf,
    /// Where per-paper output trees are written.
    pub output_dir: PathBuf,
    /// Download settings.
    pub fetch: FetchConfig,
    /// Tree-building and appendix rules.
    pub split: SplitConfig,
    /// Tool version string.
    pub tool_version: String,
}

/// What happened to one paper of a batch.
#[derive(Debug)]
pub struct PaperOutcome {
    /// The paper id as given.
    pub paper_id: String,
    /// The split result, or the error that stopped this paper.
    pub result: Result<PaperResult>,
}

impl PaperOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of [`run_batch`].
#[derive(Debug)]
pub struct BatchReport {
    /// One outcome per requested paper, in request order.
    pub outcomes: Vec<PaperOutcome>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a paper of a batch starts.
    fn paper_started(&self, paper_id: &str, current: usize, total: usize);
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a paper of a batch has finished, successfully or not.
    fn paper_finished(&self, outcome: &PaperOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn paper_started(&self, _paper_id: &str, _current: usize, _total: usize) {}
    fn phase(&self, _name: &str) {}
    fn paper_finished(&self, _outcome: &PaperOutcome) {}
}

/// Split a local LaTeX source tree into a section tree.
///
/// 1. Locate the root `.tex` file
/// 2. Inline includes and preprocess
/// 3. Convert to Markdown (also saved as `full_paper.md` in the source dir)
/// 4. Build the heading tree and move back matter under the appendix
/// 5. Materialize the output directory
#[instrument(skip_all, fields(paper = %job.name, source = %job.source_dir.display()))]
pub fn split_source(
    job: &PaperJob,
    engine: &dyn ConversionEngine,
    progress: &dyn ProgressReporter,
) -> Result<PaperResult> {
    let start = Instant::now();

    // --- Phase 1: LaTeX sources ---
    progress.phase("Resolving LaTeX sources");
    let main_tex = find_main_tex(&job.source_dir)?;
    let merged = resolve_includes(&main_tex)?;
    let latex = preprocess(&merged.text());
    info!(
        main = %main_tex.display(),
        included = merged.included.len(),
        lines = merged.lines.len(),
        "sources merged"
    );

    // --- Phase 2: Convert LaTeX → Markdown ---
    progress.phase("Converting to Markdown");
    let markdown = normalize(&latex, engine)?;

    let full_paper = job.source_dir.join(FULL_PAPER_FILE);
    std::fs::write(&full_paper, &markdown).map_err(|e| PaperSplitError::io(&full_paper, e))?;

    // --- Phase 3: Build tree ---
    progress.phase("Splitting sections");
    let mut root = build_tree(&markdown, job.split.max_heading_level);
    let appendix_created = reclassify(&mut root, &job.split);

    // --- Phase 4: Materialize ---
    progress.phase("Writing output");
    let pool = FigurePool::scan(&job.source_dir)?;
    let materialize_config = MaterializeConfig {
        dest: job.dest.clone(),
        paper: job.name.clone(),
        tool_version: job.tool_version.clone(),
    };
    let written = materialize(&materialize_config, &root, &pool)?;

    let result = PaperResult {
        name: job.name.clone(),
        output_path: written.path,
        main_tex,
        included_files: merged.included.len(),
        section_count: written.section_count,
        file_count: written.file_count,
        figures: written.outline.figures.len(),
        missing_figures: written.outline.missing_figures.len(),
        appendix_created,
        elapsed: start.elapsed(),
    };

    info!(
        sections = result.section_count,
        files = result.file_count,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "paper split complete"
    );

    Ok(result)
}

/// Fetch and split every paper in `paper_ids`, one after another.
///
/// Splitting is blocking work and runs on the blocking thread pool.
/// A failing paper is logged and recorded in the report; the batch moves on
/// to the next one. Only a fetcher that cannot be built fails the whole call.
#[instrument(skip_all, fields(papers = paper_ids.len()))]
pub async fn run_batch(
    paper_ids: &[String],
    config: &BatchConfig,
    engine: Arc<dyn ConversionEngine>,
    progress: Arc<dyn ProgressReporter>,
) -> Result<BatchReport> {
    let start = Instant::now();
    let fetcher = Fetcher::new(config.fetch.clone())?;
    let total = paper_ids.len();
    let mut outcomes = Vec::with_capacity(total);

    for (i, paper_id) in paper_ids.iter().enumerate() {
        progress.paper_started(paper_id, i + 1, total);

        let result = process_paper(&fetcher, paper_id, config, &engine, &progress).await;
        if let Err(e) = &result {
            warn!(paper = %paper_id, error = %e, "paper failed, continuing with next");
        }

        let outcome = PaperOutcome {
            paper_id: paper_id.clone(),
            result,
        };
        progress.paper_finished(&outcome);
        outcomes.push(outcome);
    }

    let report = BatchReport {
        outcomes,
        elapsed: start.elapsed(),
    };
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "batch complete"
    );
    Ok(report)
}

async fn process_paper(
    fetcher: &Fetcher,
    paper_id: &str,
    config: &BatchConfig,
    engine: &Arc<dyn ConversionEngine>,
    progress: &Arc<dyn ProgressReporter>,
) -> Result<PaperResult> {
    progress.phase("Fetching source");
    let source_dir = fetcher.fetch(paper_id, &config.data_dir).await?;

    let job = PaperJob {
        name: paper_id.to_string(),
        source_dir,
        dest: config.output_dir.join(paper_id),
        split: config.split.clone(),
        tool_version: config.tool_version.clone(),
    };
    let engine = Arc::clone(engine);
    let progress = Arc::clone(progress);
    tokio::task::spawn_blocking(move || split_source(&job, engine.as_ref(), progress.as_ref()))
        .await
        .map_err(|e| PaperSplitError::Conversion(format!("split task failed: {e}")))?
}
