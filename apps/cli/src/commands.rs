//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use papersplit_core::pipeline::{
    BatchConfig, BatchReport, PaperJob, PaperOutcome, PaperResult, ProgressReporter,
    run_batch, split_source,
};
use papersplit_fetch::Fetcher;
use papersplit_markdown::PandocEngine;
use papersplit_shared::{
    AppConfig, EngineConfig, FetchConfig, SplitConfig, init_config, load_config,
    load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// papersplit: split LaTeX papers into per-section Markdown trees.
#[derive(Parser)]
#[command(
    name = "papersplit",
    version,
    about = "Turn a paper's LaTeX source into a directory tree of per-section Markdown files.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.papersplit/papersplit.toml.
    #[arg(long, global = true, env = "PAPERSPLIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for downloaded sources (overrides config).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory for output trees (overrides config).
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch, convert and split one or more papers.
    Run {
        /// Paper ids (e.g. 2401.00001).
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Download and extract paper sources without splitting.
    Fetch {
        /// Paper ids (e.g. 2401.00001).
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Split a local LaTeX source tree.
    Split {
        /// Directory holding the LaTeX sources.
        source_dir: PathBuf,

        /// Output name (defaults to the source directory name).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "papersplit=info",
        1 => "papersplit=debug",
        _ => "papersplit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // Writing a fresh config must not depend on the current one parsing.
    if let Command::Config {
        action: ConfigAction::Init,
    } = cli.command
    {
        return cmd_config_init().await;
    }

    let settings = Settings::resolve(&cli)?;

    match cli.command {
        Command::Run { ids } => cmd_run(&settings, &ids).await,
        Command::Fetch { ids } => cmd_fetch(&settings, &ids).await,
        Command::Split { source_dir, name } => {
            cmd_split(&settings, &source_dir, name.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&settings).await,
        },
    }
}

/// Config file values with CLI overrides applied.
struct Settings {
    config: AppConfig,
    data_dir: PathBuf,
    output_dir: PathBuf,
}

impl Settings {
    fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };

        if let Some(dir) = &cli.data_dir {
            config.defaults.data_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(dir) = &cli.out {
            config.defaults.output_dir = dir.to_string_lossy().into_owned();
        }

        Ok(Self {
            data_dir: PathBuf::from(&config.defaults.data_dir),
            output_dir: PathBuf::from(&config.defaults.output_dir),
            config,
        })
    }

    fn engine(&self) -> PandocEngine {
        PandocEngine::from(&EngineConfig::from(&self.config))
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(settings: &Settings, ids: &[String]) -> Result<()> {
    let batch = BatchConfig {
        data_dir: settings.data_dir.clone(),
        output_dir: settings.output_dir.clone(),
        fetch: FetchConfig::from(&settings.config),
        split: SplitConfig::from(&settings.config),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(
        papers = ids.len(),
        data_dir = %batch.data_dir.display(),
        output_dir = %batch.output_dir.display(),
        "processing papers"
    );

    let engine = Arc::new(settings.engine());
    let reporter = Arc::new(CliProgress::new());
    let report = run_batch(ids, &batch, engine, reporter.clone()).await?;
    reporter.finish();

    print_report(&report);

    if report.all_succeeded() {
        Ok(())
    } else {
        Err(eyre!(
            "{} of {} papers failed",
            report.failed(),
            report.outcomes.len()
        ))
    }
}

async fn cmd_fetch(settings: &Settings, ids: &[String]) -> Result<()> {
    let fetcher = Fetcher::new(FetchConfig::from(&settings.config))?;
    let mut failed = 0usize;

    println!();
    for id in ids {
        match fetcher.fetch(id, &settings.data_dir).await {
            Ok(dir) => println!("  ✓ {id:<20} {}", dir.display()),
            Err(e) => {
                failed += 1;
                println!("  ✗ {id:<20} {e}");
            }
        }
    }
    println!();

    if failed == 0 {
        Ok(())
    } else {
        Err(eyre!("{failed} of {} downloads failed", ids.len()))
    }
}

async fn cmd_split(settings: &Settings, source_dir: &Path, name: Option<&str>) -> Result<()> {
    let name = match name {
        Some(n) => n.to_string(),
        None => source_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| eyre!("cannot derive a name from '{}'", source_dir.display()))?,
    };

    let job = PaperJob {
        dest: settings.output_dir.join(&name),
        name,
        source_dir: source_dir.to_path_buf(),
        split: SplitConfig::from(&settings.config),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(source = %job.source_dir.display(), name = %job.name, "splitting local source tree");

    let engine = settings.engine();
    let reporter = CliProgress::new();
    let result = split_source(&job, &engine, &reporter);
    reporter.finish();

    let result = result?;
    println!();
    print_result(&result);
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(settings: &Settings) -> Result<()> {
    let toml_str = toml::to_string_pretty(&settings.config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_report(report: &BatchReport) {
    println!();
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(result) => print_result(result),
            Err(e) => println!("  ✗ {:<20} {e}", outcome.paper_id),
        }
    }
    println!();
    println!(
        "  {} succeeded, {} failed in {:.1}s",
        report.succeeded(),
        report.failed(),
        report.elapsed.as_secs_f64()
    );
    println!();
}

fn print_result(result: &PaperResult) {
    let appendix = if result.appendix_created { ", appendix" } else { "" };
    println!(
        "  ✓ {:<20} {} sections, {} files, {} figures{appendix} → {}",
        result.name,
        result.section_count,
        result.file_count,
        result.figures,
        result.output_path.display()
    );
    if result.missing_figures > 0 {
        println!("    {} referenced figures were not found", result.missing_figures);
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix}{msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn paper_started(&self, paper_id: &str, current: usize, total: usize) {
        self.spinner.set_prefix(format!("[{current}/{total}] {paper_id}: "));
    }

    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn paper_finished(&self, outcome: &PaperOutcome) {
        let status = if outcome.is_success() { "done" } else { "failed" };
        self.spinner
            .println(format!("  {} {status}", outcome.paper_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_globals() {
        let cli = Cli::try_parse_from([
            "papersplit", "-vv", "--out", "/tmp/out", "run", "2401.00001", "2401.00002",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.out, Some(PathBuf::from("/tmp/out")));
        match cli.command {
            Command::Run { ids } => assert_eq!(ids, vec!["2401.00001", "2401.00002"]),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_requires_ids_for_run() {
        assert!(Cli::try_parse_from(["papersplit", "run"]).is_err());
    }

    #[test]
    fn cli_parses_split_with_name() {
        let cli = Cli::try_parse_from([
            "papersplit", "split", "./paper-src", "--name", "my-paper", "--log-format", "json",
        ])
        .unwrap();

        assert!(matches!(cli.log_format, LogFormat::Json));
        match cli.command {
            Command::Split { source_dir, name } => {
                assert_eq!(source_dir, PathBuf::from("./paper-src"));
                assert_eq!(name.as_deref(), Some("my-paper"));
            }
            _ => panic!("expected split"),
        }
    }

    #[test]
    fn settings_apply_cli_overrides() {
        let dir = std::env::temp_dir().join(format!("ps-cli-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("papersplit.toml");
        std::fs::write(
            &config_path,
            "[defaults]\ndata_dir = \"/srv/data\"\noutput_dir = \"/srv/out\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "papersplit",
            "--config",
            config_path.to_str().unwrap(),
            "--data-dir",
            "/override/data",
            "config",
            "show",
        ])
        .unwrap();
        let settings = Settings::resolve(&cli).unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/override/data"));
        assert_eq!(settings.output_dir, PathBuf::from("/srv/out"));
        assert_eq!(settings.config.conversion.program, "pandoc");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
