//! Application configuration for papersplit.
//!
//! User config lives at `~/.papersplit/papersplit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PaperSplitError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "papersplit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".papersplit";

/// Deepest heading marker the tree builder can be configured to treat as structural.
pub const MAX_SUPPORTED_HEADING_LEVEL: usize = 6;

// ---------------------------------------------------------------------------
// Config structs (matching papersplit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Source download settings.
    #[serde(default)]
    pub fetch: FetchSection,

    /// External conversion engine settings.
    #[serde(default)]
    pub conversion: ConversionSection,

    /// Heading split and appendix rules.
    #[serde(default)]
    pub split: SplitSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where downloaded and extracted sources live (`<data_dir>/<paper id>/`).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Where split papers are written (`<output_dir>/<paper name>/`).
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".into()
}
fn default_output_dir() -> String {
    "./output".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Source bundle URL; `{id}` is replaced by the paper id.
    #[serde(default = "default_source_url_template")]
    pub source_url_template: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Keep the downloaded archive next to the extracted tree.
    #[serde(default)]
    pub keep_archive: bool,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            source_url_template: default_source_url_template(),
            timeout_secs: default_timeout_secs(),
            keep_archive: false,
        }
    }
}

fn default_source_url_template() -> String {
    "https://arxiv.org/src/{id}".into()
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[conversion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSection {
    /// Engine executable.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments passed to the engine; the document is fed on stdin.
    #[serde(default = "default_engine_args")]
    pub args: Vec<String>,
}

impl Default for ConversionSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_engine_args(),
        }
    }
}

fn default_program() -> String {
    "pandoc".into()
}
fn default_engine_args() -> Vec<String> {
    ["-f", "latex", "-t", "markdown", "--wrap=none"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[split]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSection {
    /// Deepest `#` marker treated as a section heading.
    #[serde(default = "default_max_heading_level")]
    pub max_heading_level: usize,

    /// Title of the synthetic node that collects post-conclusion sections.
    #[serde(default = "default_appendix_title")]
    pub appendix_title: String,

    /// Normalized titles that identify the conclusion section.
    #[serde(default = "default_conclusion_titles")]
    pub conclusion_titles: Vec<String>,
}

impl Default for SplitSection {
    fn default() -> Self {
        Self {
            max_heading_level: default_max_heading_level(),
            appendix_title: default_appendix_title(),
            conclusion_titles: default_conclusion_titles(),
        }
    }
}

fn default_max_heading_level() -> usize {
    4
}
fn default_appendix_title() -> String {
    "Appendix".into()
}
fn default_conclusion_titles() -> Vec<String> {
    [
        "conclusion",
        "conclusions",
        "concluding remarks",
        "summary and conclusion",
        "summary and conclusions",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime download configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Source bundle URL template containing `{id}`.
    pub source_url_template: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Keep the downloaded archive after extraction.
    pub keep_archive: bool,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            source_url_template: config.fetch.source_url_template.clone(),
            timeout_secs: config.fetch.timeout_secs,
            keep_archive: config.fetch.keep_archive,
        }
    }
}

/// Runtime conversion engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine executable.
    pub program: String,
    /// Engine arguments.
    pub args: Vec<String>,
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            program: config.conversion.program.clone(),
            args: config.conversion.args.clone(),
        }
    }
}

/// Runtime split configuration.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Deepest structural heading marker.
    pub max_heading_level: usize,
    /// Title of the synthetic appendix node.
    pub appendix_title: String,
    /// Titles (normalized, lowercase) that mark the conclusion.
    pub conclusion_titles: Vec<String>,
}

impl From<&AppConfig> for SplitConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_heading_level: config.split.max_heading_level,
            appendix_title: config.split.appendix_title.clone(),
            conclusion_titles: config
                .split
                .conclusion_titles
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.papersplit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PaperSplitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.papersplit/papersplit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperSplitError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PaperSplitError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PaperSplitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PaperSplitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PaperSplitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs that would make the pipeline misbehave.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let level = config.split.max_heading_level;
    if !(1..=MAX_SUPPORTED_HEADING_LEVEL).contains(&level) {
        return Err(PaperSplitError::config(format!(
            "split.max_heading_level must be between 1 and {MAX_SUPPORTED_HEADING_LEVEL}, got {level}"
        )));
    }

    if !config.fetch.source_url_template.contains("{id}") {
        return Err(PaperSplitError::config(
            "fetch.source_url_template must contain the {id} placeholder",
        ));
    }

    if config.conversion.program.trim().is_empty() {
        return Err(PaperSplitError::config("conversion.program must not be empty"));
    }

    if config.split.appendix_title.trim().is_empty() {
        return Err(PaperSplitError::config("split.appendix_title must not be empty"));
    }

    Ok(())
}
