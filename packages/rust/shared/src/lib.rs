//! Shared types, error model, and configuration for papersplit.
//!
//! This crate is the foundation depended on by all other papersplit crates.
//! It provides:
//! - [`PaperSplitError`]: the unified error type
//! - Domain types ([`SectionNode`], [`FigureRef`], [`Outline`])
//! - Configuration ([`AppConfig`], [`SplitConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConversionSection, DefaultsConfig, EngineConfig, FetchConfig, FetchSection,
    MAX_SUPPORTED_HEADING_LEVEL, SplitConfig, SplitSection, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_config,
};
pub use error::{PaperSplitError, Result};
pub use types::{CURRENT_SCHEMA_VERSION, FigureRef, Outline, OutlineEntry, SectionNode};
