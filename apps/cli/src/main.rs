//! papersplit CLI: split LaTeX papers into per-section Markdown trees.
//!
//! Downloads a paper's source bundle, converts it to Markdown and writes one
//! directory per section, with back matter grouped under an appendix.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
