//! repoindex CLI: multi-repository file metadata aggregation.
//!
//! Imports file listings from the configured repositories, merges them into
//! one record per physical file, and publishes a searchable index.

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
