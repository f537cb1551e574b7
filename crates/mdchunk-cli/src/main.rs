//! mdchunk CLI - split markdown documents into typed chunks
//!
//! This is the main entry point for the mdchunk command-line interface.
//! Command implementations live in [`commands`].

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::initialize_logging(&cli)?;

    execute_command(cli).await
}

async fn execute_command(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Chunk { files, jsonl } => {
            let config = commands::resolve_config(&cli)?;
            commands::chunk_files(config, files, *jsonl, cli.debug)?;
        },

        Commands::Batch {
            files,
            concurrency,
            stats_only,
        } => {
            let config = commands::resolve_config(&cli)?;
            commands::batch_files(config, files, *concurrency, *stats_only, cli.debug).await?;
        },

        Commands::Strategies => commands::list_strategies(),

        Commands::MigrateConfig { file, output } => {
            commands::migrate_config(file, output.as_ref())?;
        },
    }

    Ok(())
}
