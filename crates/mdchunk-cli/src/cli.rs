//! # CLI Structure and Argument Parsing
//!
//! `mdchunk` follows a command-subcommand pattern:
//!
//! - **Global options**: configuration overrides and logging (`--config`,
//!   `--strategy`, `--mode`, `--verbose`, ...)
//! - **Subcommands**: `chunk`, `batch`, `strategies`, `migrate-config`
//!
//! ```bash
//! mdchunk chunk README.md
//! mdchunk --strategy hierarchical --max-chunk-size 4096 chunk docs/*.md
//! mdchunk batch docs/*.md --concurrency 8
//! mdchunk migrate-config legacy.json
//! ```

use clap::{Parser, Subcommand};
use mdchunk_core::ErrorMode;
use std::path::PathBuf;

/// Main CLI structure for the `mdchunk` command
#[derive(Parser, Clone, Debug)]
#[command(name = "mdchunk")]
#[command(version)]
#[command(about = "mdchunk - split markdown into typed, metadata-rich chunks", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML, or JSON with a `.json` extension)
    #[arg(short, long, global = true, env = "MDCHUNK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chunking strategy, overriding the configuration
    #[arg(short, long, global = true)]
    pub strategy: Option<String>,

    /// Error handling mode: strict, permissive or silent
    #[arg(short, long, global = true)]
    pub mode: Option<ErrorMode>,

    /// Maximum chunk size in bytes (0 disables the limit)
    #[arg(long, global = true)]
    pub max_chunk_size: Option<usize>,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Enable debug logging and print accounting after the command
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available subcommands
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Chunk files one after another and print the chunks as JSON
    Chunk {
        /// Markdown files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print one compact JSON document per file instead of a pretty array
        #[arg(long)]
        jsonl: bool,
    },

    /// Chunk files concurrently and print batch statistics with the results
    Batch {
        /// Markdown files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Documents processed at the same time (defaults to the configuration)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print only the statistics
        #[arg(long)]
        stats_only: bool,
    },

    /// List the registered chunking strategies
    Strategies,

    /// Convert a current or legacy configuration file to current TOML
    MigrateConfig {
        /// Configuration file to migrate
        file: PathBuf,

        /// Write the migrated configuration here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
