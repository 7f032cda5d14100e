use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::importer::DEFAULT_CHUNK_SIZE;

#[derive(Parser, Debug)]
#[command(name = "aodb-import")]
#[command(version, about = "Import denormalized game-data extracts into a normalized database")]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that every source file is present and decodes
    Validate {
        /// Directory containing the source files
        #[arg(short, long)]
        sources: PathBuf,
    },

    /// Import a single dataset
    Import {
        /// Dataset name (see list-datasets)
        dataset: String,

        /// Directory containing the source files
        #[arg(short, long)]
        sources: PathBuf,

        /// Target database path
        #[arg(short = 'd', long = "database-url")]
        database_url: PathBuf,

        /// Records per chunk transaction
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Truncate affected tables before loading (destructive)
        #[arg(long)]
        clear: bool,

        /// Emit the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import every dataset in dependency order
    All {
        /// Directory containing the source files
        #[arg(short, long)]
        sources: PathBuf,

        /// Target database path
        #[arg(short = 'd', long = "database-url")]
        database_url: PathBuf,

        /// Records per chunk transaction
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Truncate all tables before loading (destructive)
        #[arg(long)]
        clear: bool,

        /// Emit the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the schema in a fresh database
    InitDb {
        /// Target database path
        #[arg(short = 'd', long = "database-url")]
        database_url: PathBuf,
    },

    /// List all dataset names in dependency order
    ListDatasets,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
