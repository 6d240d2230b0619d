//! esorm CLI
//!
//! Command-line tools for operating the document store behind esorm.
//!
//! # Commands
//!
//! - `config` - Print the effective backend configuration
//! - `count` - Count documents matching filters
//! - `search` - Run a filtered, sorted search
//! - `delete-index` - Delete indices
//! - `ingest` - Stream NDJSON documents through the batched writer

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// esorm command-line tools.
#[derive(Parser)]
#[command(name = "esorm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Properties file with `es.*` keys
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Backend URL(s), comma-separated
    #[arg(global = true, long)]
    url: Option<String>,

    /// Basic auth user name
    #[arg(global = true, long)]
    username: Option<String>,

    /// Basic auth password
    #[arg(global = true, long)]
    password: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,

    /// Count documents
    Count {
        /// Index name(s), comma-separated
        index: String,

        /// Filter as key=value; the key may carry an operator suffix
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Search documents
    Search {
        /// Index name(s), comma-separated
        index: String,

        /// Filter as key=value; the key may carry an operator suffix
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Sort key; prefix with '-' for descending
        #[arg(short, long = "sort", allow_hyphen_values = true)]
        sort: Vec<String>,

        /// Page size
        #[arg(long, default_value = "10")]
        size: usize,

        /// Offset of the first hit
        #[arg(long, default_value = "0")]
        from: usize,

        /// Returned fields, comma-separated
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },

    /// Delete indices
    DeleteIndex {
        /// Index names
        #[arg(required = true)]
        indices: Vec<String>,
    },

    /// Stream NDJSON documents into an index
    Ingest {
        /// Target index
        index: String,

        /// Input file; standard input when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = commands::settings::Overrides {
        url: cli.url,
        username: cli.username,
        password: cli.password,
    };
    let config = commands::settings::load(cli.config.as_deref(), &overrides)?;

    if let Commands::Config = cli.command {
        commands::config::run(&config);
        return Ok(());
    }

    let gateway = Arc::new(esorm_gateway::Gateway::new(config)?);
    match cli.command {
        Commands::Config => {}
        Commands::Count { index, filters } => {
            commands::count::run(&gateway, &index, &filters)?;
        }
        Commands::Search {
            index,
            filters,
            sort,
            size,
            from,
            columns,
        } => {
            let options = commands::search::SearchOptions {
                filters,
                sort,
                size,
                from,
                columns,
            };
            commands::search::run(&gateway, &index, &options)?;
        }
        Commands::DeleteIndex { indices } => {
            commands::delete_index::run(&gateway, &indices)?;
        }
        Commands::Ingest { index, file } => {
            commands::ingest::run(&gateway, &index, file.as_deref())?;
        }
    }

    Ok(())
}
