use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Training plans grounded in your own reference material", long_about = None)]
struct Cli {
    /// Config file (default: .fitplan/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reference document, overrides [document] path
    #[arg(long, global = true)]
    document: Option<PathBuf>,

    /// Enable info-level logging (FITPLAN_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .fitplan/config.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Index the reference document (reuses the stored index when unchanged)
    Build {
        /// Rebuild even if the stored index is current
        #[arg(long)]
        force: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Search the reference document
    Query {
        /// Search text
        query: String,

        /// Number of passages (default: retrieval.top_k)
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Generate a training plan
    Plan {
        #[command(flatten)]
        args: commands::plan::PlanArgs,
    },

    /// Show metadata of the persisted index
    Inspect {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("FITPLAN_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let source = commands::ConfigSource {
        config: cli.config,
        document: cli.document,
    };

    match cli.command {
        Commands::Init { force } => {
            commands::init::execute(&source, force)?;
        }
        Commands::Build { force, json } => {
            commands::build::execute(&source, force, json)?;
        }
        Commands::Query { query, limit, json } => {
            commands::query::execute(&source, &query, limit, json)?;
        }
        Commands::Plan { args } => {
            commands::plan::execute(&source, args)?;
        }
        Commands::Inspect { json } => {
            commands::inspect::execute(&source, json)?;
        }
    }

    Ok(())
}
