//! # Shelf CLI (`shelf`)
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the SQLite database and one table per source |
//! | `shelf sources` | List configured sources |
//! | `shelf sync <source>` | Crawl a source, storing only unseen items |
//! | `shelf get <source> <id>` | Print one stored record as JSON |
//! | `shelf export <source> --dir <path>` | Write each stored record to `<id>.json` |
//! | `shelf stats` | Record counts and checkpoints per source |
//!
//! Logs go to stderr through `tracing`; set `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shelf::progress::ProgressMode;
use shelf::sync::SyncOptions;
use shelf::{config, export, get, migrate, sources, stats, sync};

/// Shelf: incremental ingestion of paginated product catalogs into SQLite.
#[derive(Parser)]
#[command(name = "shelf", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file, the checkpoints table and one record table
    /// per configured source. Idempotent.
    Init,

    /// List configured sources.
    Sources,

    /// Crawl a source page by page until the first empty page.
    ///
    /// Every page is committed as one unit. Items whose id is already
    /// stored are skipped, so re-running a sync only adds what is new.
    Sync {
        /// Source name from the config file.
        source: String,

        /// Items requested per page (overrides config).
        #[arg(long)]
        page_size: Option<u32>,

        /// Last page to request, inclusive; 0 for no limit (overrides config).
        #[arg(long)]
        page_limit: Option<u32>,

        /// First page to request.
        #[arg(long, conflicts_with = "resume")]
        start_page: Option<u32>,

        /// Continue after the last committed page of the previous run.
        #[arg(long)]
        resume: bool,

        /// Fetch and transform, but write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Print a stored record as JSON.
    Get {
        /// Source name.
        source: String,
        /// Record id.
        id: String,
    },

    /// Write every stored record of a source to `<dir>/<id>.json`.
    Export {
        /// Source name.
        source: String,
        /// Output directory, created if missing.
        #[arg(long)]
        dir: PathBuf,
    },

    /// Show record counts and checkpoints.
    Stats,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Sync {
            source,
            page_size,
            page_limit,
            start_page,
            resume,
            dry_run,
            progress,
        } => {
            let opts = SyncOptions {
                page_size,
                page_limit,
                start_page,
                resume,
                dry_run,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            let summary = sync::run_sync(&cfg, &source, &opts).await?;
            sync::print_summary(&summary, dry_run);
        }
        Commands::Get { source, id } => {
            get::run_get(&cfg, &source, &id).await?;
        }
        Commands::Export { source, dir } => {
            export::run_export(&cfg, &source, &dir).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
