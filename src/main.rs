//! # Workflow Catalog CLI (`wfcat`)
//!
//! The `wfcat` binary is the operator interface for the workflow catalog.
//! It provides commands for database initialization, ingestion runs,
//! catalog search and retrieval, re-scoring, and starting the query API.
//!
//! ## Usage
//!
//! ```bash
//! wfcat --config ./config/catalog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wfcat init` | Create the SQLite database and run schema migrations |
//! | `wfcat sources` | List configured sources and their health |
//! | `wfcat ingest <source\|all>` | Run the ingestion pipeline |
//! | `wfcat search "<query>"` | Search the catalog |
//! | `wfcat get <id>` | Print one record in full |
//! | `wfcat rescore` | Re-score records after a scorer version bump |
//! | `wfcat stats` | Catalog summary |
//! | `wfcat serve api` | Start the read-only query API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use workflow_catalog::{
    config, db, get, ingest, migrate, rules::RuleSet, search, server, sources, stats,
    store::CatalogStore,
};

/// Workflow Catalog CLI — discovers, scores, and serves automation
/// workflows for local-first stacks.
#[derive(Parser)]
#[command(
    name = "wfcat",
    about = "Workflow Catalog — discover, score, and serve automation workflows",
    version,
    long_about = "The workflow catalog ingests automation-workflow definitions from \
    configured source repositories, analyzes their node graphs, scores them for \
    compatibility with a local service stack, and serves the result through a \
    searchable read-only API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catalog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the record table, and the
    /// full-text index. Idempotent — running it multiple times is safe.
    Init,

    /// List configured sources and their health.
    Sources,

    /// Run the ingestion pipeline for one source or all of them.
    ///
    /// Streams workflow documents from the source, parses and scores
    /// each on a bounded worker pool, and upserts the results. Unchanged
    /// documents are skipped; per-item failures never abort the run.
    /// Ctrl-C stops the run cooperatively and prints a partial summary.
    Ingest {
        /// Source name from the config, or `all`.
        source: String,

        /// Maximum number of entries to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Show entry counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the catalog with ranked full-text matching.
    Search {
        /// The search query string.
        query: String,

        /// Filter by category (name or slug).
        #[arg(long)]
        category: Option<String>,

        /// Filter by difficulty: beginner, intermediate, or advanced.
        #[arg(long)]
        difficulty: Option<String>,

        /// Only workflows that run on local AI.
        #[arg(long)]
        local_ai_only: bool,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Print one catalog record by id.
    Get {
        /// Record id.
        id: String,
    },

    /// Re-score all records carrying a stale scorer version.
    ///
    /// Uses the analysis facts already stored; nothing is fetched or
    /// re-parsed.
    Rescore,

    /// Print catalog statistics.
    Stats,

    /// Start a long-running service.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the read-only query API.
    Api,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workflow_catalog=info,wfcat=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Ingest {
            source,
            limit,
            dry_run,
        } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let store = CatalogStore::new(pool);

            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("cancellation requested, finishing in-flight work");
                    signal_cancel.cancel();
                }
            });

            let summary =
                ingest::run_ingest(&cfg, &store, &source, limit, dry_run, cancel).await?;
            if !dry_run {
                ingest::print_summary(&summary);
            }
            store.pool().close().await;
        }
        Commands::Search {
            query,
            category,
            difficulty,
            local_ai_only,
            limit,
        } => {
            let pool = db::connect(&cfg).await?;
            let store = CatalogStore::new(pool);
            search::run_search(&store, &query, category, difficulty, local_ai_only, limit)
                .await?;
            store.pool().close().await;
        }
        Commands::Get { id } => {
            let pool = db::connect(&cfg).await?;
            let store = CatalogStore::new(pool);
            get::run_get(&store, &id).await?;
            store.pool().close().await;
        }
        Commands::Rescore => {
            let pool = db::connect(&cfg).await?;
            let store = CatalogStore::new(pool);
            let rules = RuleSet::new(cfg.catalog.local_services.clone());
            let updated = store.rescore_all(&rules).await?;
            println!("Re-scored {} workflows.", updated);
            store.pool().close().await;
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            let store = CatalogStore::new(pool);
            stats::run_stats(&cfg, &store).await?;
            store.pool().close().await;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                let pool = db::connect(&cfg).await?;
                migrate::run_migrations(&pool).await?;
                let store = CatalogStore::new(pool);
                server::run_server(&cfg, store).await?;
            }
        },
    }

    Ok(())
}
