//! # Handbook Assistant CLI (`hba`)
//!
//! ## Usage
//!
//! ```bash
//! hba --config ./config/hba.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hba init` | Create the SQLite database and schema |
//! | `hba ask "<query>"` | Answer a single question |
//! | `hba chat` | Interactive session over stdin |
//! | `hba search "<query>"` | Retrieval only, with score breakdown |
//! | `hba cache stats` | Cache tier sizes |
//! | `hba cache clear` | Empty both cache tiers |
//! | `hba metrics` | Query performance summary |

use clap::{Parser, Subcommand};
use handbook_assistant::{config, logging, migrate, repl, search, stats};
use std::path::PathBuf;

/// Handbook Assistant CLI: domain-scoped question answering with hybrid
/// retrieval and two-tier response caching.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hba.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hba",
    about = "Handbook Assistant: domain-scoped question answering with hybrid retrieval and response caching",
    version,
    long_about = "Handbook Assistant answers questions about a single knowledge domain. Answers come \
    from a two-tier response cache, canned templates, or a text-generation service grounded on \
    passages found by keyword + semantic retrieval over a chunked document corpus."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/hba.toml`. Database, corpus, retrieval, cache,
    /// provider, and domain vocabulary settings are read from this file.
    #[arg(long, global = true, default_value = "./config/hba.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the key-value table used by the
    /// cache tiers, metrics, and saved sessions. Idempotent.
    Init,

    /// Answer a single question.
    ///
    /// Runs the full pipeline once: cache, templates, domain enforcement,
    /// retrieval, and generation. Prints the answer, cited sources, and
    /// token usage.
    Ask {
        /// The question.
        query: String,

        /// Resume and save the conversation under this session id.
        #[arg(long)]
        session: Option<String>,
    },

    /// Start an interactive session.
    ///
    /// Reads questions from stdin, one per line. `/reset` clears the
    /// conversation, `/summary` shows its state, `/quit` exits.
    Chat {
        /// Resume and save the conversation under this session id.
        #[arg(long)]
        session: Option<String>,
    },

    /// Search the corpus without generating an answer.
    ///
    /// Prints ranked passages with combined, keyword, and semantic scores.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,

        /// Skip the keyword channel and rank by semantic similarity only.
        #[arg(long)]
        semantic_only: bool,
    },

    /// Inspect or clear the response cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show the query performance summary.
    Metrics,
}

/// Cache subcommands.
#[derive(Subcommand)]
enum CacheAction {
    /// Entry counts for the exact and fuzzy tiers.
    Stats,
    /// Remove every entry from both tiers.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ask { query, session } => {
            repl::run_ask(&cfg, &query, session).await?;
        }
        Commands::Chat { session } => {
            repl::run_chat(&cfg, session).await?;
        }
        Commands::Search {
            query,
            limit,
            semantic_only,
        } => {
            search::run_search(&cfg, &query, limit, semantic_only).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => stats::run_cache_stats(&cfg).await?,
            CacheAction::Clear => stats::run_cache_clear(&cfg).await?,
        },
        Commands::Metrics => {
            stats::run_metrics(&cfg).await?;
        }
    }

    Ok(())
}
