//! # Risk RAG CLI (`rag`)
//!
//! The `rag` binary gathers evidence for a financial-risk question from
//! past assessments, curated knowledge, document chunks and relationship
//! graphs, and decides whether that evidence is sufficient.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite history database |
//! | `rag ingest <dir>` | Chunk a directory and report what would be indexed |
//! | `rag embed-dir --dir <dir>` | Embed documents into the history database |
//! | `rag retrieve "<query>"` | Fuse evidence from every source, print JSON |
//! | `rag history count` | Number of stored history rows |
//! | `rag history clear` | Delete all history rows |
//! | `rag history similar "<text>"` | Ids of the most similar stored rows |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! rag init --config ./config/rag.toml
//!
//! # Store past assessments
//! rag embed-dir --dir ./assessments --offset 1000000
//!
//! # Ask a question about a company
//! rag retrieve "supplier concentration risk" --subject AAPL --explain
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `warn`); results go to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use risk_rag::{config, embed_cmd, ingest, migrate, retrieve};

/// Risk RAG: multi-source evidence retrieval for financial risk analysis.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Risk RAG: multi-source evidence retrieval and ranking for financial risk analysis",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the history database schema. Idempotent.
    Init,

    /// Chunk a directory of `.txt`/`.md` files into an in-memory vector
    /// store and report the chunk count.
    Ingest {
        /// Directory to scan recursively.
        dir: PathBuf,
    },

    /// Embed `.txt`/`.md`/`.html` files into the history database.
    ///
    /// Each file becomes one row with id `offset + n`, in path order.
    EmbedDir {
        /// Directory to scan recursively.
        #[arg(long)]
        dir: PathBuf,

        /// First assessment id to assign.
        #[arg(long, default_value_t = 100_000_000)]
        offset: i64,
    },

    /// Retrieve and rank evidence for a query.
    Retrieve {
        /// The query text.
        query: String,

        /// Graph subject, e.g. `AAPL` or `Account:42`. Defaults to the query.
        #[arg(long)]
        subject: Option<String>,

        /// Number of hits to keep (overrides `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Include what each source contributed.
        #[arg(long)]
        explain: bool,
    },

    /// Inspect or reset the history database.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print the number of stored rows.
    Count,
    /// Delete every stored row.
    Clear,
    /// List the ids of the stored rows most similar to a text, as JSON.
    Similar {
        /// Text to compare against.
        text: String,

        /// Number of ids to return (overrides `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dir } => {
            ingest::run_ingest(&cfg, &dir).await?;
        }
        Commands::EmbedDir { dir, offset } => {
            embed_cmd::run_embed_dir(&cfg, &dir, offset).await?;
        }
        Commands::Retrieve {
            query,
            subject,
            top_k,
            explain,
        } => {
            retrieve::run_retrieve(&cfg, &query, subject.as_deref(), top_k, explain).await?;
        }
        Commands::History { action } => match action {
            HistoryAction::Count => embed_cmd::run_history_count(&cfg).await?,
            HistoryAction::Clear => embed_cmd::run_history_clear(&cfg).await?,
            HistoryAction::Similar { text, top_k } => {
                embed_cmd::run_history_similar(&cfg, &text, top_k).await?
            }
        },
    }

    Ok(())
}
