//! # corkboard CLI
//!
//! Command-line access to the local corkboard cache, plus a headless sync
//! session for a single note.

mod commands;
mod context;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "corkboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "corkboard.yml", env = "CORKBOARD_CONFIG")]
    config: PathBuf,

    /// Local cache directory (overrides storage_dir)
    #[arg(long, global = true, env = "CORKBOARD_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// REST API base URL (overrides api_base_url)
    #[arg(long, global = true, env = "CORKBOARD_API_URL")]
    api_url: Option<String>,

    /// Push channel URL (overrides ws_url)
    #[arg(long, global = true, env = "CORKBOARD_WS_URL")]
    ws_url: Option<String>,

    /// Bearer token for the API
    #[arg(long, global = true, env = "CORKBOARD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List collections and their notes from the local cache
    Notes {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the boxes of one note
    Show {
        /// Note id
        note_id: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Export the cached workspace as JSON
    Export {
        /// Optional output file (defaults to stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a workspace export and replace the cache with it
    Import {
        /// Exported workspace JSON
        file: PathBuf,
    },

    /// Keep one note in sync with the server until Ctrl-C
    Sync {
        /// Collection holding the note
        collection_id: String,

        /// Note id
        note_id: String,

        /// Save over REST only, without the push channel
        #[arg(long)]
        no_push: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = context::Overrides {
        storage_dir: cli.storage_dir,
        api_url: cli.api_url,
        ws_url: cli.ws_url,
        token: cli.token,
    };
    let ctx = context::Context::load(&cli.config, overrides)?;

    match cli.command {
        Commands::Notes { json } => commands::list_notes(&ctx, json),
        Commands::Show { note_id, json } => commands::show_note(&ctx, &note_id, json),
        Commands::Export { output } => commands::export_workspace(&ctx, output.as_deref()),
        Commands::Import { file } => commands::import_workspace(&ctx, &file),
        Commands::Sync {
            collection_id,
            note_id,
            no_push,
        } => commands::sync_note(&ctx, &collection_id, &note_id, !no_push).await,
    }
}
