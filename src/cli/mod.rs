//! CLI commands implementation.
//!
//! The CLI drives the same services as the HTTP layer: local ingestion,
//! querying, and deletion all go through the pipeline.

use std::path::PathBuf;

use bytes::Bytes;
use clap::{Parser, Subcommand};

use crate::config::load_settings;
use crate::models::Tag;
use crate::server::{self, AppState};
use crate::services::{UploadOutcome, UploadRequest};

#[derive(Parser)]
#[command(name = "ragdex")]
#[command(about = "Document ingestion and semantic retrieval service")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check for verbose flag before clap parses (logging is initialized
/// before the CLI runs).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Ingest a local file into the index
    Ingest {
        /// File to ingest
        path: PathBuf,
        /// Category id to associate
        #[arg(long)]
        category: Option<i64>,
        /// Tag names to attach (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,
    },

    /// Query a document's indexed content
    Query {
        /// Document id (content hash)
        id: String,
        /// Natural-language query
        input: String,
    },

    /// Delete a document and its index entries
    Delete {
        /// Document id (content hash)
        id: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => server::serve(&settings, &host, port).await,
        Commands::Ingest {
            path,
            category,
            tag,
        } => {
            let state = AppState::new(&settings)?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("path has no filename: {}", path.display()))?;

            let bytes = tokio::fs::read(&path).await?;
            let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(bytes))]);

            let request = UploadRequest {
                file_name,
                category_id: category,
                tags: tag.into_iter().map(Tag::named).collect(),
            };
            match state.ingest.upload(request, stream).await? {
                UploadOutcome::Ingested(receipt) => {
                    println!("{}", serde_json::to_string_pretty(&receipt)?);
                }
                UploadOutcome::AlreadyUploaded(receipt) => {
                    println!("file already uploaded: {}", receipt.file_hash);
                }
            }
            Ok(())
        }
        Commands::Query { id, input } => {
            let state = AppState::new(&settings)?;
            let texts = state.retrieval.search(&input, &id).await?;
            for text in texts {
                println!("{}", text);
                println!("---");
            }
            Ok(())
        }
        Commands::Delete { id } => {
            let state = AppState::new(&settings)?;
            state.ingest.delete_document(&id).await?;
            println!("deleted {}", id);
            Ok(())
        }
    }
}
