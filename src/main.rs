mod config;
mod covers;
mod drive;
mod error;
mod ingest;
mod netcache;
mod parser;
mod progress;
mod provider;
mod state;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::types::Json;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::AppError;
use crate::progress::ChannelMessage;
use crate::provider::Provider;
use crate::state::AppState;
use crate::store::models::{FileRecord, FolderRecord};
use crate::store::now_millis;

#[derive(Parser)]
#[command(
    name = "driveshelf",
    version,
    about = "Local ingestion cache for cloud-drive EPUB libraries"
)]
struct Cli {
    /// Path to config file (built-in defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a remote folder, cache its records, and extract new books
    Sync {
        /// Drive provider: gdrive or onedrive
        #[arg(long)]
        provider: Provider,

        /// Remote folder id
        #[arg(long)]
        folder: String,

        /// Re-extract books that are already ready
        #[arg(long)]
        force: bool,
    },

    /// Print cached folders and their books
    Ls {
        /// Drive provider: gdrive or onedrive
        #[arg(long)]
        provider: Provider,

        /// Limit output to one folder id
        #[arg(long)]
        folder: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load(path).unwrap_or_else(|e| {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }),
        None => {
            let conventional = PathBuf::from("driveshelf.toml");
            if conventional.exists() {
                Config::load(&conventional).unwrap_or_else(|e| {
                    eprintln!("Error loading config: {e}");
                    std::process::exit(1);
                })
            } else {
                Config::default()
            }
        }
    };

    // Setup tracing/logging
    let filter =
        EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Initialize database
    let pool = store::create_pool(&config.store).await.unwrap_or_else(|e| {
        tracing::error!("Failed to initialize database: {e}");
        std::process::exit(1);
    });
    tracing::info!("Database ready: {}", config.store.url);

    let state = AppState::new(config, pool);

    // Tokens come from the environment; acquiring and refreshing them is
    // the embedder's job.
    let tokens: ingest::TokenProvider = Arc::new(|p| Box::pin(async move { access_token(p) }));
    state.processor.set_token_provider(tokens).await;

    let result = match cli.command {
        Command::Sync {
            provider,
            folder,
            force,
        } => run_sync(&state, provider, &folder, force).await,
        Command::Ls { provider, folder } => run_ls(&state, provider, folder.as_deref()).await,
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run_sync(
    state: &AppState,
    provider: Provider,
    folder_id: &str,
    force: bool,
) -> Result<(), AppError> {
    let token = match access_token(provider) {
        Some(t) => t,
        None => {
            tracing::error!("No access token for {provider}; set {}", token_env(provider));
            std::process::exit(1);
        }
    };

    if force {
        // A forced run wants fresh listings, not cached ones
        state.cache.clear();
    }

    let user = state.drive.current_user(provider, &token).await?;
    tracing::info!("Syncing as {}", user.email.as_deref().unwrap_or(&user.id));

    let remote = state.drive.folder_info(provider, folder_id, &token).await?;
    let files = state.drive.list_epub_files(provider, folder_id, &token).await?;
    tracing::info!("Listed {} EPUB file(s) in '{}'", files.len(), remote.name);

    let folder = FolderRecord {
        id: remote.id,
        provider,
        name: remote.name,
        parent_id: None,
        file_ids: Json(files.iter().map(|f| f.id.clone()).collect()),
        last_modified_at: remote.modified_at,
        cached_at: now_millis(),
    };
    state.store.put_folder(&folder).await?;
    state.store.put_files(&files).await?;

    let records = state.store.files_by_folder(provider, folder_id).await?;

    // Print every snapshot the pipeline publishes
    let mut events = state.progress.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ChannelMessage::Progress { progress }) => {
                    tracing::info!(
                        "progress: {}/{} done, {} error(s)",
                        progress.processed,
                        progress.total,
                        progress.error_count
                    );
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    state.processor.add_jobs(&records, force).await;
    state.processor.wait_idle().await;
    printer.abort();

    let summary = state.processor.progress().await;
    tracing::info!(
        "Sync finished: processed={}, errors={}",
        summary.processed,
        summary.error_count
    );
    Ok(())
}

async fn run_ls(
    state: &AppState,
    provider: Provider,
    folder: Option<&str>,
) -> Result<(), AppError> {
    let folders = match folder {
        Some(id) => state
            .store
            .get_folder(id)
            .await?
            .into_iter()
            .filter(|f| f.provider == provider)
            .collect(),
        None => state.store.folders_by_provider(provider).await?,
    };

    if folders.is_empty() {
        println!("No cached folders for {provider}");
        return Ok(());
    }

    for folder in folders {
        let files = state.store.files_by_folder(provider, &folder.id).await?;
        println!("{} [{}] ({} files)", folder.name, folder.id, files.len());
        for file in &files {
            println!("  {}", describe(file));
        }
    }
    Ok(())
}

/// One shelf line: status, then title/author/series when extracted, the
/// plain file name otherwise.
fn describe(file: &FileRecord) -> String {
    let mut line = format!("[{}] ", file.status.as_str());
    match file.metadata.as_ref() {
        Some(meta) => {
            line.push_str(&meta.title);
            if !meta.author.is_empty() {
                line.push_str(" by ");
                line.push_str(&meta.author.join(", "));
            }
            if let Some(series) = &meta.series {
                match meta.series_index {
                    Some(idx) => line.push_str(&format!(" ({series} #{idx})")),
                    None => line.push_str(&format!(" ({series})")),
                }
            }
        }
        None => line.push_str(&file.name),
    }
    line
}

fn access_token(provider: Provider) -> Option<String> {
    std::env::var(token_env(provider))
        .ok()
        .filter(|t| !t.is_empty())
}

fn token_env(provider: Provider) -> &'static str {
    match provider {
        Provider::Gdrive => "GDRIVE_TOKEN",
        Provider::Onedrive => "ONEDRIVE_TOKEN",
    }
}
