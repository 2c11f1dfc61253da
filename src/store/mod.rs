pub mod live;
pub mod models;
pub mod queries;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::config::StoreConfig;
use crate::provider::Provider;
use live::StoreEvent;
use models::{Cover, FilePatch, FileRecord, FolderRecord, NewFile, SettingsRecord};

pub type DbPool = sqlx::SqlitePool;

const EVENT_CAPACITY: usize = 64;

/// Milliseconds since the Unix epoch, the timestamp unit every table uses.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Open (creating if missing) the SQLite database and apply migrations.
pub async fn create_pool(config: &StoreConfig) -> Result<DbPool, sqlx::Error> {
    let opts = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    configure_sqlite(&pool).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Set SQLite pragmas for WAL journal mode and foreign key enforcement.
async fn configure_sqlite(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;
    Ok(())
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Create an in-memory SQLite pool for testing, with all migrations applied.
pub async fn create_test_pool() -> DbPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Facade over the database: every write goes through here so the matching
/// change event is published right after the statement commits. Clones
/// share one pool and one event bus.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    pub fn new(pool: DbPool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { pool, events }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        // No live subscribers is fine
        let _ = self.events.send(event);
    }

    pub async fn put_folder(&self, folder: &FolderRecord) -> Result<(), sqlx::Error> {
        queries::folders::put(&self.pool, folder).await?;
        self.notify(StoreEvent::FoldersChanged {
            provider: folder.provider,
        });
        Ok(())
    }

    pub async fn folders_by_provider(
        &self,
        provider: Provider,
    ) -> Result<Vec<FolderRecord>, sqlx::Error> {
        queries::folders::by_provider(&self.pool, provider).await
    }

    pub async fn get_folder(&self, id: &str) -> Result<Option<FolderRecord>, sqlx::Error> {
        queries::folders::get(&self.pool, id).await
    }

    /// Remove a folder together with its file rows and their covers.
    pub async fn remove_folder(&self, provider: Provider, folder_id: &str) -> Result<(), sqlx::Error> {
        queries::files::delete_by_folder(&self.pool, provider, folder_id).await?;
        queries::folders::delete(&self.pool, folder_id).await?;
        self.notify(StoreEvent::FilesChanged {
            provider,
            folder_id: Some(folder_id.to_string()),
        });
        self.notify(StoreEvent::FoldersChanged { provider });
        Ok(())
    }

    pub async fn put_files(&self, files: &[NewFile]) -> Result<(), sqlx::Error> {
        if files.is_empty() {
            return Ok(());
        }
        queries::files::put_many(&self.pool, files).await?;

        let mut touched: Vec<(Provider, String)> = Vec::new();
        for f in files {
            let key = (f.provider, f.folder_id.clone());
            if !touched.contains(&key) {
                touched.push(key);
            }
        }
        for (provider, folder_id) in touched {
            self.notify(StoreEvent::FilesChanged {
                provider,
                folder_id: Some(folder_id),
            });
        }
        Ok(())
    }

    pub async fn get_file(
        &self,
        provider: Provider,
        id: &str,
    ) -> Result<Option<FileRecord>, sqlx::Error> {
        queries::files::get(&self.pool, provider, id).await
    }

    pub async fn files_by_folder(
        &self,
        provider: Provider,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>, sqlx::Error> {
        queries::files::by_folder(&self.pool, provider, folder_id).await
    }

    pub async fn update_file(
        &self,
        provider: Provider,
        id: &str,
        patch: &FilePatch,
    ) -> Result<(), sqlx::Error> {
        queries::files::update(&self.pool, provider, id, patch).await?;
        self.notify(StoreEvent::FilesChanged {
            provider,
            folder_id: None,
        });
        Ok(())
    }

    pub async fn put_cover(&self, cover: &Cover) -> Result<(), sqlx::Error> {
        queries::covers::put(&self.pool, cover).await?;
        self.notify(StoreEvent::CoversChanged {
            id: cover.id.clone(),
        });
        Ok(())
    }

    pub async fn get_cover(&self, id: &str) -> Result<Option<Cover>, sqlx::Error> {
        queries::covers::get(&self.pool, id).await
    }

    pub async fn settings(&self) -> Result<SettingsRecord, sqlx::Error> {
        queries::settings::get(&self.pool).await
    }

    pub async fn put_settings(&self, settings: &SettingsRecord) -> Result<(), sqlx::Error> {
        queries::settings::put(&self.pool, settings).await?;
        self.notify(StoreEvent::SettingsChanged);
        Ok(())
    }

    /// Live query over one folder's files: delivers the current result set
    /// immediately, then a fresh one after every write that can affect it.
    /// The feed ends when the receiver is dropped or every Store clone is
    /// gone.
    pub fn watch_files(
        &self,
        provider: Provider,
        folder_id: &str,
    ) -> mpsc::Receiver<Vec<FileRecord>> {
        let (tx, rx) = mpsc::channel(8);
        let pool = self.pool.clone();
        let folder = folder_id.to_string();
        let mut events = self.events.subscribe();

        tokio::spawn(async move {
            match queries::files::by_folder(&pool, provider, &folder).await {
                Ok(rows) => {
                    if tx.send(rows).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!("live file query failed: {e}"),
            }
            loop {
                let refresh = match events.recv().await {
                    Ok(ev) => ev.touches_files(provider, &folder),
                    // Dropped events may have been relevant, so re-query
                    Err(broadcast::error::RecvError::Lagged(_)) => true,
                    Err(broadcast::error::RecvError::Closed) => return,
                };
                if !refresh {
                    continue;
                }
                match queries::files::by_folder(&pool, provider, &folder).await {
                    Ok(rows) => {
                        if tx.send(rows).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("live file query failed: {e}"),
                }
            }
        });

        rx
    }
}
