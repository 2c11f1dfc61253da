use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::parser::BookMetadata;
use crate::provider::Provider;

/// Processing lifecycle of one file record. Transitions are
/// pending -> processing -> ready | error; terminal states are only left
/// by an explicit forced re-enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Ready,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Ready => "ready",
            FileStatus::Error => "error",
        }
    }
}

impl TryFrom<String> for FileStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        match value.as_str() {
            "pending" => Ok(FileStatus::Pending),
            "processing" => Ok(FileStatus::Processing),
            "ready" => Ok(FileStatus::Ready),
            "error" => Ok(FileStatus::Error),
            other => Err(format!("unknown file status: {other}")),
        }
    }
}

/// One remote file, keyed by `(provider, id)`.
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    #[sqlx(try_from = "String")]
    pub provider: Provider,
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub modified_at: i64,
    #[sqlx(try_from = "String")]
    pub status: FileStatus,
    pub metadata: Option<Json<BookMetadata>>,
    pub cover_id: Option<String>,
}

/// A file as seen in a drive listing, before any extraction. The columns
/// missing here (status, metadata, cover_id) belong to the ingest pipeline
/// and are never written by listings.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub provider: Provider,
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub modified_at: i64,
}

/// Partial update for one file row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    pub status: Option<FileStatus>,
    pub metadata: Option<BookMetadata>,
    pub cover_id: Option<String>,
}

/// Provider-scoped folder the user has added to the shelf. `file_ids` is a
/// denormalized snapshot from the last listing; the `(provider, folder_id)`
/// index on files is the source of truth for membership.
#[derive(Debug, Clone, FromRow)]
pub struct FolderRecord {
    pub id: String,
    #[sqlx(try_from = "String")]
    pub provider: Provider,
    pub name: String,
    pub parent_id: Option<String>,
    pub file_ids: Json<Vec<String>>,
    pub last_modified_at: i64,
    pub cached_at: i64,
}

/// Normalized cover blob. `id` matches the owning file's id.
#[derive(Debug, Clone, FromRow)]
pub struct Cover {
    pub id: String,
    #[sqlx(try_from = "String")]
    pub provider: Provider,
    pub data: Vec<u8>,
    pub width: i64,
    pub height: i64,
    pub cached_at: i64,
}

/// Singleton row of user preferences.
#[derive(Debug, Clone, FromRow)]
pub struct SettingsRecord {
    pub id: i64,
    pub view_mode: String,
    pub theme: String,
    pub group_by: String,
    pub last_opened_file_id: Option<String>,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            id: SETTINGS_ROW_ID,
            view_mode: "card".to_string(),
            theme: "light".to_string(),
            group_by: "none".to_string(),
            last_opened_file_id: None,
        }
    }
}

pub const SETTINGS_ROW_ID: i64 = 1;
