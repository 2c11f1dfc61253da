use sqlx::types::Json;

use crate::provider::Provider;
use crate::store::DbPool;
use crate::store::models::{FilePatch, FileRecord, NewFile};

/// Bulk upsert of listing results. New rows start out `pending`; for rows
/// that already exist only the listing-owned columns are refreshed, so a
/// re-listing never wipes out parsed metadata or a terminal status.
pub async fn put_many(pool: &DbPool, files: &[NewFile]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for f in files {
        sqlx::query(
            "INSERT INTO files (provider, id, folder_id, name, mime_type, size, modified_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(provider, id) DO UPDATE SET \
               folder_id = excluded.folder_id, \
               name = excluded.name, \
               mime_type = excluded.mime_type, \
               size = excluded.size, \
               modified_at = excluded.modified_at",
        )
        .bind(f.provider.as_str())
        .bind(&f.id)
        .bind(&f.folder_id)
        .bind(&f.name)
        .bind(&f.mime_type)
        .bind(f.size)
        .bind(f.modified_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn get(pool: &DbPool, provider: Provider, id: &str) -> Result<Option<FileRecord>, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE provider = ? AND id = ?")
        .bind(provider.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn by_folder(
    pool: &DbPool,
    provider: Provider,
    folder_id: &str,
) -> Result<Vec<FileRecord>, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>(
        "SELECT * FROM files WHERE provider = ? AND folder_id = ? ORDER BY name",
    )
    .bind(provider.as_str())
    .bind(folder_id)
    .fetch_all(pool)
    .await
}

/// Merge semantics: absent patch fields leave their column untouched.
pub async fn update(
    pool: &DbPool,
    provider: Provider,
    id: &str,
    patch: &FilePatch,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE files SET \
           status = COALESCE(?, status), \
           metadata = COALESCE(?, metadata), \
           cover_id = COALESCE(?, cover_id) \
         WHERE provider = ? AND id = ?",
    )
    .bind(patch.status.map(|s| s.as_str()))
    .bind(patch.metadata.as_ref().map(Json))
    .bind(patch.cover_id.as_deref())
    .bind(provider.as_str())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_by_folder(
    pool: &DbPool,
    provider: Provider,
    folder_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "DELETE FROM covers WHERE id IN \
           (SELECT cover_id FROM files WHERE provider = ? AND folder_id = ? AND cover_id IS NOT NULL)",
    )
    .bind(provider.as_str())
    .bind(folder_id)
    .execute(pool)
    .await?;
    sqlx::query("DELETE FROM files WHERE provider = ? AND folder_id = ?")
        .bind(provider.as_str())
        .bind(folder_id)
        .execute(pool)
        .await?;
    Ok(())
}
