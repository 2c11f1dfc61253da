use crate::provider::Provider;
use crate::store::DbPool;
use crate::store::models::FolderRecord;

pub async fn put(pool: &DbPool, folder: &FolderRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO folders (id, provider, name, parent_id, file_ids, last_modified_at, cached_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           provider = excluded.provider, \
           name = excluded.name, \
           parent_id = excluded.parent_id, \
           file_ids = excluded.file_ids, \
           last_modified_at = excluded.last_modified_at, \
           cached_at = excluded.cached_at",
    )
    .bind(&folder.id)
    .bind(folder.provider.as_str())
    .bind(&folder.name)
    .bind(folder.parent_id.as_deref())
    .bind(&folder.file_ids)
    .bind(folder.last_modified_at)
    .bind(folder.cached_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &DbPool, id: &str) -> Result<Option<FolderRecord>, sqlx::Error> {
    sqlx::query_as::<_, FolderRecord>("SELECT * FROM folders WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn by_provider(pool: &DbPool, provider: Provider) -> Result<Vec<FolderRecord>, sqlx::Error> {
    sqlx::query_as::<_, FolderRecord>("SELECT * FROM folders WHERE provider = ? ORDER BY name")
        .bind(provider.as_str())
        .fetch_all(pool)
        .await
}

pub async fn delete(pool: &DbPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM folders WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
