use crate::store::DbPool;
use crate::store::models::Cover;

/// Single-statement upsert: a reader either sees the previous blob or the
/// complete new one, never a torn write.
pub async fn put(pool: &DbPool, cover: &Cover) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO covers (id, provider, data, width, height, cached_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           provider = excluded.provider, \
           data = excluded.data, \
           width = excluded.width, \
           height = excluded.height, \
           cached_at = excluded.cached_at",
    )
    .bind(&cover.id)
    .bind(cover.provider.as_str())
    .bind(&cover.data)
    .bind(cover.width)
    .bind(cover.height)
    .bind(cover.cached_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &DbPool, id: &str) -> Result<Option<Cover>, sqlx::Error> {
    sqlx::query_as::<_, Cover>("SELECT * FROM covers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}
