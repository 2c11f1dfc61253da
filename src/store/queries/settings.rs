use crate::store::DbPool;
use crate::store::models::{SETTINGS_ROW_ID, SettingsRecord};

/// Read the singleton settings row, falling back to defaults when the row
/// has never been written.
pub async fn get(pool: &DbPool) -> Result<SettingsRecord, sqlx::Error> {
    let row = sqlx::query_as::<_, SettingsRecord>("SELECT * FROM settings WHERE id = ?")
        .bind(SETTINGS_ROW_ID)
        .fetch_optional(pool)
        .await?;
    Ok(row.unwrap_or_default())
}

pub async fn put(pool: &DbPool, settings: &SettingsRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO settings (id, view_mode, theme, group_by, last_opened_file_id) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           view_mode = excluded.view_mode, \
           theme = excluded.theme, \
           group_by = excluded.group_by, \
           last_opened_file_id = excluded.last_opened_file_id",
    )
    .bind(SETTINGS_ROW_ID)
    .bind(&settings.view_mode)
    .bind(&settings.theme)
    .bind(&settings.group_by)
    .bind(settings.last_opened_file_id.as_deref())
    .execute(pool)
    .await?;
    Ok(())
}
