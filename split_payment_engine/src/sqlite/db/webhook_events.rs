use sqlx::SqliteConnection;

use crate::db_types::ProviderKind;

pub async fn event_exists(provider: ProviderKind, event_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM webhook_events WHERE provider = $1 AND event_id = $2")
        .bind(provider)
        .bind(event_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}

/// Returns false if the event was already recorded.
pub async fn insert_event(
    provider: ProviderKind,
    event_id: &str,
    event_type: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            INSERT INTO webhook_events (provider, event_id, event_type) VALUES ($1, $2, $3)
            ON CONFLICT (provider, event_id) DO NOTHING
        "#,
    )
    .bind(provider)
    .bind(event_id)
    .bind(event_type)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
