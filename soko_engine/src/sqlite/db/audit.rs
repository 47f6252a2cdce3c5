use serde_json::Value;
use sqlx::SqliteConnection;

use crate::db_types::AuditEntry;

/// Appends an audit row. `actor_id` is `None` for actions the system takes on its own, like
/// the auto-completion sweep.
pub async fn insert_entry(
    actor_id: Option<i64>,
    action: &str,
    details: Value,
    conn: &mut SqliteConnection,
) -> Result<AuditEntry, sqlx::Error> {
    let entry = sqlx::query_as("INSERT INTO audit_log (actor_id, action, details) VALUES ($1, $2, $3) RETURNING *")
        .bind(actor_id)
        .bind(action)
        .bind(details.to_string())
        .fetch_one(conn)
        .await?;
    Ok(entry)
}

/// The most recent entries, newest first.
pub async fn fetch_entries(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<AuditEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM audit_log ORDER BY id DESC LIMIT $1")
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
