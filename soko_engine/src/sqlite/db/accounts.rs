use sqlx::SqliteConnection;

use crate::db_types::{NewNotification, Notification, User};

pub async fn fetch_user_by_id(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(user)
}

/// Email lookups are case-insensitive (the column collates NOCASE).
pub async fn fetch_user_by_email(email: &str, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as("SELECT * FROM users WHERE email = $1").bind(email).fetch_optional(conn).await?;
    Ok(user)
}

/// Replaces the phone number and voids any previous verification in the same statement.
pub async fn update_phone(user_id: i64, phone: &str, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as(
        r#"
            UPDATE users SET
                phone = $2,
                phone_verified = 0,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(phone)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

pub async fn mark_phone_verified(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as(
        "UPDATE users SET phone_verified = 1, updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

/// The user's notifications, newest first.
pub async fn fetch_notifications(
    user_id: i64,
    unread_only: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, sqlx::Error> {
    let q = if unread_only {
        "SELECT * FROM notifications WHERE user_id = $1 AND read_at IS NULL ORDER BY id DESC"
    } else {
        "SELECT * FROM notifications WHERE user_id = $1 ORDER BY id DESC"
    };
    let notifications = sqlx::query_as(q).bind(user_id).fetch_all(conn).await?;
    Ok(notifications)
}

pub async fn insert_notification(
    notification: &NewNotification,
    conn: &mut SqliteConnection,
) -> Result<Notification, sqlx::Error> {
    let notification =
        sqlx::query_as("INSERT INTO notifications (user_id, event, body) VALUES ($1, $2, $3) RETURNING *")
            .bind(notification.user_id)
            .bind(notification.event.as_str())
            .bind(notification.body.as_str())
            .fetch_one(conn)
            .await?;
    Ok(notification)
}

/// Marks the notification read, if it belongs to the user. Re-reading keeps the original
/// `read_at`.
pub async fn mark_notification_read(
    user_id: i64,
    notification_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Notification>, sqlx::Error> {
    let notification = sqlx::query_as(
        r#"
            UPDATE notifications SET
                read_at = COALESCE(read_at, CURRENT_TIMESTAMP)
            WHERE id = $1 AND user_id = $2
            RETURNING *;
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(notification)
}
