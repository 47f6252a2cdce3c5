use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Dispute, DisputeMessage, NewDispute, OrderId, Role},
    dispute_objects::DisputeQueryFilter,
    traits::DisputeError,
};

/// Inserts the dispute row. A partial unique index on the disputes table guarantees at most
/// one non-`Closed` dispute per order, so a racing second insert surfaces here as
/// `AlreadyDisputed` no matter what the caller checked beforehand.
pub async fn insert_dispute(
    raised_by: i64,
    vendor_id: i64,
    dispute: &NewDispute,
    conn: &mut SqliteConnection,
) -> Result<Dispute, DisputeError> {
    let order_id = dispute.order_id.clone();
    let dispute = sqlx::query_as(
        r#"
            INSERT INTO disputes (order_id, order_item_id, raised_by, vendor_id, reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(dispute.order_id.as_str())
    .bind(dispute.order_item_id)
    .bind(raised_by)
    .bind(vendor_id)
    .bind(dispute.reason.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => DisputeError::AlreadyDisputed(order_id),
        _ => DisputeError::from(e),
    })?;
    Ok(dispute)
}

pub async fn fetch_dispute(dispute_id: i64, conn: &mut SqliteConnection) -> Result<Option<Dispute>, sqlx::Error> {
    let dispute =
        sqlx::query_as("SELECT * FROM disputes WHERE id = $1").bind(dispute_id).fetch_optional(conn).await?;
    Ok(dispute)
}

/// The dispute currently occupying the order's slot, if any. `Closed` disputes don't count.
pub async fn fetch_live_dispute_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    let dispute = sqlx::query_as("SELECT * FROM disputes WHERE order_id = $1 AND status != 'Closed' LIMIT 1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(dispute)
}

/// Fetches disputes according to criteria specified in the `DisputeQueryFilter`
///
/// Resulting disputes are ordered by `created_at` in descending order (newest first)
pub async fn search_disputes(
    query: DisputeQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Dispute>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM disputes
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.to_string());
    }
    if let Some(raised_by) = query.raised_by {
        where_clause.push("raised_by = ");
        where_clause.push_bind_unseparated(raised_by);
    }
    if let Some(vendor_id) = query.vendor_id {
        where_clause.push("vendor_id = ");
        where_clause.push_bind_unseparated(vendor_id);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("datetime(created_at) >= datetime(");
        where_clause.push_bind_unseparated(since);
        where_clause.push_unseparated(")");
    }
    if let Some(until) = query.until {
        where_clause.push("datetime(created_at) <= datetime(");
        where_clause.push_bind_unseparated(until);
        where_clause.push_unseparated(")");
    }
    builder.push(" ORDER BY created_at DESC, id DESC");

    trace!("⚖️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Dispute>();
    let disputes = query.fetch_all(conn).await?;
    trace!("⚖️ Result of search_disputes: {:?}", disputes.len());
    Ok(disputes)
}

/// The message thread in posting order.
pub async fn fetch_messages(dispute_id: i64, conn: &mut SqliteConnection) -> Result<Vec<DisputeMessage>, sqlx::Error> {
    let messages = sqlx::query_as("SELECT * FROM dispute_messages WHERE dispute_id = $1 ORDER BY id ASC")
        .bind(dispute_id)
        .fetch_all(conn)
        .await?;
    Ok(messages)
}

pub async fn insert_message(
    dispute_id: i64,
    author_id: i64,
    author_role: Role,
    body: &str,
    conn: &mut SqliteConnection,
) -> Result<DisputeMessage, sqlx::Error> {
    let message = sqlx::query_as(
        r#"
            INSERT INTO dispute_messages (dispute_id, author_id, author_role, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(dispute_id)
    .bind(author_id)
    .bind(author_role)
    .bind(body)
    .fetch_one(conn)
    .await?;
    Ok(message)
}

/// Records the admin verdict. Only an `Open` dispute can be resolved; returns `None` if it has
/// settled in the meantime.
pub async fn resolve_dispute(
    dispute_id: i64,
    admin_id: i64,
    resolution: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    let dispute = sqlx::query_as(
        r#"
            UPDATE disputes SET
                status = 'Resolved',
                resolution = $2,
                resolved_by = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Open'
            RETURNING *;
        "#,
    )
    .bind(dispute_id)
    .bind(resolution)
    .bind(admin_id)
    .fetch_optional(conn)
    .await?;
    Ok(dispute)
}

/// Closes the dispute, freeing the order's dispute slot. Returns `None` if it was already
/// closed.
pub async fn close_dispute(dispute_id: i64, conn: &mut SqliteConnection) -> Result<Option<Dispute>, sqlx::Error> {
    let dispute = sqlx::query_as(
        r#"
            UPDATE disputes SET
                status = 'Closed',
                closed_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status != 'Closed'
            RETURNING *;
        "#,
    )
    .bind(dispute_id)
    .fetch_optional(conn)
    .await?;
    Ok(dispute)
}
