use log::trace;
use soko_common::Cents;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Payout, PayoutAttempt, PayoutStatusType},
    payout_objects::{BalanceSummary, PayoutQueryFilter},
};

/// Gross sales for the vendor: the sum of their line items on `Completed` orders. Orders that
/// are `Disputed` fall out of this figure until the dispute settles.
pub async fn vendor_gross_sales(vendor_id: i64, conn: &mut SqliteConnection) -> Result<Cents, sqlx::Error> {
    let gross: i64 = sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(order_items.quantity * order_items.unit_price), 0)
            FROM order_items JOIN orders ON order_items.order_id = orders.order_id
            WHERE order_items.vendor_id = $1 AND orders.status = 'Completed'
        "#,
    )
    .bind(vendor_id)
    .fetch_one(conn)
    .await?;
    Ok(Cents::from(gross))
}

pub async fn vendor_paid_out(vendor_id: i64, conn: &mut SqliteConnection) -> Result<Cents, sqlx::Error> {
    let paid: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM payouts WHERE vendor_id = $1 AND status = 'Completed'")
            .bind(vendor_id)
            .fetch_one(conn)
            .await?;
    Ok(Cents::from(paid))
}

/// Payouts accepted locally or sitting at the provider. These hold their amount against the
/// balance until they complete, fail or are cancelled.
pub async fn vendor_payouts_in_flight(vendor_id: i64, conn: &mut SqliteConnection) -> Result<Cents, sqlx::Error> {
    let in_flight: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payouts WHERE vendor_id = $1 AND status IN ('Pending', 'Processing')",
    )
    .bind(vendor_id)
    .fetch_one(conn)
    .await?;
    Ok(Cents::from(in_flight))
}

pub async fn balance_for_vendor(
    vendor_id: i64,
    fee_basis_points: i64,
    conn: &mut SqliteConnection,
) -> Result<BalanceSummary, sqlx::Error> {
    let gross = vendor_gross_sales(vendor_id, conn).await?;
    let paid_out = vendor_paid_out(vendor_id, conn).await?;
    let in_flight = vendor_payouts_in_flight(vendor_id, conn).await?;
    Ok(BalanceSummary::compute(gross, paid_out, in_flight, fee_basis_points))
}

/// Inserts the payout only if the vendor's available balance covers the amount, in a single
/// statement. The balance check and the insert cannot be separated by a concurrent insert, so
/// two racing withdrawals can never jointly overdraw. Returns `None` when the guard fails.
pub async fn guarded_insert(
    vendor_id: i64,
    bank_account_id: i64,
    amount: Cents,
    reference: &str,
    recipient_code: &str,
    fee_basis_points: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            WITH sales(gross) AS (
                SELECT COALESCE(SUM(order_items.quantity * order_items.unit_price), 0)
                FROM order_items JOIN orders ON order_items.order_id = orders.order_id
                WHERE order_items.vendor_id = $1 AND orders.status = 'Completed'
            ),
            holds(held) AS (
                SELECT COALESCE(SUM(amount), 0) FROM payouts
                WHERE vendor_id = $1 AND status IN ('Pending', 'Processing', 'Completed')
            )
            INSERT INTO payouts (vendor_id, bank_account_id, amount, reference, recipient_code)
            SELECT $1, $2, $3, $4, $5 FROM sales, holds
            WHERE $3 > 0 AND $3 <= gross - (gross * $6) / 10000 - held
            RETURNING *;
        "#,
    )
    .bind(vendor_id)
    .bind(bank_account_id)
    .bind(amount)
    .bind(reference)
    .bind(recipient_code)
    .bind(fee_basis_points)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

pub async fn insert_attempt(
    payout_id: i64,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<PayoutAttempt, sqlx::Error> {
    let attempt = sqlx::query_as("INSERT INTO payout_attempts (payout_id, reference) VALUES ($1, $2) RETURNING *")
        .bind(payout_id)
        .bind(reference)
        .fetch_one(conn)
        .await?;
    Ok(attempt)
}

pub async fn fetch_payout(payout_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as("SELECT * FROM payouts WHERE id = $1").bind(payout_id).fetch_optional(conn).await?;
    Ok(payout)
}

/// Looks the payout up through its attempt history, so superseded references from earlier
/// tries still land on the right row.
pub async fn fetch_payout_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            SELECT payouts.* FROM payouts
            JOIN payout_attempts ON payout_attempts.payout_id = payouts.id
            WHERE payout_attempts.reference = $1
            LIMIT 1
        "#,
    )
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

/// The payout's provider handoffs, oldest first. The last row carries the current reference.
pub async fn fetch_attempts(payout_id: i64, conn: &mut SqliteConnection) -> Result<Vec<PayoutAttempt>, sqlx::Error> {
    let attempts = sqlx::query_as("SELECT * FROM payout_attempts WHERE payout_id = $1 ORDER BY id ASC")
        .bind(payout_id)
        .fetch_all(conn)
        .await?;
    Ok(attempts)
}

/// Fetches payouts according to criteria specified in the `PayoutQueryFilter`
///
/// Resulting payouts are ordered by `created_at` in descending order (newest first)
pub async fn search_payouts(query: PayoutQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Payout>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM payouts
    "#,
    );
    let has_filters = query.vendor_id.is_some() ||
        query.reference.is_some() ||
        query.since.is_some() ||
        query.until.is_some() ||
        query.status.is_some();
    if has_filters {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(vendor_id) = query.vendor_id {
        where_clause.push("vendor_id = ");
        where_clause.push_bind_unseparated(vendor_id);
    }
    if let Some(reference) = query.reference {
        where_clause.push("reference = ");
        where_clause.push_bind_unseparated(reference);
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
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }

    trace!("💸️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Payout>();
    let payouts = query.fetch_all(conn).await?;
    trace!("💸️ Result of search_payouts: {:?}", payouts.len());
    Ok(payouts)
}

/// `Pending` → `Processing` once the provider accepts the transfer. Returns `None` if the
/// payout is not `Pending` any more.
pub async fn mark_submitted(
    payout_id: i64,
    transfer_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET
                status = 'Processing',
                transfer_code = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(payout_id)
    .bind(transfer_code)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

/// Marks an in-flight payout `Failed`, releasing its amount back to the vendor's balance.
pub async fn mark_failed(
    payout_id: i64,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET
                status = 'Failed',
                failure_reason = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status IN ('Pending', 'Processing')
            RETURNING *;
        "#,
    )
    .bind(payout_id)
    .bind(reason)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

/// Moves a `Failed` payout back to `Pending` under a fresh reference for another run at the
/// provider. The retry holds the amount against the balance again.
pub async fn retry_payout(
    payout_id: i64,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET
                status = 'Pending',
                reference = $2,
                transfer_code = NULL,
                failure_reason = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Failed'
            RETURNING *;
        "#,
    )
    .bind(payout_id)
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

/// Cancels the payout if its current status is one of `cancellable_from`. The caller decides
/// that set (vendors may only cancel `Pending`, admins also `Processing`).
pub async fn cancel_payout(
    payout_id: i64,
    cancellable_from: &[PayoutStatusType],
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let statuses = cancellable_from.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
    let q = format!(
        "UPDATE payouts SET status = 'Cancelled', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND status IN \
         ({statuses}) RETURNING *;"
    );
    let payout = sqlx::query_as(&q).bind(payout_id).fetch_optional(conn).await?;
    Ok(payout)
}

/// Applies a provider-reported status, guarded on the expected current status so a stale
/// report cannot clobber a newer state.
pub async fn reconcile_payout(
    payout_id: i64,
    from: PayoutStatusType,
    to: PayoutStatusType,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET
                status = $2,
                failure_reason = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(payout_id)
    .bind(to.to_string())
    .bind(reason)
    .bind(from.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}
