use chrono::Duration;
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{ItemStatusType, NewOrder, NewOrderItem, Order, OrderId, OrderItem, OrderStatusType},
    order_objects::OrderQueryFilter,
    traits::OrderFlowError,
};

/// Inserts a new order row using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// The line items are inserted separately with [`insert_order_item`].
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let order_id = order.order_id.clone();
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (order_id, buyer_id, total_price, currency)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(order.buyer_id)
    .bind(order.total_price())
    .bind(order.currency.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => OrderFlowError::DuplicateOrder(order_id),
        _ => OrderFlowError::from(e),
    })?;
    Ok(order)
}

pub async fn insert_order_item(
    order_id: &OrderId,
    item: &NewOrderItem,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, OrderFlowError> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO order_items (order_id, vendor_id, description, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(item.vendor_id)
    .bind(item.description.as_str())
    .bind(item.quantity)
    .bind(item.unit_price)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// The order's line items, in insertion order.
pub async fn fetch_order_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn fetch_order_item(item_id: i64, conn: &mut SqliteConnection) -> Result<Option<OrderItem>, sqlx::Error> {
    let item = sqlx::query_as("SELECT * FROM order_items WHERE id = $1").bind(item_id).fetch_optional(conn).await?;
    Ok(item)
}

pub async fn fetch_orders_for_buyer(buyer_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(buyer_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

pub async fn fetch_items_for_vendor(
    vendor_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE vendor_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(vendor_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT DISTINCT orders.* FROM orders
    "#,
    );
    if query.vendor_id.is_some() {
        builder.push("JOIN order_items ON order_items.order_id = orders.order_id ");
    }
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("orders.order_id = ");
        where_clause.push_bind_unseparated(order_id.to_string());
    }
    if let Some(buyer_id) = query.buyer_id {
        where_clause.push("buyer_id = ");
        where_clause.push_bind_unseparated(buyer_id);
    }
    if let Some(vendor_id) = query.vendor_id {
        where_clause.push("order_items.vendor_id = ");
        where_clause.push_bind_unseparated(vendor_id);
    }
    if let Some(currency) = query.currency {
        where_clause.push("orders.currency = ");
        where_clause.push_bind_unseparated(currency);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("orders.status IN ({status_clause})"));
    }
    // Stored timestamps mix the space and RFC 3339 separators, so normalise both sides before
    // comparing.
    if let Some(since) = query.since {
        where_clause.push("datetime(orders.created_at) >= datetime(");
        where_clause.push_bind_unseparated(since);
        where_clause.push_unseparated(")");
    }
    if let Some(until) = query.until {
        where_clause.push("datetime(orders.created_at) <= datetime(");
        where_clause.push_bind_unseparated(until);
        where_clause.push_unseparated(")");
    }
    builder.push(" ORDER BY orders.created_at ASC");

    trace!("📦️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("📦️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

pub async fn update_item_status(
    item_id: i64,
    status: ItemStatusType,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, OrderFlowError> {
    let status = status.to_string();
    let result: Option<OrderItem> =
        sqlx::query_as("UPDATE order_items SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(item_id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(OrderFlowError::OrderItemNotFound(item_id))
}

pub async fn update_order_status(
    order_id: &OrderId,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let status = status.to_string();
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 RETURNING *",
    )
    .bind(status)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    result.ok_or(OrderFlowError::OrderNotFound(order_id.clone()))
}

/// Moves the order to `Delivered` and starts the confirmation clock. `delivered_at` is set
/// only the first time an order is delivered.
pub async fn mark_order_delivered(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'Delivered',
                delivered_at = COALESCE(delivered_at, CURRENT_TIMESTAMP),
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    result.ok_or(OrderFlowError::OrderNotFound(order_id.clone()))
}

/// The buyer confirmation step. Only fires on a `Delivered` order; returns `None` if the order
/// has moved on in the meantime.
pub async fn confirm_delivered_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'Completed',
                completed_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'Delivered'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Returns a `Disputed` order to `Completed` once its dispute settles. The original completion
/// time is kept if the order had already been completed before the dispute.
pub async fn release_disputed_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'Completed',
                completed_at = COALESCE(completed_at, CURRENT_TIMESTAMP),
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'Disputed'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Completes every order that has sat in `Delivered` for longer than the grace period and has
/// no open or resolved dispute against it. Completed orders drop out of the `WHERE` clause, so
/// running the sweep twice over the same data is a no-op.
pub async fn sweep_delivered_orders(
    grace_period: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let rows = sqlx::query_as(
        format!(
            "UPDATE orders SET status = 'Completed', completed_at = CURRENT_TIMESTAMP, updated_at = \
             CURRENT_TIMESTAMP WHERE status = 'Delivered' AND delivered_at IS NOT NULL AND \
             (unixepoch(CURRENT_TIMESTAMP) - unixepoch(delivered_at)) > {} AND NOT EXISTS (SELECT 1 FROM disputes \
             WHERE disputes.order_id = orders.order_id AND disputes.status != 'Closed') RETURNING *;",
            grace_period.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
