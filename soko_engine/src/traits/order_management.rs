use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{ItemStatusType, ItemStatusUpdate, NewOrder, Order, OrderId, OrderItem},
    order_objects::OrderQueryFilter,
    traits::SweepResult,
};

/// Storage contract for the order lifecycle.
///
/// Implementations must enforce the status rules themselves (items move forward only, the
/// order status is derived from its items) rather than trusting callers, since several API
/// objects share one backend.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// The URL of the database backing this instance.
    fn url(&self) -> &str;

    /// Persist a new order and its line items in a single transaction.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, Vec<OrderItem>), OrderFlowError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, OrderFlowError>;

    async fn fetch_orders_for_buyer(&self, buyer_id: i64) -> Result<Vec<Order>, OrderFlowError>;

    /// Every line item assigned to the given vendor, newest first.
    async fn fetch_items_for_vendor(&self, vendor_id: i64) -> Result<Vec<OrderItem>, OrderFlowError>;

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    /// Advance one of `vendor_id`'s items to `status` and re-derive the order status. When the
    /// update completes the last outstanding delivery, `delivered_at` is set (once) and the
    /// result flags the order as freshly delivered.
    async fn update_item_status(
        &self,
        item_id: i64,
        vendor_id: i64,
        status: ItemStatusType,
    ) -> Result<ItemStatusUpdate, OrderFlowError>;

    /// The buyer confirms receipt of a delivered order, releasing its funds to the vendors.
    async fn complete_order(&self, order_id: &OrderId, buyer_id: i64) -> Result<Order, OrderFlowError>;

    /// Complete every order that has sat in `Delivered` for longer than `grace_period` with no
    /// active dispute. Runs as a single transaction and writes one audit row per order, so a
    /// second sweep over the same data completes nothing.
    async fn auto_complete_orders(&self, grace_period: Duration) -> Result<SweepResult, OrderFlowError>;
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Order item {0} not found")]
    OrderItemNotFound(i64),
    #[error("An order with id {0} already exists")]
    DuplicateOrder(OrderId),
    #[error("Orders must contain at least one item")]
    EmptyOrder,
    #[error("Order items need a positive quantity and a non-negative unit price")]
    InvalidItem,
    #[error("Invalid status change. {0}")]
    InvalidStatusChange(String),
    #[error("This order belongs to another user")]
    NotYourOrder,
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
