use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{Dispute, DisputeMessage, NewDispute, Order, OrderId, OrderStatusType, SessionUser},
    dispute_objects::DisputeQueryFilter,
};

/// Storage contract for disputes and their message threads.
///
/// Opening a dispute moves the order to `Disputed` in the same transaction, which freezes the
/// order's funds out of every vendor balance until the dispute is settled. Settling (resolve
/// or close) moves the order back to `Completed`.
#[allow(async_fn_in_trait)]
pub trait DisputeManagement: Clone {
    /// Open a dispute on one of the buyer's orders. `window` is how long after delivery a
    /// dispute may still be raised. Returns the dispute along with the order, which is now
    /// `Disputed`.
    async fn create_dispute(
        &self,
        raised_by: i64,
        dispute: NewDispute,
        window: Duration,
    ) -> Result<(Dispute, Order), DisputeError>;

    async fn fetch_dispute(&self, dispute_id: i64) -> Result<Option<Dispute>, DisputeError>;

    async fn search_disputes(&self, query: DisputeQueryFilter) -> Result<Vec<Dispute>, DisputeError>;

    async fn fetch_dispute_messages(&self, dispute_id: i64) -> Result<Vec<DisputeMessage>, DisputeError>;

    /// Append a message to an open dispute. Only the buyer who raised it, the vendor on the
    /// other side, or an admin may post.
    async fn add_dispute_message(&self, dispute_id: i64, author: &SessionUser, body: String) -> Result<DisputeMessage, DisputeError>;

    /// Admin verdict. Records the resolution text, marks the dispute `Resolved` and returns
    /// the order to `Completed`.
    async fn resolve_dispute(&self, dispute_id: i64, admin_id: i64, resolution: String) -> Result<Dispute, DisputeError>;

    /// Close the dispute without a verdict (the raiser withdrawing it, or an admin tidying
    /// up). Also returns the order to `Completed`.
    async fn close_dispute(&self, dispute_id: i64, actor: &SessionUser) -> Result<Dispute, DisputeError>;
}

#[derive(Debug, Clone, Error)]
pub enum DisputeError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Dispute {0} not found")]
    DisputeNotFound(i64),
    #[error("Order {order_id} cannot be disputed while it is {status}")]
    OrderNotDisputable { order_id: OrderId, status: OrderStatusType },
    #[error("The dispute window for order {0} has closed")]
    WindowClosed(OrderId),
    #[error("Order {0} already has an unresolved dispute")]
    AlreadyDisputed(OrderId),
    #[error("This order contains items from several vendors. Identify the line item you are disputing")]
    ItemRequired,
    #[error("Item {item_id} does not belong to order {order_id}")]
    ItemNotInOrder { item_id: i64, order_id: OrderId },
    #[error("Only the buyer who placed the order can dispute it")]
    NotYourOrder,
    #[error("You are not a party to this dispute")]
    NotAParty,
    #[error("Dispute {0} is no longer accepting messages")]
    ThreadClosed(i64),
    #[error("Dispute {0} has already been settled")]
    AlreadySettled(i64),
    #[error("Give a reason for the dispute")]
    EmptyReason,
    #[error("Messages cannot be empty")]
    EmptyMessage,
}

impl From<sqlx::Error> for DisputeError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
