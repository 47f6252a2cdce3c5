use std::fmt::Debug;

use chrono::Duration;
use futures_util::future::join_all;
use log::*;

use crate::{
    db_types::{ItemStatusType, ItemStatusUpdate, NewOrder, Order, OrderId, OrderItem, Role, SessionUser},
    events::{EventProducers, OrderDeliveredEvent},
    order_objects::{OrderQueryFilter, OrderResult},
    traits::{OrderFlowError, OrderManagement, SweepResult},
};

/// `OrderFlowApi` drives the order lifecycle: placing orders, vendors advancing their items,
/// buyers confirming receipt, and the auto-completion sweep that confirms on their behalf
/// after the grace period.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Record a new order for `buyer_id`. The order must carry at least one item, and every
    /// item needs a positive quantity and a non-negative price. Items start `Pending` and the
    /// order starts `Created`.
    pub async fn place_order(&self, buyer_id: i64, mut order: NewOrder) -> Result<(Order, Vec<OrderItem>), OrderFlowError> {
        order.buyer_id = buyer_id;
        if order.items.is_empty() {
            return Err(OrderFlowError::EmptyOrder);
        }
        if order.items.iter().any(|i| i.quantity <= 0 || i.unit_price.value() < 0) {
            return Err(OrderFlowError::InvalidItem);
        }
        let (order, items) = self.db.insert_order(order).await?;
        debug!("📦️ Order [{}] placed for buyer #{buyer_id} with {} item(s), total {}", order.order_id, items.len(), order.total_price);
        Ok((order, items))
    }

    /// Fetch an order for the given user, enforcing visibility: buyers see their own orders,
    /// vendors see orders they supply (with the item list narrowed to their items), admins
    /// see everything.
    pub async fn order_for_user(&self, order_id: &OrderId, user: &SessionUser) -> Result<OrderResult, OrderFlowError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let items = self.db.fetch_order_items(order_id).await?;
        match user.role {
            Role::Admin => Ok(OrderResult::new(order, items)),
            Role::Buyer if order.buyer_id == user.user_id => Ok(OrderResult::new(order, items)),
            Role::Vendor if items.iter().any(|i| i.vendor_id == user.user_id) => {
                let mine = items.into_iter().filter(|i| i.vendor_id == user.user_id).collect();
                Ok(OrderResult::new(order, mine))
            },
            _ => Err(OrderFlowError::NotYourOrder),
        }
    }

    pub async fn orders_for_buyer(&self, buyer_id: i64) -> Result<Vec<Order>, OrderFlowError> {
        self.db.fetch_orders_for_buyer(buyer_id).await
    }

    pub async fn items_for_vendor(&self, vendor_id: i64) -> Result<Vec<OrderItem>, OrderFlowError> {
        self.db.fetch_items_for_vendor(vendor_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        trace!("📦️ Searching orders. {query}");
        self.db.search_orders(query).await
    }

    /// A vendor advances one of their items. When this update delivers the last outstanding
    /// item the order becomes `Delivered`, the confirmation clock starts, and the
    /// order-delivered hook fires.
    pub async fn update_item_status(
        &self,
        vendor_id: i64,
        item_id: i64,
        status: ItemStatusType,
    ) -> Result<ItemStatusUpdate, OrderFlowError> {
        let update = self.db.update_item_status(item_id, vendor_id, status).await?;
        debug!(
            "📦️ Item #{item_id} on order [{}] moved to {status} by vendor #{vendor_id} (order is {})",
            update.order.order_id, update.order.status
        );
        if update.order_delivered {
            self.call_order_delivered_hook(&update.order).await;
        }
        Ok(update)
    }

    /// The buyer confirms receipt, completing the order and releasing its funds to the
    /// vendors.
    pub async fn confirm_receipt(&self, buyer_id: i64, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.complete_order(order_id, buyer_id).await?;
        info!("📦️ Order [{order_id}] confirmed received by buyer #{buyer_id}");
        Ok(order)
    }

    /// Complete every order delivered more than `grace_period` ago that has no live dispute.
    /// Safe to call from a timer; a rerun over swept data is a no-op.
    pub async fn auto_complete_orders(&self, grace_period: Duration) -> Result<SweepResult, OrderFlowError> {
        let result = self.db.auto_complete_orders(grace_period).await?;
        if result.is_empty() {
            trace!("📦️ Auto-completion sweep found nothing to do");
        } else {
            let ids = result.order_ids().iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
            info!("📦️ Auto-completed {} order(s): {ids}", result.count());
        }
        Ok(result)
    }

    async fn call_order_delivered_hook(&self, order: &Order) {
        debug!("📦️ Notifying order delivered hook subscribers for [{}]", order.order_id);
        let jobs = self
            .producers
            .order_delivered_producer
            .iter()
            .map(|emitter| emitter.publish_event(OrderDeliveredEvent::new(order.clone())));
        join_all(jobs).await;
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
