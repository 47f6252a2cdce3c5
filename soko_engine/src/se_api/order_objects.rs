use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, OrderItem, OrderStatusType};

/// An order with its line items, as returned by the detail endpoints. Vendors receive only
/// their own items here; buyers and admins receive all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderResult {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self { order, items }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub buyer_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub currency: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_buyer_id(mut self, buyer_id: i64) -> Self {
        self.buyer_id = Some(buyer_id);
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: i64) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.buyer_id.is_none() &&
            self.vendor_id.is_none() &&
            self.currency.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.status.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        if let Some(buyer_id) = &self.buyer_id {
            write!(f, "buyer_id: {buyer_id}. ")?;
        }
        if let Some(vendor_id) = &self.vendor_id {
            write!(f, "vendor_id: {vendor_id}. ")?;
        }
        if let Some(currency) = &self.currency {
            write!(f, "currency: {currency}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}
