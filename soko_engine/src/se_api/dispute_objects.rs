use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Dispute, DisputeMessage, DisputeStatusType, OrderId};

/// A dispute with its message thread, as the detail endpoint returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeThread {
    pub dispute: Dispute,
    pub messages: Vec<DisputeMessage>,
}

impl DisputeThread {
    pub fn new(dispute: Dispute, messages: Vec<DisputeMessage>) -> Self {
        Self { dispute, messages }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisputeQueryFilter {
    pub order_id: Option<OrderId>,
    pub raised_by: Option<i64>,
    pub vendor_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<DisputeStatusType>>,
}

impl DisputeQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_raised_by(mut self, raised_by: i64) -> Self {
        self.raised_by = Some(raised_by);
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: i64) -> Self {
        self.vendor_id = Some(vendor_id);
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

    pub fn with_status(mut self, status: DisputeStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.raised_by.is_none() &&
            self.vendor_id.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.status.is_none()
    }
}

impl Display for DisputeQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        if let Some(raised_by) = &self.raised_by {
            write!(f, "raised_by: {raised_by}. ")?;
        }
        if let Some(vendor_id) = &self.vendor_id {
            write!(f, "vendor_id: {vendor_id}. ")?;
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
