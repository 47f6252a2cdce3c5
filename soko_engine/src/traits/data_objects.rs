use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId};

/// The outcome of one auto-completion sweep.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SweepResult {
    pub completed: Vec<Order>,
}

impl SweepResult {
    pub fn new(completed: Vec<Order>) -> Self {
        Self { completed }
    }

    pub fn count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        self.completed.iter().map(|o| o.order_id.clone()).collect()
    }
}
