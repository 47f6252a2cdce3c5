use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db_types::{Dispute, DisputeMessage, Order, OtpPurpose, Payout};

/// An order's last item was delivered and the buyer's confirmation clock started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeliveredEvent {
    pub order: Order,
}

impl OrderDeliveredEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// A buyer opened a dispute; the order's funds are now frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeOpenedEvent {
    pub dispute: Dispute,
    pub order: Order,
}

impl DisputeOpenedEvent {
    pub fn new(dispute: Dispute, order: Order) -> Self {
        Self { dispute, order }
    }
}

/// Someone posted to a dispute thread. `recipients` are the other parties to notify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeMessageEvent {
    pub dispute: Dispute,
    pub message: DisputeMessage,
    pub recipients: Vec<i64>,
}

impl DisputeMessageEvent {
    pub fn new(dispute: Dispute, message: DisputeMessage, recipients: Vec<i64>) -> Self {
        Self { dispute, message, recipients }
    }
}

/// A dispute was settled, either by an admin verdict or by the raiser withdrawing it. The
/// dispute inside carries the final status and any resolution text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeSettledEvent {
    pub dispute: Dispute,
}

impl DisputeSettledEvent {
    pub fn new(dispute: Dispute) -> Self {
        Self { dispute }
    }
}

/// A payout changed status (submitted, completed, failed, reversed, cancelled or queued for
/// retry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutUpdatedEvent {
    pub payout: Payout,
}

impl PayoutUpdatedEvent {
    pub fn new(payout: Payout) -> Self {
        Self { payout }
    }
}

/// A one-time code needs delivering. This event is the only place the plaintext code leaves
/// the engine; the registered hook is responsible for getting it to the user over SMS or
/// email and for not logging it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpIssuedEvent {
    pub user_id: i64,
    pub purpose: OtpPurpose,
    pub code: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl OtpIssuedEvent {
    pub fn new(user_id: i64, purpose: OtpPurpose, code: String, phone: Option<String>, email: Option<String>) -> Self {
        Self { user_id, purpose, code, phone, email }
    }
}

// Hand-rolled so that a stray `{:?}` in a log line never prints the code.
impl fmt::Debug for OtpIssuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpIssuedEvent")
            .field("user_id", &self.user_id)
            .field("purpose", &self.purpose)
            .field("code", &"******")
            .finish()
    }
}
