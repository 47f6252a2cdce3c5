use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soko_common::Cents;

/// Every Paystack response wraps its payload in the same envelope. `status` is `false` when the
/// request was understood but refused (bad recipient, insufficient balance on the Paystack
/// account, and so on), with the reason in `message`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: bool,
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bank {
    pub name: String,
    pub code: String,
    pub currency: String,
    pub country: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolvedAccount {
    pub account_number: String,
    pub account_name: String,
}

/// Body for `POST /transferrecipient`. `recipient_type` is `nuban` for Nigerian bank accounts and
/// `mobile_money` for wallet destinations.
#[derive(Debug, Clone, Serialize)]
pub struct NewTransferRecipient {
    #[serde(rename = "type")]
    pub recipient_type: String,
    pub name: String,
    pub account_number: String,
    pub bank_code: String,
    pub currency: String,
}

impl NewTransferRecipient {
    pub fn nuban(name: &str, account_number: &str, bank_code: &str, currency: &str) -> Self {
        Self {
            recipient_type: "nuban".to_string(),
            name: name.to_string(),
            account_number: account_number.to_string(),
            bank_code: bank_code.to_string(),
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipientDetails {
    pub account_number: String,
    #[serde(default)]
    pub account_name: Option<String>,
    pub bank_code: String,
    #[serde(default)]
    pub bank_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRecipient {
    pub recipient_code: String,
    pub active: bool,
    pub currency: String,
    pub details: RecipientDetails,
}

/// Body for `POST /transfer`. Amounts are integer kobo, which is exactly what [`Cents`]
/// serializes to.
#[derive(Debug, Clone, Serialize)]
pub struct NewTransfer {
    pub source: String,
    pub amount: Cents,
    pub reference: String,
    pub recipient: String,
    pub reason: String,
}

impl NewTransfer {
    pub fn from_balance(amount: Cents, reference: &str, recipient: &str, reason: &str) -> Self {
        Self {
            source: "balance".to_string(),
            amount,
            reference: reference.to_string(),
            recipient: recipient.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transfer {
    pub amount: Cents,
    pub currency: String,
    pub reference: String,
    /// Paystack's own status string. `pending`/`processing`/`success`/`failed`/`reversed`.
    pub status: String,
    pub transfer_code: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Webhook event as delivered to the `/webhook/paystack` endpoint. Only transfer events are
/// interesting here; everything else is acknowledged and dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferEvent {
    pub event: String,
    pub data: Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEventKind {
    Success,
    Failed,
    Reversed,
}

impl TransferEvent {
    pub fn kind(&self) -> Option<TransferEventKind> {
        match self.event.as_str() {
            "transfer.success" => Some(TransferEventKind::Success),
            "transfer.failed" => Some(TransferEventKind::Failed),
            "transfer.reversed" => Some(TransferEventKind::Reversed),
            _ => None,
        }
    }
}
