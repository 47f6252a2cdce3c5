use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soko_common::Cents;
use soko_engine::db_types::{ItemStatusType, NewOrderItem, OrderId, SessionUser};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

/// Checkout payload. The order id is minted server-side.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub currency: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemStatusRequest {
    pub status: ItemStatusType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDisputeRequest {
    pub order_id: OrderId,
    #[serde(default)]
    pub order_item_id: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisputeMessageRequest {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveDisputeRequest {
    pub resolution: String,
}

/// Body for requesting a phone-verification code. A phone number, if supplied, replaces the
/// one on file (and un-verifies it) before the code is issued.
#[derive(Debug, Clone, Deserialize)]
pub struct PhoneRequest {
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpVerifyRequest {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    /// Amount in minor units (kobo).
    pub amount: Cents,
}

/// Body for registering a payout destination. The account name is not taken from the client;
/// it is resolved with the provider before the account is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBankAccountRequest {
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    #[serde(default)]
    pub make_primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditParams {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub completed_count: usize,
    pub order_ids: Vec<OrderId>,
}
