use std::{fmt::Display, str::FromStr, sync::OnceLock};

use chrono::{DateTime, Duration, Utc};
use log::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use soko_common::Cents;
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::helpers::references::new_order_id;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Conversion error: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        Role        ---------------------------------------------

/// Every user carries exactly one role. Endpoints that accept several roles check membership
/// against the session's role, so there is no hierarchy here. An admin is not implicitly a
/// vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Vendor,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Vendor => write!(f, "vendor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "vendor" => Ok(Self::Vendor),
            "admin" => Ok(Self::Admin),
            s => Err(ConversionError(format!("Invalid role: {s}."))),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|e| {
            error!("{e} Defaulting to Buyer");
            Role::Buyer
        })
    }
}

//--------------------------------------       OrderId      ---------------------------------------------

/// The public identifier of an order, e.g. `ORD-1724580000-a41bc9`. Minted when the order is
/// placed and used in every customer-facing URL and payload. The numeric row id stays internal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Mint a fresh order id.
    pub fn random() -> Self {
        Self(new_order_id())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for OrderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   OrderStatusType  ---------------------------------------------

/// The lifecycle of an order as a whole. The fulfilment phases (`Created` through `Delivered`)
/// are never set directly; they are derived from the statuses of the order's items. The
/// settlement phases (`Completed`, `Disputed`) are set by explicit actions.
///
/// Valid transitions:
/// * any fulfilment phase → a later fulfilment phase (derived from items)
/// * `Delivered` → `Completed` (buyer confirmation, or the auto-completion sweep)
/// * `Delivered` or `Completed` → `Disputed` (dispute raised inside the window)
/// * `Disputed` → `Completed` (dispute resolved or withdrawn)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
pub enum OrderStatusType {
    Created,
    Confirmed,
    OutForDelivery,
    Delivered,
    Disputed,
    Completed,
}

impl OrderStatusType {
    /// The position in the fulfilment pipeline, or `None` for the settlement phases.
    fn fulfilment_rank(&self) -> Option<u8> {
        match self {
            Self::Created => Some(0),
            Self::Confirmed => Some(1),
            Self::OutForDelivery => Some(2),
            Self::Delivered => Some(3),
            Self::Disputed | Self::Completed => None,
        }
    }

    pub fn can_transition_to(&self, next: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.fulfilment_rank(), next.fulfilment_rank()) {
            return b > a;
        }
        matches!(
            (self, next),
            (Self::Delivered, Self::Completed) |
                (Self::Delivered, Self::Disputed) |
                (Self::Completed, Self::Disputed) |
                (Self::Disputed, Self::Completed)
        )
    }

    /// `true` for the statuses a dispute may be raised against.
    pub fn is_disputable(&self) -> bool {
        matches!(self, Self::Delivered | Self::Completed)
    }

    /// Derive the order status from its items. Only covers the fulfilment phases; once an order
    /// is `Delivered` the settlement phases take over.
    pub fn derive_from_items(items: &[ItemStatusType]) -> Self {
        if items.is_empty() {
            return Self::Created;
        }
        if items.iter().all(|s| *s == ItemStatusType::Delivered) {
            return Self::Delivered;
        }
        if items.iter().any(|s| matches!(s, ItemStatusType::Shipped | ItemStatusType::Delivered)) {
            return Self::OutForDelivery;
        }
        if items.iter().all(|s| *s != ItemStatusType::Pending) {
            return Self::Confirmed;
        }
        Self::Created
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::OutForDelivery => write!(f, "OutForDelivery"),
            Self::Delivered => write!(f, "Delivered"),
            Self::Disputed => write!(f, "Disputed"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Confirmed" => Ok(Self::Confirmed),
            "OutForDelivery" => Ok(Self::OutForDelivery),
            "Delivered" => Ok(Self::Delivered),
            "Disputed" => Ok(Self::Disputed),
            "Completed" => Ok(Self::Completed),
            // Alias kept for rows imported from the legacy system.
            "Fulfilled" => Ok(Self::Completed),
            s => Err(ConversionError(format!("Invalid order status: {s}."))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|e| {
            error!("{e} Defaulting to Created");
            OrderStatusType::Created
        })
    }
}

//--------------------------------------   ItemStatusType   ---------------------------------------------

/// The per-vendor slice of an order. Each vendor advances their own items independently, and
/// items only ever move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
pub enum ItemStatusType {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
}

impl ItemStatusType {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Confirmed => 1,
            Self::Shipped => 2,
            Self::Delivered => 3,
        }
    }

    /// Items advance forward only. Skipping a phase is allowed, going back is not.
    pub fn can_advance_to(&self, next: &Self) -> bool {
        next.rank() > self.rank()
    }
}

impl Display for ItemStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::Shipped => write!(f, "Shipped"),
            Self::Delivered => write!(f, "Delivered"),
        }
    }
}

impl FromStr for ItemStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            s => Err(ConversionError(format!("Invalid item status: {s}."))),
        }
    }
}

impl From<String> for ItemStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|e| {
            error!("{e} Defaulting to Pending");
            ItemStatusType::Pending
        })
    }
}

//--------------------------------------       Order        ---------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub buyer_id: i64,
    pub total_price: Cents,
    pub currency: String,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether the buyer confirmation window (or a dispute) is still open for this order at
    /// `now`, given the configured grace period. Only meaningful once `delivered_at` is set.
    pub fn within_window(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.delivered_at {
            Some(delivered) => now.signed_duration_since(delivered) <= window,
            None => false,
        }
    }
}

impl Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Order {} ({}, {} {})", self.order_id, self.status, self.total_price, self.currency)
    }
}

//--------------------------------------      OrderItem     ---------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub vendor_id: i64,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Cents,
    pub status: ItemStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn subtotal(&self) -> Cents {
        self.unit_price * self.quantity
    }
}

/// The result of a vendor advancing one of their items, including the knock-on effect on the
/// order as a whole.
#[derive(Debug, Clone)]
pub struct ItemStatusUpdate {
    pub item: OrderItem,
    pub order: Order,
    /// The item update changed the derived order status.
    pub order_status_changed: bool,
    /// This update was the one that moved the order to `Delivered` and started the
    /// confirmation clock.
    pub order_delivered: bool,
}

//--------------------------------------      NewOrder      ---------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub vendor_id: i64,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Cents,
}

impl NewOrderItem {
    pub fn new<S: Into<String>>(vendor_id: i64, description: S, quantity: i64, unit_price: Cents) -> Self {
        Self { vendor_id, description: description.into(), quantity, unit_price }
    }

    pub fn subtotal(&self) -> Cents {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub buyer_id: i64,
    pub currency: String,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Start a new order for the given buyer. A fresh order id is minted; use
    /// [`with_order_id`](Self::with_order_id) to override it (imports, tests).
    pub fn new(buyer_id: i64) -> Self {
        Self {
            order_id: OrderId::random(),
            buyer_id,
            currency: soko_common::NAIRA_CURRENCY_CODE.to_string(),
            items: Vec::new(),
        }
    }

    pub fn with_order_id<T: Into<OrderId>>(mut self, order_id: T) -> Self {
        self.order_id = order_id.into();
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_item(mut self, item: NewOrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn total_price(&self) -> Cents {
        self.items.iter().map(NewOrderItem::subtotal).sum()
    }

    /// The distinct vendors participating in this order.
    pub fn vendor_count(&self) -> usize {
        let mut vendors = self.items.iter().map(|i| i.vendor_id).collect::<Vec<_>>();
        vendors.sort_unstable();
        vendors.dedup();
        vendors.len()
    }
}

//--------------------------------------  DisputeStatusType ---------------------------------------------

/// Disputes open, get resolved by an admin, or get withdrawn/closed. `Resolved` keeps the
/// thread read-only and still blocks a new dispute on the same order; only `Closed` frees the
/// order up again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
pub enum DisputeStatusType {
    Open,
    Resolved,
    Closed,
}

impl DisputeStatusType {
    pub fn accepts_messages(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// An unsettled or resolved dispute still occupies the order's dispute slot.
    pub fn blocks_new_dispute(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl Display for DisputeStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Resolved => write!(f, "Resolved"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl FromStr for DisputeStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "Resolved" => Ok(Self::Resolved),
            "Closed" => Ok(Self::Closed),
            s => Err(ConversionError(format!("Invalid dispute status: {s}."))),
        }
    }
}

impl From<String> for DisputeStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|e| {
            error!("{e} Defaulting to Open");
            DisputeStatusType::Open
        })
    }
}

//--------------------------------------      Dispute       ---------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct Dispute {
    pub id: i64,
    pub order_id: OrderId,
    /// The disputed line item. Required when the order spans several vendors, optional for
    /// single-vendor orders.
    pub order_item_id: Option<i64>,
    pub raised_by: i64,
    /// The vendor on the other side of the dispute.
    pub vendor_id: i64,
    pub reason: String,
    pub status: DisputeStatusType,
    pub resolution: Option<String>,
    pub resolved_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Whether the given user may read this dispute and post to its thread.
    pub fn is_party(&self, user_id: i64, role: Role) -> bool {
        role == Role::Admin || self.raised_by == user_id || self.vendor_id == user_id
    }
}

impl Display for Dispute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dispute #{} on order {} ({})", self.id, self.order_id, self.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDispute {
    pub order_id: OrderId,
    pub order_item_id: Option<i64>,
    pub reason: String,
}

impl NewDispute {
    pub fn new<T: Into<OrderId>, S: Into<String>>(order_id: T, reason: S) -> Self {
        Self { order_id: order_id.into(), order_item_id: None, reason: reason.into() }
    }

    pub fn with_item(mut self, order_item_id: i64) -> Self {
        self.order_item_id = Some(order_item_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct DisputeMessage {
    pub id: i64,
    pub dispute_id: i64,
    pub author_id: i64,
    pub author_role: Role,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  PayoutStatusType  ---------------------------------------------

/// The lifecycle of a withdrawal. `Pending` rows have been accepted locally but not handed to
/// the transfer provider yet; `Processing` rows are in flight at the provider.
///
/// Valid transitions:
/// * `Pending` → `Processing` (provider accepted) | `Failed` (provider rejected) | `Cancelled`
/// * `Processing` → `Completed` | `Failed` | `Reversed` (webhook / poll) | `Cancelled` (admin)
/// * `Failed` → `Pending` (admin retry, which mints a fresh reference)
/// * `Completed` → `Reversed` (late reversal reported by the provider)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
pub enum PayoutStatusType {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
    Cancelled,
}

impl PayoutStatusType {
    /// No further user or admin action applies in these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Reversed)
    }

    /// Statuses that count against the vendor's available balance. Failed, reversed and
    /// cancelled payouts release their funds.
    pub fn deducts_from_balance(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Completed)
    }

    pub fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing) |
                (Self::Pending, Self::Failed) |
                (Self::Pending, Self::Cancelled) |
                (Self::Processing, Self::Completed) |
                (Self::Processing, Self::Failed) |
                (Self::Processing, Self::Reversed) |
                (Self::Processing, Self::Cancelled) |
                (Self::Failed, Self::Pending) |
                (Self::Completed, Self::Reversed)
        )
    }
}

impl Display for PayoutStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Processing => write!(f, "Processing"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Reversed => write!(f, "Reversed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for PayoutStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Reversed" => Ok(Self::Reversed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid payout status: {s}."))),
        }
    }
}

impl From<String> for PayoutStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|e| {
            error!("{e} Defaulting to Pending");
            PayoutStatusType::Pending
        })
    }
}

//--------------------------------------       Payout       ---------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct Payout {
    pub id: i64,
    pub vendor_id: i64,
    pub bank_account_id: i64,
    pub amount: Cents,
    /// Our idempotency reference for the current attempt, e.g. `PYT-1724580000-9f2ab310`.
    /// Every retry mints a new one; prior references live in `payout_attempts`.
    pub reference: String,
    /// Provider recipient the funds go to, snapshotted at request time.
    pub recipient_code: String,
    /// Provider-side identifier, set once the transfer is accepted.
    pub transfer_code: Option<String>,
    pub status: PayoutStatusType,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Display for Payout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payout #{} ({}) of {} for vendor {}", self.id, self.status, self.amount, self.vendor_id)
    }
}

/// One provider handoff for a payout. The first attempt is recorded when the payout is
/// created; each admin retry appends another row. References are unique across all attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct PayoutAttempt {
    pub id: i64,
    pub payout_id: i64,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     BankAccount    ---------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct BankAccount {
    pub id: i64,
    pub vendor_id: i64,
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    /// The account holder name reported by the provider when the account was resolved.
    pub account_name: String,
    /// Provider transfer-recipient handle. Payouts cannot be sent to an account without one.
    pub recipient_code: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBankAccount {
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub recipient_code: Option<String>,
    pub make_primary: bool,
}

fn nuban_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{10}$").expect("nuban regex is valid"))
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?\d{7,15}$").expect("phone regex is valid"))
}

impl NewBankAccount {
    pub fn new<S1, S2, S3, S4>(bank_code: S1, bank_name: S2, account_number: S3, account_name: S4) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        Self {
            bank_code: bank_code.into(),
            bank_name: bank_name.into(),
            account_number: account_number.into(),
            account_name: account_name.into(),
            recipient_code: None,
            make_primary: false,
        }
    }

    pub fn with_recipient_code<S: Into<String>>(mut self, code: S) -> Self {
        self.recipient_code = Some(code.into());
        self
    }

    pub fn as_primary(mut self) -> Self {
        self.make_primary = true;
        self
    }

    /// NUBAN account numbers are exactly ten digits.
    pub fn is_valid_account_number(account_number: &str) -> bool {
        nuban_regex().is_match(account_number)
    }
}

/// Loose E.164 check for the phone numbers we send OTPs to.
pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone)
}

//--------------------------------------        User        ---------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub phone: Option<String>,
    /// Set after the user completes a phone-verification OTP. Vendors cannot request payouts
    /// until this is true.
    pub phone_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    /// Argon2 PHC string. Hashing happens in [`crate::helpers::passwords`]; the storage layer
    /// never sees a plaintext password.
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
}

impl NewUser {
    pub fn new<S1, S2, S3>(email: S1, display_name: S2, password_hash: S3, role: Role) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            email: email.into(),
            display_name: display_name.into(),
            password_hash: password_hash.into(),
            role,
            phone: None,
        }
    }

    pub fn with_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// The authenticated identity attached to a request once its session cookie checks out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct SessionUser {
    pub user_id: i64,
    pub role: Role,
    pub display_name: String,
    pub email: String,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl Display for SessionUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, id {})", self.display_name, self.role, self.user_id)
    }
}

//--------------------------------------    OtpChallenge    ---------------------------------------------

/// What a one-time code is allowed to unlock. The purpose is bound into the code's HMAC, so a
/// code issued for one purpose can never verify for another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
pub enum OtpPurpose {
    /// Gate for changing where payouts go (managing bank accounts). Successful verification
    /// mints a short-lived action token.
    PayoutDestination,
    /// First-time phone verification. Successful verification flips `users.phone_verified`.
    VerifyPhone,
}

impl Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PayoutDestination => write!(f, "PayoutDestination"),
            Self::VerifyPhone => write!(f, "VerifyPhone"),
        }
    }
}

impl FromStr for OtpPurpose {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PayoutDestination" => Ok(Self::PayoutDestination),
            "VerifyPhone" => Ok(Self::VerifyPhone),
            s => Err(ConversionError(format!("Invalid OTP purpose: {s}."))),
        }
    }
}

/// A single issued code. Only the keyed hash of the code is stored; the plaintext code exists
/// in memory just long enough to be handed to the delivery hook.
#[derive(Debug, Clone, FromRow)]
pub struct OtpChallenge {
    pub id: i64,
    pub user_id: i64,
    pub purpose: OtpPurpose,
    pub otp_hash: String,
    pub attempts: i64,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OtpChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

//--------------------------------------    ActionToken     ---------------------------------------------

/// A single-use bearer token minted by a successful OTP verification. Stored hashed, consumed
/// atomically on first use.
#[derive(Debug, Clone, FromRow)]
pub struct ActionTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub purpose: OtpPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    Notification    ---------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    /// Machine-readable kind, e.g. `order_delivered` or `payout_failed`.
    pub event: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: i64,
    pub event: String,
    pub body: String,
}

impl NewNotification {
    pub fn new<S1: Into<String>, S2: Into<String>>(user_id: i64, event: S1, body: S2) -> Self {
        Self { user_id, event: event.into(), body: body.into() }
    }
}

//--------------------------------------     AuditEntry     ---------------------------------------------

/// Append-only record of privileged and automatic state changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    /// The acting user, or `None` for system actions such as the auto-completion sweep.
    pub actor_id: Option<i64>,
    pub action: String,
    /// JSON blob with action-specific context.
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Audit action names. Kept as constants so the log can be filtered reliably.
pub mod audit {
    pub const ORDER_AUTO_COMPLETED: &str = "order_auto_completed";
    pub const ORDER_COMPLETED: &str = "order_completed";
    pub const DISPUTE_OPENED: &str = "dispute_opened";
    pub const DISPUTE_RESOLVED: &str = "dispute_resolved";
    pub const DISPUTE_CLOSED: &str = "dispute_closed";
    pub const PAYOUT_REQUESTED: &str = "payout_requested";
    pub const PAYOUT_RETRIED: &str = "payout_retried";
    pub const PAYOUT_CANCELLED: &str = "payout_cancelled";
    pub const PAYOUT_RECONCILED: &str = "payout_reconciled";
}
