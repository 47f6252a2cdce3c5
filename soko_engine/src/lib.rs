//! # Soko payment engine
//!
//! The engine owns every piece of marketplace state that involves money: orders and their
//! per-vendor line items, disputes, vendor balances, payout requests and the audit trail they
//! leave behind. It exposes that state through a set of storage traits ([`traits`]) with a
//! SQLite implementation ([`SqliteDatabase`]), and through higher-level API objects
//! ([`se_api`]) that enforce the business rules:
//!
//! * Order items advance forward only, and the order status is always derived from its items.
//! * A buyer's funds only become available to vendors once an order is `Completed`, either by
//!   explicit confirmation or by the auto-completion sweep after the grace period.
//! * Disputes freeze settlement for the order they cover until an admin resolves them or the
//!   raiser withdraws.
//! * A payout can never exceed the vendor's available balance, no matter how many requests
//!   race each other.
//!
//! Side effects (notifications, OTP delivery) are not performed here. The engine fires
//! [`events`] and the embedding server decides what to do with them.

pub mod db_types;

pub mod events;

#[cfg(feature = "sqlite")]
mod sqlite;

pub mod helpers;

pub mod se_api;

pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use se_api::{
    account_api::AccountApi,
    auth_api::AuthApi,
    dispute_api::DisputeApi,
    dispute_objects,
    order_flow_api::OrderFlowApi,
    order_objects,
    payout_api::PayoutApi,
    payout_objects,
};
