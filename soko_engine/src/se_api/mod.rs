//! The business-rule layer.
//!
//! Each API object owns one slice of the marketplace flow, wraps a storage backend
//! implementing the corresponding [`crate::traits`] contract, and publishes
//! [`crate::events`] for the side effects it wants the embedding server to perform. The
//! `*_objects` modules hold the request, filter and composite result types those APIs speak.

pub mod account_api;
pub mod auth_api;
pub mod dispute_api;
pub mod dispute_objects;
pub mod order_flow_api;
pub mod order_objects;
pub mod payout_api;
pub mod payout_objects;
