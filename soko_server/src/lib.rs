//! # Soko server
//!
//! The HTTP face of the Soko marketplace settlement engine. It is responsible for:
//! * Authenticating buyers, vendors and admins and handing them session cookies.
//! * Exposing the order, dispute and payout flows as a JSON API.
//! * Receiving transfer status webhooks from Paystack and reconciling payouts.
//! * Delivering one-time codes and in-app notifications via the notifier hooks.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! All routes live in [routes](routes/index.html). Anything under `/api` requires a valid
//! session cookie; role checks are applied per-route by the ACL middleware.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod housekeeping;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
