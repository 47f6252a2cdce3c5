//! Endpoint tests against mocked storage and a mocked transfer provider.
//!
//! These cover the HTTP layer: session resolution, role checks, webhook signatures, status
//! codes and response bodies. The business rules themselves are tested in the engine crate
//! against a real database.

mod auth;
mod disputes;
mod helpers;
mod mocks;
mod payouts;
