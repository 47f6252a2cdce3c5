//! Fire-and-forget events emitted by the API objects.
//!
//! The engine never sends an SMS or writes a notification row on its own. Instead, each
//! state change that the outside world might care about (an order arriving, a dispute
//! opening, a payout changing status, a one-time code needing delivery) is published to the
//! hooks the embedding server registered at startup. Handlers run on their own tasks, so a
//! slow notifier never blocks a request.

mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
