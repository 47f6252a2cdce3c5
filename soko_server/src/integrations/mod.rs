pub mod notifier;
pub mod paystack;

pub use notifier::Notifier;
pub use paystack::PaystackGateway;
