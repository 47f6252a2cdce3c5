mod cents;
pub mod helpers;
pub mod op;
mod secret;

pub use cents::{Cents, CentsConversionError, NAIRA_CURRENCY_CODE, NAIRA_CURRENCY_CODE_LOWER};
pub use secret::Secret;
