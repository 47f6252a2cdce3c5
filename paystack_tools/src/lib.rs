mod api;
mod config;
mod error;

mod data_objects;

pub use api::PaystackApi;
pub use config::PaystackConfig;
pub use data_objects::{
    Bank,
    NewTransfer,
    NewTransferRecipient,
    RecipientDetails,
    ResolvedAccount,
    Transfer,
    TransferEvent,
    TransferEventKind,
    TransferRecipient,
};
pub use error::PaystackApiError;
