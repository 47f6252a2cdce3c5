//! The storage and provider contracts the engine is built against.
//!
//! Each trait covers one slice of the marketplace settlement domain and carries its own error
//! type. [`SqliteDatabase`](crate::SqliteDatabase) implements all of the storage traits;
//! [`TransferGateway`] is implemented by the payment-provider client in the server crate and
//! by stubs in tests.

mod account_management;
mod auth_management;
mod data_objects;
mod dispute_management;
mod order_management;
mod payout_management;
mod transfer_gateway;

pub use account_management::{AccountError, AccountManagement};
pub use auth_management::{AuthApiError, AuthManagement};
pub use data_objects::SweepResult;
pub use dispute_management::{DisputeError, DisputeManagement};
pub use order_management::{OrderFlowError, OrderManagement};
pub use payout_management::{PayoutError, PayoutManagement};
pub use transfer_gateway::{
    BankInfo,
    RemoteTransferStatus,
    ResolvedDestination,
    TransferAck,
    TransferGateway,
    TransferGatewayError,
    TransferInstruction,
};
