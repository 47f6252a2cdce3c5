use serde::{Deserialize, Serialize};
use soko_common::Cents;
use thiserror::Error;

use crate::db_types::PayoutStatusType;

/// The payment provider seam. Everything the engine needs from Paystack (or a stand-in during
/// tests) goes through this trait: bank directory lookups, account resolution, recipient
/// registration and the transfers themselves.
#[allow(async_fn_in_trait)]
pub trait TransferGateway: Clone {
    /// Banks that can receive transfers, for populating account forms.
    async fn list_banks(&self) -> Result<Vec<BankInfo>, TransferGatewayError>;

    /// Ask the provider who owns `account_number` at `bank_code`.
    async fn resolve_account(&self, bank_code: &str, account_number: &str) -> Result<ResolvedDestination, TransferGatewayError>;

    /// Register a transfer recipient with the provider, returning its recipient code.
    async fn register_recipient(
        &self,
        account_name: &str,
        bank_code: &str,
        account_number: &str,
    ) -> Result<String, TransferGatewayError>;

    /// Hand a payout to the provider. A clean return means the provider accepted the transfer
    /// for processing, not that the money has moved.
    async fn initiate_transfer(&self, instruction: &TransferInstruction) -> Result<TransferAck, TransferGatewayError>;

    /// Ask the provider for the current status of a transfer by our reference.
    async fn verify_transfer(&self, reference: &str) -> Result<RemoteTransferStatus, TransferGatewayError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub amount: Cents,
    pub reference: String,
    pub recipient_code: String,
    pub reason: String,
}

impl TransferInstruction {
    pub fn new<S1: Into<String>, S2: Into<String>, S3: Into<String>>(
        amount: Cents,
        reference: S1,
        recipient_code: S2,
        reason: S3,
    ) -> Self {
        Self {
            amount,
            reference: reference.into(),
            recipient_code: recipient_code.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAck {
    /// The provider's identifier for the transfer.
    pub transfer_code: String,
    pub status: RemoteTransferStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankInfo {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedDestination {
    pub account_name: String,
}

/// Transfer status as the provider reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteTransferStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Reversed,
}

impl RemoteTransferStatus {
    /// The payout status a provider report corresponds to. In-flight reports map to
    /// `Processing`.
    pub fn as_payout_status(&self) -> PayoutStatusType {
        match self {
            Self::Pending | Self::Processing => PayoutStatusType::Processing,
            Self::Success => PayoutStatusType::Completed,
            Self::Failed => PayoutStatusType::Failed,
            Self::Reversed => PayoutStatusType::Reversed,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransferGatewayError {
    /// The provider understood the request and said no (bad recipient, limits, compliance).
    #[error("The transfer provider rejected the request: {0}")]
    Rejected(String),
    /// The provider could not be reached or returned garbage. Retryable.
    #[error("The transfer provider could not be reached: {0}")]
    Unavailable(String),
}
