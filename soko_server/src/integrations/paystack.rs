//! The [`TransferGateway`] implementation backed by the real Paystack API.
//!
//! The engine only ever talks to the provider through the trait, so this adapter is the one
//! place where Paystack's types and status strings are translated into engine terms.

use log::*;
use paystack_tools::{
    NewTransfer,
    NewTransferRecipient,
    PaystackApi,
    PaystackApiError,
    PaystackConfig,
    TransferEventKind,
};
use soko_common::NAIRA_CURRENCY_CODE;
use soko_engine::{
    db_types::PayoutStatusType,
    traits::{
        BankInfo,
        RemoteTransferStatus,
        ResolvedDestination,
        TransferAck,
        TransferGateway,
        TransferGatewayError,
        TransferInstruction,
    },
};

#[derive(Clone)]
pub struct PaystackGateway {
    api: PaystackApi,
}

impl PaystackGateway {
    pub fn new(config: PaystackConfig) -> Result<Self, PaystackApiError> {
        let api = PaystackApi::new(config)?;
        Ok(Self { api })
    }
}

impl TransferGateway for PaystackGateway {
    async fn list_banks(&self) -> Result<Vec<BankInfo>, TransferGatewayError> {
        let banks = self.api.list_banks("nigeria").await.map_err(into_gateway_error)?;
        Ok(banks.into_iter().map(|b| BankInfo { name: b.name, code: b.code }).collect())
    }

    async fn resolve_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<ResolvedDestination, TransferGatewayError> {
        let resolved = self.api.resolve_account(account_number, bank_code).await.map_err(into_gateway_error)?;
        Ok(ResolvedDestination { account_name: resolved.account_name })
    }

    async fn register_recipient(
        &self,
        account_name: &str,
        bank_code: &str,
        account_number: &str,
    ) -> Result<String, TransferGatewayError> {
        let recipient = NewTransferRecipient::nuban(account_name, account_number, bank_code, NAIRA_CURRENCY_CODE);
        let result = self.api.create_transfer_recipient(recipient).await.map_err(into_gateway_error)?;
        Ok(result.recipient_code)
    }

    async fn initiate_transfer(&self, instruction: &TransferInstruction) -> Result<TransferAck, TransferGatewayError> {
        let transfer = NewTransfer::from_balance(
            instruction.amount,
            &instruction.reference,
            &instruction.recipient_code,
            &instruction.reason,
        );
        let result = self.api.initiate_transfer(transfer).await.map_err(into_gateway_error)?;
        Ok(TransferAck { transfer_code: result.transfer_code, status: remote_status(&result.status) })
    }

    async fn verify_transfer(&self, reference: &str) -> Result<RemoteTransferStatus, TransferGatewayError> {
        let transfer = self.api.fetch_transfer(reference).await.map_err(into_gateway_error)?;
        Ok(remote_status(&transfer.status))
    }
}

/// Paystack's transfer status strings, mapped onto the engine's view of the world. Statuses
/// we do not recognise are treated as still in flight rather than failed; the next webhook
/// or sync settles them.
fn remote_status(status: &str) -> RemoteTransferStatus {
    match status {
        "pending" => RemoteTransferStatus::Pending,
        "success" => RemoteTransferStatus::Success,
        "failed" => RemoteTransferStatus::Failed,
        "reversed" => RemoteTransferStatus::Reversed,
        "processing" | "otp" | "queued" => RemoteTransferStatus::Processing,
        other => {
            warn!("💸️ Unrecognised Paystack transfer status '{other}'. Treating it as still processing.");
            RemoteTransferStatus::Processing
        },
    }
}

/// The payout status a webhook event corresponds to.
pub fn event_payout_status(kind: TransferEventKind) -> PayoutStatusType {
    match kind {
        TransferEventKind::Success => PayoutStatusType::Completed,
        TransferEventKind::Failed => PayoutStatusType::Failed,
        TransferEventKind::Reversed => PayoutStatusType::Reversed,
    }
}

fn into_gateway_error(e: PaystackApiError) -> TransferGatewayError {
    match e {
        PaystackApiError::Rejected(msg) => TransferGatewayError::Rejected(msg),
        PaystackApiError::QueryError { status, message } if (400..500).contains(&status) => {
            TransferGatewayError::Rejected(format!("{status}: {message}"))
        },
        other => TransferGatewayError::Unavailable(other.to_string()),
    }
}
