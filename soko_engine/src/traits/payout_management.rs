use soko_common::Cents;
use thiserror::Error;

use crate::{
    db_types::{Payout, PayoutAttempt, PayoutStatusType, SessionUser},
    payout_objects::{BalanceSummary, PayoutQueryFilter},
    traits::AccountError,
};

/// Storage contract for vendor balances and payouts.
///
/// The critical guarantee lives in [`create_payout`](PayoutManagement::create_payout): the
/// balance check and the payout insert happen atomically, so two racing withdrawal requests
/// can never jointly overdraw a vendor's balance.
#[allow(async_fn_in_trait)]
pub trait PayoutManagement: Clone {
    /// The vendor's balance, broken down into gross completed sales, the platform fee,
    /// amounts already paid out, amounts tied up in live payouts, and what is left.
    async fn vendor_balance(&self, vendor_id: i64, fee_basis_points: i64) -> Result<BalanceSummary, PayoutError>;

    /// Record a withdrawal request in `Pending`, deducting it from the available balance in
    /// the same breath. Fails if the vendor's phone is unverified, if no primary bank account
    /// with a provider recipient exists, or if `amount` is non-positive or exceeds the
    /// available balance.
    async fn create_payout(&self, vendor_id: i64, amount: Cents, fee_basis_points: i64) -> Result<Payout, PayoutError>;

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, PayoutError>;

    /// Look a payout up by any reference it has ever carried, including superseded retry
    /// references. Webhooks may arrive for old attempts.
    async fn fetch_payout_by_reference(&self, reference: &str) -> Result<Option<Payout>, PayoutError>;

    async fn search_payouts(&self, query: PayoutQueryFilter) -> Result<Vec<Payout>, PayoutError>;

    async fn fetch_payout_attempts(&self, payout_id: i64) -> Result<Vec<PayoutAttempt>, PayoutError>;

    /// The provider accepted the transfer: `Pending` → `Processing`, recording the provider's
    /// transfer code.
    async fn mark_payout_submitted(&self, payout_id: i64, transfer_code: &str) -> Result<Payout, PayoutError>;

    /// The provider rejected or could not take the transfer: → `Failed` with the reason. The
    /// amount immediately returns to the vendor's available balance.
    async fn mark_payout_failed(&self, payout_id: i64, reason: &str) -> Result<Payout, PayoutError>;

    /// Admin retry of a failed payout. Moves it back to `Pending` under a freshly minted
    /// reference and records the new attempt; the caller then re-submits to the provider.
    async fn begin_payout_retry(&self, payout_id: i64, admin_id: i64) -> Result<Payout, PayoutError>;

    /// Vendors may cancel their own `Pending` payouts; admins may also cancel `Processing`
    /// ones.
    async fn cancel_payout(&self, payout_id: i64, actor: &SessionUser) -> Result<Payout, PayoutError>;

    /// Apply a provider-reported outcome (webhook or poll) to the payout owning `reference`.
    async fn reconcile_payout(&self, reference: &str, status: PayoutStatusType, reason: Option<String>) -> Result<Payout, PayoutError>;
}

#[derive(Debug, Clone, Error)]
pub enum PayoutError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error(transparent)]
    AccountError(#[from] AccountError),
    #[error("Payout {0} not found")]
    PayoutNotFound(i64),
    #[error("No payout with reference {0}")]
    ReferenceNotFound(String),
    #[error("Withdrawal amounts must be positive")]
    InvalidAmount,
    #[error("Requested {requested} but only {available} is available")]
    InsufficientFunds { requested: Cents, available: Cents },
    #[error("Verify your phone number before requesting a payout")]
    PhoneNotVerified,
    #[error("Add a bank account before requesting a payout")]
    NoPayoutDestination,
    #[error("Payout {id} is {status} and cannot move to {next}")]
    InvalidStatusChange { id: i64, status: PayoutStatusType, next: PayoutStatusType },
    #[error("Payout {0} belongs to another vendor")]
    NotYourPayout(i64),
    #[error("The transfer provider could not be reached: {0}")]
    ProviderUnavailable(String),
}

impl From<sqlx::Error> for PayoutError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
