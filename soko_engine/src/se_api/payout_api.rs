use std::fmt::Debug;

use futures_util::future::{join_all, try_join3};
use log::*;
use soko_common::Cents;

use crate::{
    db_types::{Payout, PayoutStatusType, SessionUser},
    events::{EventProducers, PayoutUpdatedEvent},
    payout_objects::{BalanceSummary, PayoutDetail, PayoutOverview, PayoutQueryFilter},
    traits::{
        AccountManagement,
        PayoutError,
        PayoutManagement,
        TransferGateway,
        TransferGatewayError,
        TransferInstruction,
    },
};

/// How many payouts the overview endpoint includes.
const OVERVIEW_PAYOUT_COUNT: i64 = 10;

/// `PayoutApi` turns vendor balances into bank transfers.
///
/// The storage backend guarantees the money invariants (atomic balance check, transition
/// table); this API adds the conversation with the transfer provider and publishes payout
/// events for notification hooks. Provider rejections are not errors here: the payout comes
/// back `Failed` with the reason attached, ready for an admin retry.
pub struct PayoutApi<B, G> {
    db: B,
    gateway: G,
    fee_basis_points: i64,
    producers: EventProducers,
}

impl<B, G> Debug for PayoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutApi")
    }
}

impl<B, G> PayoutApi<B, G> {
    pub fn new(db: B, gateway: G, fee_basis_points: i64, producers: EventProducers) -> Self {
        Self { db, gateway, fee_basis_points, producers }
    }

    pub fn fee_basis_points(&self) -> i64 {
        self.fee_basis_points
    }
}

impl<B, G> PayoutApi<B, G>
where
    B: PayoutManagement + AccountManagement,
    G: TransferGateway,
{
    pub async fn balance(&self, vendor_id: i64) -> Result<BalanceSummary, PayoutError> {
        self.db.vendor_balance(vendor_id, self.fee_basis_points).await
    }

    /// Balance, payout destination and recent payouts in one round trip, for the vendor
    /// dashboard.
    pub async fn overview(&self, vendor_id: i64) -> Result<PayoutOverview, PayoutError> {
        let balance = self.db.vendor_balance(vendor_id, self.fee_basis_points);
        let destination = async { self.db.fetch_primary_bank_account(vendor_id).await.map_err(PayoutError::from) };
        let recent = self
            .db
            .search_payouts(PayoutQueryFilter::default().with_vendor_id(vendor_id).with_limit(OVERVIEW_PAYOUT_COUNT));
        let (balance, payout_destination, recent_payouts) = try_join3(balance, destination, recent).await?;
        Ok(PayoutOverview { balance, payout_destination, recent_payouts })
    }

    /// A vendor asks for money. The storage layer performs the balance check and records the
    /// payout atomically; then the transfer goes to the provider. The returned payout is
    /// `Processing` if the provider accepted it and `Failed` (with the reason) if it did not.
    pub async fn request_withdrawal(&self, vendor_id: i64, amount: Cents) -> Result<Payout, PayoutError> {
        let payout = self.db.create_payout(vendor_id, amount, self.fee_basis_points).await?;
        info!("💸️ Payout #{} ({}) accepted for vendor #{vendor_id}, handing to provider", payout.id, payout.amount);
        let payout = self.submit_to_provider(payout).await?;
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    /// Admin retry of a failed payout: re-queue it under a fresh reference and hand it to the
    /// provider again.
    pub async fn retry_payout(&self, admin: &SessionUser, payout_id: i64) -> Result<Payout, PayoutError> {
        let payout = self.db.begin_payout_retry(payout_id, admin.user_id).await?;
        info!("💸️ Payout #{payout_id} re-queued as {} by admin #{}", payout.reference, admin.user_id);
        let payout = self.submit_to_provider(payout).await?;
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    /// Cancel a payout. Vendors may cancel their own `Pending` payouts; admins may also pull
    /// back `Processing` ones.
    pub async fn cancel_payout(&self, actor: &SessionUser, payout_id: i64) -> Result<Payout, PayoutError> {
        let payout = self.db.cancel_payout(payout_id, actor).await?;
        info!("💸️ Payout #{payout_id} cancelled by {}", actor.user_id);
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    /// A payout with its attempt history, with ownership enforced for non-admins.
    pub async fn payout_for_user(&self, payout_id: i64, user: &SessionUser) -> Result<PayoutDetail, PayoutError> {
        let payout = self.db.fetch_payout(payout_id).await?.ok_or(PayoutError::PayoutNotFound(payout_id))?;
        if !user.is_admin() && payout.vendor_id != user.user_id {
            return Err(PayoutError::NotYourPayout(payout_id));
        }
        let attempts = self.db.fetch_payout_attempts(payout_id).await?;
        Ok(PayoutDetail { payout, attempts })
    }

    pub async fn payouts_for_vendor(&self, vendor_id: i64) -> Result<Vec<Payout>, PayoutError> {
        self.db.search_payouts(PayoutQueryFilter::default().with_vendor_id(vendor_id)).await
    }

    pub async fn search_payouts(&self, query: PayoutQueryFilter) -> Result<Vec<Payout>, PayoutError> {
        trace!("💸️ Searching payouts. {query}");
        self.db.search_payouts(query).await
    }

    /// Apply a provider webhook report. The reference may belong to a superseded attempt; the
    /// lookup covers those too.
    pub async fn apply_provider_report(
        &self,
        reference: &str,
        status: PayoutStatusType,
        reason: Option<String>,
    ) -> Result<Payout, PayoutError> {
        let payout = self.db.reconcile_payout(reference, status, reason).await?;
        info!("💸️ Provider report for {reference}: payout #{} is now {}", payout.id, payout.status);
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    /// Ask the provider for the current status of an in-flight payout and reconcile any
    /// difference. Used by the admin poll endpoint when a webhook goes missing.
    pub async fn sync_with_provider(&self, payout_id: i64) -> Result<Payout, PayoutError> {
        let payout = self.db.fetch_payout(payout_id).await?.ok_or(PayoutError::PayoutNotFound(payout_id))?;
        if payout.status.is_terminal() {
            return Ok(payout);
        }
        let remote = self.gateway.verify_transfer(&payout.reference).await.map_err(|e| match e {
            TransferGatewayError::Rejected(detail) | TransferGatewayError::Unavailable(detail) => {
                PayoutError::ProviderUnavailable(detail)
            },
        })?;
        let next = remote.as_payout_status();
        if next == payout.status {
            debug!("💸️ Payout #{payout_id} unchanged at the provider ({next})");
            return Ok(payout);
        }
        let payout = self.db.reconcile_payout(&payout.reference, next, None).await?;
        info!("💸️ Poll moved payout #{payout_id} to {}", payout.status);
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    async fn submit_to_provider(&self, payout: Payout) -> Result<Payout, PayoutError> {
        let instruction = TransferInstruction::new(
            payout.amount,
            payout.reference.as_str(),
            payout.recipient_code.as_str(),
            format!("Soko payout {}", payout.reference),
        );
        match self.gateway.initiate_transfer(&instruction).await {
            Ok(ack) => {
                debug!("💸️ Provider accepted payout #{} as {}", payout.id, ack.transfer_code);
                self.db.mark_payout_submitted(payout.id, &ack.transfer_code).await
            },
            Err(e) => {
                warn!("💸️ Provider turned down payout #{}: {e}", payout.id);
                self.db.mark_payout_failed(payout.id, &e.to_string()).await
            },
        }
    }

    async fn call_payout_updated_hook(&self, payout: &Payout) {
        let jobs = self
            .producers
            .payout_updated_producer
            .iter()
            .map(|emitter| emitter.publish_event(PayoutUpdatedEvent::new(payout.clone())));
        join_all(jobs).await;
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}
