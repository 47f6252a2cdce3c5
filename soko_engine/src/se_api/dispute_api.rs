use std::fmt::Debug;

use chrono::Duration;
use futures_util::future::join_all;
use log::*;

use crate::{
    db_types::{Dispute, DisputeMessage, NewDispute, Role, SessionUser},
    dispute_objects::{DisputeQueryFilter, DisputeThread},
    events::{DisputeMessageEvent, DisputeOpenedEvent, DisputeSettledEvent, EventProducers},
    traits::{DisputeError, DisputeManagement},
};

/// `DisputeApi` handles the dispute lifecycle: a buyer raising one (which freezes the
/// order's funds), the parties talking it through, and an admin resolving it or the raiser
/// withdrawing it (which unfreezes the funds).
pub struct DisputeApi<B> {
    db: B,
    window: Duration,
    producers: EventProducers,
}

impl<B> Debug for DisputeApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisputeApi")
    }
}

impl<B> DisputeApi<B> {
    /// `window` is how long after delivery a dispute may still be raised. It matches the
    /// auto-completion grace period in the default configuration.
    pub fn new(db: B, window: Duration, producers: EventProducers) -> Self {
        Self { db, window, producers }
    }

    pub fn dispute_window(&self) -> Duration {
        self.window
    }
}

impl<B> DisputeApi<B>
where B: DisputeManagement
{
    /// Raise a dispute on one of the buyer's orders. The order must be `Delivered` or
    /// `Completed`, inside the window, and free of other unresolved disputes. Multi-vendor
    /// orders need the disputed line item named so the counterparty is unambiguous.
    pub async fn raise_dispute(&self, user: &SessionUser, dispute: NewDispute) -> Result<Dispute, DisputeError> {
        if dispute.reason.trim().is_empty() {
            return Err(DisputeError::EmptyReason);
        }
        let (dispute, order) = self.db.create_dispute(user.user_id, dispute, self.window).await?;
        info!("⚖️ Dispute #{} opened on order [{}] by buyer #{}", dispute.id, dispute.order_id, user.user_id);
        let jobs = self
            .producers
            .dispute_opened_producer
            .iter()
            .map(|emitter| emitter.publish_event(DisputeOpenedEvent::new(dispute.clone(), order.clone())));
        join_all(jobs).await;
        Ok(dispute)
    }

    /// Fetch a dispute and its thread, enforcing that the caller is a party to it.
    pub async fn dispute_for_user(&self, dispute_id: i64, user: &SessionUser) -> Result<DisputeThread, DisputeError> {
        let dispute =
            self.db.fetch_dispute(dispute_id).await?.ok_or(DisputeError::DisputeNotFound(dispute_id))?;
        if !dispute.is_party(user.user_id, user.role) {
            return Err(DisputeError::NotAParty);
        }
        let messages = self.db.fetch_dispute_messages(dispute_id).await?;
        Ok(DisputeThread::new(dispute, messages))
    }

    /// The disputes the user is involved in (raised, or against them as vendor). Admins get
    /// an unfiltered view via [`Self::search_disputes`] instead.
    pub async fn disputes_for_user(&self, user: &SessionUser) -> Result<Vec<Dispute>, DisputeError> {
        let query = match user.role {
            Role::Vendor => DisputeQueryFilter::default().with_vendor_id(user.user_id),
            _ => DisputeQueryFilter::default().with_raised_by(user.user_id),
        };
        self.db.search_disputes(query).await
    }

    pub async fn search_disputes(&self, query: DisputeQueryFilter) -> Result<Vec<Dispute>, DisputeError> {
        trace!("⚖️ Searching disputes. {query}");
        self.db.search_disputes(query).await
    }

    /// Post to an open dispute's thread and notify the other parties.
    pub async fn post_message(&self, dispute_id: i64, user: &SessionUser, body: String) -> Result<DisputeMessage, DisputeError> {
        if body.trim().is_empty() {
            return Err(DisputeError::EmptyMessage);
        }
        let message = self.db.add_dispute_message(dispute_id, user, body).await?;
        let dispute =
            self.db.fetch_dispute(dispute_id).await?.ok_or(DisputeError::DisputeNotFound(dispute_id))?;
        let recipients = dispute_counterparties(&dispute, user.user_id);
        debug!("⚖️ Message posted to dispute #{dispute_id} by {}; notifying {recipients:?}", user.user_id);
        let event = DisputeMessageEvent::new(dispute, message.clone(), recipients);
        let jobs = self.producers.dispute_message_producer.iter().map(|emitter| emitter.publish_event(event.clone()));
        join_all(jobs).await;
        Ok(message)
    }

    /// Admin verdict: record the resolution, mark the dispute `Resolved`, return the order to
    /// `Completed`.
    pub async fn resolve_dispute(&self, admin: &SessionUser, dispute_id: i64, resolution: String) -> Result<Dispute, DisputeError> {
        if resolution.trim().is_empty() {
            return Err(DisputeError::EmptyReason);
        }
        let dispute = self.db.resolve_dispute(dispute_id, admin.user_id, resolution).await?;
        info!("⚖️ Dispute #{dispute_id} resolved by admin #{}", admin.user_id);
        self.call_dispute_settled_hook(&dispute).await;
        Ok(dispute)
    }

    /// Close without a verdict. Storage enforces that only the raiser or an admin may do
    /// this.
    pub async fn close_dispute(&self, user: &SessionUser, dispute_id: i64) -> Result<Dispute, DisputeError> {
        let dispute = self.db.close_dispute(dispute_id, user).await?;
        info!("⚖️ Dispute #{dispute_id} closed by {}", user.user_id);
        self.call_dispute_settled_hook(&dispute).await;
        Ok(dispute)
    }

    async fn call_dispute_settled_hook(&self, dispute: &Dispute) {
        let jobs = self
            .producers
            .dispute_settled_producer
            .iter()
            .map(|emitter| emitter.publish_event(DisputeSettledEvent::new(dispute.clone())));
        join_all(jobs).await;
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// The dispute parties other than `author_id`. Admin posts notify both sides.
fn dispute_counterparties(dispute: &Dispute, author_id: i64) -> Vec<i64> {
    [dispute.raised_by, dispute.vendor_id].into_iter().filter(|id| *id != author_id).collect()
}
