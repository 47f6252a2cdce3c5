//! `SqliteDatabase` is a concrete implementation of a Soko storage backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//!
//! The money-critical invariants live here rather than in the API layer: item statuses only
//! move forward, the order status is derived from its items, a payout insert and its balance
//! check share one statement, and every settlement action writes an audit row in the same
//! transaction.
//!
//! [`traits`]: crate::traits
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde_json::json;
use soko_common::Cents;
use sqlx::{SqliteConnection, SqlitePool};
use subtle::ConstantTimeEq;

use super::db::{accounts, audit, auth, bank_accounts, db_url, disputes, new_pool, orders, payouts};
use crate::{
    db_types::{
        audit::{
            DISPUTE_CLOSED,
            DISPUTE_OPENED,
            DISPUTE_RESOLVED,
            ORDER_AUTO_COMPLETED,
            ORDER_COMPLETED,
            PAYOUT_CANCELLED,
            PAYOUT_RECONCILED,
            PAYOUT_REQUESTED,
            PAYOUT_RETRIED,
        },
        is_valid_phone,
        AuditEntry,
        BankAccount,
        Dispute,
        DisputeMessage,
        DisputeStatusType,
        ItemStatusType,
        ItemStatusUpdate,
        NewBankAccount,
        NewDispute,
        NewNotification,
        NewOrder,
        NewUser,
        Notification,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        OtpChallenge,
        OtpPurpose,
        Payout,
        PayoutAttempt,
        PayoutStatusType,
        SessionUser,
        User,
    },
    dispute_objects::DisputeQueryFilter,
    helpers::references::new_payout_reference,
    order_objects::OrderQueryFilter,
    payout_objects::{BalanceSummary, PayoutQueryFilter},
    traits::{
        AccountError,
        AccountManagement,
        AuthApiError,
        AuthManagement,
        DisputeError,
        DisputeManagement,
        OrderFlowError,
        OrderManagement,
        PayoutError,
        PayoutManagement,
        SweepResult,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderManagement for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, Vec<OrderItem>), OrderFlowError> {
        if order.items.is_empty() {
            return Err(OrderFlowError::EmptyOrder);
        }
        if order.items.iter().any(|i| i.quantity <= 0 || i.unit_price.value() < 0) {
            return Err(OrderFlowError::InvalidItem);
        }
        let mut tx = self.pool.begin().await?;
        let new_order = orders::insert_order(&order, &mut tx).await?;
        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let item = orders::insert_order_item(&new_order.order_id, item, &mut tx).await?;
            items.push(item);
        }
        tx.commit().await?;
        debug!("🗃️ Order {} inserted with {} items", new_order.order_id, items.len());
        Ok((new_order, items))
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_orders_for_buyer(&self, buyer_id: i64) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_buyer(buyer_id, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_items_for_vendor(&self, vendor_id: i64) -> Result<Vec<OrderItem>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_items_for_vendor(vendor_id, &mut conn).await?;
        Ok(items)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn update_item_status(
        &self,
        item_id: i64,
        vendor_id: i64,
        status: ItemStatusType,
    ) -> Result<ItemStatusUpdate, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let item =
            orders::fetch_order_item(item_id, &mut tx).await?.ok_or(OrderFlowError::OrderItemNotFound(item_id))?;
        if item.vendor_id != vendor_id {
            return Err(OrderFlowError::NotYourOrder);
        }
        if !item.status.can_advance_to(&status) {
            return Err(OrderFlowError::InvalidStatusChange(format!(
                "Item {item_id} cannot move from {} to {status}",
                item.status
            )));
        }
        let order = orders::fetch_order_by_order_id(&item.order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(item.order_id.clone()))?;
        let item = orders::update_item_status(item_id, status, &mut tx).await?;
        let statuses =
            orders::fetch_order_items(&item.order_id, &mut tx).await?.iter().map(|i| i.status).collect::<Vec<_>>();
        let derived = OrderStatusType::derive_from_items(&statuses);
        let order_status_changed = derived != order.status;
        let order_delivered =
            order_status_changed && derived == OrderStatusType::Delivered && order.delivered_at.is_none();
        let order = if order_status_changed {
            if derived == OrderStatusType::Delivered {
                orders::mark_order_delivered(&item.order_id, &mut tx).await?
            } else {
                orders::update_order_status(&item.order_id, derived, &mut tx).await?
            }
        } else {
            order
        };
        tx.commit().await?;
        debug!("🗃️ Item {item_id} on order {} is now {}", order.order_id, item.status);
        Ok(ItemStatusUpdate { item, order, order_status_changed, order_delivered })
    }

    async fn complete_order(&self, order_id: &OrderId, buyer_id: i64) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.buyer_id != buyer_id {
            return Err(OrderFlowError::NotYourOrder);
        }
        if order.status != OrderStatusType::Delivered {
            return Err(OrderFlowError::InvalidStatusChange(format!(
                "Order {order_id} is {}. Only delivered orders can be confirmed",
                order.status
            )));
        }
        drop(conn);
        let mut tx = self.pool.begin().await?;
        let order = orders::confirm_delivered_order(order_id, &mut tx).await?.ok_or_else(|| {
            OrderFlowError::InvalidStatusChange(format!("Order {order_id} moved on before the confirmation landed"))
        })?;
        audit::insert_entry(Some(buyer_id), ORDER_COMPLETED, json!({ "order_id": order.order_id.as_str() }), &mut tx)
            .await?;
        tx.commit().await?;
        info!("🗃️ Order {order_id} confirmed by its buyer");
        Ok(order)
    }

    async fn auto_complete_orders(&self, grace_period: Duration) -> Result<SweepResult, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let completed = orders::sweep_delivered_orders(grace_period, &mut tx).await?;
        for order in &completed {
            audit::insert_entry(None, ORDER_AUTO_COMPLETED, json!({ "order_id": order.order_id.as_str() }), &mut tx)
                .await?;
        }
        tx.commit().await?;
        if !completed.is_empty() {
            info!("🗃️ Auto-completed {} delivered orders", completed.len());
        }
        Ok(SweepResult::new(completed))
    }
}

impl DisputeManagement for SqliteDatabase {
    async fn create_dispute(
        &self,
        raised_by: i64,
        dispute: NewDispute,
        window: Duration,
    ) -> Result<(Dispute, Order), DisputeError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(&dispute.order_id, &mut conn)
            .await?
            .ok_or_else(|| DisputeError::OrderNotFound(dispute.order_id.clone()))?;
        if order.buyer_id != raised_by {
            return Err(DisputeError::NotYourOrder);
        }
        if !order.status.is_disputable() {
            return Err(DisputeError::OrderNotDisputable { order_id: order.order_id.clone(), status: order.status });
        }
        if !order.within_window(window, Utc::now()) {
            return Err(DisputeError::WindowClosed(order.order_id.clone()));
        }
        if let Some(live) = disputes::fetch_live_dispute_for_order(&order.order_id, &mut conn).await? {
            debug!("⚖️ Dispute {} already occupies order {}", live.id, order.order_id);
            return Err(DisputeError::AlreadyDisputed(order.order_id.clone()));
        }
        let items = orders::fetch_order_items(&order.order_id, &mut conn).await?;
        let vendor_id = dispute_vendor(&items, &dispute)?;
        drop(conn);
        let mut tx = self.pool.begin().await?;
        let new_dispute = disputes::insert_dispute(raised_by, vendor_id, &dispute, &mut tx).await?;
        let order = orders::update_order_status(&order.order_id, OrderStatusType::Disputed, &mut tx)
            .await
            .map_err(|e| DisputeError::DatabaseError(e.to_string()))?;
        audit::insert_entry(
            Some(raised_by),
            DISPUTE_OPENED,
            json!({ "dispute_id": new_dispute.id, "order_id": order.order_id.as_str(), "vendor_id": vendor_id }),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("⚖️ Dispute {} opened on order {} by user {raised_by}", new_dispute.id, order.order_id);
        Ok((new_dispute, order))
    }

    async fn fetch_dispute(&self, dispute_id: i64) -> Result<Option<Dispute>, DisputeError> {
        let mut conn = self.pool.acquire().await?;
        let dispute = disputes::fetch_dispute(dispute_id, &mut conn).await?;
        Ok(dispute)
    }

    async fn search_disputes(&self, query: DisputeQueryFilter) -> Result<Vec<Dispute>, DisputeError> {
        let mut conn = self.pool.acquire().await?;
        let disputes = disputes::search_disputes(query, &mut conn).await?;
        Ok(disputes)
    }

    async fn fetch_dispute_messages(&self, dispute_id: i64) -> Result<Vec<DisputeMessage>, DisputeError> {
        let mut conn = self.pool.acquire().await?;
        let messages = disputes::fetch_messages(dispute_id, &mut conn).await?;
        Ok(messages)
    }

    async fn add_dispute_message(
        &self,
        dispute_id: i64,
        author: &SessionUser,
        body: String,
    ) -> Result<DisputeMessage, DisputeError> {
        let mut conn = self.pool.acquire().await?;
        let dispute =
            disputes::fetch_dispute(dispute_id, &mut conn).await?.ok_or(DisputeError::DisputeNotFound(dispute_id))?;
        if !dispute.is_party(author.user_id, author.role) {
            return Err(DisputeError::NotAParty);
        }
        if !dispute.status.accepts_messages() {
            return Err(DisputeError::ThreadClosed(dispute_id));
        }
        let message = disputes::insert_message(dispute_id, author.user_id, author.role, &body, &mut conn).await?;
        debug!("⚖️ Message {} added to dispute {dispute_id} by {author}", message.id);
        Ok(message)
    }

    async fn resolve_dispute(
        &self,
        dispute_id: i64,
        admin_id: i64,
        resolution: String,
    ) -> Result<Dispute, DisputeError> {
        let mut tx = self.pool.begin().await?;
        let dispute = disputes::resolve_dispute(dispute_id, admin_id, &resolution, &mut tx).await?;
        let Some(dispute) = dispute else {
            let existing = disputes::fetch_dispute(dispute_id, &mut tx).await?;
            return Err(match existing {
                Some(_) => DisputeError::AlreadySettled(dispute_id),
                None => DisputeError::DisputeNotFound(dispute_id),
            });
        };
        orders::release_disputed_order(&dispute.order_id, &mut tx).await?;
        audit::insert_entry(
            Some(admin_id),
            DISPUTE_RESOLVED,
            json!({ "dispute_id": dispute_id, "order_id": dispute.order_id.as_str() }),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("⚖️ Dispute {dispute_id} resolved by admin {admin_id}");
        Ok(dispute)
    }

    async fn close_dispute(&self, dispute_id: i64, actor: &SessionUser) -> Result<Dispute, DisputeError> {
        let mut conn = self.pool.acquire().await?;
        let dispute =
            disputes::fetch_dispute(dispute_id, &mut conn).await?.ok_or(DisputeError::DisputeNotFound(dispute_id))?;
        if !actor.is_admin() && dispute.raised_by != actor.user_id {
            return Err(DisputeError::NotAParty);
        }
        match dispute.status {
            DisputeStatusType::Closed => return Err(DisputeError::AlreadySettled(dispute_id)),
            // A resolved dispute stays on the record. Only an admin can close it out to free
            // the order's dispute slot.
            DisputeStatusType::Resolved if !actor.is_admin() => {
                return Err(DisputeError::AlreadySettled(dispute_id));
            },
            _ => {},
        }
        drop(conn);
        let mut tx = self.pool.begin().await?;
        let dispute =
            disputes::close_dispute(dispute_id, &mut tx).await?.ok_or(DisputeError::AlreadySettled(dispute_id))?;
        orders::release_disputed_order(&dispute.order_id, &mut tx).await?;
        audit::insert_entry(
            Some(actor.user_id),
            DISPUTE_CLOSED,
            json!({ "dispute_id": dispute_id, "order_id": dispute.order_id.as_str() }),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("⚖️ Dispute {dispute_id} closed by {actor}");
        Ok(dispute)
    }
}

impl PayoutManagement for SqliteDatabase {
    async fn vendor_balance(&self, vendor_id: i64, fee_basis_points: i64) -> Result<BalanceSummary, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        let summary = payouts::balance_for_vendor(vendor_id, fee_basis_points, &mut conn).await?;
        trace!("💸️ Balance for vendor {vendor_id}: {summary}");
        Ok(summary)
    }

    async fn create_payout(
        &self,
        vendor_id: i64,
        amount: Cents,
        fee_basis_points: i64,
    ) -> Result<Payout, PayoutError> {
        if !amount.is_positive() {
            return Err(PayoutError::InvalidAmount);
        }
        let mut conn = self.pool.acquire().await?;
        let user = accounts::fetch_user_by_id(vendor_id, &mut conn)
            .await?
            .ok_or(PayoutError::AccountError(AccountError::UserNotFound(vendor_id)))?;
        if !user.phone_verified {
            return Err(PayoutError::PhoneNotVerified);
        }
        let destination =
            bank_accounts::fetch_primary(vendor_id, &mut conn).await?.ok_or(PayoutError::NoPayoutDestination)?;
        let recipient_code = destination.recipient_code.clone().ok_or(PayoutError::NoPayoutDestination)?;
        drop(conn);
        let reference = new_payout_reference();
        // The guarded insert is the first statement in the transaction, so its balance check
        // runs under the write lock and a racing request sees this payout's hold.
        let mut tx = self.pool.begin().await?;
        let payout = payouts::guarded_insert(
            vendor_id,
            destination.id,
            amount,
            &reference,
            &recipient_code,
            fee_basis_points,
            &mut tx,
        )
        .await?;
        let Some(payout) = payout else {
            let balance = payouts::balance_for_vendor(vendor_id, fee_basis_points, &mut tx).await?;
            return Err(PayoutError::InsufficientFunds { requested: amount, available: balance.available });
        };
        payouts::insert_attempt(payout.id, &payout.reference, &mut tx).await?;
        audit::insert_entry(
            Some(vendor_id),
            PAYOUT_REQUESTED,
            json!({ "payout_id": payout.id, "amount": payout.amount, "reference": payout.reference.as_str() }),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("💸️ {payout} accepted under reference {}", payout.reference);
        Ok(payout)
    }

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout(payout_id, &mut conn).await?;
        Ok(payout)
    }

    async fn fetch_payout_by_reference(&self, reference: &str) -> Result<Option<Payout>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout_by_reference(reference, &mut conn).await?;
        Ok(payout)
    }

    async fn search_payouts(&self, query: PayoutQueryFilter) -> Result<Vec<Payout>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        let payouts = payouts::search_payouts(query, &mut conn).await?;
        Ok(payouts)
    }

    async fn fetch_payout_attempts(&self, payout_id: i64) -> Result<Vec<PayoutAttempt>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        let attempts = payouts::fetch_attempts(payout_id, &mut conn).await?;
        Ok(attempts)
    }

    async fn mark_payout_submitted(&self, payout_id: i64, transfer_code: &str) -> Result<Payout, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        match payouts::mark_submitted(payout_id, transfer_code, &mut conn).await? {
            Some(payout) => {
                debug!("💸️ Payout {payout_id} handed to the provider as {transfer_code}");
                Ok(payout)
            },
            None => Err(payout_status_error(payout_id, PayoutStatusType::Processing, &mut conn).await),
        }
    }

    async fn mark_payout_failed(&self, payout_id: i64, reason: &str) -> Result<Payout, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        match payouts::mark_failed(payout_id, reason, &mut conn).await? {
            Some(payout) => {
                warn!("💸️ Payout {payout_id} failed: {reason}");
                Ok(payout)
            },
            None => Err(payout_status_error(payout_id, PayoutStatusType::Failed, &mut conn).await),
        }
    }

    async fn begin_payout_retry(&self, payout_id: i64, admin_id: i64) -> Result<Payout, PayoutError> {
        let reference = new_payout_reference();
        let mut tx = self.pool.begin().await?;
        let Some(payout) = payouts::retry_payout(payout_id, &reference, &mut tx).await? else {
            return Err(payout_status_error(payout_id, PayoutStatusType::Pending, &mut tx).await);
        };
        payouts::insert_attempt(payout.id, &reference, &mut tx).await?;
        audit::insert_entry(
            Some(admin_id),
            PAYOUT_RETRIED,
            json!({ "payout_id": payout_id, "reference": reference.as_str() }),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("💸️ Payout {payout_id} retried under reference {reference} by admin {admin_id}");
        Ok(payout)
    }

    async fn cancel_payout(&self, payout_id: i64, actor: &SessionUser) -> Result<Payout, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        let payout =
            payouts::fetch_payout(payout_id, &mut conn).await?.ok_or(PayoutError::PayoutNotFound(payout_id))?;
        if !actor.is_admin() && payout.vendor_id != actor.user_id {
            return Err(PayoutError::NotYourPayout(payout_id));
        }
        let cancellable_from: &[PayoutStatusType] = if actor.is_admin() {
            &[PayoutStatusType::Pending, PayoutStatusType::Processing]
        } else {
            &[PayoutStatusType::Pending]
        };
        drop(conn);
        let mut tx = self.pool.begin().await?;
        let Some(payout) = payouts::cancel_payout(payout_id, cancellable_from, &mut tx).await? else {
            return Err(payout_status_error(payout_id, PayoutStatusType::Cancelled, &mut tx).await);
        };
        audit::insert_entry(Some(actor.user_id), PAYOUT_CANCELLED, json!({ "payout_id": payout_id }), &mut tx).await?;
        tx.commit().await?;
        info!("💸️ Payout {payout_id} cancelled by {actor}");
        Ok(payout)
    }

    async fn reconcile_payout(
        &self,
        reference: &str,
        status: PayoutStatusType,
        reason: Option<String>,
    ) -> Result<Payout, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout_by_reference(reference, &mut conn)
            .await?
            .ok_or_else(|| PayoutError::ReferenceNotFound(reference.to_string()))?;
        if payout.status == status {
            debug!("💸️ Payout {} is already {status}. Nothing to reconcile", payout.id);
            return Ok(payout);
        }
        if !payout.status.can_transition_to(&status) {
            return Err(PayoutError::InvalidStatusChange { id: payout.id, status: payout.status, next: status });
        }
        drop(conn);
        let mut tx = self.pool.begin().await?;
        let Some(updated) = payouts::reconcile_payout(payout.id, payout.status, status, reason, &mut tx).await? else {
            return Err(payout_status_error(payout.id, status, &mut tx).await);
        };
        audit::insert_entry(
            None,
            PAYOUT_RECONCILED,
            json!({ "payout_id": payout.id, "reference": reference, "status": status.to_string() }),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("💸️ Payout {} reconciled to {status}", payout.id);
        Ok(updated)
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let user = accounts::fetch_user_by_id(user_id, &mut conn).await?;
        Ok(user)
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let user = accounts::fetch_user_by_email(email, &mut conn).await?;
        Ok(user)
    }

    async fn update_phone(&self, user_id: i64, phone: &str) -> Result<User, AccountError> {
        if !is_valid_phone(phone) {
            return Err(AccountError::InvalidPhoneNumber(phone.to_string()));
        }
        let mut conn = self.pool.acquire().await?;
        let user = accounts::update_phone(user_id, phone, &mut conn)
            .await?
            .ok_or(AccountError::UserNotFound(user_id))?;
        info!("👤️ User {user_id} changed their phone number. Verification reset");
        Ok(user)
    }

    async fn mark_phone_verified(&self, user_id: i64) -> Result<User, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let user =
            accounts::mark_phone_verified(user_id, &mut conn).await?.ok_or(AccountError::UserNotFound(user_id))?;
        info!("👤️ User {user_id} verified their phone number");
        Ok(user)
    }

    async fn fetch_bank_accounts(&self, vendor_id: i64) -> Result<Vec<BankAccount>, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let accounts = bank_accounts::fetch_accounts(vendor_id, &mut conn).await?;
        Ok(accounts)
    }

    async fn fetch_primary_bank_account(&self, vendor_id: i64) -> Result<Option<BankAccount>, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let account = bank_accounts::fetch_primary(vendor_id, &mut conn).await?;
        Ok(account)
    }

    async fn add_bank_account(&self, vendor_id: i64, account: NewBankAccount) -> Result<BankAccount, AccountError> {
        if !NewBankAccount::is_valid_account_number(&account.account_number) {
            return Err(AccountError::InvalidAccountNumber(account.account_number.clone()));
        }
        let mut tx = self.pool.begin().await?;
        let existing = bank_accounts::count_live_accounts(vendor_id, &mut tx).await?;
        // The vendor's first account becomes the payout destination without being asked.
        let make_primary = account.make_primary || existing == 0;
        if make_primary && existing > 0 {
            bank_accounts::demote_primaries(vendor_id, &mut tx).await?;
        }
        let account = bank_accounts::insert_account(vendor_id, &account, make_primary, &mut tx).await?;
        tx.commit().await?;
        info!("👤️ Vendor {vendor_id} added bank account {} at {}", account.id, account.bank_name);
        Ok(account)
    }

    async fn set_primary_bank_account(&self, vendor_id: i64, account_id: i64) -> Result<BankAccount, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let account =
            bank_accounts::fetch_account(account_id, &mut conn).await?.ok_or(AccountError::AccountNotFound(account_id))?;
        if account.vendor_id != vendor_id {
            return Err(AccountError::NotYourAccount(account_id));
        }
        if account.deleted_at.is_some() {
            return Err(AccountError::AccountNotFound(account_id));
        }
        drop(conn);
        let mut tx = self.pool.begin().await?;
        bank_accounts::demote_primaries(vendor_id, &mut tx).await?;
        let account =
            bank_accounts::promote_account(account_id, &mut tx).await?.ok_or(AccountError::AccountNotFound(account_id))?;
        tx.commit().await?;
        info!("👤️ Vendor {vendor_id} switched their payout destination to account {account_id}");
        Ok(account)
    }

    async fn remove_bank_account(&self, vendor_id: i64, account_id: i64) -> Result<BankAccount, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let account =
            bank_accounts::fetch_account(account_id, &mut conn).await?.ok_or(AccountError::AccountNotFound(account_id))?;
        if account.vendor_id != vendor_id {
            return Err(AccountError::NotYourAccount(account_id));
        }
        let account = bank_accounts::soft_delete_account(account_id, &mut conn)
            .await?
            .ok_or(AccountError::AccountNotFound(account_id))?;
        info!("👤️ Vendor {vendor_id} removed bank account {account_id}");
        Ok(account)
    }

    async fn fetch_notifications(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let notifications = accounts::fetch_notifications(user_id, unread_only, &mut conn).await?;
        Ok(notifications)
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let notification = accounts::insert_notification(&notification, &mut conn).await?;
        Ok(notification)
    }

    async fn mark_notification_read(&self, user_id: i64, notification_id: i64) -> Result<Notification, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let notification = accounts::mark_notification_read(user_id, notification_id, &mut conn)
            .await?
            .ok_or(AccountError::NotificationNotFound(notification_id))?;
        Ok(notification)
    }

    async fn fetch_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>, AccountError> {
        let mut conn = self.pool.acquire().await?;
        let entries = audit::fetch_entries(limit, &mut conn).await?;
        Ok(entries)
    }
}

impl AuthManagement for SqliteDatabase {
    async fn create_user(&self, user: NewUser) -> Result<User, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let user = auth::insert_user(&user, &mut conn).await?;
        info!("🔑️ New {} account created for {}", user.role, user.email);
        Ok(user)
    }

    async fn fetch_user_with_credentials(&self, email: &str) -> Result<Option<(User, String)>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = auth::fetch_user_with_credentials(email, &mut conn).await?;
        Ok(result)
    }

    async fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, AuthApiError> {
        let expires_at = Utc::now() + ttl;
        let mut conn = self.pool.acquire().await?;
        auth::insert_session(user_id, token_hash, expires_at, &mut conn).await?;
        debug!("🔑️ Session created for user {user_id}, expires {expires_at}");
        Ok(expires_at)
    }

    async fn fetch_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let user = auth::fetch_session_user(token_hash, &mut conn).await?;
        Ok(user)
    }

    async fn destroy_session(&self, token_hash: &str) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::delete_session(token_hash, &mut conn).await?;
        Ok(())
    }

    async fn create_otp_challenge(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        otp_hash: &str,
        ttl: Duration,
        cooldown: Duration,
    ) -> Result<OtpChallenge, AuthApiError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        if let Some(last) = auth::latest_challenge(user_id, purpose, &mut tx).await? {
            let elapsed = now.signed_duration_since(last.created_at);
            if elapsed < cooldown {
                let wait = (cooldown - elapsed).num_seconds().max(1);
                return Err(AuthApiError::OtpCooldown(wait));
            }
        }
        auth::supersede_challenges(user_id, purpose, &mut tx).await?;
        let challenge = auth::insert_challenge(user_id, purpose, otp_hash, now + ttl, &mut tx).await?;
        tx.commit().await?;
        debug!("🔑️ New {purpose} code issued to user {user_id}");
        Ok(challenge)
    }

    async fn verify_otp_challenge(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        candidate_hash: &str,
        max_attempts: i64,
    ) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let challenge = auth::live_challenge(user_id, purpose, &mut conn).await?.ok_or(AuthApiError::OtpNotFound)?;
        if challenge.is_expired(Utc::now()) {
            return Err(AuthApiError::OtpExpired);
        }
        // The cap is checked before the code is even looked at, so the attempt that reaches
        // it is rejected no matter what was typed.
        if challenge.attempts >= max_attempts {
            return Err(AuthApiError::OtpAttemptsExhausted);
        }
        let attempts = auth::record_attempt(challenge.id, &mut conn).await?;
        if bool::from(candidate_hash.as_bytes().ct_eq(challenge.otp_hash.as_bytes())) {
            auth::consume_challenge(challenge.id, &mut conn).await?;
            debug!("🔑️ User {user_id} passed the {purpose} check");
            Ok(())
        } else {
            let remaining = (max_attempts - attempts).max(0);
            warn!("🔑️ Failed {purpose} attempt for user {user_id}. {remaining} attempt(s) left");
            Err(AuthApiError::OtpIncorrect(remaining))
        }
    }

    async fn issue_action_token(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        token_hash: &str,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, AuthApiError> {
        let expires_at = Utc::now() + ttl;
        let mut conn = self.pool.acquire().await?;
        auth::insert_action_token(user_id, purpose, token_hash, expires_at, &mut conn).await?;
        debug!("🔑️ Action token issued to user {user_id} for {purpose}");
        Ok(expires_at)
    }

    async fn consume_action_token(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        token_hash: &str,
    ) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let claimed = auth::consume_action_token(user_id, purpose, token_hash, &mut conn).await?;
        if claimed == 0 {
            return Err(AuthApiError::ActionTokenInvalid);
        }
        debug!("🔑️ User {user_id} spent their {purpose} action token");
        Ok(())
    }

    async fn purge_expired_auth_records(&self, now: DateTime<Utc>) -> Result<u64, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let purged = auth::purge_expired(now, &mut conn).await?;
        if purged > 0 {
            info!("🔑️ Purged {purged} expired auth records");
        }
        Ok(purged)
    }
}

/// Which vendor a new dispute is against. Multi-vendor orders need the disputed line item to
/// pin it down; single-vendor orders don't.
fn dispute_vendor(items: &[OrderItem], dispute: &NewDispute) -> Result<i64, DisputeError> {
    match dispute.order_item_id {
        Some(item_id) => items
            .iter()
            .find(|i| i.id == item_id)
            .map(|i| i.vendor_id)
            .ok_or(DisputeError::ItemNotInOrder { item_id, order_id: dispute.order_id.clone() }),
        None => {
            let mut vendors = items.iter().map(|i| i.vendor_id).collect::<Vec<_>>();
            vendors.sort_unstable();
            vendors.dedup();
            match vendors.as_slice() {
                [vendor] => Ok(*vendor),
                _ => Err(DisputeError::ItemRequired),
            }
        },
    }
}

/// The error for a payout status change that found the row in the wrong state.
async fn payout_status_error(payout_id: i64, next: PayoutStatusType, conn: &mut SqliteConnection) -> PayoutError {
    match payouts::fetch_payout(payout_id, conn).await {
        Ok(Some(p)) => PayoutError::InvalidStatusChange { id: payout_id, status: p.status, next },
        Ok(None) => PayoutError::PayoutNotFound(payout_id),
        Err(e) => PayoutError::from(e),
    }
}

impl SqliteDatabase {
    /// Creates a new database api object, connecting to the database at the URL given by the
    /// `SOKO_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the connection pool. Outstanding queries are allowed to finish first.
    pub async fn close(&mut self) {
        self.pool.close().await;
    }
}
