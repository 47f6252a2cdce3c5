use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{is_valid_phone, AuditEntry, BankAccount, NewBankAccount, Notification, User},
    traits::{AccountError, AccountManagement},
};

/// `AccountApi` covers profile data, vendor bank accounts and in-app notifications. The OTP
/// and action-token gates that protect bank-account changes live in the server layer; by the
/// time a call lands here it is already authorised.
pub struct AccountApi<B> {
    db: B,
}

impl<B> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi")
    }
}

impl<B> AccountApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub async fn profile(&self, user_id: i64) -> Result<User, AccountError> {
        self.db.fetch_user(user_id).await?.ok_or(AccountError::UserNotFound(user_id))
    }

    /// Attach or replace the user's phone number. Verification resets and must be redone via
    /// OTP before the next payout.
    pub async fn set_phone(&self, user_id: i64, phone: &str) -> Result<User, AccountError> {
        if !is_valid_phone(phone) {
            return Err(AccountError::InvalidPhoneNumber(phone.to_string()));
        }
        let user = self.db.update_phone(user_id, phone).await?;
        info!("👤️ User #{user_id} changed their phone number (verification reset)");
        Ok(user)
    }

    pub async fn bank_accounts(&self, vendor_id: i64) -> Result<Vec<BankAccount>, AccountError> {
        self.db.fetch_bank_accounts(vendor_id).await
    }

    /// Register a payout destination. Callers resolve the account with the provider first and
    /// pass the resolved holder name and recipient code in.
    pub async fn add_bank_account(&self, vendor_id: i64, account: NewBankAccount) -> Result<BankAccount, AccountError> {
        if !NewBankAccount::is_valid_account_number(&account.account_number) {
            return Err(AccountError::InvalidAccountNumber(account.account_number));
        }
        let account = self.db.add_bank_account(vendor_id, account).await?;
        info!(
            "👤️ Vendor #{vendor_id} added bank account #{} ({}){}",
            account.id,
            account.bank_name,
            if account.is_primary { " as primary" } else { "" }
        );
        Ok(account)
    }

    pub async fn set_primary_bank_account(&self, vendor_id: i64, account_id: i64) -> Result<BankAccount, AccountError> {
        let account = self.db.set_primary_bank_account(vendor_id, account_id).await?;
        info!("👤️ Vendor #{vendor_id} switched their primary account to #{account_id}");
        Ok(account)
    }

    pub async fn remove_bank_account(&self, vendor_id: i64, account_id: i64) -> Result<BankAccount, AccountError> {
        let account = self.db.remove_bank_account(vendor_id, account_id).await?;
        info!("👤️ Vendor #{vendor_id} removed bank account #{account_id}");
        Ok(account)
    }

    pub async fn notifications(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>, AccountError> {
        self.db.fetch_notifications(user_id, unread_only).await
    }

    pub async fn mark_notification_read(&self, user_id: i64, notification_id: i64) -> Result<Notification, AccountError> {
        self.db.mark_notification_read(user_id, notification_id).await
    }

    pub async fn audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>, AccountError> {
        self.db.fetch_audit_log(limit).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
