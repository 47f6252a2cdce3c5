use thiserror::Error;

use crate::db_types::{AuditEntry, BankAccount, NewBankAccount, NewNotification, Notification, User};

/// Storage contract for user profiles, vendor bank accounts, in-app notifications and the
/// audit log.
#[allow(async_fn_in_trait)]
pub trait AccountManagement: Clone {
    async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, AccountError>;

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AccountError>;

    /// Attach or replace the user's phone number. Any previous verification is voided.
    async fn update_phone(&self, user_id: i64, phone: &str) -> Result<User, AccountError>;

    async fn mark_phone_verified(&self, user_id: i64) -> Result<User, AccountError>;

    /// The vendor's bank accounts, primary first. Removed accounts are not included.
    async fn fetch_bank_accounts(&self, vendor_id: i64) -> Result<Vec<BankAccount>, AccountError>;

    async fn fetch_primary_bank_account(&self, vendor_id: i64) -> Result<Option<BankAccount>, AccountError>;

    /// Add a payout destination. The vendor's first account automatically becomes primary, as
    /// does any account added with `make_primary` set.
    async fn add_bank_account(&self, vendor_id: i64, account: NewBankAccount) -> Result<BankAccount, AccountError>;

    async fn set_primary_bank_account(&self, vendor_id: i64, account_id: i64) -> Result<BankAccount, AccountError>;

    /// Soft-delete an account. Past payouts keep their reference to it.
    async fn remove_bank_account(&self, vendor_id: i64, account_id: i64) -> Result<BankAccount, AccountError>;

    async fn fetch_notifications(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>, AccountError>;

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, AccountError>;

    async fn mark_notification_read(&self, user_id: i64, notification_id: i64) -> Result<Notification, AccountError>;

    /// The most recent audit entries, newest first.
    async fn fetch_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>, AccountError>;
}

#[derive(Debug, Clone, Error)]
pub enum AccountError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User {0} not found")]
    UserNotFound(i64),
    #[error("Bank account {0} not found")]
    AccountNotFound(i64),
    #[error("Bank account {0} belongs to another vendor")]
    NotYourAccount(i64),
    #[error("That account number is already registered")]
    DuplicateAccount,
    #[error("{0} is not a valid NUBAN account number")]
    InvalidAccountNumber(String),
    #[error("{0} is not a valid phone number")]
    InvalidPhoneNumber(String),
    #[error("Notification {0} not found")]
    NotificationNotFound(i64),
}

impl From<sqlx::Error> for AccountError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
