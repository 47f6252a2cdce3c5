use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::db_types::{NewUser, OtpChallenge, OtpPurpose, SessionUser, User};

/// Storage contract for credentials: password logins, sessions, one-time codes and the action
/// tokens they mint.
///
/// Plaintext secrets never reach this layer. Callers hash passwords, session tokens, OTP codes
/// and action tokens first (see [`crate::helpers`]) and the implementation only ever stores
/// and compares digests.
#[allow(async_fn_in_trait)]
pub trait AuthManagement: Clone {
    async fn create_user(&self, user: NewUser) -> Result<User, AuthApiError>;

    /// The user plus their stored password hash, for login verification.
    async fn fetch_user_with_credentials(&self, email: &str) -> Result<Option<(User, String)>, AuthApiError>;

    /// Record a new session and return its expiry.
    async fn create_session(&self, user_id: i64, token_hash: &str, ttl: Duration) -> Result<DateTime<Utc>, AuthApiError>;

    /// Resolve a session token hash to its user, or `None` if the session is unknown or past
    /// its expiry.
    async fn fetch_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>, AuthApiError>;

    async fn destroy_session(&self, token_hash: &str) -> Result<(), AuthApiError>;

    /// Issue a new OTP challenge, superseding any live challenge for the same user and
    /// purpose. Enforces the reissue cooldown against the most recent challenge.
    async fn create_otp_challenge(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        otp_hash: &str,
        ttl: Duration,
        cooldown: Duration,
    ) -> Result<OtpChallenge, AuthApiError>;

    /// Check a candidate code digest against the live challenge. The attempt counter is
    /// checked *before* the comparison, so the attempt that reaches the cap is rejected even
    /// if the code is right. A successful check consumes the challenge.
    async fn verify_otp_challenge(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        candidate_hash: &str,
        max_attempts: i64,
    ) -> Result<(), AuthApiError>;

    /// Store a freshly minted action token (hashed) and return its expiry.
    async fn issue_action_token(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        token_hash: &str,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, AuthApiError>;

    /// Atomically consume an action token. Fails if it is unknown, expired, already used, or
    /// bound to a different user or purpose.
    async fn consume_action_token(&self, user_id: i64, purpose: OtpPurpose, token_hash: &str) -> Result<(), AuthApiError>;

    /// Delete expired sessions, challenges and action tokens. Returns the number of rows
    /// removed.
    async fn purge_expired_auth_records(&self, now: DateTime<Utc>) -> Result<u64, AuthApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum AuthApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("User {0} not found")]
    UserNotFound(i64),
    #[error("A user with that email already exists")]
    DuplicateEmail,
    #[error("Your session has expired. Log in again")]
    InvalidSession,
    #[error("Wait {0} more seconds before requesting another code")]
    OtpCooldown(i64),
    #[error("No active code. Request a new one")]
    OtpNotFound,
    #[error("That code has expired. Request a new one")]
    OtpExpired,
    #[error("Too many incorrect attempts. Request a new code")]
    OtpAttemptsExhausted,
    #[error("Incorrect code. {0} attempt(s) remaining")]
    OtpIncorrect(i64),
    #[error("Invalid or expired action token")]
    ActionTokenInvalid,
    #[error("No phone number on file. Add one first")]
    NoPhoneNumber,
    #[error("Password processing failed: {0}")]
    PasswordHash(String),
}

impl From<sqlx::Error> for AuthApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
