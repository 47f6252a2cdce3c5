use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use log::*;
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::{
    db_types::{NewUser, OtpPurpose, Role, SessionUser, User},
    events::{EventProducers, OtpIssuedEvent},
    helpers::{
        masking::{mask_email, mask_phone},
        otp::{code_digest, generate_code},
        passwords::{hash_password, verify_password},
        tokens::{new_auth_token, token_digest},
    },
    traits::{AccountError, AccountManagement, AuthApiError, AuthManagement},
};

/// Knobs for the credential flows. The defaults match production; tests shrink the windows.
#[derive(Debug, Clone)]
pub struct OtpSettings {
    /// Server-side key mixed into every OTP digest. Never stored in the database.
    pub pepper: String,
    /// How long an issued code stays valid.
    pub code_ttl: Duration,
    /// Minimum gap between code issues for the same user and purpose.
    pub reissue_cooldown: Duration,
    /// Wrong guesses allowed per challenge. The guess that reaches the cap is rejected before
    /// it is compared.
    pub max_attempts: i64,
    /// Lifetime of the single-use action token a successful OTP mints.
    pub action_token_ttl: Duration,
    /// Login session lifetime.
    pub session_ttl: Duration,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            pepper: String::new(),
            code_ttl: Duration::minutes(10),
            reissue_cooldown: Duration::seconds(60),
            max_attempts: 5,
            action_token_ttl: Duration::minutes(15),
            session_ttl: Duration::hours(48),
        }
    }
}

/// A successful login: the identity for the session cookie plus the raw token that goes into
/// it. The token is never stored; only its digest is.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: SessionUser,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Where a requested code was sent, with the destinations masked for the response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpDelivery {
    pub expires_at: DateTime<Utc>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// What a successful OTP verification unlocked.
#[derive(Debug, Clone)]
pub enum OtpVerification {
    /// `VerifyPhone`: the user's phone is now verified.
    PhoneVerified(User),
    /// `PayoutDestination`: a single-use action token for the sensitive call.
    ActionToken { token: String, expires_at: DateTime<Utc> },
}

/// `AuthApi` owns logins, sessions and the OTP step-up flows.
pub struct AuthApi<B> {
    db: B,
    settings: OtpSettings,
    producers: EventProducers,
}

impl<B> Debug for AuthApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthApi")
    }
}

impl<B> AuthApi<B> {
    pub fn new(db: B, settings: OtpSettings, producers: EventProducers) -> Self {
        Self { db, settings, producers }
    }

    pub fn settings(&self) -> &OtpSettings {
        &self.settings
    }
}

impl<B> AuthApi<B>
where B: AuthManagement + AccountManagement
{
    /// Create a user with a hashed password. There is no self-service registration endpoint;
    /// this is reached from operator tooling and test fixtures.
    pub async fn create_user(
        &self,
        email: &str,
        display_name: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthApiError> {
        let password = password.to_string();
        let hash = task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthApiError::PasswordHash(e.to_string()))??;
        let user = self.db.create_user(NewUser::new(email, display_name, hash, role)).await?;
        info!("🔑️ Created {} account #{} for {}", user.role, user.id, user.email);
        Ok(user)
    }

    /// Verify credentials and open a session. The Argon2 check runs on the blocking pool.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthApiError> {
        let Some((user, stored_hash)) = self.db.fetch_user_with_credentials(email).await? else {
            debug!("🔑️ Login attempt for unknown email");
            return Err(AuthApiError::InvalidCredentials);
        };
        let password = password.to_string();
        let ok = task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .map_err(|e| AuthApiError::PasswordHash(e.to_string()))??;
        if !ok {
            debug!("🔑️ Bad password for user #{}", user.id);
            return Err(AuthApiError::InvalidCredentials);
        }
        let token = new_auth_token();
        let expires_at = self.db.create_session(user.id, &token_digest(&token), self.settings.session_ttl).await?;
        info!("🔑️ User #{} ({}) logged in", user.id, user.role);
        let session_user =
            SessionUser { user_id: user.id, role: user.role, display_name: user.display_name, email: user.email };
        Ok(AuthSession { user: session_user, token, expires_at })
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthApiError> {
        self.db.destroy_session(&token_digest(token)).await
    }

    /// Resolve a session cookie to its user, or `None` for unknown and expired sessions.
    pub async fn session_user(&self, token: &str) -> Result<Option<SessionUser>, AuthApiError> {
        self.db.fetch_session_user(&token_digest(token)).await
    }

    /// Issue a one-time code for `purpose` and hand it to the delivery hook. The plaintext
    /// code leaves this method only inside the [`OtpIssuedEvent`]; the caller gets masked
    /// destinations and the expiry.
    pub async fn request_otp(&self, user_id: i64, purpose: OtpPurpose) -> Result<OtpDelivery, AuthApiError> {
        let user = self
            .db
            .fetch_user(user_id)
            .await
            .map_err(account_err)?
            .ok_or(AuthApiError::UserNotFound(user_id))?;
        if purpose == OtpPurpose::VerifyPhone && user.phone.is_none() {
            return Err(AuthApiError::NoPhoneNumber);
        }
        let code = generate_code();
        let digest = code_digest(&self.settings.pepper, user_id, purpose, &code);
        let challenge = self
            .db
            .create_otp_challenge(user_id, purpose, &digest, self.settings.code_ttl, self.settings.reissue_cooldown)
            .await?;
        info!("🔑️ Issued {purpose} code for user #{user_id}, expires {}", challenge.expires_at);
        let event = OtpIssuedEvent::new(user_id, purpose, code, user.phone.clone(), Some(user.email.clone()));
        let jobs = self.producers.otp_issued_producer.iter().map(|emitter| emitter.publish_event(event.clone()));
        join_all(jobs).await;
        Ok(OtpDelivery {
            expires_at: challenge.expires_at,
            phone: user.phone.as_deref().map(mask_phone),
            email: Some(mask_email(&user.email)),
        })
    }

    /// Check a submitted code. On success the challenge is consumed and the purpose's reward
    /// is granted: `VerifyPhone` flips the flag, `PayoutDestination` mints an action token.
    pub async fn verify_otp(&self, user_id: i64, purpose: OtpPurpose, code: &str) -> Result<OtpVerification, AuthApiError> {
        let digest = code_digest(&self.settings.pepper, user_id, purpose, code);
        self.db.verify_otp_challenge(user_id, purpose, &digest, self.settings.max_attempts).await?;
        match purpose {
            OtpPurpose::VerifyPhone => {
                let user = self.db.mark_phone_verified(user_id).await.map_err(account_err)?;
                info!("🔑️ User #{user_id} verified their phone number");
                Ok(OtpVerification::PhoneVerified(user))
            },
            OtpPurpose::PayoutDestination => {
                let token = new_auth_token();
                let expires_at = self
                    .db
                    .issue_action_token(user_id, purpose, &token_digest(&token), self.settings.action_token_ttl)
                    .await?;
                info!("🔑️ User #{user_id} passed the {purpose} check; action token issued");
                Ok(OtpVerification::ActionToken { token, expires_at })
            },
        }
    }

    /// Spend an action token. Single use: a second call with the same token fails.
    pub async fn consume_action_token(&self, user_id: i64, purpose: OtpPurpose, token: &str) -> Result<(), AuthApiError> {
        self.db.consume_action_token(user_id, purpose, &token_digest(token)).await
    }

    /// Housekeeping entry point: drop expired sessions, challenges and action tokens.
    pub async fn purge_expired(&self) -> Result<u64, AuthApiError> {
        let purged = self.db.purge_expired_auth_records(Utc::now()).await?;
        if purged > 0 {
            debug!("🔑️ Purged {purged} expired credential record(s)");
        }
        Ok(purged)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

fn account_err(e: AccountError) -> AuthApiError {
    match e {
        AccountError::UserNotFound(id) => AuthApiError::UserNotFound(id),
        other => AuthApiError::DatabaseError(other.to_string()),
    }
}
