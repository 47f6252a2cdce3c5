//! Sqlite database operations for logins, sessions and one-time codes.
//!
//! Generally clients should never call these methods directly, and prefer to use the [`AuthManagement`] trait methods
//! that are implemented on the [`SqliteDatabase`] struct instead.
//!
//! Nothing in this module sees a plaintext secret. Passwords arrive as Argon2 PHC strings,
//! session tokens, OTP codes and action tokens as hex digests.
//!
//! [`AuthManagement`]: crate::traits::AuthManagement
//! [`SqliteDatabase`]: crate::SqliteDatabase

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row, SqliteConnection};

use crate::{
    db_types::{NewUser, OtpChallenge, OtpPurpose, SessionUser, User},
    traits::AuthApiError,
};

pub async fn insert_user(user: &NewUser, conn: &mut SqliteConnection) -> Result<User, AuthApiError> {
    let user = sqlx::query_as(
        r#"
            INSERT INTO users (email, display_name, password_hash, role, phone)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(user.email.as_str())
    .bind(user.display_name.as_str())
    .bind(user.password_hash.as_str())
    .bind(user.role)
    .bind(user.phone.as_deref())
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => AuthApiError::DuplicateEmail,
        _ => AuthApiError::from(e),
    })?;
    Ok(user)
}

/// The user and their stored password hash, for login verification.
pub async fn fetch_user_with_credentials(
    email: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<(User, String)>, AuthApiError> {
    let row = sqlx::query("SELECT * FROM users WHERE email = $1").bind(email).fetch_optional(conn).await?;
    let result = match row {
        Some(row) => {
            let user = User::from_row(&row)?;
            let hash: String = row.try_get("password_hash")?;
            Some((user, hash))
        },
        None => None,
    };
    Ok(result)
}

//--------------------------------------      Sessions      ---------------------------------------------

pub async fn insert_session(
    user_id: i64,
    token_hash: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO sessions (user_id, token_digest, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Resolves a session token digest to the logged-in user. Expired sessions resolve to `None`;
/// they are swept out later by [`purge_expired`].
pub async fn fetch_session_user(
    token_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<SessionUser>, sqlx::Error> {
    let user = sqlx::query_as(
        r#"
            SELECT users.id AS user_id, users.role, users.display_name, users.email
            FROM sessions JOIN users ON sessions.user_id = users.id
            WHERE sessions.token_digest = $1 AND datetime(sessions.expires_at) > datetime(CURRENT_TIMESTAMP)
        "#,
    )
    .bind(token_hash)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

pub async fn delete_session(token_hash: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM sessions WHERE token_digest = $1").bind(token_hash).execute(conn).await?;
    Ok(res.rows_affected())
}

//--------------------------------------    OTP challenges   ---------------------------------------------

/// The most recent challenge for the user and purpose, consumed or not. The reissue cooldown
/// is measured against this row.
pub async fn latest_challenge(
    user_id: i64,
    purpose: OtpPurpose,
    conn: &mut SqliteConnection,
) -> Result<Option<OtpChallenge>, sqlx::Error> {
    let challenge =
        sqlx::query_as("SELECT * FROM otp_challenges WHERE user_id = $1 AND purpose = $2 ORDER BY id DESC LIMIT 1")
            .bind(user_id)
            .bind(purpose)
            .fetch_optional(conn)
            .await?;
    Ok(challenge)
}

/// The challenge a candidate code is checked against: the newest unconsumed one.
pub async fn live_challenge(
    user_id: i64,
    purpose: OtpPurpose,
    conn: &mut SqliteConnection,
) -> Result<Option<OtpChallenge>, sqlx::Error> {
    let challenge = sqlx::query_as(
        "SELECT * FROM otp_challenges WHERE user_id = $1 AND purpose = $2 AND consumed_at IS NULL ORDER BY id DESC \
         LIMIT 1",
    )
    .bind(user_id)
    .bind(purpose)
    .fetch_optional(conn)
    .await?;
    Ok(challenge)
}

/// Retires any live challenges for the user and purpose. Issuing a new code supersedes the old
/// one; two codes are never valid at once.
pub async fn supersede_challenges(
    user_id: i64,
    purpose: OtpPurpose,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE otp_challenges SET consumed_at = CURRENT_TIMESTAMP WHERE user_id = $1 AND purpose = $2 AND \
         consumed_at IS NULL",
    )
    .bind(user_id)
    .bind(purpose)
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

pub async fn insert_challenge(
    user_id: i64,
    purpose: OtpPurpose,
    otp_hash: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OtpChallenge, sqlx::Error> {
    let challenge = sqlx::query_as(
        r#"
            INSERT INTO otp_challenges (user_id, purpose, otp_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(purpose)
    .bind(otp_hash)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;
    Ok(challenge)
}

/// Bumps the attempt counter and returns the new count. The increment sticks regardless of
/// whether the attempt turns out right or wrong.
pub async fn record_attempt(challenge_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let attempts: i64 =
        sqlx::query_scalar("UPDATE otp_challenges SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts")
            .bind(challenge_id)
            .fetch_one(conn)
            .await?;
    Ok(attempts)
}

pub async fn consume_challenge(challenge_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE otp_challenges SET consumed_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(challenge_id)
        .execute(conn)
        .await?;
    Ok(())
}

//--------------------------------------    Action tokens    ---------------------------------------------

pub async fn insert_action_token(
    user_id: i64,
    purpose: OtpPurpose,
    token_hash: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO action_tokens (user_id, purpose, token_hash, expires_at) VALUES ($1, $2, $3, $4)")
        .bind(user_id)
        .bind(purpose)
        .bind(token_hash)
        .bind(expires_at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Consumes the token in one statement, so two racing requests cannot both spend it. Returns
/// the number of rows claimed: one on success, zero if the token is unknown, expired, already
/// used, or bound to a different user or purpose.
pub async fn consume_action_token(
    user_id: i64,
    purpose: OtpPurpose,
    token_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r#"
            UPDATE action_tokens SET consumed_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
              AND purpose = $2
              AND token_hash = $3
              AND consumed_at IS NULL
              AND datetime(expires_at) > datetime(CURRENT_TIMESTAMP)
        "#,
    )
    .bind(user_id)
    .bind(purpose)
    .bind(token_hash)
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

//--------------------------------------       Purging       ---------------------------------------------

/// Deletes expired sessions and challenges, and spent or expired action tokens. Unexpired
/// challenges stay even when consumed, because the reissue cooldown is measured against them.
pub async fn purge_expired(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let sessions = sqlx::query("DELETE FROM sessions WHERE datetime(expires_at) <= datetime($1)")
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let challenges = sqlx::query("DELETE FROM otp_challenges WHERE datetime(expires_at) <= datetime($1)")
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let tokens = sqlx::query(
        "DELETE FROM action_tokens WHERE datetime(expires_at) <= datetime($1) OR consumed_at IS NOT NULL",
    )
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(sessions + challenges + tokens)
}
