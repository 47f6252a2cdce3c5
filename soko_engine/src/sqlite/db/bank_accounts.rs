use sqlx::SqliteConnection;

use crate::{
    db_types::{BankAccount, NewBankAccount},
    traits::AccountError,
};

/// The vendor's live accounts, primary first.
pub async fn fetch_accounts(vendor_id: i64, conn: &mut SqliteConnection) -> Result<Vec<BankAccount>, sqlx::Error> {
    let accounts = sqlx::query_as(
        "SELECT * FROM bank_accounts WHERE vendor_id = $1 AND deleted_at IS NULL ORDER BY is_primary DESC, id ASC",
    )
    .bind(vendor_id)
    .fetch_all(conn)
    .await?;
    Ok(accounts)
}

/// Fetches the account row whether it has been removed or not. Callers decide what a soft
/// deleted row means for them.
pub async fn fetch_account(account_id: i64, conn: &mut SqliteConnection) -> Result<Option<BankAccount>, sqlx::Error> {
    let account =
        sqlx::query_as("SELECT * FROM bank_accounts WHERE id = $1").bind(account_id).fetch_optional(conn).await?;
    Ok(account)
}

pub async fn fetch_primary(vendor_id: i64, conn: &mut SqliteConnection) -> Result<Option<BankAccount>, sqlx::Error> {
    let account =
        sqlx::query_as("SELECT * FROM bank_accounts WHERE vendor_id = $1 AND is_primary AND deleted_at IS NULL")
            .bind(vendor_id)
            .fetch_optional(conn)
            .await?;
    Ok(account)
}

pub async fn count_live_accounts(vendor_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bank_accounts WHERE vendor_id = $1 AND deleted_at IS NULL")
            .bind(vendor_id)
            .fetch_one(conn)
            .await?;
    Ok(count)
}

/// Clears the primary flag on the vendor's live accounts, making room for a new primary.
pub async fn demote_primaries(vendor_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let res =
        sqlx::query("UPDATE bank_accounts SET is_primary = 0 WHERE vendor_id = $1 AND deleted_at IS NULL AND is_primary")
            .bind(vendor_id)
            .execute(conn)
            .await?;
    Ok(res.rows_affected())
}

/// Inserts the account. A partial unique index over the live rows rejects a second copy of the
/// same bank code and account number for the vendor.
pub async fn insert_account(
    vendor_id: i64,
    account: &NewBankAccount,
    is_primary: bool,
    conn: &mut SqliteConnection,
) -> Result<BankAccount, AccountError> {
    let account = sqlx::query_as(
        r#"
            INSERT INTO bank_accounts (
                vendor_id,
                bank_code,
                bank_name,
                account_number,
                account_name,
                recipient_code,
                is_primary
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(vendor_id)
    .bind(account.bank_code.as_str())
    .bind(account.bank_name.as_str())
    .bind(account.account_number.as_str())
    .bind(account.account_name.as_str())
    .bind(account.recipient_code.as_deref())
    .bind(is_primary)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => AccountError::DuplicateAccount,
        _ => AccountError::from(e),
    })?;
    Ok(account)
}

/// Flags the account as primary. Returns `None` if the account has been removed.
pub async fn promote_account(account_id: i64, conn: &mut SqliteConnection) -> Result<Option<BankAccount>, sqlx::Error> {
    let account = sqlx::query_as(
        "UPDATE bank_accounts SET is_primary = 1 WHERE id = $1 AND deleted_at IS NULL RETURNING *",
    )
    .bind(account_id)
    .fetch_optional(conn)
    .await?;
    Ok(account)
}

/// Soft deletes the account so past payouts keep a valid reference to it. A removed primary
/// leaves the vendor without a payout destination until they pick another.
pub async fn soft_delete_account(
    account_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<BankAccount>, sqlx::Error> {
    let account = sqlx::query_as(
        r#"
            UPDATE bank_accounts SET
                deleted_at = CURRENT_TIMESTAMP,
                is_primary = 0
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(account_id)
    .fetch_optional(conn)
    .await?;
    Ok(account)
}
