//! Database helpers for accounts and pending token state.
//!
//! Token redemption uses a single conditional UPDATE (digest equality and
//! expiry check in the WHERE clause, field clearing and effect in the SET
//! clause), so two concurrent redemptions of the same still-valid secret can
//! never both succeed. Re-issuing a pending secret is a plain overwrite:
//! latest request supersedes the prior one, no lock taken.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::tokens::{MintedSecret, TokenPurpose};
use super::utils::is_unique_violation;

/// Account row as the credential subsystem sees it. The pending token pairs
/// are deliberately not part of this snapshot; they are only touched by the
/// store/consume helpers below.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub handle: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub is_blocked: bool,
    pub is_admin: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ACCOUNT_COLUMNS: &str = "id, email, handle, password_hash, is_verified, is_blocked, \
     is_admin, is_superuser, created_at, updated_at";

fn account_from_row(row: &PgRow) -> Account {
    Account {
        id: row.get("id"),
        email: row.get("email"),
        handle: row.get("handle"),
        password_hash: row.get("password_hash"),
        is_verified: row.get("is_verified"),
        is_blocked: row.get("is_blocked"),
        is_admin: row.get("is_admin"),
        is_superuser: row.get("is_superuser"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Account),
    DuplicateEmail,
}

/// Outcome of a profile update.
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(Account),
    NotFound,
    DuplicateEmail,
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Account>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account by id")?;

    Ok(row.map(|row| account_from_row(&row)))
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Account>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account by email")?;

    Ok(row.map(|row| account_from_row(&row)))
}

pub async fn list_accounts(pool: &PgPool) -> Result<Vec<Account>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users ORDER BY created_at");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list accounts")?;

    Ok(rows.iter().map(account_from_row).collect())
}

/// Insert a new account with its already-derived password hash.
pub async fn insert_account(
    pool: &PgPool,
    email: &str,
    handle: &str,
    password_hash: &str,
) -> Result<CreateOutcome> {
    let query = format!(
        "INSERT INTO users (email, handle, password_hash) \
         VALUES ($1, $2, $3) \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(handle)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(CreateOutcome::Created(account_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::DuplicateEmail),
        Err(err) => Err(err).context("failed to insert account"),
    }
}

/// Store a freshly minted pending secret on the account, overwriting any
/// prior one for the same purpose (hash and expiry always move together).
pub async fn store_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: Uuid,
    minted: &MintedSecret,
) -> Result<bool> {
    let query = match minted.purpose {
        TokenPurpose::VerifyAccount => {
            "UPDATE users \
             SET verification_token_hash = $2, \
                 verification_token_expires_at = $3, \
                 updated_at = NOW() \
             WHERE id = $1"
        }
        TokenPurpose::ResetPassword => {
            "UPDATE users \
             SET reset_token_hash = $2, \
                 reset_token_expires_at = $3, \
                 updated_at = NOW() \
             WHERE id = $1"
        }
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account_id)
        .bind(&minted.digest)
        .bind(minted.expires_at)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to store pending token")?;

    Ok(result.rows_affected() > 0)
}

/// Atomically consume a verification secret: the digest and expiry checks
/// and the clearing of both fields plus the `is_verified` flip happen in one
/// statement. Returns the verified account, or `None` if no still-valid
/// matching token existed.
pub async fn consume_verification_token(
    pool: &PgPool,
    token_digest: &[u8],
) -> Result<Option<Account>> {
    let query = format!(
        "UPDATE users \
         SET is_verified = TRUE, \
             verification_token_hash = NULL, \
             verification_token_expires_at = NULL, \
             updated_at = NOW() \
         WHERE verification_token_hash = $1 \
           AND verification_token_expires_at > NOW() \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(token_digest)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume verification token")?;

    Ok(row.map(|row| account_from_row(&row)))
}

/// Atomically consume a reset secret and install the new password hash in
/// the same statement that clears the token pair.
pub async fn consume_reset_token(
    pool: &PgPool,
    token_digest: &[u8],
    new_password_hash: &str,
) -> Result<Option<Account>> {
    let query = format!(
        "UPDATE users \
         SET password_hash = $2, \
             reset_token_hash = NULL, \
             reset_token_expires_at = NULL, \
             updated_at = NOW() \
         WHERE reset_token_hash = $1 \
           AND reset_token_expires_at > NOW() \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(token_digest)
        .bind(new_password_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;

    Ok(row.map(|row| account_from_row(&row)))
}

/// Expiry of a stored pending token matching `token_digest`, if any.
/// Used only to classify failed redemptions for internal logs.
pub async fn find_token_expiry(
    pool: &PgPool,
    purpose: TokenPurpose,
    token_digest: &[u8],
) -> Result<Option<DateTime<Utc>>> {
    let query = match purpose {
        TokenPurpose::VerifyAccount => {
            "SELECT verification_token_expires_at AS expires_at \
             FROM users WHERE verification_token_hash = $1"
        }
        TokenPurpose::ResetPassword => {
            "SELECT reset_token_expires_at AS expires_at \
             FROM users WHERE reset_token_hash = $1"
        }
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_digest)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup token expiry")?;

    Ok(row.and_then(|row| row.get("expires_at")))
}

/// Update mutable profile fields. A new password arrives here already
/// re-derived as a hash; the old hash is never copied forward.
pub async fn update_profile(
    pool: &PgPool,
    id: Uuid,
    handle: Option<&str>,
    email: Option<&str>,
    password_hash: Option<&str>,
) -> Result<UpdateOutcome> {
    let query = format!(
        "UPDATE users \
         SET handle = COALESCE($2, handle), \
             email = COALESCE($3, email), \
             password_hash = COALESCE($4, password_hash), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(handle)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => Ok(UpdateOutcome::Updated(account_from_row(&row))),
        Ok(None) => Ok(UpdateOutcome::NotFound),
        Err(err) if is_unique_violation(&err) => Ok(UpdateOutcome::DuplicateEmail),
        Err(err) => Err(err).context("failed to update profile"),
    }
}

pub async fn set_blocked(pool: &PgPool, id: Uuid, blocked: bool) -> Result<Option<Account>> {
    let query = format!(
        "UPDATE users SET is_blocked = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(blocked)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update blocked flag")?;

    Ok(row.map(|row| account_from_row(&row)))
}

pub async fn delete_account(pool: &PgPool, id: Uuid) -> Result<bool> {
    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete account")?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_outcome_debug_names() {
        assert_eq!(format!("{:?}", CreateOutcome::DuplicateEmail), "DuplicateEmail");
    }

    #[test]
    fn update_outcome_debug_names() {
        assert_eq!(format!("{:?}", UpdateOutcome::NotFound), "NotFound");
        assert_eq!(format!("{:?}", UpdateOutcome::DuplicateEmail), "DuplicateEmail");
    }

    #[test]
    fn account_columns_never_include_token_fields() {
        // The pending token pairs must not leak through roster/profile reads.
        assert!(!ACCOUNT_COLUMNS.contains("token"));
        assert!(ACCOUNT_COLUMNS.contains("password_hash"));
    }
}
