//! Resolving the calling account from a bearer session token.

use axum::http::HeaderMap;
use chrono::Utc;
use sqlx::PgPool;
use tracing::debug;

use super::session;
use super::state::AuthState;
use super::storage::{self, Account};
use super::utils::extract_bearer_token;
use crate::api::error::ApiError;

/// Validate the bearer token and load the account it names.
///
/// Fails with `NoCredential` when no token is presented, `InvalidCredential`
/// when the token is malformed, tampered, expired or names a deleted
/// account, and `Blocked` when the account exists but is blocked.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Account, ApiError> {
    let token = extract_bearer_token(headers).ok_or(ApiError::NoCredential)?;

    let account_id = session::validate(state.session_key(), &token, Utc::now()).map_err(|err| {
        debug!("session token rejected: {err}");
        ApiError::InvalidCredential
    })?;

    let account = storage::find_by_id(pool, account_id)
        .await?
        .ok_or(ApiError::InvalidCredential)?;

    if account.is_blocked {
        return Err(ApiError::Blocked);
    }

    Ok(account)
}
