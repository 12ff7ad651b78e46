use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use super::password::hash_password;
use super::state::AuthState;
use super::storage;
use super::tokens::{self, TokenPurpose};
use super::types::{ForgotPasswordRequest, ResetPasswordRequest};
use super::utils::{build_reset_url, ensure_token_stored, normalize_email, valid_password};
use crate::api::email;
use crate::api::error::ApiError;

/// Mint a reset secret for the named email and queue the email carrying it.
#[utoipa::path(
    post,
    path = "/users/forgot-password-token",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset email queued"),
        (status = 404, description = "No account with that email"),
        (status = 502, description = "Email could not be queued")
    ),
    tag = "auth"
)]
pub async fn forgot_password_token(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::validation("missing request body"));
    };

    let email_address = normalize_email(&payload.email);

    let Some(account) = storage::find_by_email(&pool, &email_address).await? else {
        return Err(ApiError::NotFound);
    };

    let minted = tokens::mint(
        TokenPurpose::ResetPassword,
        state.config().email_token_ttl_seconds(),
        Utc::now(),
    )?;

    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;

    let stored = storage::store_token(&mut tx, account.id, &minted).await?;
    if let Err(err) = ensure_token_stored(stored) {
        // The account disappeared between lookup and write.
        tx.rollback().await.map_err(anyhow::Error::from)?;
        return Err(err);
    }

    let reset_url = build_reset_url(state.config().frontend_base_url(), &minted.plaintext);
    let queued = email::enqueue(
        &mut tx,
        &account.email,
        minted.purpose.template(),
        &json!({
            "handle": account.handle,
            "url": reset_url,
            "expires_in_minutes": state.config().email_token_ttl_seconds() / 60,
        }),
    )
    .await;

    if let Err(err) = queued {
        debug!(account_id = %account.id, "failed to queue reset email: {err:?}");
        tx.rollback().await.map_err(anyhow::Error::from)?;
        return Err(ApiError::DeliveryFailed);
    }

    tx.commit().await.map_err(anyhow::Error::from)?;

    info!(account_id = %account.id, "password reset email queued");

    Ok(StatusCode::NO_CONTENT)
}

/// Redeem a reset secret and install the new password. The token check, the
/// clearing of the pending secret and the password swap are a single
/// database statement, so a secret can never authorize two resets.
#[utoipa::path(
    put,
    path = "/users/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Invalid token or unacceptable password")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Extension(pool): Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::validation("missing request body"));
    };

    if !valid_password(&payload.password) {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }

    let digest = tokens::digest(&payload.token);
    let new_hash = hash_password(&payload.password)?;

    if let Some(account) = storage::consume_reset_token(&pool, &digest, &new_hash).await? {
        info!(account_id = %account.id, "password reset");

        // Best-effort notice; the reset itself already committed.
        let queued = email::enqueue_via_pool(
            &pool,
            &account.email,
            "password_changed",
            &json!({ "handle": account.handle }),
        )
        .await;
        if let Err(err) = queued {
            warn!(account_id = %account.id, "failed to queue password change notice: {err:?}");
        }

        return Ok(StatusCode::NO_CONTENT);
    }

    // Classify for logs only; callers always see the same answer.
    match storage::find_token_expiry(&pool, TokenPurpose::ResetPassword, &digest).await? {
        Some(expires_at) if Utc::now() >= expires_at => debug!("reset token expired"),
        Some(_) => debug!("reset token lost a concurrent redemption"),
        None => debug!("reset token unknown or already used"),
    }

    Err(ApiError::InvalidOrExpiredToken)
}
