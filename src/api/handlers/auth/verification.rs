use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, info};

use super::principal::require_auth;
use super::state::AuthState;
use super::storage;
use super::tokens::{self, TokenPurpose};
use super::types::{AccountSummary, VerifyAccountRequest};
use super::utils::{build_verify_url, ensure_token_stored};
use crate::api::email;
use crate::api::error::ApiError;

/// Mint a verification secret for the calling account and queue the email
/// carrying it. Re-requesting simply overwrites the previous pending secret.
#[utoipa::path(
    post,
    path = "/users/send-verification-request",
    responses(
        (status = 204, description = "Verification email queued"),
        (status = 401, description = "Missing or invalid session"),
        (status = 502, description = "Email could not be queued")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn send_verification_request(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let account = require_auth(&headers, &pool, &state).await?;

    let minted = tokens::mint(
        TokenPurpose::VerifyAccount,
        state.config().email_token_ttl_seconds(),
        Utc::now(),
    )?;

    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;

    let stored = storage::store_token(&mut tx, account.id, &minted).await?;
    if let Err(err) = ensure_token_stored(stored) {
        // The account disappeared between the gate and the write.
        tx.rollback().await.map_err(anyhow::Error::from)?;
        return Err(err);
    }

    let verify_url = build_verify_url(state.config().frontend_base_url(), &minted.plaintext);
    let queued = email::enqueue(
        &mut tx,
        &account.email,
        minted.purpose.template(),
        &json!({
            "handle": account.handle,
            "url": verify_url,
            "expires_in_minutes": state.config().email_token_ttl_seconds() / 60,
        }),
    )
    .await;

    if let Err(err) = queued {
        debug!(account_id = %account.id, "failed to queue verification email: {err:?}");
        // Roll back so the stored secret never outlives its delivery.
        tx.rollback().await.map_err(anyhow::Error::from)?;
        return Err(ApiError::DeliveryFailed);
    }

    tx.commit().await.map_err(anyhow::Error::from)?;

    info!(account_id = %account.id, "verification email queued");

    Ok(StatusCode::NO_CONTENT)
}

/// Redeem a verification secret. Only a logged-in caller may confirm, since
/// the link is only ever issued to an authenticated session. Succeeds at
/// most once per minted secret; expired, already-used and unknown tokens
/// all answer with the same 400.
#[utoipa::path(
    put,
    path = "/users/verify-account",
    request_body = VerifyAccountRequest,
    responses(
        (status = 200, description = "Account verified", body = AccountSummary),
        (status = 400, description = "Invalid or expired token"),
        (status = 401, description = "Missing or invalid session")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn verify_account(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
    payload: Option<Json<VerifyAccountRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    require_auth(&headers, &pool, &state).await?;

    let Some(Json(payload)) = payload else {
        return Err(ApiError::validation("missing request body"));
    };

    let digest = tokens::digest(&payload.token);

    if let Some(account) = storage::consume_verification_token(&pool, &digest).await? {
        info!(account_id = %account.id, "account verified");
        return Ok(Json(AccountSummary::from(&account)));
    }

    // Classify for logs only; callers always see the same answer.
    match storage::find_token_expiry(&pool, TokenPurpose::VerifyAccount, &digest).await? {
        Some(expires_at) if Utc::now() >= expires_at => debug!("verification token expired"),
        Some(_) => debug!("verification token lost a concurrent redemption"),
        None => debug!("verification token unknown or already used"),
    }

    Err(ApiError::InvalidOrExpiredToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::session::SessionKey;
    use crate::api::handlers::auth::state::AuthConfig;
    use axum::http::HeaderValue;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn state() -> AuthState {
        let key = SessionKey::from_secret(&SecretString::from(
            "an-adequately-long-signing-secret-0123456789",
        ))
        .unwrap();
        AuthState::new(AuthConfig::new("http://localhost:3000".to_string()), key)
    }

    fn lazy_pool() -> PgPool {
        // Never connects; the gate must reject before any query runs.
        PgPoolOptions::new()
            .connect_lazy("postgres://fiscus@localhost:5432/fiscus")
            .unwrap()
    }

    #[tokio::test]
    async fn confirm_rejects_anonymous_callers() {
        let result = verify_account(
            Extension(lazy_pool()),
            Extension(state()),
            HeaderMap::new(),
            Some(Json(VerifyAccountRequest {
                token: "leaked-link-secret".to_string(),
            })),
        )
        .await;

        assert!(matches!(result, Err(ApiError::NoCredential)));
    }

    #[tokio::test]
    async fn confirm_rejects_garbage_sessions() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer not.a.session"),
        );

        let result = verify_account(
            Extension(lazy_pool()),
            Extension(state()),
            headers,
            Some(Json(VerifyAccountRequest {
                token: "leaked-link-secret".to_string(),
            })),
        )
        .await;

        assert!(matches!(result, Err(ApiError::InvalidCredential)));
    }
}
