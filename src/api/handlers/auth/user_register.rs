use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;

use super::password::hash_password;
use super::session;
use super::state::AuthState;
use super::storage::{self, CreateOutcome};
use super::types::{AccountSummary, RegisterRequest, SessionResponse};
use super::utils::{normalize_email, valid_email, valid_handle, valid_password};
use crate::api::error::ApiError;

/// Create a new account and hand back a session for it.
#[utoipa::path(
    post,
    path = "/users/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 400, description = "Invalid email, handle or password"),
        (status = 422, description = "Email already in use")
    ),
    tag = "auth"
)]
pub async fn register(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::validation("missing request body"));
    };

    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return Err(ApiError::validation("invalid email address"));
    }
    if !valid_handle(&payload.handle) {
        return Err(ApiError::validation("handle must not be blank"));
    }
    if !valid_password(&payload.password) {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }

    let password_hash = hash_password(&payload.password)?;

    let account =
        match storage::insert_account(&pool, &email, payload.handle.trim(), &password_hash).await? {
            CreateOutcome::Created(account) => account,
            CreateOutcome::DuplicateEmail => return Err(ApiError::DuplicateEmail),
        };

    let token = session::mint(
        state.session_key(),
        account.id,
        state.config().session_ttl_seconds(),
        Utc::now(),
    )
    .map_err(|err| anyhow::anyhow!("failed to mint session token: {err}"))?;

    info!(account_id = %account.id, "account registered");

    let body = SessionResponse {
        token,
        user: AccountSummary::from(&account),
    };

    Ok((StatusCode::CREATED, Json(body)))
}
