use axum::{response::IntoResponse, Extension, Json};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info};

use super::password::verify_password;
use super::session;
use super::state::AuthState;
use super::storage;
use super::types::{AccountSummary, LoginRequest, SessionResponse};
use super::utils::normalize_email;
use crate::api::error::ApiError;

/// Exchange email and password for a session token.
///
/// Unknown email and wrong password both answer with the same 401 body, so
/// the endpoint cannot be used to probe which addresses are registered.
#[utoipa::path(
    post,
    path = "/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::validation("missing request body"));
    };

    let email = normalize_email(&payload.email);

    let Some(account) = storage::find_by_email(&pool, &email).await? else {
        debug!("login rejected, unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&payload.password, &account.password_hash) {
        debug!(account_id = %account.id, "login rejected, password mismatch");
        return Err(ApiError::InvalidCredentials);
    }

    let token = session::mint(
        state.session_key(),
        account.id,
        state.config().session_ttl_seconds(),
        Utc::now(),
    )
    .map_err(|err| anyhow::anyhow!("failed to mint session token: {err}"))?;

    info!(account_id = %account.id, "session issued");

    let body = SessionResponse {
        token,
        user: AccountSummary::from(&account),
    };

    Ok(Json(body))
}
