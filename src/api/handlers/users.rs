//! Account roster and management endpoints. All of them sit behind the
//! bearer session check; mutation of other accounts additionally requires
//! the admin flag.

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::auth::password::hash_password;
use super::auth::principal::require_auth;
use super::auth::storage::{self, Account, UpdateOutcome};
use super::auth::types::{AccountSummary, UpdateProfileRequest};
use super::auth::utils::{normalize_email, valid_email, valid_handle, valid_password};
use super::auth::AuthState;
use crate::api::error::ApiError;

fn can_manage(caller: &Account, target_id: Uuid) -> bool {
    caller.id == target_id || caller.is_admin || caller.is_superuser
}

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All accounts", body = [AccountSummary]),
        (status = 401, description = "Missing or invalid session")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_auth(&headers, &pool, &state).await?;

    let accounts = storage::list_accounts(&pool).await?;
    let summaries: Vec<AccountSummary> = accounts.iter().map(AccountSummary::from).collect();

    Ok(Json(summaries))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = AccountSummary),
        (status = 404, description = "No such account")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_auth(&headers, &pool, &state).await?;

    let account = storage::find_by_id(&pool, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(AccountSummary::from(&account)))
}

#[utoipa::path(
    get,
    path = "/users/profile/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Profile", body = AccountSummary),
        (status = 404, description = "No such account")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_profile(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_auth(&headers, &pool, &state).await?;

    let account = storage::find_by_id(&pool, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(AccountSummary::from(&account)))
}

/// Update an account's handle, email or password. A password given here is
/// re-derived from scratch; the stored hash is never edited in place.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated account", body = AccountSummary),
        (status = 403, description = "Not the caller's account"),
        (status = 404, description = "No such account"),
        (status = 422, description = "Email already in use")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Option<Json<UpdateProfileRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = require_auth(&headers, &pool, &state).await?;
    if !can_manage(&caller, id) {
        return Err(ApiError::Forbidden);
    }

    let Some(Json(payload)) = payload else {
        return Err(ApiError::validation("missing request body"));
    };

    let email = payload.email.as_deref().map(normalize_email);
    if let Some(email) = email.as_deref() {
        if !valid_email(email) {
            return Err(ApiError::validation("invalid email address"));
        }
    }
    if let Some(handle) = payload.handle.as_deref() {
        if !valid_handle(handle) {
            return Err(ApiError::validation("handle must not be blank"));
        }
    }

    let new_hash = match payload.password.as_deref() {
        Some(password) if !valid_password(password) => {
            return Err(ApiError::validation("password must be at least 8 characters"));
        }
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let outcome = storage::update_profile(
        &pool,
        id,
        payload.handle.as_deref().map(str::trim),
        email.as_deref(),
        new_hash.as_deref(),
    )
    .await?;

    match outcome {
        UpdateOutcome::Updated(account) => {
            info!(account_id = %account.id, "profile updated");
            Ok(Json(AccountSummary::from(&account)))
        }
        UpdateOutcome::NotFound => Err(ApiError::NotFound),
        UpdateOutcome::DuplicateEmail => Err(ApiError::DuplicateEmail),
    }
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 403, description = "Not the caller's account"),
        (status = 404, description = "No such account")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = require_auth(&headers, &pool, &state).await?;
    if !can_manage(&caller, id) {
        return Err(ApiError::Forbidden);
    }

    if storage::delete_account(&pool, id).await? {
        info!(account_id = %id, "account deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

#[utoipa::path(
    put,
    path = "/users/block-user/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account blocked", body = AccountSummary),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such account")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn block_user(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    set_blocked(&pool, &state, &headers, id, true).await
}

#[utoipa::path(
    put,
    path = "/users/unblock-user/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account unblocked", body = AccountSummary),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such account")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn unblock_user(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<AuthState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    set_blocked(&pool, &state, &headers, id, false).await
}

async fn set_blocked(
    pool: &PgPool,
    state: &AuthState,
    headers: &HeaderMap,
    id: Uuid,
    blocked: bool,
) -> Result<Json<AccountSummary>, ApiError> {
    let caller = require_auth(headers, pool, state).await?;
    if !caller.is_admin && !caller.is_superuser {
        return Err(ApiError::Forbidden);
    }

    let account = storage::set_blocked(pool, id, blocked)
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(account_id = %account.id, blocked, "blocked flag updated");

    Ok(Json(AccountSummary::from(&account)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(id: Uuid, is_admin: bool) -> Account {
        Account {
            id,
            email: "a@b.cl".to_string(),
            handle: "ana".to_string(),
            password_hash: String::new(),
            is_verified: true,
            is_blocked: false,
            is_admin,
            is_superuser: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn callers_manage_themselves() {
        let id = Uuid::new_v4();
        assert!(can_manage(&account(id, false), id));
    }

    #[test]
    fn non_admins_cannot_manage_others() {
        let caller = account(Uuid::new_v4(), false);
        assert!(!can_manage(&caller, Uuid::new_v4()));
    }

    #[test]
    fn admins_manage_anyone() {
        let caller = account(Uuid::new_v4(), true);
        assert!(can_manage(&caller, Uuid::new_v4()));
    }
}
