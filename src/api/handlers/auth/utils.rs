//! Small helpers for auth validation and credential carriers.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use regex::Regex;

use crate::api::error::ApiError;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Minimum password length for registration and reset.
pub(crate) fn valid_password(password: &str) -> bool {
    password.len() >= 8
}

/// Handles are display names: non-empty after trimming.
pub(crate) fn valid_handle(handle: &str) -> bool {
    !handle.trim().is_empty()
}

/// Pull a bearer token out of the Authorization header, if present.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Build the frontend verification link included in outbound emails.
pub(crate) fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-account/{token}")
}

/// Build the frontend password-reset link included in outbound emails.
pub(crate) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password/{token}")
}

/// A pending-token write that matched no account row means the account was
/// deleted between lookup and write. Callers must roll back and stop before
/// any email is queued for the dead address.
pub(crate) fn ensure_token_stored(rows_matched: bool) -> Result<(), ApiError> {
    if rows_matched {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
