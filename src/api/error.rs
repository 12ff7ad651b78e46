//! API error taxonomy.
//!
//! Every failure path in the credential and token flows resolves to one of
//! these variants at the handler boundary. Auth-relevant variants carry
//! deliberately undifferentiated messages: login failures never say which
//! field was wrong, and token failures never say whether the token was
//! unknown or merely expired.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String },
    #[error("Email already in use")]
    DuplicateEmail,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("Missing credentials")]
    NoCredential,
    #[error("Invalid or expired session")]
    InvalidCredential,
    #[error("Account is blocked")]
    Blocked,
    #[error("Not allowed")]
    Forbidden,
    #[error("Not found")]
    NotFound,
    #[error("Unable to deliver email")]
    DeliveryFailed,
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            Self::DuplicateEmail => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidCredentials | Self::NoCredential | Self::InvalidCredential => {
                StatusCode::UNAUTHORIZED
            }
            Self::Blocked | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DeliveryFailed => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Persistence(err) => {
                // Detail stays in the logs; the caller gets a generic body.
                error!("persistence failure: {err:#}");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::validation("handle is required").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::DuplicateEmail.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidOrExpiredToken.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NoCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::InvalidCredential.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Blocked.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::DeliveryFailed.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::Persistence(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn credential_errors_are_undifferentiated() {
        // Wrong email and wrong password must produce the same message.
        assert_eq!(
            ApiError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
        // Mismatch and expiry must produce the same message.
        assert_eq!(
            ApiError::InvalidOrExpiredToken.to_string(),
            "Invalid or expired token"
        );
    }

    #[test]
    fn persistence_body_is_generic() {
        let response = ApiError::Persistence(anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
