//! Request and response bodies for the credential endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::Account;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public view of an account. Never carries the password hash or any
/// pending token state.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountSummary {
    pub id: Uuid,
    pub email: String,
    pub handle: String,
    pub is_verified: bool,
    pub is_blocked: bool,
    pub is_admin: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            handle: account.handle.clone(),
            is_verified: account.is_verified,
            is_blocked: account.is_blocked,
            is_admin: account.is_admin,
            is_superuser: account.is_superuser,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Session token plus the account it belongs to, returned by register and
/// login.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub user: AccountSummary,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyAccountRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Partial profile update; absent fields keep their current value.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub handle: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_deserializes() {
        let body = r#"{"email":"a@b.cl","handle":"ana","password":"hunter22"}"#;
        let request: RegisterRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.email, "a@b.cl");
        assert_eq!(request.handle, "ana");
        assert_eq!(request.password, "hunter22");
    }

    #[test]
    fn update_profile_fields_are_optional() {
        let request: UpdateProfileRequest = serde_json::from_str(r#"{"handle":"nina"}"#).unwrap();
        assert_eq!(request.handle.as_deref(), Some("nina"));
        assert!(request.email.is_none());
        assert!(request.password.is_none());
    }

    #[test]
    fn account_summary_omits_password_hash() {
        let account = Account {
            id: Uuid::new_v4(),
            email: "a@b.cl".to_string(),
            handle: "ana".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            is_verified: true,
            is_blocked: false,
            is_admin: false,
            is_superuser: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let summary = AccountSummary::from(&account);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"is_verified\":true"));
    }

    #[test]
    fn session_response_round_trips() {
        let account = Account {
            id: Uuid::new_v4(),
            email: "a@b.cl".to_string(),
            handle: "ana".to_string(),
            password_hash: String::new(),
            is_verified: false,
            is_blocked: false,
            is_admin: false,
            is_superuser: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let response = SessionResponse {
            token: "abc.def.ghi".to_string(),
            user: AccountSummary::from(&account),
        };
        let json = serde_json::to_string(&response).unwrap();
        let back: SessionResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.token, "abc.def.ghi");
        assert_eq!(back.user.id, account.id);
    }
}
