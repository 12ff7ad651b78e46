//! Credential and token lifecycle: password hashing, session tokens,
//! single-use email secrets and the HTTP flows built on them.
//!
//! Three shapes of secret live here and are never interchangeable:
//!
//! * passwords, stored only as Argon2id PHC strings ([`password`])
//! * bearer session tokens, HMAC-signed and stateless ([`session`])
//! * single-use email secrets for verification and reset, stored only as
//!   SHA-256 digests next to an expiry ([`tokens`])

pub mod password;
pub mod principal;
pub mod reset;
pub mod session;
pub mod state;
pub mod storage;
pub mod tokens;
pub mod types;
pub mod user_login;
pub mod user_register;
pub mod utils;
pub mod verification;

pub use state::{AuthConfig, AuthState};
