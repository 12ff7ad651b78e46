//! # Fiscus (Finance Tracking Backend)
//!
//! `fiscus` is a personal/team finance-tracking backend. This crate carries the
//! account and credential subsystem: registration, Argon2id password hashing,
//! stateless signed session tokens, and the two time-bounded email flows
//! (account verification and password reset).
//!
//! ## Credentials & Tokens
//!
//! - Passwords are stored as Argon2id PHC strings; the plaintext never touches
//!   the database or the logs.
//! - Verification and reset secrets are random 256-bit values; only their
//!   SHA-256 digest is persisted, paired with an expiry. Both fields are set
//!   and cleared together, and a secret is consumed exactly once.
//! - Session tokens are HS256-signed claim sets with no server-side state.
//!   The signing secret is loaded from configuration at startup and is never
//!   embedded in source.
//!
//! ## Known Gaps
//!
//! Rate limiting is not implemented. Blocking a user takes effect on the next
//! authenticated request, but already-issued session tokens stay
//! cryptographically valid until their natural expiry.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
