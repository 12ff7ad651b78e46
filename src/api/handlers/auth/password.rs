//! Password hashing and verification (Argon2id).
//!
//! Hashes are PHC-format strings with a random per-password salt. The
//! plaintext never leaves this module in any form other than the digest.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password with Argon2id and a fresh random salt.
///
/// # Errors
///
/// Fails only on catastrophic entropy or parameter failure, never on the
/// content of the password itself.
pub fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC-format hash.
///
/// A mismatch or a malformed stored hash both return `false`; verification
/// never fails loudly on caller input. Comparison happens inside the argon2
/// verifier, which is not correlated with match length.
#[must_use]
pub fn verify_password(plaintext: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() -> Result<()> {
        let digest = hash_password("correct horse battery staple")?;
        assert!(digest.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery staple", &digest));
        Ok(())
    }

    #[test]
    fn wrong_password_fails() -> Result<()> {
        let digest = hash_password("p1")?;
        assert!(!verify_password("p2", &digest));
        Ok(())
    }

    #[test]
    fn salts_differ_between_hashes() -> Result<()> {
        let first = hash_password("same input")?;
        let second = hash_password("same input")?;
        assert_ne!(first, second);
        assert!(verify_password("same input", &first));
        assert!(verify_password("same input", &second));
        Ok(())
    }

    #[test]
    fn malformed_digest_returns_false() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }
}
