//! Verification and password-reset secrets.
//!
//! A minted secret is 32 random bytes, base64url-encoded. Only its SHA-256
//! digest is ever persisted; the plaintext leaves the system exactly once,
//! embedded in an email link. Tokens are single-use and time-bounded.
//!
//! The digest is a plain fast hash on purpose: the input is a high-entropy
//! single-use random value checked by equality, not a password.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Caller bookkeeping for which flow a secret belongs to. The minter itself
/// is purpose-agnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyAccount,
    ResetPassword,
}

impl TokenPurpose {
    /// Outbox template name used when the secret is mailed out.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::VerifyAccount => "verify_account",
            Self::ResetPassword => "reset_password",
        }
    }
}

/// A freshly minted pending secret. `plaintext` is handed to the email
/// collaborator; `digest` and `expires_at` are stored.
#[derive(Debug)]
pub struct MintedSecret {
    pub purpose: TokenPurpose,
    pub plaintext: String,
    pub digest: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of checking a presented secret against stored state.
#[derive(Debug, PartialEq, Eq)]
pub enum Redemption {
    Accepted,
    Expired,
    Mismatch,
}

/// Mint a new pending secret with `ttl_seconds` of validity from `now`.
///
/// # Errors
///
/// Fails only when the OS entropy source does.
pub fn mint(purpose: TokenPurpose, ttl_seconds: i64, now: DateTime<Utc>) -> Result<MintedSecret> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token secret")?;
    let plaintext = Base64UrlUnpadded::encode_string(&bytes);
    let digest = digest(&plaintext);

    Ok(MintedSecret {
        purpose,
        plaintext,
        digest,
        expires_at: now + Duration::seconds(ttl_seconds),
    })
}

/// SHA-256 digest of a presented secret, matching what is stored at rest.
#[must_use]
pub fn digest(plaintext: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.finalize().to_vec()
}

/// Decide whether a presented secret can be redeemed against stored state.
///
/// Absent stored state always resolves to `Mismatch`. Equality is checked
/// before expiry, so an expired-but-matching secret reports `Expired` (the
/// API still collapses both to one uniform error for the caller).
#[must_use]
pub fn redeem(
    presented: &str,
    stored: Option<(&[u8], DateTime<Utc>)>,
    now: DateTime<Utc>,
) -> Redemption {
    let Some((stored_digest, stored_expiry)) = stored else {
        return Redemption::Mismatch;
    };
    if digest(presented) != stored_digest {
        return Redemption::Mismatch;
    }
    if now >= stored_expiry {
        return Redemption::Expired;
    }
    Redemption::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn mint_produces_256_bits() -> Result<()> {
        let minted = mint(TokenPurpose::VerifyAccount, 600, now())?;
        let decoded = Base64UrlUnpadded::decode_vec(&minted.plaintext)
            .context("plaintext should be base64url")?;
        assert_eq!(decoded.len(), 32);
        assert_eq!(minted.digest, digest(&minted.plaintext));
        assert_eq!(minted.expires_at, now() + Duration::seconds(600));
        Ok(())
    }

    #[test]
    fn mint_is_not_deterministic() -> Result<()> {
        let first = mint(TokenPurpose::ResetPassword, 600, now())?;
        let second = mint(TokenPurpose::ResetPassword, 600, now())?;
        assert_ne!(first.plaintext, second.plaintext);
        assert_ne!(first.digest, second.digest);
        Ok(())
    }

    #[test]
    fn redeem_accepts_before_expiry() -> Result<()> {
        let minted = mint(TokenPurpose::VerifyAccount, 600, now())?;
        let outcome = redeem(
            &minted.plaintext,
            Some((&minted.digest, minted.expires_at)),
            now() + Duration::seconds(599),
        );
        assert_eq!(outcome, Redemption::Accepted);
        Ok(())
    }

    #[test]
    fn redeem_expired_at_boundary() -> Result<()> {
        // `now == expiry` is already expired; acceptance requires strictly before.
        let minted = mint(TokenPurpose::VerifyAccount, 600, now())?;
        let outcome = redeem(
            &minted.plaintext,
            Some((&minted.digest, minted.expires_at)),
            minted.expires_at,
        );
        assert_eq!(outcome, Redemption::Expired);
        Ok(())
    }

    #[test]
    fn redeem_mismatch_on_wrong_secret() -> Result<()> {
        let minted = mint(TokenPurpose::ResetPassword, 600, now())?;
        let outcome = redeem(
            "some-other-secret",
            Some((&minted.digest, minted.expires_at)),
            now(),
        );
        assert_eq!(outcome, Redemption::Mismatch);
        Ok(())
    }

    #[test]
    fn redeem_mismatch_on_absent_state() {
        assert_eq!(redeem("anything", None, now()), Redemption::Mismatch);
    }

    #[test]
    fn reissue_supersedes_prior_secret() -> Result<()> {
        // The stored pair is overwritten by the second mint; the first
        // plaintext becomes permanently unredeemable.
        let first = mint(TokenPurpose::ResetPassword, 600, now())?;
        let second = mint(TokenPurpose::ResetPassword, 600, now())?;
        let outcome = redeem(
            &first.plaintext,
            Some((&second.digest, second.expires_at)),
            now(),
        );
        assert_eq!(outcome, Redemption::Mismatch);
        let outcome = redeem(
            &second.plaintext,
            Some((&second.digest, second.expires_at)),
            now(),
        );
        assert_eq!(outcome, Redemption::Accepted);
        Ok(())
    }

    #[test]
    fn template_names() {
        assert_eq!(TokenPurpose::VerifyAccount.template(), "verify_account");
        assert_eq!(TokenPurpose::ResetPassword.template(), "reset_password");
    }
}
